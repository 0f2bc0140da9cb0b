//! Error types for the download module.
//!
//! Variants carry the URL they relate to so a failure can be logged and
//! ledgered without extra context.

use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur while fetching and storing one media reference.
#[derive(Debug, Error)]
pub enum DownloadError {
    /// Network-level error (DNS resolution, connection refused, TLS errors, etc.)
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed to download.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Connect or total request timeout elapsed.
    #[error("timeout downloading {url}")]
    Timeout {
        /// The URL that timed out.
        url: String,
    },

    /// HTTP error response (4xx client errors, 5xx server errors).
    #[error("HTTP {status} downloading {url}")]
    HttpStatus {
        /// The URL that returned an error status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// The provided URL is malformed or not http(s).
    #[error("invalid URL: {url}")]
    InvalidUrl {
        /// The invalid URL string.
        url: String,
    },

    /// Payload exceeds the configured maximum size.
    #[error("{url} exceeds the size limit of {limit} bytes")]
    TooLarge {
        /// The URL whose payload was rejected.
        url: String,
        /// Configured limit in bytes.
        limit: u64,
    },

    /// Sniffed content type is not on the allow-list.
    #[error("{url} has disallowed content type {mime}")]
    DisallowedType {
        /// The URL whose payload was rejected.
        url: String,
        /// Sniffed MIME type, or `unknown`.
        mime: String,
    },

    /// The asset store failed to persist the bytes.
    #[error("failed to store asset from {url}: {source}")]
    Store {
        /// The URL that was downloaded.
        url: String,
        /// The underlying store error.
        #[source]
        source: StoreError,
    },
}

impl DownloadError {
    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            url: url.into(),
            status,
        }
    }

    /// Creates a timeout error.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self::Timeout { url: url.into() }
    }

    /// Creates an invalid URL error.
    pub fn invalid_url(url: impl Into<String>) -> Self {
        Self::InvalidUrl { url: url.into() }
    }

    /// Creates a size limit error.
    pub fn too_large(url: impl Into<String>, limit: u64) -> Self {
        Self::TooLarge {
            url: url.into(),
            limit,
        }
    }

    /// Creates a disallowed content type error.
    pub fn disallowed_type(url: impl Into<String>, mime: impl Into<String>) -> Self {
        Self::DisallowedType {
            url: url.into(),
            mime: mime.into(),
        }
    }

    /// Creates a store error.
    pub fn store(url: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            url: url.into(),
            source,
        }
    }

    /// Whether the failure lies with local infrastructure rather than the source.
    ///
    /// Such failures are not written to the failed-URL ledger.
    #[must_use]
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, Self::Store { .. })
    }

    /// Whether the payload was rejected by local limits (size cap, MIME
    /// allow-list) that an operator may later change.
    #[must_use]
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, Self::TooLarge { .. } | Self::DisallowedType { .. })
    }

    /// Whether a terminal failure of this kind belongs in the failed-URL ledger.
    #[must_use]
    pub fn blames_source(&self) -> bool {
        !self.is_infrastructure() && !self.is_policy_rejection()
    }
}

// No From<reqwest::Error> or From<StoreError>: every variant needs the URL,
// which the source errors do not carry. Use the helper constructors.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_download_error_timeout_display() {
        let error = DownloadError::timeout("https://ext.example/a.jpg");
        assert!(error.to_string().contains("timeout"));
        assert!(error.to_string().contains("https://ext.example/a.jpg"));
    }

    #[test]
    fn test_download_error_http_status_display() {
        let error = DownloadError::http_status("https://ext.example/a.jpg", 404);
        let msg = error.to_string();
        assert!(msg.contains("404"), "Expected '404' in: {msg}");
        assert!(msg.contains("https://ext.example/a.jpg"), "Expected URL in: {msg}");
    }

    #[test]
    fn test_download_error_too_large_display() {
        let msg = DownloadError::too_large("https://ext.example/big.mp4", 1024).to_string();
        assert!(msg.contains("1024"), "Expected limit in: {msg}");
    }

    #[test]
    fn test_download_error_disallowed_type_display() {
        let msg = DownloadError::disallowed_type("https://ext.example/a.jpg", "text/html").to_string();
        assert!(msg.contains("text/html"), "Expected MIME in: {msg}");
    }

    #[test]
    fn test_only_store_errors_are_infrastructure() {
        let store = DownloadError::store(
            "https://ext.example/a.jpg",
            StoreError::io("/srv/media/a.jpg", std::io::Error::other("disk full")),
        );
        assert!(store.is_infrastructure());
        assert!(!DownloadError::http_status("https://ext.example/a.jpg", 500).is_infrastructure());
        assert!(!DownloadError::invalid_url("x").is_infrastructure());
    }

    #[test]
    fn test_policy_rejections_do_not_blame_source() {
        let url = "https://ext.example/a.jpg";
        assert!(DownloadError::too_large(url, 1024).is_policy_rejection());
        assert!(DownloadError::disallowed_type(url, "text/html").is_policy_rejection());
        assert!(!DownloadError::too_large(url, 1024).blames_source());
        assert!(DownloadError::http_status(url, 404).blames_source());
        assert!(DownloadError::timeout(url).blames_source());
    }
}
