//! HTTP client wrapper for fetching media.
//!
//! [`HttpClient::fetch`] performs exactly one GET with bounded connect and
//! total timeouts, verifies the status, and streams the body into memory
//! while enforcing a size limit.

use std::time::Duration;

use futures_util::StreamExt;
use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tracing::{debug, instrument};
use url::Url;

use super::constants::default_user_agent;
use super::error::DownloadError;
use crate::config::IngestConfig;

/// HTTP client for media downloads.
///
/// Create once and share; clones reuse the same connection pool.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

/// Body and final location of a successful fetch.
#[derive(Debug, Clone)]
pub struct FetchedBody {
    /// URL after redirects.
    pub final_url: Url,
    /// Complete response body.
    pub bytes: Vec<u8>,
}

impl HttpClient {
    /// Creates a client with the timeouts from `config`.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with this static configuration,
    /// which only happens when the TLS backend cannot initialize.
    #[must_use]
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::with_timeouts(
            Duration::from_secs(config.connect_timeout_secs),
            Duration::from_secs(config.read_timeout_secs),
        )
    }

    /// Creates a client with explicit connect and total request timeouts.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails with the supplied configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn with_timeouts(connect_timeout: Duration, total_timeout: Duration) -> Self {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(total_timeout)
            .gzip(true)
            .user_agent(default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches `url`, rejecting bodies larger than `max_bytes`.
    ///
    /// `Content-Length` is checked before reading; the streamed byte count is
    /// checked as well because the header may be absent or wrong.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if:
    /// - The URL is invalid
    /// - The request fails or times out
    /// - The server returns a non-success status
    /// - The body exceeds `max_bytes`
    #[instrument(skip(self), fields(url = %url))]
    pub async fn fetch(&self, url: &str, max_bytes: u64) -> Result<FetchedBody, DownloadError> {
        let parsed = Url::parse(url).map_err(|_| DownloadError::invalid_url(url))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(DownloadError::invalid_url(url));
        }

        let response = self
            .client
            .get(parsed)
            .send()
            .await
            .map_err(|e| map_reqwest_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        let declared = response
            .headers()
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        if declared.is_some_and(|len| len > max_bytes) {
            debug!(declared, max_bytes, "rejecting by Content-Length");
            return Err(DownloadError::too_large(url, max_bytes));
        }

        let final_url = response.url().clone();
        let capacity = declared.map_or(0, |len| usize::try_from(len).unwrap_or(0));
        let mut bytes = Vec::with_capacity(capacity);
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| map_reqwest_error(url, e))?;
            if (bytes.len() + chunk.len()) as u64 > max_bytes {
                debug!(max_bytes, "rejecting oversized stream");
                return Err(DownloadError::too_large(url, max_bytes));
            }
            bytes.extend_from_slice(&chunk);
        }

        debug!(bytes = bytes.len(), "fetch complete");
        Ok(FetchedBody { final_url, bytes })
    }
}

fn map_reqwest_error(url: &str, error: reqwest::Error) -> DownloadError {
    if error.is_timeout() {
        DownloadError::timeout(url)
    } else {
        DownloadError::network(url, error)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::test_support::socket_guard::start_mock_server_or_skip;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, ResponseTemplate};

    fn client() -> HttpClient {
        HttpClient::from_config(&IngestConfig::default())
    }

    #[tokio::test]
    async fn test_fetch_success() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/a.jpg"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"\xFF\xD8\xFFjpeg".to_vec()))
            .mount(&mock_server)
            .await;

        let url = format!("{}/a.jpg", mock_server.uri());
        let body = client().fetch(&url, 1024).await.unwrap();

        assert_eq!(body.bytes, b"\xFF\xD8\xFFjpeg");
        assert_eq!(body.final_url.path(), "/a.jpg");
    }

    #[tokio::test]
    async fn test_fetch_404_error() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/missing.jpg"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let url = format!("{}/missing.jpg", mock_server.uri());
        match client().fetch(&url, 1024).await {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fetch_rejects_oversized_body() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/big.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0u8; 4096]))
            .mount(&mock_server)
            .await;

        let url = format!("{}/big.mp4", mock_server.uri());
        let result = client().fetch(&url, 1000).await;

        assert!(matches!(result, Err(DownloadError::TooLarge { limit: 1000, .. })));
    }

    #[tokio::test]
    async fn test_fetch_accepts_body_at_limit() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/exact.bin"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![7u8; 1000]))
            .mount(&mock_server)
            .await;

        let url = format!("{}/exact.bin", mock_server.uri());
        assert_eq!(client().fetch(&url, 1000).await.unwrap().bytes.len(), 1000);
    }

    #[test]
    fn test_fetch_invalid_url() {
        let result = tokio_test::block_on(client().fetch("not-a-valid-url", 1024));
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));

        let result = tokio_test::block_on(client().fetch("ftp://ext.example/a.jpg", 1024));
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_fetch_times_out() {
        let Some(mock_server) = start_mock_server_or_skip().await else {
            return;
        };
        Mock::given(method("GET"))
            .and(path("/slow.jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(b"late".to_vec())
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&mock_server)
            .await;

        let client = HttpClient::with_timeouts(Duration::from_secs(1), Duration::from_millis(200));
        let url = format!("{}/slow.jpg", mock_server.uri());

        assert!(matches!(client.fetch(&url, 1024).await, Err(DownloadError::Timeout { .. })));
    }
}
