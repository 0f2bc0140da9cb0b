//! Pipeline configuration.
//!
//! [`IngestConfig`] is an explicit value passed into every component
//! constructor. It can be deserialized from TOML; missing keys fall back to
//! the defaults below.
//!
//! ```toml
//! base_urls = ["https://blog.example.org"]
//! excluded_domains = ["*.cdn.example.com"]
//! max_retries = 2
//! concurrency = 8
//! ```

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

/// Default maximum retries for transient failures (in addition to the first attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Upper bound for `max_retries`.
pub const MAX_RETRIES_LIMIT: u32 = 10;

/// Default number of concurrent downloads per run.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Upper bound for `concurrency`.
pub const MAX_CONCURRENCY: usize = 64;

/// Default maximum accepted payload size (20 MiB).
pub const DEFAULT_MAX_FILE_SIZE_BYTES: u64 = 20 * 1024 * 1024;

/// Default lifetime of a progress record (10 minutes).
pub const DEFAULT_RUN_TTL_SECS: u64 = 600;

const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_READ_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BACKOFF_UNIT_MS: u64 = 1000;

/// MIME types accepted when no allow-list is configured.
pub const DEFAULT_ALLOWED_MIME_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/avif",
    "image/bmp",
    "image/svg+xml",
    "video/mp4",
    "video/webm",
    "video/quicktime",
];

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Config file is not valid TOML or has wrong value types.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its accepted range.
    #[error("invalid config value for `{field}`: {reason}")]
    Invalid {
        /// Offending key.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Settings consumed by the ingestion pipeline.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct IngestConfig {
    /// Base URLs of the home system; references under these are already local.
    pub base_urls: Vec<String>,
    /// Host patterns never downloaded (`*.example.com` or `example.com`).
    pub excluded_domains: Vec<String>,
    /// Sniffed MIME types that may be stored.
    pub allowed_mime_types: Vec<String>,
    /// Payloads larger than this are rejected permanently.
    pub max_file_size_bytes: u64,
    /// Retries after the first attempt, clamped to `0..=10`.
    pub max_retries: u32,
    /// Concurrent downloads per interactive run.
    pub concurrency: usize,
    /// Lifetime of progress records in seconds.
    pub run_ttl_secs: u64,
    /// HTTP connect timeout in seconds.
    pub connect_timeout_secs: u64,
    /// HTTP total request timeout in seconds.
    pub read_timeout_secs: u64,
    /// Length of one backoff unit in milliseconds.
    pub backoff_unit_ms: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            base_urls: Vec::new(),
            excluded_domains: Vec::new(),
            allowed_mime_types: DEFAULT_ALLOWED_MIME_TYPES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            max_file_size_bytes: DEFAULT_MAX_FILE_SIZE_BYTES,
            max_retries: DEFAULT_MAX_RETRIES,
            concurrency: DEFAULT_CONCURRENCY,
            run_ttl_secs: DEFAULT_RUN_TTL_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            backoff_unit_ms: DEFAULT_BACKOFF_UNIT_MS,
        }
    }
}

impl IngestConfig {
    /// Parses a TOML document, then normalizes and validates it.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] when the file cannot be read, otherwise
    /// the same errors as [`from_toml_str`](Self::from_toml_str).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), "loaded config file");
        Self::from_toml_str(&raw)
    }

    /// Clamps values that have a documented saturation behavior.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        if self.max_retries > MAX_RETRIES_LIMIT {
            warn!(
                requested = self.max_retries,
                limit = MAX_RETRIES_LIMIT,
                "max_retries clamped"
            );
            self.max_retries = MAX_RETRIES_LIMIT;
        }
        self.allowed_mime_types = self
            .allowed_mime_types
            .iter()
            .map(|m| m.trim().to_ascii_lowercase())
            .filter(|m| !m.is_empty())
            .collect();
        self
    }

    /// Validates values against their accepted ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=MAX_CONCURRENCY).contains(&self.concurrency) {
            return Err(ConfigError::invalid(
                "concurrency",
                format!("{} not in 1..={MAX_CONCURRENCY}", self.concurrency),
            ));
        }
        if self.max_retries > MAX_RETRIES_LIMIT {
            return Err(ConfigError::invalid(
                "max_retries",
                format!("{} not in 0..={MAX_RETRIES_LIMIT}", self.max_retries),
            ));
        }
        if self.max_file_size_bytes == 0 {
            return Err(ConfigError::invalid("max_file_size_bytes", "must be positive"));
        }
        if self.allowed_mime_types.is_empty() {
            return Err(ConfigError::invalid("allowed_mime_types", "must not be empty"));
        }
        if self.run_ttl_secs == 0 {
            return Err(ConfigError::invalid("run_ttl_secs", "must be positive"));
        }
        for (field, value) in [
            ("connect_timeout_secs", self.connect_timeout_secs),
            ("read_timeout_secs", self.read_timeout_secs),
        ] {
            if !(1..=3600).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{value} not in 1..=3600")));
            }
        }
        if self.backoff_unit_ms > 60_000 {
            return Err(ConfigError::invalid(
                "backoff_unit_ms",
                format!("{} not in 0..=60000", self.backoff_unit_ms),
            ));
        }
        for base in &self.base_urls {
            if url::Url::parse(base).is_err() {
                return Err(ConfigError::invalid(
                    "base_urls",
                    format!("'{base}' is not an absolute URL"),
                ));
            }
        }
        for pattern in &self.excluded_domains {
            let host = pattern.strip_prefix("*.").unwrap_or(pattern);
            if host.is_empty() || host.contains('*') || host.contains('/') {
                return Err(ConfigError::invalid(
                    "excluded_domains",
                    format!("'{pattern}' is not a host or *.host pattern"),
                ));
            }
        }
        Ok(())
    }

    /// Returns `max_retries` saturated to the accepted range.
    #[must_use]
    pub fn effective_max_retries(&self) -> u32 {
        self.max_retries.min(MAX_RETRIES_LIMIT)
    }

    /// Lifetime of progress records.
    #[must_use]
    pub fn run_ttl(&self) -> Duration {
        Duration::from_secs(self.run_ttl_secs)
    }

    /// Length of one backoff unit.
    #[must_use]
    pub fn backoff_unit(&self) -> Duration {
        Duration::from_millis(self.backoff_unit_ms)
    }

    /// Whether a sniffed MIME type is on the allow-list.
    #[must_use]
    pub fn is_mime_allowed(&self, mime: &str) -> bool {
        self.allowed_mime_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(mime))
    }
}
