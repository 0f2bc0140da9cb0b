//! Retry policy with capped linear backoff for transient download failures.
//!
//! When a download fails, the error is classified into a [`FailureType`]:
//! - [`FailureType::Transient`] - may succeed on retry (timeouts, 5xx, 408, resets)
//! - [`FailureType::RateLimited`] - HTTP 429, retried like a transient failure
//! - [`FailureType::Permanent`] - will not succeed regardless of retries
//!
//! The [`RetryPolicy`] then decides whether another attempt is made and how
//! long to wait first. The wait before attempt `n + 1` is
//! `min(n, 3) × backoff_unit`.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use media_ingest_core::download::{
//!     DownloadError, FailureType, RetryDecision, RetryPolicy, classify_error,
//! };
//!
//! let policy = RetryPolicy::new(2, Duration::from_millis(100));
//! let error = DownloadError::http_status("https://ext.example/a.jpg", 503);
//!
//! match policy.should_retry(classify_error(&error), 1) {
//!     RetryDecision::Retry { delay, attempt } => {
//!         assert_eq!(delay, Duration::from_millis(100));
//!         assert_eq!(attempt, 2);
//!     }
//!     RetryDecision::DoNotRetry { reason } => panic!("unexpected: {reason}"),
//! }
//! ```

use std::time::Duration;

use tracing::{debug, instrument};

use super::DownloadError;
use super::constants::MAX_BACKOFF_UNITS;
use crate::config::{IngestConfig, MAX_RETRIES_LIMIT};

/// Classification of download failure types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureType {
    /// Temporary failure that may succeed on retry.
    Transient,

    /// Failure that won't succeed regardless of retries.
    Permanent,

    /// Server rate limiting (HTTP 429).
    RateLimited,
}

impl FailureType {
    /// Whether another attempt may help.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::RateLimited)
    }
}

/// Decision on whether to retry a failed download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Retry the download after the specified delay.
    Retry {
        /// How long to wait before retrying.
        delay: Duration,
        /// Which attempt number this will be (1-indexed, so first retry is attempt 2).
        attempt: u32,
    },

    /// Do not retry the download.
    DoNotRetry {
        /// Human-readable reason why retry is not attempted.
        reason: String,
    },
}

/// Bounded retries with linear backoff capped at three units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt, at most [`MAX_RETRIES_LIMIT`].
    max_retries: u32,

    /// Length of one backoff unit.
    backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&IngestConfig::default())
    }
}

impl RetryPolicy {
    /// Creates a policy. `max_retries` saturates at [`MAX_RETRIES_LIMIT`].
    #[must_use]
    pub fn new(max_retries: u32, backoff_unit: Duration) -> Self {
        Self {
            max_retries: max_retries.min(MAX_RETRIES_LIMIT),
            backoff_unit,
        }
    }

    /// Policy using the configured retry count and backoff unit.
    #[must_use]
    pub fn from_config(config: &IngestConfig) -> Self {
        Self::new(config.effective_max_retries(), config.backoff_unit())
    }

    /// Retries after the first attempt.
    #[must_use]
    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Total attempts allowed, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        1 + self.max_retries
    }

    /// Determines whether to retry a failed download.
    ///
    /// `attempt` is the 1-indexed number of the attempt that just failed.
    #[instrument(skip(self), fields(max_attempts = self.max_attempts()))]
    pub fn should_retry(&self, failure_type: FailureType, attempt: u32) -> RetryDecision {
        if !failure_type.is_retryable() {
            return RetryDecision::DoNotRetry {
                reason: "permanent failure - retry would not help".to_string(),
            };
        }

        if attempt >= self.max_attempts() {
            debug!(attempt, "max attempts reached");
            return RetryDecision::DoNotRetry {
                reason: format!("max attempts ({}) exhausted", self.max_attempts()),
            };
        }

        let delay = self.backoff_after(attempt);
        debug!(
            attempt,
            next_attempt = attempt + 1,
            delay_ms = delay.as_millis(),
            "will retry"
        );

        RetryDecision::Retry {
            delay,
            attempt: attempt + 1,
        }
    }

    /// Wait after failed attempt `attempt`: `min(attempt, 3) × backoff_unit`.
    #[must_use]
    pub fn backoff_after(&self, attempt: u32) -> Duration {
        self.backoff_unit * attempt.clamp(1, MAX_BACKOFF_UNITS)
    }
}

/// Classifies a download error into a failure type for retry decisions.
///
/// # Non-HTTP Errors
///
/// | Error | Type |
/// |-------|------|
/// | Timeout | Transient |
/// | Network (most) | Transient |
/// | Network (TLS) | Permanent |
/// | InvalidUrl | Permanent |
/// | TooLarge | Permanent |
/// | DisallowedType | Permanent |
/// | Store | Permanent |
#[instrument]
pub fn classify_error(error: &DownloadError) -> FailureType {
    match error {
        DownloadError::HttpStatus { status, .. } => classify_http_status(*status),

        DownloadError::Timeout { .. } => FailureType::Transient,

        DownloadError::Network { source, .. } => {
            if is_tls_error(source) {
                FailureType::Permanent
            } else {
                FailureType::Transient
            }
        }

        DownloadError::InvalidUrl { .. }
        | DownloadError::TooLarge { .. }
        | DownloadError::DisallowedType { .. }
        | DownloadError::Store { .. } => FailureType::Permanent,
    }
}

/// Classifies an HTTP status code into a failure type.
///
/// | Status | Type |
/// |--------|------|
/// | 408 | Transient |
/// | 429 | RateLimited |
/// | other 4xx | Permanent |
/// | 5xx | Transient |
#[allow(clippy::match_same_arms)]
fn classify_http_status(status: u16) -> FailureType {
    match status {
        408 => FailureType::Transient,   // Request Timeout
        429 => FailureType::RateLimited, // Too Many Requests
        status if (400..500).contains(&status) => FailureType::Permanent,
        status if (500..600).contains(&status) => FailureType::Transient,
        // Unexpected non-success codes (1xx, 3xx without redirect) won't improve.
        _ => FailureType::Permanent,
    }
}

/// Checks the error chain of a reqwest error for TLS/certificate failures.
fn is_tls_error(error: &reqwest::Error) -> bool {
    let mut current: Option<&dyn std::error::Error> = Some(error);
    while let Some(err) = current {
        let text = err.to_string().to_lowercase();
        if text.contains("certificate")
            || text.contains("tls")
            || text.contains("ssl")
            || text.contains("handshake")
        {
            return true;
        }
        current = err.source();
    }
    false
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::store::StoreError;

    const UNIT: Duration = Duration::from_millis(100);

    #[test]
    fn test_retry_policy_default_follows_config() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries(), crate::config::DEFAULT_MAX_RETRIES);
        assert_eq!(policy.max_attempts(), crate::config::DEFAULT_MAX_RETRIES + 1);
    }

    #[test]
    fn test_retry_policy_clamps_max_retries() {
        let policy = RetryPolicy::new(50, UNIT);
        assert_eq!(policy.max_retries(), 10);
        assert_eq!(policy.max_attempts(), 11);
    }

    #[test]
    fn test_zero_retries_means_single_attempt() {
        let policy = RetryPolicy::new(0, UNIT);
        assert!(matches!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::DoNotRetry { .. }
        ));
    }

    #[test]
    fn test_backoff_grows_linearly_and_caps_at_three_units() {
        let policy = RetryPolicy::new(10, UNIT);
        assert_eq!(policy.backoff_after(1), UNIT);
        assert_eq!(policy.backoff_after(2), UNIT * 2);
        assert_eq!(policy.backoff_after(3), UNIT * 3);
        assert_eq!(policy.backoff_after(4), UNIT * 3);
        assert_eq!(policy.backoff_after(10), UNIT * 3);
    }

    #[test]
    fn test_should_retry_respects_max_attempts() {
        let policy = RetryPolicy::new(2, UNIT);

        assert_eq!(
            policy.should_retry(FailureType::Transient, 1),
            RetryDecision::Retry { delay: UNIT, attempt: 2 }
        );
        assert_eq!(
            policy.should_retry(FailureType::Transient, 2),
            RetryDecision::Retry { delay: UNIT * 2, attempt: 3 }
        );
        let decision = policy.should_retry(FailureType::Transient, 3);
        assert!(matches!(decision, RetryDecision::DoNotRetry { ref reason } if reason.contains("exhausted")));
    }

    #[test]
    fn test_should_retry_permanent_does_not_retry() {
        let policy = RetryPolicy::new(3, UNIT);
        let decision = policy.should_retry(FailureType::Permanent, 1);
        assert!(matches!(decision, RetryDecision::DoNotRetry { ref reason } if reason.contains("permanent")));
    }

    #[test]
    fn test_should_retry_rate_limited_retries() {
        let policy = RetryPolicy::new(3, UNIT);
        assert!(matches!(
            policy.should_retry(FailureType::RateLimited, 1),
            RetryDecision::Retry { .. }
        ));
    }

    #[test]
    fn test_classify_http_statuses() {
        let cases = [
            (400, FailureType::Permanent),
            (401, FailureType::Permanent),
            (403, FailureType::Permanent),
            (404, FailureType::Permanent),
            (408, FailureType::Transient),
            (410, FailureType::Permanent),
            (429, FailureType::RateLimited),
            (500, FailureType::Transient),
            (502, FailureType::Transient),
            (503, FailureType::Transient),
            (504, FailureType::Transient),
            (599, FailureType::Transient),
        ];
        for (status, expected) in cases {
            let error = DownloadError::http_status("https://ext.example/a.jpg", status);
            assert_eq!(classify_error(&error), expected, "status {status}");
        }
    }

    #[test]
    fn test_classify_timeout_transient() {
        let error = DownloadError::timeout("https://ext.example/a.jpg");
        assert_eq!(classify_error(&error), FailureType::Transient);
    }

    #[test]
    fn test_classify_content_rejections_permanent() {
        assert_eq!(
            classify_error(&DownloadError::too_large("https://ext.example/a.jpg", 10)),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::disallowed_type("https://ext.example/a.jpg", "text/html")),
            FailureType::Permanent
        );
        assert_eq!(
            classify_error(&DownloadError::invalid_url("nope")),
            FailureType::Permanent
        );
    }

    #[test]
    fn test_classify_store_error_permanent() {
        let error = DownloadError::store(
            "https://ext.example/a.jpg",
            StoreError::io("/srv/media", std::io::Error::other("disk full")),
        );
        assert_eq!(classify_error(&error), FailureType::Permanent);
    }
}
