//! Retry controller wrapping a [`DownloadService`] with bounded retries.
//!
//! Per reference the controller runs this state machine:
//!
//! ```text
//! Eligible ──► Attempting ──► Success
//!                 ▲   │
//!                 │   ├──► TransientFailure ──(attempt < 1 + max_retries)──┐
//!                 │   │                                                     │
//!                 └───┼─────────────────── backoff ◄────────────────────────┘
//!                     └──► PermanentFailure / retries exhausted ──► ledger
//! ```
//!
//! A reference whose URL is already in the ledger short-circuits to
//! [`RetryOutcome::Skipped`] without any attempt. Every terminal outcome is
//! recorded with the [`ProgressTracker`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
use super::service::DownloadService;
use super::DownloadError;
use crate::ledger::{FailedUrlLedger, LedgerError};
use crate::progress::{ItemOutcome, ProgressError, ProgressTracker};
use crate::run::RunContext;
use crate::scanner::MediaReference;
use crate::store::Asset;

/// Error type for retry controller operations.
///
/// Only infrastructure faults surface here; per-reference download failures
/// are reported through [`RetryOutcome::Failed`].
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Ledger lookup or write failed.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Progress record could not be updated.
    #[error("progress error: {0}")]
    Progress(#[from] ProgressError),
}

/// Result of a single attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(Asset),
    TransientFailure(DownloadError),
    PermanentFailure(DownloadError),
}

/// One attempt at downloading a reference.
#[derive(Debug)]
pub struct DownloadAttempt {
    /// 1-indexed attempt number.
    pub attempt_number: u32,
    pub outcome: AttemptOutcome,
}

/// Why a reference was skipped without a network attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The URL is in the failed-URL ledger.
    PreviouslyFailed,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreviouslyFailed => f.write_str("previously failed"),
        }
    }
}

/// Terminal outcome for one reference.
#[derive(Debug)]
pub enum RetryOutcome {
    /// The asset was stored.
    Downloaded {
        asset: Asset,
        attempts: u32,
    },
    /// No attempt was made.
    Skipped {
        reason: SkipReason,
    },
    /// Every allowed attempt failed, or a permanent failure occurred.
    Failed {
        error: DownloadError,
        attempts: u32,
        /// Whether the URL is now in the ledger.
        blacklisted: bool,
    },
}

impl RetryOutcome {
    /// Number of network attempts made.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Downloaded { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
            Self::Skipped { .. } => 0,
        }
    }

    /// Progress counter this outcome increments.
    #[must_use]
    pub fn item_outcome(&self) -> ItemOutcome {
        match self {
            Self::Downloaded { .. } => ItemOutcome::Success,
            Self::Skipped { .. } => ItemOutcome::Skipped,
            Self::Failed { .. } => ItemOutcome::Failed,
        }
    }

    /// The stored asset, if any.
    #[must_use]
    pub fn asset(&self) -> Option<&Asset> {
        match self {
            Self::Downloaded { asset, .. } => Some(asset),
            _ => None,
        }
    }
}

/// Drives a [`DownloadService`] through the retry state machine.
#[derive(Clone)]
pub struct RetryController {
    service: Arc<dyn DownloadService>,
    ledger: FailedUrlLedger,
    tracker: ProgressTracker,
    policy: RetryPolicy,
}

impl fmt::Debug for RetryController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryController")
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl RetryController {
    /// Creates a controller.
    #[must_use]
    pub fn new(
        service: Arc<dyn DownloadService>,
        ledger: FailedUrlLedger,
        tracker: ProgressTracker,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            service,
            ledger,
            tracker,
            policy,
        }
    }

    /// Returns the configured retry policy.
    #[must_use]
    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Downloads `reference` with retries and records the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError`] only when the ledger or progress store fails.
    /// Download failures are reported as [`RetryOutcome::Failed`].
    #[instrument(skip(self, reference), fields(url = %reference.source_url, run = %ctx))]
    pub async fn download_with_retry(
        &self,
        reference: &MediaReference,
        ctx: &RunContext,
    ) -> Result<RetryOutcome, EngineError> {
        let url = reference.source_url.as_str();

        if self.ledger.is_blacklisted(url).await? {
            debug!("url is blacklisted, skipping");
            self.tracker.record_outcome(ctx, ItemOutcome::Skipped).await?;
            return Ok(RetryOutcome::Skipped {
                reason: SkipReason::PreviouslyFailed,
            });
        }

        let mut attempt_number = 0u32;
        let outcome = loop {
            attempt_number += 1;
            self.tracker.set_current_url(ctx, url).await?;
            let attempt = self.attempt(reference, ctx, attempt_number).await;

            match attempt.outcome {
                AttemptOutcome::Success(asset) => {
                    info!(attempts = attempt_number, local_url = %asset.local_url, "download completed");
                    break RetryOutcome::Downloaded {
                        asset,
                        attempts: attempt_number,
                    };
                }
                AttemptOutcome::PermanentFailure(error) => {
                    break self.fail(url, error, attempt_number).await?;
                }
                AttemptOutcome::TransientFailure(error) => {
                    match self.policy.should_retry(classify_error(&error), attempt_number) {
                        RetryDecision::Retry { delay, attempt } => {
                            info!(
                                attempt,
                                max_attempts = self.policy.max_attempts(),
                                delay_ms = delay.as_millis(),
                                error = %error,
                                "retrying download"
                            );
                            tokio::time::sleep(delay).await;
                        }
                        RetryDecision::DoNotRetry { reason } => {
                            debug!(reason = %reason, "giving up");
                            break self.fail(url, error, attempt_number).await?;
                        }
                    }
                }
            }
        };

        self.tracker.record_outcome(ctx, outcome.item_outcome()).await?;
        Ok(outcome)
    }

    async fn attempt(
        &self,
        reference: &MediaReference,
        ctx: &RunContext,
        attempt_number: u32,
    ) -> DownloadAttempt {
        debug!(attempt = attempt_number, "attempting download");
        let outcome = match self.service.download(reference, ctx).await {
            Ok(asset) => AttemptOutcome::Success(asset),
            Err(error) => match classify_error(&error) {
                FailureType::Permanent => AttemptOutcome::PermanentFailure(error),
                FailureType::Transient | FailureType::RateLimited => {
                    AttemptOutcome::TransientFailure(error)
                }
            },
        };
        DownloadAttempt {
            attempt_number,
            outcome,
        }
    }

    /// Terminal failure: ledger source faults, never infrastructure faults or
    /// rejections by configurable limits.
    async fn fail(
        &self,
        url: &str,
        error: DownloadError,
        attempts: u32,
    ) -> Result<RetryOutcome, EngineError> {
        let blacklisted = if error.blames_source() {
            self.ledger.add(url).await?;
            true
        } else {
            false
        };
        warn!(attempts, blacklisted, error = %error, "download failed");
        Ok(RetryOutcome::Failed {
            error,
            attempts,
            blacklisted,
        })
    }
}
