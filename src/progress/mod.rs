//! Per-run progress counters visible to a polling client.
//!
//! Each run owns one [`ProgressRecord`] keyed by `(owner_id, run_id)`.
//! Records live in a [`ProgressCache`] with a TTL that is refreshed on every
//! write, so a finished run stays visible for a while and then disappears.
//!
//! Updates for one run are serialized through a per-key async mutex, so
//! concurrent workers never lose an increment.

mod cache;

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub use cache::{MemoryProgressCache, ProgressCache};

use crate::run::RunContext;

/// Progress tracking errors.
#[derive(Debug, Error)]
pub enum ProgressError {
    /// A record could not be encoded or decoded.
    #[error("progress record serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The cache backend failed.
    #[error("progress cache unavailable: {0}")]
    Cache(String),

    /// Counters disagree after an update.
    #[error("progress counters inconsistent for {key}: processed={processed}, success={success}, failed={failed}, skipped={skipped}")]
    Inconsistent {
        key: String,
        processed: u64,
        success: u64,
        failed: u64,
        skipped: u64,
    },
}

/// Lifecycle of a run as seen by a poller.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressStatus {
    /// No record exists (never started or expired).
    #[default]
    Idle,
    Processing,
    Completed,
}

/// Terminal result of one dispatched reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOutcome {
    Success,
    Failed,
    Skipped,
}

/// Counters of a single run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub status: ProgressStatus,
    pub total: u64,
    pub processed: u64,
    pub success: u64,
    pub failed: u64,
    pub skipped: u64,
    pub current_url: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl ProgressRecord {
    fn processing(total: u64) -> Self {
        Self {
            status: ProgressStatus::Processing,
            total,
            started_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Whether `processed` equals the sum of the outcome counters.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.processed == self.success + self.failed + self.skipped
    }

    /// Fraction of items processed, `1.0` for empty runs.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            self.processed as f64 / self.total as f64
        }
    }
}

/// Writes and reads progress records.
#[derive(Clone)]
pub struct ProgressTracker {
    cache: Arc<dyn ProgressCache>,
    ttl: Duration,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("ttl", &self.ttl)
            .field("active_runs", &self.locks.len())
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    /// Creates a tracker writing to `cache` with the given record TTL.
    #[must_use]
    pub fn new(cache: Arc<dyn ProgressCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            locks: Arc::new(DashMap::new()),
        }
    }

    /// Tracker backed by a fresh [`MemoryProgressCache`].
    #[must_use]
    pub fn in_memory(ttl: Duration) -> Self {
        Self::new(Arc::new(MemoryProgressCache::new()), ttl)
    }

    fn lock_for(&self, key: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    async fn load(&self, key: &str) -> Result<Option<ProgressRecord>, ProgressError> {
        match self.cache.get(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, key: &str, record: &ProgressRecord) -> Result<(), ProgressError> {
        if !record.is_consistent() {
            return Err(ProgressError::Inconsistent {
                key: key.to_string(),
                processed: record.processed,
                success: record.success,
                failed: record.failed,
                skipped: record.skipped,
            });
        }
        let raw = serde_json::to_string(record)?;
        self.cache.set(key, raw, self.ttl).await
    }

    /// Applies `update` to the run's record under its lock.
    ///
    /// A missing record (expired mid-run) is recreated as processing.
    async fn update(
        &self,
        ctx: &RunContext,
        update: impl FnOnce(&mut ProgressRecord),
    ) -> Result<ProgressRecord, ProgressError> {
        let key = ctx.progress_key();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let mut record = match self.load(&key).await? {
            Some(record) => record,
            None => {
                warn!(run = %ctx, "progress record missing, recreating");
                ProgressRecord::processing(0)
            }
        };
        update(&mut record);
        if record.processed > record.total {
            warn!(run = %ctx, processed = record.processed, total = record.total, "more outcomes than dispatched items");
            record.total = record.processed;
        }
        self.store(&key, &record).await?;
        Ok(record)
    }

    /// Creates the record for a run. Zero-item runs are completed at once.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the cache cannot be written.
    pub async fn start(&self, ctx: &RunContext, total: u64) -> Result<ProgressRecord, ProgressError> {
        let key = ctx.progress_key();
        let lock = self.lock_for(&key);
        let _guard = lock.lock().await;

        let mut record = ProgressRecord::processing(total);
        if total == 0 {
            record.status = ProgressStatus::Completed;
            record.ended_at = record.started_at;
        }
        self.store(&key, &record).await?;
        info!(run = %ctx, total, "run started");
        Ok(record)
    }

    /// Counts one terminal outcome.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the cache cannot be read or written.
    pub async fn record_outcome(
        &self,
        ctx: &RunContext,
        outcome: ItemOutcome,
    ) -> Result<ProgressRecord, ProgressError> {
        let record = self
            .update(ctx, |record| {
                record.processed += 1;
                match outcome {
                    ItemOutcome::Success => record.success += 1,
                    ItemOutcome::Failed => record.failed += 1,
                    ItemOutcome::Skipped => record.skipped += 1,
                }
            })
            .await?;
        debug!(run = %ctx, ?outcome, processed = record.processed, total = record.total, "outcome recorded");
        Ok(record)
    }

    /// Counts `count` references as skipped in one update.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the cache cannot be read or written.
    pub async fn record_skipped(&self, ctx: &RunContext, count: u64) -> Result<ProgressRecord, ProgressError> {
        self.update(ctx, |record| {
            record.processed += count;
            record.skipped += count;
        })
        .await
    }

    /// Sets the URL currently being attempted.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the cache cannot be read or written.
    pub async fn set_current_url(&self, ctx: &RunContext, url: &str) -> Result<(), ProgressError> {
        self.update(ctx, |record| record.current_url = Some(url.to_string()))
            .await
            .map(|_| ())
    }

    /// Returns the run's record, or `None` if it never existed or expired.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the cache cannot be read.
    pub async fn get(&self, ctx: &RunContext) -> Result<Option<ProgressRecord>, ProgressError> {
        self.load(&ctx.progress_key()).await
    }

    /// Like [`get`](Self::get) but returns an idle record when nothing is stored.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the cache cannot be read.
    pub async fn poll(&self, ctx: &RunContext) -> Result<ProgressRecord, ProgressError> {
        Ok(self.get(ctx).await?.unwrap_or_default())
    }

    /// Marks the run completed and clears `current_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ProgressError`] if the cache cannot be read or written.
    pub async fn finish(&self, ctx: &RunContext) -> Result<ProgressRecord, ProgressError> {
        let record = self
            .update(ctx, |record| {
                record.status = ProgressStatus::Completed;
                record.current_url = None;
                if record.ended_at.is_none() {
                    record.ended_at = Some(Utc::now());
                }
            })
            .await?;
        self.locks.remove(&ctx.progress_key());
        info!(
            run = %ctx,
            total = record.total,
            success = record.success,
            failed = record.failed,
            skipped = record.skipped,
            "run completed"
        );
        Ok(record)
    }
}
