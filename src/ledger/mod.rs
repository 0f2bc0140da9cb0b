//! Durable blacklist of URLs that failed permanently or exhausted retries.
//!
//! A URL in the ledger is never attempted again until an operator removes it
//! or clears the ledger. Entries are keyed by the URL string verbatim.

mod store;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{info, instrument};

pub use store::{LedgerStore, MemoryLedgerStore, SqliteLedgerStore};

use crate::db::Database;

/// Ledger errors. These are infrastructure faults and abort the current run.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// The backing database rejected a query.
    #[error("ledger store unavailable: {0}")]
    Database(#[from] sqlx::Error),
}

/// One blacklisted URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedUrlEntry {
    /// URL as it appeared in the source document.
    pub url: String,
    /// When the URL was last recorded as failed.
    pub failed_at: DateTime<Utc>,
}

/// Shared handle to the failed-URL ledger.
#[derive(Clone)]
pub struct FailedUrlLedger {
    store: Arc<dyn LedgerStore>,
}

impl std::fmt::Debug for FailedUrlLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailedUrlLedger").finish_non_exhaustive()
    }
}

impl FailedUrlLedger {
    /// Wraps a ledger store.
    #[must_use]
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Self { store }
    }

    /// Ledger persisted in the `failed_urls` table of `db`.
    #[must_use]
    pub fn sqlite(db: Database) -> Self {
        Self::new(Arc::new(SqliteLedgerStore::new(db)))
    }

    /// Ledger kept in process memory.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryLedgerStore::new()))
    }

    /// Returns whether `url` is blacklisted.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be queried.
    pub async fn is_blacklisted(&self, url: &str) -> Result<bool, LedgerError> {
        self.store.contains(url).await
    }

    /// Blacklists `url`. Re-adding an existing URL refreshes its timestamp.
    ///
    /// Returns `true` when the URL was not already present.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be written.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn add(&self, url: &str) -> Result<bool, LedgerError> {
        let added = self.store.insert(url, Utc::now()).await?;
        if added {
            info!("url added to failed-url ledger");
        }
        Ok(added)
    }

    /// Removes one URL so it becomes eligible again.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be written.
    #[instrument(skip(self), fields(url = %url))]
    pub async fn remove(&self, url: &str) -> Result<bool, LedgerError> {
        self.store.remove(url).await
    }

    /// Removes every entry and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be written.
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<u64, LedgerError> {
        let removed = self.store.clear().await?;
        info!(removed, "failed-url ledger cleared");
        Ok(removed)
    }

    /// Lists entries, most recent first.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError`] if the store cannot be queried.
    pub async fn entries(&self) -> Result<Vec<FailedUrlEntry>, LedgerError> {
        self.store.entries().await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_add_then_is_blacklisted() {
        let ledger = FailedUrlLedger::in_memory();
        assert!(!ledger.is_blacklisted("https://ext.example/b.png").await.unwrap());

        assert!(ledger.add("https://ext.example/b.png").await.unwrap());

        assert!(ledger.is_blacklisted("https://ext.example/b.png").await.unwrap());
        assert!(!ledger.is_blacklisted("https://ext.example/B.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_makes_urls_eligible_again() {
        let ledger = FailedUrlLedger::in_memory();
        ledger.add("https://ext.example/a.png").await.unwrap();
        ledger.add("https://ext.example/b.png").await.unwrap();

        assert_eq!(ledger.clear().await.unwrap(), 2);
        assert!(!ledger.is_blacklisted("https://ext.example/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn test_sqlite_ledger_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.db");

        let db = Database::new(&path).await.unwrap();
        FailedUrlLedger::sqlite(db.clone()).add("https://ext.example/c.gif").await.unwrap();
        db.close().await;

        let reopened = FailedUrlLedger::sqlite(Database::new(&path).await.unwrap());
        assert!(reopened.is_blacklisted("https://ext.example/c.gif").await.unwrap());
    }
}
