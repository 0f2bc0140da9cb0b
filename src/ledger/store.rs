//! Storage backends for the failed-URL ledger.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sqlx::Row;
use tracing::{debug, instrument, warn};

use super::{FailedUrlEntry, LedgerError};
use crate::db::Database;

/// Durable key-value storage for failed URLs.
///
/// Implementations must tolerate concurrent writers: inserting the same URL
/// from two tasks at once leaves exactly one entry.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    /// Returns whether `url` is stored.
    async fn contains(&self, url: &str) -> Result<bool, LedgerError>;

    /// Upserts `url` with `failed_at`; returns `true` when the entry is new.
    async fn insert(&self, url: &str, failed_at: DateTime<Utc>) -> Result<bool, LedgerError>;

    /// Removes one URL; returns `true` when it was present.
    async fn remove(&self, url: &str) -> Result<bool, LedgerError>;

    /// Removes every entry and returns how many were removed.
    async fn clear(&self) -> Result<u64, LedgerError>;

    /// Lists entries, most recent failure first.
    async fn entries(&self) -> Result<Vec<FailedUrlEntry>, LedgerError>;
}

/// Ledger backed by the `failed_urls` table.
#[derive(Debug, Clone)]
pub struct SqliteLedgerStore {
    db: Database,
}

impl SqliteLedgerStore {
    /// Creates a store on an opened database.
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl LedgerStore for SqliteLedgerStore {
    #[instrument(skip(self), fields(url = %url))]
    async fn contains(&self, url: &str) -> Result<bool, LedgerError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM failed_urls WHERE url = ?")
            .bind(url)
            .fetch_one(self.db.pool())
            .await?;
        Ok(row.get::<i64, _>("count") > 0)
    }

    #[instrument(skip(self, failed_at), fields(url = %url))]
    async fn insert(&self, url: &str, failed_at: DateTime<Utc>) -> Result<bool, LedgerError> {
        let timestamp = failed_at.to_rfc3339();
        // INSERT OR IGNORE is atomic, so racing writers cannot both report "new".
        let inserted = sqlx::query("INSERT OR IGNORE INTO failed_urls (url, failed_at) VALUES (?, ?)")
            .bind(url)
            .bind(&timestamp)
            .execute(self.db.pool())
            .await?
            .rows_affected()
            > 0;

        if !inserted {
            sqlx::query("UPDATE failed_urls SET failed_at = ? WHERE url = ?")
                .bind(&timestamp)
                .bind(url)
                .execute(self.db.pool())
                .await?;
            debug!("ledger entry refreshed");
        }
        Ok(inserted)
    }

    #[instrument(skip(self), fields(url = %url))]
    async fn remove(&self, url: &str) -> Result<bool, LedgerError> {
        let result = sqlx::query("DELETE FROM failed_urls WHERE url = ?")
            .bind(url)
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<u64, LedgerError> {
        let result = sqlx::query("DELETE FROM failed_urls")
            .execute(self.db.pool())
            .await?;
        Ok(result.rows_affected())
    }

    #[instrument(skip(self))]
    async fn entries(&self) -> Result<Vec<FailedUrlEntry>, LedgerError> {
        let rows = sqlx::query("SELECT url, failed_at FROM failed_urls ORDER BY failed_at DESC, url ASC")
            .fetch_all(self.db.pool())
            .await?;

        Ok(rows
            .iter()
            .map(|row| {
                let url: String = row.get("url");
                let raw: String = row.get("failed_at");
                FailedUrlEntry {
                    failed_at: parse_timestamp(&raw),
                    url,
                }
            })
            .collect())
    }
}

/// Accepts RFC 3339 (written by this crate) and SQLite's `datetime('now')` format.
fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return parsed.with_timezone(&Utc);
    }
    match NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        Ok(naive) => naive.and_utc(),
        Err(e) => {
            warn!(raw, error = %e, "unparseable ledger timestamp");
            DateTime::<Utc>::UNIX_EPOCH
        }
    }
}

/// Process-local ledger, used in tests and embedded setups without a database.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    entries: DashMap<String, DateTime<Utc>>,
}

impl MemoryLedgerStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn contains(&self, url: &str) -> Result<bool, LedgerError> {
        Ok(self.entries.contains_key(url))
    }

    async fn insert(&self, url: &str, failed_at: DateTime<Utc>) -> Result<bool, LedgerError> {
        match self.entries.entry(url.to_string()) {
            Entry::Occupied(mut existing) => {
                existing.insert(failed_at);
                Ok(false)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(failed_at);
                Ok(true)
            }
        }
    }

    async fn remove(&self, url: &str) -> Result<bool, LedgerError> {
        Ok(self.entries.remove(url).is_some())
    }

    async fn clear(&self) -> Result<u64, LedgerError> {
        let count = self.entries.len() as u64;
        self.entries.clear();
        Ok(count)
    }

    async fn entries(&self) -> Result<Vec<FailedUrlEntry>, LedgerError> {
        let mut entries: Vec<FailedUrlEntry> = self
            .entries
            .iter()
            .map(|e| FailedUrlEntry {
                url: e.key().clone(),
                failed_at: *e.value(),
            })
            .collect();
        entries.sort_by(|a, b| b.failed_at.cmp(&a.failed_at).then_with(|| a.url.cmp(&b.url)));
        Ok(entries)
    }
}
