//! TTL key-value cache holding serialized progress records.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::DashMap;

use super::ProgressError;

/// Short-lived key-value storage with per-entry expiry.
#[async_trait]
pub trait ProgressCache: Send + Sync {
    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), ProgressError>;

    /// Returns the value if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>, ProgressError>;

    /// Removes `key`.
    async fn delete(&self, key: &str) -> Result<(), ProgressError>;
}

/// In-process cache. Expired entries are dropped on read of that key and
/// swept on every write.
#[derive(Debug, Default)]
pub struct MemoryProgressCache {
    entries: DashMap<String, (String, Instant)>,
}

impl MemoryProgressCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressCache for MemoryProgressCache {
    async fn set(&self, key: &str, value: String, ttl: Duration) -> Result<(), ProgressError> {
        let now = Instant::now();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        let expires_at = now + ttl;
        self.entries.insert(key.to_string(), (value, expires_at));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, ProgressError> {
        let now = Instant::now();
        let value = self
            .entries
            .get(key)
            .and_then(|entry| (entry.1 > now).then(|| entry.0.clone()));
        if value.is_none() {
            self.entries.remove_if(key, |_, (_, expires_at)| *expires_at <= now);
        }
        Ok(value)
    }

    async fn delete(&self, key: &str) -> Result<(), ProgressError> {
        self.entries.remove(key);
        Ok(())
    }
}
