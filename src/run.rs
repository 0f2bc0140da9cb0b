//! Identity of a single ingestion run.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifies who started a run, which run it is, and which document it targets.
///
/// `run_id` is caller-generated and opaque. Progress records are keyed by
/// `(owner_id, run_id)` so concurrent runs never share counters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunContext {
    /// Owner of the run (user or service account).
    pub owner_id: String,
    /// Opaque run identifier.
    pub run_id: String,
    /// Document whose references are ingested.
    pub target_document_id: String,
}

impl RunContext {
    /// Creates a run context.
    pub fn new(
        owner_id: impl Into<String>,
        run_id: impl Into<String>,
        target_document_id: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            run_id: run_id.into(),
            target_document_id: target_document_id.into(),
        }
    }

    /// Creates a run context with a fresh random run id.
    pub fn generate(owner_id: impl Into<String>, target_document_id: impl Into<String>) -> Self {
        Self::new(owner_id, uuid::Uuid::new_v4().to_string(), target_document_id)
    }

    /// Cache key for this run's progress record.
    ///
    /// The owner id is length-prefixed so ids containing `:` cannot collide.
    #[must_use]
    pub fn progress_key(&self) -> String {
        format!(
            "media-ingest:progress:{}:{}:{}",
            self.owner_id.len(),
            self.owner_id,
            self.run_id
        )
    }
}

impl fmt::Display for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} -> {}",
            self.owner_id, self.run_id, self.target_document_id
        )
    }
}
