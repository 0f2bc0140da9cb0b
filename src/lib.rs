//! Media Ingest Core Library
//!
//! Downloads externally hosted media referenced by a content document into
//! local storage and rewrites the document to point at the local copies.
//!
//! # Architecture
//!
//! - [`scanner`] - media references in markup
//! - [`classify`] - local / excluded / malformed / previously failed / eligible
//! - [`download`] - HTTP fetch, type sniffing, retry controller
//! - [`ledger`] - durable blacklist of URLs that failed for good
//! - [`progress`] - per-run counters for polling clients
//! - [`rewrite`] - single-pass URL substitution including encoded variants
//! - [`primary`] - cover asset inference
//! - [`store`] - asset and document storage seams
//! - [`pipeline`] - interactive and bulk orchestration
//! - [`config`], [`db`], [`run`] - shared plumbing

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod classify;
pub mod config;
pub mod db;
pub mod download;
pub mod ledger;
pub mod pipeline;
pub mod primary;
pub mod progress;
pub mod rewrite;
pub mod run;
pub mod scanner;
pub mod store;

#[cfg(test)]
pub mod test_support;

// Re-export commonly used types
pub use classify::{Classifier, ValidationOutcome};
pub use config::{ConfigError, IngestConfig};
pub use db::{Database, DbError};
pub use download::{
    DownloadError, DownloadService, EngineError, FailureType, HttpClient, MediaDownloader,
    RetryController, RetryOutcome, RetryPolicy,
};
pub use ledger::{FailedUrlEntry, FailedUrlLedger, LedgerError};
pub use pipeline::{BulkReport, BulkRunner, IngestPipeline, PipelineError, RunReport};
pub use primary::{PrimaryAssetResolver, PrimaryAssignment};
pub use progress::{ItemOutcome, ProgressRecord, ProgressStatus, ProgressTracker};
pub use rewrite::{ContentRewriter, RewriteResult, UrlMapping};
pub use run::RunContext;
pub use scanner::{MediaKind, MediaReference, scan};
pub use store::{
    Asset, AssetId, AssetStore, ContentDocument, DocumentStore, LocalAssetStore,
    SqliteDocumentStore, StoreError,
};
