//! Fetching, verifying and storing remote media.
//!
//! # Features
//!
//! - One bounded GET per attempt (connect and total timeouts)
//! - Size limit enforced from `Content-Length` and while streaming
//! - Content type sniffed from magic bytes; the header is never trusted
//! - Retries with capped linear backoff; failed URLs go to the ledger
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use media_ingest_core::config::IngestConfig;
//! use media_ingest_core::download::{DownloadService, MediaDownloader};
//! use media_ingest_core::scanner::MediaReference;
//! use media_ingest_core::store::MemoryAssetStore;
//! use media_ingest_core::RunContext;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(MemoryAssetStore::new("https://blog.example.org/media"));
//! let downloader = MediaDownloader::new(store, Arc::new(IngestConfig::default()));
//! let ctx = RunContext::generate("alice", "post-1");
//! let asset = downloader
//!     .download(&MediaReference::image("https://ext.example/a.jpg"), &ctx)
//!     .await?;
//! println!("stored at {}", asset.local_url);
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod engine;
mod error;
pub(crate) mod filename;
mod retry;
mod service;
pub mod sniff;

pub use client::{FetchedBody, HttpClient};
pub use constants::MAX_BACKOFF_UNITS;
pub use engine::{
    AttemptOutcome, DownloadAttempt, EngineError, RetryController, RetryOutcome, SkipReason,
};
pub use error::DownloadError;
pub use retry::{FailureType, RetryDecision, RetryPolicy, classify_error};
pub use service::{DownloadService, MediaDownloader};

// No module-local Result alias; use `Result<T, DownloadError>` explicitly.
