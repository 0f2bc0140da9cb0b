//! Storage seams for media assets and content documents.
//!
//! The pipeline never writes files or rows directly. It talks to an
//! [`AssetStore`] for downloaded media and a [`DocumentStore`] for the
//! markup being rewritten. SQLite-backed implementations live in
//! [`local`] and [`documents`]; [`memory`] holds process-local variants.

mod documents;
mod local;
mod memory;

use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use documents::SqliteDocumentStore;
pub use local::LocalAssetStore;
pub use memory::{MemoryAssetStore, MemoryDocumentStore};

/// Identifier of a stored asset.
pub type AssetId = i64;

/// A media file owned by the local system. Created once per successful
/// download and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    pub id: AssetId,
    /// Public URL the rewritten document points at.
    pub local_url: String,
    /// Path below the media root, e.g. `2026/03/photo.jpg`.
    pub relative_path: String,
    pub filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub alt_text: Option<String>,
    pub title: Option<String>,
    /// URL the bytes were downloaded from.
    pub source_url: Option<String>,
}

/// Metadata supplied when storing new bytes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NewAsset {
    pub mime_type: String,
    /// Preferred filename; the store may add a suffix to keep it unique.
    pub filename: String,
    pub source_url: Option<String>,
    pub alt_text: Option<String>,
    pub title: Option<String>,
}

/// A stored content document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentDocument {
    pub id: String,
    pub owner_id: String,
    /// Markup with media references.
    pub content: String,
    pub primary_asset_id: Option<AssetId>,
}

impl ContentDocument {
    /// New document without a primary asset.
    pub fn new(id: impl Into<String>, owner_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            content: content.into(),
            primary_asset_id: None,
        }
    }
}

/// Storage errors. All of them are infrastructure faults.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backing database rejected a query.
    #[error("store database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Writing media bytes failed.
    #[error("IO error writing {path}: {source}")]
    Io {
        /// File that could not be written.
        path: PathBuf,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// No document with this id.
    #[error("document not found: {id}")]
    DocumentNotFound {
        /// Requested document id.
        id: String,
    },

    /// No asset with this id.
    #[error("asset not found: {id}")]
    AssetNotFound {
        /// Requested asset id.
        id: AssetId,
    },
}

impl StoreError {
    /// Creates an IO error with the path that failed.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates a document-not-found error.
    pub fn document_not_found(id: impl Into<String>) -> Self {
        Self::DocumentNotFound { id: id.into() }
    }
}

/// Registry of locally stored media.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Stores `bytes` and returns the new asset with a fresh local URL.
    async fn put(&self, bytes: &[u8], asset: NewAsset) -> Result<Asset, StoreError>;

    /// Looks an asset up by id.
    async fn get(&self, id: AssetId) -> Result<Option<Asset>, StoreError>;

    /// Finds the asset whose local URL (or original source URL) equals `url`.
    async fn resolve_by_url(&self, url: &str) -> Result<Option<Asset>, StoreError>;

    /// Finds an asset by bare filename or by `YYYY/MM/filename` relative path.
    async fn resolve_by_filename(&self, filename: &str) -> Result<Option<Asset>, StoreError>;
}

/// Persistence for content documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Inserts or replaces a whole document.
    async fn create(&self, document: &ContentDocument) -> Result<(), StoreError>;

    /// Loads a document.
    ///
    /// Returns [`StoreError::DocumentNotFound`] when `id` is unknown.
    async fn load(&self, id: &str) -> Result<ContentDocument, StoreError>;

    /// Replaces the markup of an existing document.
    async fn save(&self, id: &str, content: &str) -> Result<(), StoreError>;

    /// Returns the document's primary asset, if any.
    async fn primary_asset(&self, id: &str) -> Result<Option<AssetId>, StoreError>;

    /// Sets the document's primary asset.
    async fn set_primary_asset(&self, id: &str, asset_id: AssetId) -> Result<(), StoreError>;

    /// Lists every document id in stable order.
    async fn list_ids(&self) -> Result<Vec<String>, StoreError>;
}

/// Joins a base URL and a relative media path with exactly one slash.
pub(crate) fn join_url(base_url: &str, relative_path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        relative_path.trim_start_matches('/')
    )
}
