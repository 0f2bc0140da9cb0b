//! Single-attempt download of one media reference into the asset store.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, instrument};

use super::client::HttpClient;
use super::error::DownloadError;
use super::filename::filename_for;
use super::sniff::sniff_mime;
use crate::classify::fetchable_url;
use crate::config::IngestConfig;
use crate::run::RunContext;
use crate::scanner::MediaReference;
use crate::store::{Asset, AssetStore, NewAsset};

/// One attempt at turning a reference into a local asset.
///
/// Implementations are stateless units of work; retries belong to
/// [`RetryController`](super::RetryController).
#[async_trait]
pub trait DownloadService: Send + Sync {
    /// Fetches, verifies and stores the media behind `reference`.
    async fn download(
        &self,
        reference: &MediaReference,
        ctx: &RunContext,
    ) -> Result<Asset, DownloadError>;
}

/// [`DownloadService`] fetching over HTTP and writing to an [`AssetStore`].
#[derive(Clone)]
pub struct MediaDownloader {
    client: HttpClient,
    store: Arc<dyn AssetStore>,
    config: Arc<IngestConfig>,
}

impl std::fmt::Debug for MediaDownloader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaDownloader")
            .field("client", &self.client)
            .field("max_file_size_bytes", &self.config.max_file_size_bytes)
            .finish_non_exhaustive()
    }
}

impl MediaDownloader {
    /// Creates a downloader with an HTTP client built from `config`.
    #[must_use]
    pub fn new(store: Arc<dyn AssetStore>, config: Arc<IngestConfig>) -> Self {
        Self::with_client(HttpClient::from_config(&config), store, config)
    }

    /// Creates a downloader around an existing client.
    #[must_use]
    pub fn with_client(
        client: HttpClient,
        store: Arc<dyn AssetStore>,
        config: Arc<IngestConfig>,
    ) -> Self {
        Self {
            client,
            store,
            config,
        }
    }
}

#[async_trait]
impl DownloadService for MediaDownloader {
    #[instrument(skip(self, reference), fields(url = %reference.source_url, run = %ctx))]
    async fn download(
        &self,
        reference: &MediaReference,
        ctx: &RunContext,
    ) -> Result<Asset, DownloadError> {
        let source_url = reference.source_url.as_str();
        let url = fetchable_url(source_url).ok_or_else(|| DownloadError::invalid_url(source_url))?;

        let body = self
            .client
            .fetch(url.as_str(), self.config.max_file_size_bytes)
            .await?;

        let mime = sniff_mime(&body.bytes).unwrap_or("unknown");
        if !self.config.is_mime_allowed(mime) {
            return Err(DownloadError::disallowed_type(source_url, mime));
        }
        debug!(mime, bytes = body.bytes.len(), "content verified");

        let new_asset = NewAsset {
            mime_type: mime.to_string(),
            filename: filename_for(&url, mime),
            source_url: Some(reference.source_url.clone()),
            alt_text: reference.alt_text.clone(),
            title: reference.title.clone(),
        };
        self.store
            .put(&body.bytes, new_asset)
            .await
            .map_err(|e| DownloadError::store(source_url, e))
    }
}
