//! Selection of a document's primary (cover) asset.
//!
//! After a run, the rewritten document references local assets. The
//! resolver walks image references in document order and returns the first
//! one that maps to a stored asset. Each reference is tried against the
//! asset store in this order:
//!
//! 1. the URL as written
//! 2. the same URL with a different scheme spelling (`https:`, `http:`, `//`)
//! 3. `YYYY/MM/filename` taken from a dated media path, so same-named files
//!    from different months stay apart
//! 4. the bare filename, then with generated-size and `-scaled` suffixes removed

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info, instrument};

use crate::scanner::{scan, MediaKind};
use crate::store::{AssetId, AssetStore, DocumentStore, StoreError};

/// `stem-300x200.jpg`, `stem-scaled.jpg`, `stem-scaled-1024x768.jpg`.
#[allow(clippy::expect_used)]
static GENERATED_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<stem>.+?)(?:-\d{1,5}x\d{1,5}|-scaled)+(?P<ext>\.[A-Za-z0-9]+)$")
        .expect("suffix regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DATE_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:^|/)(?P<year>\d{4})/(?P<month>\d{2})/(?P<name>[^/]+)$")
        .expect("date path regex is valid") // Static pattern, safe to panic
});

/// Result of [`PrimaryAssetResolver::assign_if_missing`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimaryAssignment {
    /// The document already had a primary asset; it was left untouched.
    AlreadySet(AssetId),
    /// A primary asset was found and stored.
    Assigned(AssetId),
    /// No image reference resolved to a stored asset.
    NotFound,
}

impl PrimaryAssignment {
    /// The document's primary asset after the call, if any.
    #[must_use]
    pub fn asset_id(self) -> Option<AssetId> {
        match self {
            Self::AlreadySet(id) | Self::Assigned(id) => Some(id),
            Self::NotFound => None,
        }
    }
}

/// Infers primary assets from document content.
#[derive(Clone)]
pub struct PrimaryAssetResolver {
    assets: Arc<dyn AssetStore>,
    documents: Arc<dyn DocumentStore>,
}

impl std::fmt::Debug for PrimaryAssetResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrimaryAssetResolver").finish_non_exhaustive()
    }
}

impl PrimaryAssetResolver {
    #[must_use]
    pub fn new(assets: Arc<dyn AssetStore>, documents: Arc<dyn DocumentStore>) -> Self {
        Self { assets, documents }
    }

    /// Returns the first image in `document` that resolves to a stored asset.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the asset store cannot be queried.
    pub async fn resolve_primary_asset(&self, document: &str) -> Result<Option<AssetId>, StoreError> {
        for reference in scan(document).filter(|r| r.kind == MediaKind::Image) {
            if let Some(id) = self.resolve_reference(&reference.source_url).await? {
                debug!(url = %reference.source_url, asset_id = id, "primary asset resolved");
                return Ok(Some(id));
            }
        }
        Ok(None)
    }

    /// Sets the primary asset of `document_id` unless it already has one.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the document cannot be loaded or updated.
    #[instrument(skip(self))]
    pub async fn assign_if_missing(&self, document_id: &str) -> Result<PrimaryAssignment, StoreError> {
        if let Some(existing) = self.documents.primary_asset(document_id).await? {
            debug!(asset_id = existing, "primary asset already set");
            return Ok(PrimaryAssignment::AlreadySet(existing));
        }
        let document = self.documents.load(document_id).await?;
        match self.resolve_primary_asset(&document.content).await? {
            Some(id) => {
                self.documents.set_primary_asset(document_id, id).await?;
                info!(asset_id = id, "primary asset assigned");
                Ok(PrimaryAssignment::Assigned(id))
            }
            None => Ok(PrimaryAssignment::NotFound),
        }
    }

    async fn resolve_reference(&self, url: &str) -> Result<Option<AssetId>, StoreError> {
        for candidate in std::iter::once(url.to_string()).chain(scheme_variants(url)) {
            if let Some(asset) = self.assets.resolve_by_url(&candidate).await? {
                return Ok(Some(asset.id));
            }
        }

        let path = url_path(url);
        let Some(filename) = path.rsplit('/').next().filter(|f| !f.is_empty()) else {
            return Ok(None);
        };
        let stripped = strip_generated_suffix(filename);

        if let Some(caps) = DATE_PATH.captures(&path) {
            let dir = format!("{}/{}", &caps["year"], &caps["month"]);
            for name in std::iter::once(filename).chain(stripped.as_deref()) {
                let relative = format!("{dir}/{name}");
                if let Some(asset) = self.assets.resolve_by_filename(&relative).await? {
                    return Ok(Some(asset.id));
                }
            }
        }

        for name in std::iter::once(filename).chain(stripped.as_deref()) {
            if let Some(asset) = self.assets.resolve_by_filename(name).await? {
                return Ok(Some(asset.id));
            }
        }
        Ok(None)
    }
}

/// Other spellings of the same absolute URL.
fn scheme_variants(url: &str) -> Vec<String> {
    let rest = if let Some(rest) = url.strip_prefix("https:") {
        rest
    } else if let Some(rest) = url.strip_prefix("http:") {
        rest
    } else if url.starts_with("//") {
        url
    } else {
        return Vec::new();
    };
    [format!("https:{rest}"), format!("http:{rest}"), rest.to_string()]
        .into_iter()
        .filter(|candidate| candidate != url)
        .collect()
}

/// Percent-decoded path of `url` without query or fragment.
fn url_path(url: &str) -> String {
    let without_query = url.split(['?', '#']).next().unwrap_or(url);
    let path = match without_query.find("//") {
        Some(idx) => {
            let after_host = &without_query[idx + 2..];
            after_host.find('/').map_or("", |slash| &after_host[slash..])
        }
        None => without_query,
    };
    urlencoding::decode(path).map_or_else(|_| path.to_string(), std::borrow::Cow::into_owned)
}

fn strip_generated_suffix(filename: &str) -> Option<String> {
    let caps = GENERATED_SUFFIX.captures(filename)?;
    Some(format!("{}{}", &caps["stem"], &caps["ext"]))
}
