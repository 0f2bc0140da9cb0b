//! Process-local stores for tests and embedding.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use super::{
    Asset, AssetId, AssetStore, ContentDocument, DocumentStore, NewAsset, StoreError, join_url,
};

/// Asset store that keeps bytes in memory.
///
/// Local URLs are `<base_url>/YYYY/MM/<filename>` like [`super::LocalAssetStore`].
#[derive(Debug)]
pub struct MemoryAssetStore {
    base_url: String,
    date_dir: String,
    next_id: AtomicI64,
    assets: DashMap<AssetId, (Asset, Vec<u8>)>,
}

impl MemoryAssetStore {
    /// Creates an empty store serving assets under `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            date_dir: chrono::Utc::now().format("%Y/%m").to_string(),
            next_id: AtomicI64::new(1),
            assets: DashMap::new(),
        }
    }

    /// Inserts an asset with a fixed relative path, bypassing name allocation.
    pub fn insert_existing(&self, relative_path: &str, mime_type: &str) -> Asset {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let filename = relative_path.rsplit('/').next().unwrap_or(relative_path).to_string();
        let asset = Asset {
            id,
            local_url: join_url(&self.base_url, relative_path),
            relative_path: relative_path.to_string(),
            filename,
            mime_type: mime_type.to_string(),
            size_bytes: 0,
            alt_text: None,
            title: None,
            source_url: None,
        };
        self.assets.insert(id, (asset.clone(), Vec::new()));
        asset
    }

    /// Number of stored assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }

    /// Stored bytes of an asset.
    #[must_use]
    pub fn bytes(&self, id: AssetId) -> Option<Vec<u8>> {
        self.assets.get(&id).map(|entry| entry.1.clone())
    }

    fn find(&self, predicate: impl Fn(&Asset) -> bool) -> Option<Asset> {
        self.assets
            .iter()
            .filter(|entry| predicate(&entry.0))
            .map(|entry| entry.0.clone())
            .min_by_key(|asset| asset.id)
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn put(&self, bytes: &[u8], asset: NewAsset) -> Result<Asset, StoreError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let taken = |name: &str| self.assets.iter().any(|e| e.0.filename == name);
        let filename = if taken(&asset.filename) {
            let (stem, ext) = match asset.filename.rfind('.') {
                Some(pos) if pos > 0 => asset.filename.split_at(pos),
                _ => (asset.filename.as_str(), ""),
            };
            format!("{stem}-{id}{ext}")
        } else {
            asset.filename.clone()
        };
        let relative_path = format!("{}/{filename}", self.date_dir);
        let stored = Asset {
            id,
            local_url: join_url(&self.base_url, &relative_path),
            relative_path,
            filename,
            mime_type: asset.mime_type,
            size_bytes: bytes.len() as u64,
            alt_text: asset.alt_text,
            title: asset.title,
            source_url: asset.source_url,
        };
        self.assets.insert(id, (stored.clone(), bytes.to_vec()));
        Ok(stored)
    }

    async fn get(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        Ok(self.assets.get(&id).map(|entry| entry.0.clone()))
    }

    async fn resolve_by_url(&self, url: &str) -> Result<Option<Asset>, StoreError> {
        Ok(self
            .find(|a| a.local_url == url)
            .or_else(|| self.find(|a| a.source_url.as_deref() == Some(url))))
    }

    async fn resolve_by_filename(&self, filename: &str) -> Result<Option<Asset>, StoreError> {
        Ok(self
            .find(|a| a.relative_path == filename)
            .or_else(|| self.find(|a| a.filename == filename)))
    }
}

/// Document store backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<String, ContentDocument>,
}

impl MemoryDocumentStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn create(&self, document: &ContentDocument) -> Result<(), StoreError> {
        self.documents.insert(document.id.clone(), document.clone());
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<ContentDocument, StoreError> {
        self.documents
            .get(id)
            .map(|d| d.value().clone())
            .ok_or_else(|| StoreError::document_not_found(id))
    }

    async fn save(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let mut doc = self
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::document_not_found(id))?;
        doc.content = content.to_string();
        Ok(())
    }

    async fn primary_asset(&self, id: &str) -> Result<Option<AssetId>, StoreError> {
        self.documents
            .get(id)
            .map(|d| d.primary_asset_id)
            .ok_or_else(|| StoreError::document_not_found(id))
    }

    async fn set_primary_asset(&self, id: &str, asset_id: AssetId) -> Result<(), StoreError> {
        let mut doc = self
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::document_not_found(id))?;
        doc.primary_asset_id = Some(asset_id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let mut ids: Vec<String> = self.documents.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_asset_store_assigns_distinct_urls() {
        let store = MemoryAssetStore::new("https://blog.example.org/media");
        let asset = NewAsset {
            mime_type: "image/png".to_string(),
            filename: "a.png".to_string(),
            ..NewAsset::default()
        };

        let first = store.put(b"1", asset.clone()).await.unwrap();
        let second = store.put(b"2", asset).await.unwrap();

        assert_ne!(first.local_url, second.local_url);
        assert_eq!(store.len(), 2);
        assert_eq!(store.bytes(second.id).unwrap(), b"2");
    }

    #[tokio::test]
    async fn test_memory_document_store_save_requires_existing() {
        let store = MemoryDocumentStore::new();
        assert!(store.save("missing", "x").await.is_err());

        store.create(&ContentDocument::new("d", "o", "x")).await.unwrap();
        store.save("d", "y").await.unwrap();
        assert_eq!(store.load("d").await.unwrap().content, "y");
    }
}
