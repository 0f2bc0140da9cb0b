//! Asset store writing files below a media directory and indexing them in SQLite.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use sqlx::sqlite::SqliteRow;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, instrument};

use super::{Asset, AssetId, AssetStore, NewAsset, StoreError, join_url};
use crate::db::Database;
use crate::download::filename::sanitize_filename;

/// Duplicate names get `-1`, `-2`, ... up to this suffix before giving up.
const MAX_NAME_SUFFIX: usize = 999;

/// Stores media as `<media_dir>/YYYY/MM/<name>` and serves it under `base_url`.
#[derive(Debug, Clone)]
pub struct LocalAssetStore {
    db: Database,
    media_dir: PathBuf,
    base_url: String,
}

impl LocalAssetStore {
    /// Creates a store. `base_url` is the public prefix of `media_dir`.
    pub fn new(db: Database, media_dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            db,
            media_dir: media_dir.into(),
            base_url: base_url.into(),
        }
    }

    /// Root directory files are written to.
    #[must_use]
    pub fn media_dir(&self) -> &Path {
        &self.media_dir
    }

    /// Creates a new file in `dir`, adding a numeric suffix until the name is free.
    ///
    /// `create_new` makes the claim atomic, so concurrent puts of the same
    /// filename end up in distinct files.
    async fn create_unique(
        dir: &Path,
        filename: &str,
    ) -> Result<(tokio::fs::File, String), StoreError> {
        let (stem, ext) = match filename.rfind('.') {
            Some(pos) if pos > 0 => (&filename[..pos], &filename[pos..]),
            _ => (filename, ""),
        };

        for suffix in 0..=MAX_NAME_SUFFIX {
            let name = if suffix == 0 {
                filename.to_string()
            } else {
                format!("{stem}-{suffix}{ext}")
            };
            let path = dir.join(&name);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => return Ok((file, name)),
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {}
                Err(e) => return Err(StoreError::io(path, e)),
            }
        }
        Err(StoreError::io(
            dir.join(filename),
            std::io::Error::new(
                std::io::ErrorKind::AlreadyExists,
                "no free filename suffix left",
            ),
        ))
    }
}

fn asset_from_row(row: &SqliteRow) -> Asset {
    let size: i64 = row.get("size_bytes");
    Asset {
        id: row.get("id"),
        local_url: row.get("local_url"),
        relative_path: row.get("relative_path"),
        filename: row.get("filename"),
        mime_type: row.get("mime_type"),
        size_bytes: u64::try_from(size).unwrap_or_default(),
        alt_text: row.get("alt_text"),
        title: row.get("title"),
        source_url: row.get("source_url"),
    }
}

const ASSET_COLUMNS: &str =
    "id, local_url, relative_path, filename, mime_type, size_bytes, alt_text, title, source_url";

#[async_trait]
impl AssetStore for LocalAssetStore {
    #[instrument(skip(self, bytes, asset), fields(filename = %asset.filename, size = bytes.len()))]
    async fn put(&self, bytes: &[u8], asset: NewAsset) -> Result<Asset, StoreError> {
        let date_dir = Utc::now().format("%Y/%m").to_string();
        let dir = self.media_dir.join(&date_dir);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StoreError::io(dir.clone(), e))?;

        let filename = sanitize_filename(&asset.filename);
        let (mut file, name) = Self::create_unique(&dir, &filename).await?;
        let path = dir.join(&name);

        let written = async {
            file.write_all(bytes).await?;
            file.flush().await
        }
        .await;
        if let Err(e) = written {
            debug!(path = %path.display(), "removing partial file after write error");
            let _ = tokio::fs::remove_file(&path).await;
            return Err(StoreError::io(path, e));
        }

        let relative_path = format!("{date_dir}/{name}");
        let local_url = join_url(&self.base_url, &relative_path);
        let size_bytes = i64::try_from(bytes.len()).unwrap_or(i64::MAX);

        let inserted = sqlx::query(
            "INSERT INTO assets (local_url, relative_path, filename, mime_type, size_bytes, alt_text, title, source_url)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&local_url)
        .bind(&relative_path)
        .bind(&name)
        .bind(&asset.mime_type)
        .bind(size_bytes)
        .bind(&asset.alt_text)
        .bind(&asset.title)
        .bind(&asset.source_url)
        .execute(self.db.pool())
        .await;

        let id = match inserted {
            Ok(result) => result.last_insert_rowid(),
            Err(e) => {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(e.into());
            }
        };

        info!(asset_id = id, local_url = %local_url, "asset stored");
        Ok(Asset {
            id,
            local_url,
            relative_path,
            filename: name,
            mime_type: asset.mime_type,
            size_bytes: bytes.len() as u64,
            alt_text: asset.alt_text,
            title: asset.title,
            source_url: asset.source_url,
        })
    }

    async fn get(&self, id: AssetId) -> Result<Option<Asset>, StoreError> {
        let row = sqlx::query(&format!("SELECT {ASSET_COLUMNS} FROM assets WHERE id = ?"))
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?;
        Ok(row.as_ref().map(asset_from_row))
    }

    #[instrument(skip(self))]
    async fn resolve_by_url(&self, url: &str) -> Result<Option<Asset>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets
             WHERE local_url = ? OR source_url = ?
             ORDER BY (local_url = ?) DESC, id ASC LIMIT 1"
        ))
        .bind(url)
        .bind(url)
        .bind(url)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.as_ref().map(asset_from_row))
    }

    #[instrument(skip(self))]
    async fn resolve_by_filename(&self, filename: &str) -> Result<Option<Asset>, StoreError> {
        let row = sqlx::query(&format!(
            "SELECT {ASSET_COLUMNS} FROM assets
             WHERE relative_path = ? OR filename = ?
             ORDER BY (relative_path = ?) DESC, id ASC LIMIT 1"
        ))
        .bind(filename)
        .bind(filename)
        .bind(filename)
        .fetch_optional(self.db.pool())
        .await?;
        Ok(row.as_ref().map(asset_from_row))
    }
}
