//! SQLite-backed document store.

use async_trait::async_trait;
use sqlx::Row;
use tracing::{debug, instrument};

use super::{AssetId, ContentDocument, DocumentStore, StoreError};
use crate::db::Database;

/// Documents kept in the `documents` table.
#[derive(Debug, Clone)]
pub struct SqliteDocumentStore {
    db: Database,
}

impl SqliteDocumentStore {
    #[must_use]
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl DocumentStore for SqliteDocumentStore {
    #[instrument(skip(self, document), fields(id = %document.id))]
    async fn create(&self, document: &ContentDocument) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO documents (id, owner_id, content, primary_asset_id)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                owner_id = excluded.owner_id,
                content = excluded.content,
                primary_asset_id = excluded.primary_asset_id,
                updated_at = datetime('now')",
        )
        .bind(&document.id)
        .bind(&document.owner_id)
        .bind(&document.content)
        .bind(document.primary_asset_id)
        .execute(self.db.pool())
        .await?;
        debug!("document stored");
        Ok(())
    }

    #[instrument(skip(self))]
    async fn load(&self, id: &str) -> Result<ContentDocument, StoreError> {
        let row = sqlx::query(
            "SELECT id, owner_id, content, primary_asset_id FROM documents WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(self.db.pool())
        .await?
        .ok_or_else(|| StoreError::document_not_found(id))?;

        Ok(ContentDocument {
            id: row.get("id"),
            owner_id: row.get("owner_id"),
            content: row.get("content"),
            primary_asset_id: row.get("primary_asset_id"),
        })
    }

    #[instrument(skip(self, content), fields(len = content.len()))]
    async fn save(&self, id: &str, content: &str) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET content = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(content)
        .bind(id)
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::document_not_found(id));
        }
        Ok(())
    }

    async fn primary_asset(&self, id: &str) -> Result<Option<AssetId>, StoreError> {
        let row = sqlx::query("SELECT primary_asset_id FROM documents WHERE id = ?")
            .bind(id)
            .fetch_optional(self.db.pool())
            .await?
            .ok_or_else(|| StoreError::document_not_found(id))?;
        Ok(row.get("primary_asset_id"))
    }

    #[instrument(skip(self))]
    async fn set_primary_asset(&self, id: &str, asset_id: AssetId) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE documents SET primary_asset_id = ?, updated_at = datetime('now') WHERE id = ?",
        )
        .bind(asset_id)
        .bind(id)
        .execute(self.db.pool())
        .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::document_not_found(id));
        }
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<String>, StoreError> {
        let rows = sqlx::query("SELECT id FROM documents ORDER BY created_at ASC, id ASC")
            .fetch_all(self.db.pool())
            .await?;
        Ok(rows.iter().map(|row| row.get("id")).collect())
    }
}
