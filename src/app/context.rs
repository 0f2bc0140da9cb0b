//! Shared handles built once per process from the global CLI flags.

use std::sync::Arc;

use anyhow::{Context, Result};
use media_ingest_core::{
    Database, FailedUrlLedger, IngestConfig, IngestPipeline, LocalAssetStore, ProgressTracker,
    SqliteDocumentStore,
};
use tracing::debug;

use crate::app::app_config::load_config;
use crate::cli::Cli;

pub(crate) struct AppContext {
    pub(crate) db: Database,
    pub(crate) config: IngestConfig,
    media_dir: std::path::PathBuf,
    media_base_url: String,
}

impl AppContext {
    pub(crate) async fn open(cli: &Cli) -> Result<Self> {
        let mut config = load_config(cli.config.as_deref())?;
        // Media we serve ourselves is already local.
        if cli.media_base_url.starts_with("http")
            && !config.base_urls.iter().any(|u| u == &cli.media_base_url)
        {
            config.base_urls.push(cli.media_base_url.clone());
        }

        let db = Database::new(&cli.db)
            .await
            .with_context(|| format!("opening database {}", cli.db.display()))?;
        debug!(db = %cli.db.display(), media_dir = %cli.media_dir.display(), "context opened");

        Ok(Self {
            db,
            config,
            media_dir: cli.media_dir.clone(),
            media_base_url: cli.media_base_url.clone(),
        })
    }

    pub(crate) fn documents(&self) -> Arc<SqliteDocumentStore> {
        Arc::new(SqliteDocumentStore::new(self.db.clone()))
    }

    pub(crate) fn ledger(&self) -> FailedUrlLedger {
        FailedUrlLedger::sqlite(self.db.clone())
    }

    /// Builds a pipeline with `config` (the file config plus CLI overrides).
    pub(crate) fn pipeline(&self, config: IngestConfig) -> IngestPipeline {
        let assets = Arc::new(LocalAssetStore::new(
            self.db.clone(),
            self.media_dir.clone(),
            self.media_base_url.clone(),
        ));
        let tracker = ProgressTracker::in_memory(config.run_ttl());
        IngestPipeline::new(config, assets, self.documents(), self.ledger(), tracker)
    }
}
