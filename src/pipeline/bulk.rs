//! Sequential server-driven mode.
//!
//! Documents are processed one at a time with a single download worker and
//! each is persisted before the next starts. A failing document is logged
//! and counted; it never stops the batch. Cancellation is checked between
//! documents only.

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use super::{IngestPipeline, PipelineError, RunReport};
use crate::run::RunContext;

/// Owner recorded on runs whose document has no owner.
const BULK_OWNER: &str = "bulk";

/// A document whose run aborted on an infrastructure error.
#[derive(Debug, Clone, Serialize)]
pub struct BulkFailure {
    pub document_id: String,
    pub error: String,
}

/// Outcome of a bulk pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BulkReport {
    pub runs: Vec<RunReport>,
    pub failures: Vec<BulkFailure>,
    /// Documents never started because the pass was cancelled.
    pub remaining: usize,
    pub cancelled: bool,
}

impl BulkReport {
    /// Number of references downloaded across all runs.
    #[must_use]
    pub fn downloaded(&self) -> u64 {
        self.runs.iter().map(|r| r.downloaded).sum()
    }
}

/// Drains a queue of document ids through an [`IngestPipeline`].
#[derive(Debug, Clone)]
pub struct BulkRunner {
    pipeline: IngestPipeline,
}

impl BulkRunner {
    #[must_use]
    pub fn new(pipeline: IngestPipeline) -> Self {
        Self { pipeline }
    }

    /// Processes every document in the document store.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the document ids cannot be listed.
    pub async fn run_all(&self, cancel: &CancellationToken) -> Result<BulkReport, PipelineError> {
        let ids = self.pipeline.documents().list_ids().await?;
        Ok(self.run(&ids, cancel).await)
    }

    /// Processes `document_ids` in order.
    #[instrument(skip(self, document_ids, cancel), fields(documents = document_ids.len()))]
    pub async fn run(&self, document_ids: &[String], cancel: &CancellationToken) -> BulkReport {
        let mut report = BulkReport::default();

        for (index, id) in document_ids.iter().enumerate() {
            if cancel.is_cancelled() {
                report.cancelled = true;
                report.remaining = document_ids.len() - index;
                info!(remaining = report.remaining, "bulk run cancelled");
                break;
            }

            match self.run_one(id).await {
                Ok(run) => report.runs.push(run),
                Err(e) => {
                    error!(document_id = %id, error = %e, "document run failed");
                    report.failures.push(BulkFailure {
                        document_id: id.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        info!(
            completed = report.runs.len(),
            failed = report.failures.len(),
            downloaded = report.downloaded(),
            "bulk run finished"
        );
        report
    }

    async fn run_one(&self, document_id: &str) -> Result<RunReport, PipelineError> {
        let document = self.pipeline.documents().load(document_id).await?;
        let owner = if document.owner_id.is_empty() {
            BULK_OWNER
        } else {
            document.owner_id.as_str()
        };
        let ctx = RunContext::generate(owner, document_id);
        // Per-document runs are never interrupted mid-way.
        self.pipeline
            .run_document_with_concurrency(&ctx, &CancellationToken::new(), 1)
            .await
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::config::IngestConfig;
    use crate::download::{DownloadError, DownloadService};
    use crate::ledger::FailedUrlLedger;
    use crate::progress::ProgressTracker;
    use crate::scanner::MediaReference;
    use crate::store::{
        Asset, AssetStore, ContentDocument, DocumentStore, MemoryAssetStore, MemoryDocumentStore,
        NewAsset,
    };

    #[derive(Debug)]
    struct StoreEverything(Arc<MemoryAssetStore>);

    #[async_trait]
    impl DownloadService for StoreEverything {
        async fn download(&self, reference: &MediaReference, _ctx: &RunContext) -> Result<Asset, DownloadError> {
            self.0
                .put(
                    b"x",
                    NewAsset {
                        mime_type: "image/png".to_string(),
                        filename: "img.png".to_string(),
                        source_url: Some(reference.source_url.clone()),
                        ..NewAsset::default()
                    },
                )
                .await
                .map_err(|e| DownloadError::store(&reference.source_url, e))
        }
    }

    async fn runner(docs: &[(&str, &str)]) -> (BulkRunner, Arc<MemoryDocumentStore>) {
        let assets = Arc::new(MemoryAssetStore::new("https://blog.example.org/media"));
        let documents = Arc::new(MemoryDocumentStore::new());
        for (id, content) in docs {
            documents
                .create(&ContentDocument::new(*id, "alice", *content))
                .await
                .unwrap();
        }
        let pipeline = IngestPipeline::with_service(
            Arc::new(IngestConfig::default()),
            Arc::new(StoreEverything(Arc::clone(&assets))),
            assets,
            documents.clone(),
            FailedUrlLedger::in_memory(),
            ProgressTracker::in_memory(Duration::from_secs(60)),
        );
        (BulkRunner::new(pipeline), documents)
    }

    #[tokio::test]
    async fn test_bulk_processes_all_documents_in_order() {
        let (runner, documents) = runner(&[
            ("post-1", r#"<img src="https://ext.example/1.png">"#),
            ("post-2", r#"<img src="https://ext.example/2.png">"#),
        ])
        .await;

        let report = runner.run_all(&CancellationToken::new()).await.unwrap();

        assert_eq!(report.runs.len(), 2);
        assert_eq!(report.runs[0].document_id, "post-1");
        assert_eq!(report.downloaded(), 2);
        for id in ["post-1", "post-2"] {
            let doc = documents.load(id).await.unwrap();
            assert!(!doc.content.contains("ext.example"));
        }
    }

    #[tokio::test]
    async fn test_bulk_missing_document_is_counted_and_skipped() {
        let (runner, _) = runner(&[("post-1", r#"<img src="https://ext.example/1.png">"#)]).await;
        let ids = vec!["missing".to_string(), "post-1".to_string()];

        let report = runner.run(&ids, &CancellationToken::new()).await;

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].document_id, "missing");
        assert_eq!(report.runs.len(), 1);
    }

    #[tokio::test]
    async fn test_bulk_cancelled_before_start_runs_nothing() {
        let (runner, documents) = runner(&[("post-1", r#"<img src="https://ext.example/1.png">"#)]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = runner.run_all(&cancel).await.unwrap();

        assert!(report.cancelled);
        assert_eq!(report.remaining, 1);
        assert!(report.runs.is_empty());
        let doc = documents.load("post-1").await.unwrap();
        assert!(doc.content.contains("ext.example"));
    }
}
