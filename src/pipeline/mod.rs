//! Orchestration of a full ingestion run over one document.
//!
//! A run has three phases:
//!
//! 1. [`IngestPipeline::prepare`] loads the document, scans and classifies
//!    its references and starts the progress record.
//! 2. [`IngestPipeline::download_one`] is called once per dispatched
//!    reference, either by an external orchestrator or by the built-in
//!    worker pool in [`IngestPipeline::run_document`].
//! 3. [`IngestPipeline::apply_mappings`] applies every successful download
//!    to the document in one rewrite pass, persists it, picks a primary
//!    asset and completes the progress record.
//!
//! Workers never touch the document. They send finished downloads over a
//! channel that is drained by the single rewrite step.

mod bulk;

pub use bulk::{BulkFailure, BulkReport, BulkRunner};

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::{Semaphore, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::classify::{Classifier, ValidationOutcome};
use crate::config::IngestConfig;
use crate::download::{
    DownloadService, EngineError, MediaDownloader, RetryController, RetryOutcome, RetryPolicy,
};
use crate::ledger::{FailedUrlLedger, LedgerError};
use crate::primary::PrimaryAssetResolver;
use crate::progress::{ItemOutcome, ProgressError, ProgressRecord, ProgressTracker};
use crate::rewrite::{ContentRewriter, UrlMapping};
use crate::run::RunContext;
use crate::scanner::{MediaReference, scan};
use crate::store::{AssetId, AssetStore, DocumentStore, StoreError};

/// Infrastructure failures that abort a run. Per-reference download
/// failures are never reported here.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Document or asset store failed.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Failed-URL ledger unavailable.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Progress store unavailable.
    #[error("progress error: {0}")]
    Progress(#[from] ProgressError),

    /// The retry controller hit an infrastructure error.
    #[error("download engine error: {0}")]
    Engine(#[from] EngineError),

    /// The worker semaphore was closed while dispatching.
    #[error("worker pool closed unexpectedly")]
    PoolClosed,
}

/// Classification tally of the references found in a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ClassificationCounts {
    pub eligible: u64,
    pub previously_failed: u64,
    pub already_local: u64,
    pub excluded_domain: u64,
    pub malformed: u64,
    /// Repeated occurrences of a URL already dispatched in this run.
    pub duplicate: u64,
}

impl ClassificationCounts {
    fn add(&mut self, outcome: ValidationOutcome) {
        let slot = match outcome {
            ValidationOutcome::Eligible => &mut self.eligible,
            ValidationOutcome::PreviouslyFailed => &mut self.previously_failed,
            ValidationOutcome::AlreadyLocal => &mut self.already_local,
            ValidationOutcome::ExcludedDomain => &mut self.excluded_domain,
            ValidationOutcome::Malformed => &mut self.malformed,
        };
        *slot += 1;
    }
}

/// References of a document that will be handed to the retry controller.
#[derive(Debug, Clone)]
pub struct RunPlan {
    /// Number of references the scanner found.
    pub scanned: u64,
    pub counts: ClassificationCounts,
    /// One reference per distinct source URL, in document order.
    pub dispatch: Vec<MediaReference>,
}

/// Result of [`IngestPipeline::download_one`].
#[derive(Debug)]
pub enum ReferenceOutcome {
    /// The reference was not dispatched (local, excluded or malformed).
    Ignored(ValidationOutcome),
    /// The reference went through the retry controller.
    Attempted(RetryOutcome),
}

/// Result of [`IngestPipeline::apply_mappings`].
#[derive(Debug, Clone, Serialize)]
pub struct ApplyReport {
    pub substitutions: usize,
    pub variant_substitutions: usize,
    pub misses: Vec<String>,
    /// Whether the document content changed and was saved.
    pub saved: bool,
    pub primary_asset_id: Option<AssetId>,
    /// Final progress record.
    pub progress: ProgressRecord,
}

/// A reference whose download failed terminally.
#[derive(Debug, Clone, Serialize)]
pub struct FailureReport {
    pub url: String,
    pub attempts: u32,
    pub blacklisted: bool,
    pub error: String,
}

/// Summary of one document run, printed by the CLI as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub owner_id: String,
    pub run_id: String,
    pub document_id: String,
    pub scanned: u64,
    pub classification: ClassificationCounts,
    pub downloaded: u64,
    pub failed: u64,
    pub skipped: u64,
    pub failures: Vec<FailureReport>,
    pub cancelled: bool,
    pub rewrite: ApplyReport,
}

struct Dispatched {
    outcomes: Vec<(MediaReference, RetryOutcome)>,
    dispatched: usize,
    cancelled: bool,
    /// First infrastructure error hit while dispatching or collecting.
    error: Option<PipelineError>,
}

/// Ingests the media of documents and rewrites them to local assets.
#[derive(Clone)]
pub struct IngestPipeline {
    config: Arc<IngestConfig>,
    classifier: Classifier,
    controller: RetryController,
    ledger: FailedUrlLedger,
    tracker: ProgressTracker,
    documents: Arc<dyn DocumentStore>,
    rewriter: ContentRewriter,
    primary: PrimaryAssetResolver,
}

impl std::fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("concurrency", &self.config.concurrency)
            .field("controller", &self.controller)
            .finish_non_exhaustive()
    }
}

impl IngestPipeline {
    /// Creates a pipeline downloading over HTTP with [`MediaDownloader`].
    #[must_use]
    pub fn new(
        config: IngestConfig,
        assets: Arc<dyn AssetStore>,
        documents: Arc<dyn DocumentStore>,
        ledger: FailedUrlLedger,
        tracker: ProgressTracker,
    ) -> Self {
        let config = Arc::new(config);
        let service = Arc::new(MediaDownloader::new(Arc::clone(&assets), Arc::clone(&config)));
        Self::with_service(config, service, assets, documents, ledger, tracker)
    }

    /// Creates a pipeline around a custom download service.
    #[must_use]
    pub fn with_service(
        config: Arc<IngestConfig>,
        service: Arc<dyn DownloadService>,
        assets: Arc<dyn AssetStore>,
        documents: Arc<dyn DocumentStore>,
        ledger: FailedUrlLedger,
        tracker: ProgressTracker,
    ) -> Self {
        let controller = RetryController::new(
            service,
            ledger.clone(),
            tracker.clone(),
            RetryPolicy::from_config(&config),
        );
        Self {
            classifier: Classifier::new(&config),
            controller,
            ledger,
            tracker,
            primary: PrimaryAssetResolver::new(assets, Arc::clone(&documents)),
            documents,
            rewriter: ContentRewriter::default(),
            config,
        }
    }

    /// Replaces the content rewriter.
    #[must_use]
    pub fn with_rewriter(mut self, rewriter: ContentRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    #[must_use]
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    #[must_use]
    pub fn tracker(&self) -> &ProgressTracker {
        &self.tracker
    }

    #[must_use]
    pub fn ledger(&self) -> &FailedUrlLedger {
        &self.ledger
    }

    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Loads and classifies the target document, then starts progress
    /// tracking with one item per dispatched reference.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the document, ledger or progress store fails.
    #[instrument(skip(self), fields(run = %ctx))]
    pub async fn prepare(&self, ctx: &RunContext) -> Result<RunPlan, PipelineError> {
        let document = self.documents.load(&ctx.target_document_id).await?;

        let mut scanned = 0;
        let mut counts = ClassificationCounts::default();
        let mut seen = HashSet::new();
        let mut dispatch = Vec::new();
        for reference in scan(&document.content) {
            scanned += 1;
            let outcome = self.classifier.classify(&reference, &self.ledger).await?;
            if !outcome.is_dispatched() {
                counts.add(outcome);
                continue;
            }
            if seen.insert(reference.source_url.clone()) {
                counts.add(outcome);
                dispatch.push(reference);
            } else {
                counts.duplicate += 1;
            }
        }

        self.tracker.start(ctx, dispatch.len() as u64).await?;
        info!(scanned, dispatched = dispatch.len(), "run prepared");
        Ok(RunPlan {
            scanned,
            counts,
            dispatch,
        })
    }

    /// Processes a single reference for an external orchestrator.
    ///
    /// References that classify as local, excluded or malformed are returned
    /// as [`ReferenceOutcome::Ignored`] without touching progress or network.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] only for ledger or progress store failures.
    #[instrument(skip(self, reference), fields(url = %reference.source_url, run = %ctx))]
    pub async fn download_one(
        &self,
        ctx: &RunContext,
        reference: &MediaReference,
    ) -> Result<ReferenceOutcome, PipelineError> {
        if let Some(outcome) = self.classifier.classify_static(reference) {
            debug!(outcome = %outcome, "reference not dispatched");
            return Ok(ReferenceOutcome::Ignored(outcome));
        }
        let outcome = self.controller.download_with_retry(reference, ctx).await?;
        Ok(ReferenceOutcome::Attempted(outcome))
    }

    /// Applies all mappings to the target document in one rewrite pass,
    /// saves it, assigns a primary asset if none is set, and completes the
    /// progress record.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] if the document or progress store fails.
    #[instrument(skip(self, mappings), fields(run = %ctx, mappings = mappings.len()))]
    pub async fn apply_mappings(
        &self,
        ctx: &RunContext,
        mappings: &[UrlMapping],
    ) -> Result<ApplyReport, PipelineError> {
        let document = self.documents.load(&ctx.target_document_id).await?;
        let result = self.rewriter.rewrite(&document.content, mappings);

        let saved = result.document != document.content;
        if saved {
            self.documents.save(&document.id, &result.document).await?;
        }

        let primary_asset_id = self.primary.assign_if_missing(&document.id).await?.asset_id();

        let progress = self.tracker.finish(ctx).await?;
        info!(
            substitutions = result.substitutions,
            misses = result.misses.len(),
            saved,
            "mappings applied"
        );
        Ok(ApplyReport {
            substitutions: result.substitutions,
            variant_substitutions: result.variant_substitutions,
            misses: result.misses,
            saved,
            primary_asset_id,
            progress,
        })
    }

    /// Runs the whole pipeline with the configured concurrency.
    ///
    /// Cancellation is checked between dispatches. Downloads already in
    /// flight complete and their results are still applied; references never
    /// dispatched are counted as skipped.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] on infrastructure failures only.
    pub async fn run_document(
        &self,
        ctx: &RunContext,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        self.run_document_with_concurrency(ctx, cancel, self.config.concurrency)
            .await
    }

    /// [`run_document`](Self::run_document) with an explicit worker count.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] on infrastructure failures only.
    #[instrument(skip(self, cancel), fields(run = %ctx))]
    pub async fn run_document_with_concurrency(
        &self,
        ctx: &RunContext,
        cancel: &CancellationToken,
        concurrency: usize,
    ) -> Result<RunReport, PipelineError> {
        let plan = self.prepare(ctx).await?;
        let Dispatched {
            outcomes,
            dispatched,
            cancelled,
            error,
        } = self.dispatch(ctx, cancel, concurrency, &plan).await;

        let mut mappings = Vec::new();
        let mut failures = Vec::new();
        let (mut downloaded, mut failed, mut skipped) = (0usize, 0usize, 0usize);
        for (reference, outcome) in outcomes {
            match outcome {
                RetryOutcome::Downloaded { asset, .. } => {
                    downloaded += 1;
                    mappings.push(UrlMapping::new(reference.source_url, asset));
                }
                RetryOutcome::Skipped { .. } => skipped += 1,
                RetryOutcome::Failed {
                    error,
                    attempts,
                    blacklisted,
                } => {
                    failed += 1;
                    failures.push(FailureReport {
                        url: reference.source_url,
                        attempts,
                        blacklisted,
                        error: error.to_string(),
                    });
                }
            }
        }
        if let Some(e) = error {
            self.salvage(ctx, &mappings).await;
            return Err(e);
        }

        // Workers that panicked were recorded as failed by `dispatch`.
        failed += dispatched - downloaded - failed - skipped;
        let undispatched = plan.dispatch.len() - dispatched;

        let rewrite = self.apply_mappings(ctx, &mappings).await?;
        info!(downloaded, failed, skipped, cancelled, "run complete");

        Ok(RunReport {
            owner_id: ctx.owner_id.clone(),
            run_id: ctx.run_id.clone(),
            document_id: ctx.target_document_id.clone(),
            scanned: plan.scanned,
            classification: plan.counts,
            downloaded: downloaded as u64,
            failed: failed as u64,
            skipped: (skipped + undispatched) as u64,
            failures,
            cancelled,
            rewrite,
        })
    }

    /// Applies downloads that finished before a run aborted, so their assets
    /// stay referenced. Errors here are logged; the abort error wins.
    async fn salvage(&self, ctx: &RunContext, mappings: &[UrlMapping]) {
        if mappings.is_empty() {
            if let Err(e) = self.tracker.finish(ctx).await {
                warn!(error = %e, "failed to complete progress record");
            }
            return;
        }
        warn!(finished = mappings.len(), "run aborted, applying finished downloads");
        if let Err(e) = self.apply_mappings(ctx, mappings).await {
            let orphaned: Vec<AssetId> = mappings.iter().map(|m| m.asset.id).collect();
            warn!(error = %e, ?orphaned, "failed to apply finished downloads");
        }
    }

    /// Feeds the plan through a bounded worker pool.
    ///
    /// Every outcome a worker sends is kept, even after another worker has
    /// hit an infrastructure error.
    async fn dispatch(
        &self,
        ctx: &RunContext,
        cancel: &CancellationToken,
        concurrency: usize,
        plan: &RunPlan,
    ) -> Dispatched {
        let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
        let (tx, mut rx) = mpsc::channel(plan.dispatch.len().max(1));
        let mut handles = Vec::with_capacity(plan.dispatch.len());
        let mut dispatched = 0usize;
        let mut cancelled = false;
        let mut first_error: Option<PipelineError> = None;

        for reference in &plan.dispatch {
            let permit = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => {
                    match permit {
                        Ok(permit) => permit,
                        Err(_) => {
                            first_error = Some(PipelineError::PoolClosed);
                            break;
                        }
                    }
                }
            };

            let controller = self.controller.clone();
            let ctx = ctx.clone();
            let reference = reference.clone();
            let tx = tx.clone();
            dispatched += 1;
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let result = controller.download_with_retry(&reference, &ctx).await;
                // The receiver outlives every worker.
                let _ = tx.send((reference, result)).await;
            }));
        }
        drop(tx);

        if cancelled {
            let remaining = (plan.dispatch.len() - dispatched) as u64;
            info!(remaining, "run cancelled, skipping undispatched references");
            if let Err(e) = self.tracker.record_skipped(ctx, remaining).await {
                first_error.get_or_insert(e.into());
            }
        }

        let mut outcomes = Vec::with_capacity(dispatched);
        while let Some((reference, result)) = rx.recv().await {
            match result {
                Ok(outcome) => outcomes.push((reference, outcome)),
                Err(e) => {
                    warn!(url = %reference.source_url, error = %e, "worker hit infrastructure error");
                    first_error.get_or_insert(e.into());
                }
            }
        }

        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "download task panicked");
                if let Err(e) = self.tracker.record_outcome(ctx, ItemOutcome::Failed).await {
                    first_error.get_or_insert(e.into());
                }
            }
        }

        Dispatched {
            outcomes,
            dispatched,
            cancelled,
            error: first_error,
        }
    }
}
