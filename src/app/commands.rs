//! Subcommand handlers.

use std::io::{self, IsTerminal, Read, Write};
use std::path::Path;
use std::sync::atomic::Ordering;

use anyhow::{Context, Result};
use media_ingest_core::{BulkRunner, ContentDocument, DocumentStore, RunContext};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::app::context::AppContext;
use crate::app::{progress_manager, terminal};
use crate::cli::{IngestArgs, LedgerCommand};

pub(crate) async fn run_import(app: &AppContext, id: &str, file: &Path, owner: &str) -> Result<()> {
    let content = if file.as_os_str() == "-" {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?
    };
    app.documents()
        .create(&ContentDocument::new(id, owner, content))
        .await?;
    info!(id, "document imported");
    Ok(())
}

pub(crate) async fn run_export(app: &AppContext, id: &str) -> Result<()> {
    let document = app.documents().load(id).await?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(document.content.as_bytes())?;
    if !document.content.ends_with('\n') {
        stdout.write_all(b"\n")?;
    }
    Ok(())
}

pub(crate) async fn run_ingest(app: &AppContext, args: &IngestArgs, quiet: bool) -> Result<()> {
    let mut config = app.config.clone();
    if let Some(concurrency) = args.concurrency {
        config.concurrency = usize::from(concurrency);
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = u32::from(max_retries);
    }
    let config = config.normalized();
    config.validate()?;

    let pipeline = app.pipeline(config);
    let ctx = match &args.run_id {
        Some(run_id) => RunContext::new(&args.owner, run_id, &args.id),
        None => RunContext::generate(&args.owner, &args.id),
    };

    let cancel = cancel_on_ctrl_c();
    let use_spinner =
        terminal::should_use_spinner(io::stderr().is_terminal(), quiet, terminal::is_dumb_terminal());
    let (progress_handle, progress_stop) =
        progress_manager::spawn_progress_ui(use_spinner, pipeline.tracker().clone(), ctx.clone());

    let result = pipeline.run_document(&ctx, &cancel).await;

    progress_stop.store(true, Ordering::SeqCst);
    if let Some(handle) = progress_handle {
        let _ = handle.await;
    }

    let report = result?;
    info!(
        downloaded = report.downloaded,
        failed = report.failed,
        skipped = report.skipped,
        "Ingest complete"
    );
    print_json(&report)
}

pub(crate) async fn run_bulk(app: &AppContext, ids: &[String]) -> Result<()> {
    let runner = BulkRunner::new(app.pipeline(app.config.clone()));
    let cancel = cancel_on_ctrl_c();

    let report = if ids.is_empty() {
        runner.run_all(&cancel).await?
    } else {
        runner.run(ids, &cancel).await
    };
    if !report.failures.is_empty() {
        warn!(failed = report.failures.len(), "some documents could not be processed");
    }
    print_json(&report)
}

pub(crate) async fn run_ledger(app: &AppContext, command: &LedgerCommand) -> Result<()> {
    let ledger = app.ledger();
    match command {
        LedgerCommand::List => {
            let mut stdout = io::stdout().lock();
            for entry in ledger.entries().await? {
                writeln!(stdout, "{}\t{}", entry.failed_at.to_rfc3339(), entry.url)?;
            }
        }
        LedgerCommand::Clear => {
            let removed = ledger.clear().await?;
            info!(removed, "ledger cleared");
        }
        LedgerCommand::Remove { url } => {
            if ledger.remove(url).await? {
                info!(url = %url, "removed from ledger");
            } else {
                warn!(url = %url, "url was not in the ledger");
            }
        }
    }
    Ok(())
}

/// Token cancelled on the first Ctrl-C.
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, finishing in-flight downloads");
            signal.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut stdout = io::stdout().lock();
    serde_json::to_writer_pretty(&mut stdout, value)?;
    writeln!(stdout)?;
    Ok(())
}
