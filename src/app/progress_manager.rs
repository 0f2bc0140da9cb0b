//! Progress UI (spinner) for ingestion runs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use media_ingest_core::{ProgressRecord, ProgressTracker, RunContext};
use url::Url;

/// Spawns the progress UI (spinner) when requested.
/// Returns (handle, stop) so the caller can signal stop and await the handle.
/// When `use_spinner` is false, returns (None, stop) with stop already true.
pub(crate) fn spawn_progress_ui(
    use_spinner: bool,
    tracker: ProgressTracker,
    ctx: RunContext,
) -> (Option<tokio::task::JoinHandle<()>>, Arc<AtomicBool>) {
    if !use_spinner {
        return (None, Arc::new(AtomicBool::new(true)));
    }
    let stop = Arc::new(AtomicBool::new(false));
    let handle = spawn_spinner_inner(tracker, ctx, Arc::clone(&stop));
    (Some(handle), stop)
}

fn spawn_spinner_inner(
    tracker: ProgressTracker,
    ctx: RunContext,
    stop: Arc<AtomicBool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(100));

        while !stop.load(Ordering::SeqCst) {
            if let Ok(record) = tracker.poll(&ctx).await {
                spinner.set_message(progress_message(&record));
            }
            tokio::time::sleep(Duration::from_millis(120)).await;
        }

        spinner.finish_and_clear();
    })
}

fn progress_message(record: &ProgressRecord) -> String {
    let host = record
        .current_url
        .as_deref()
        .and_then(|url| Url::parse(url).ok())
        .and_then(|url| url.host_str().map(std::string::ToString::to_string))
        .unwrap_or_else(|| "document".to_string());
    format!(
        "[{}/{}] ok {} failed {} skipped {} - downloading from {}...",
        record.processed, record.total, record.success, record.failed, record.skipped, host
    )
}
