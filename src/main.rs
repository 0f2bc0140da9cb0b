//! CLI entry point for media-ingest.

use anyhow::Result;
use clap::Parser;
use tracing::debug;

mod app;
mod cli;

use app::context::AppContext;
use app::{commands, terminal};
use cli::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    terminal::init_tracing(terminal::default_level(cli.quiet, cli.verbose));
    debug!(?cli, "CLI arguments parsed");

    let app = AppContext::open(&cli).await?;

    let result = match &cli.command {
        Command::Import { id, file, owner } => commands::run_import(&app, id, file, owner).await,
        Command::Export { id } => commands::run_export(&app, id).await,
        Command::Ingest(args) => commands::run_ingest(&app, args, cli.quiet).await,
        Command::Bulk { ids } => commands::run_bulk(&app, ids).await,
        Command::Ledger { command } => commands::run_ledger(&app, command).await,
    };

    app.db.close().await;
    result
}
