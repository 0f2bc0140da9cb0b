//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Ingest remote media referenced by content documents.
///
/// Downloads external images and videos into a local media directory and
/// rewrites the documents to point at the local copies.
#[derive(Parser, Debug)]
#[command(name = "media-ingest")]
#[command(author, version, about)]
pub struct Cli {
    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// SQLite database holding documents, assets and the failed-URL ledger
    #[arg(long, global = true, default_value = "media-ingest.db")]
    pub db: PathBuf,

    /// Directory downloaded media is written to (laid out as YYYY/MM/name)
    #[arg(long, global = true, default_value = "media")]
    pub media_dir: PathBuf,

    /// URL prefix under which the media directory is served
    #[arg(long, global = true, default_value = "/media")]
    pub media_base_url: String,

    /// Config file (defaults to $XDG_CONFIG_HOME/media-ingest/config.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Store a document read from FILE ("-" for stdin)
    Import {
        /// Document id
        id: String,
        /// Markup file
        file: PathBuf,
        /// Owner recorded on the document
        #[arg(long, default_value = "local")]
        owner: String,
    },

    /// Print a stored document
    Export {
        /// Document id
        id: String,
    },

    /// Download the media of one document and rewrite it
    Ingest(IngestArgs),

    /// Process documents sequentially (all documents when no ids are given)
    Bulk {
        /// Document ids, in processing order
        ids: Vec<String>,
    },

    /// Inspect or reset the failed-URL ledger
    Ledger {
        #[command(subcommand)]
        command: LedgerCommand,
    },
}

#[derive(Args, Debug, Clone)]
pub struct IngestArgs {
    /// Document id
    pub id: String,

    /// Owner of the run
    #[arg(long, default_value = "local")]
    pub owner: String,

    /// Run id (random when omitted)
    #[arg(long)]
    pub run_id: Option<String>,

    /// Maximum concurrent downloads (1-64)
    #[arg(short = 'c', long, value_parser = clap::value_parser!(u8).range(1..=64))]
    pub concurrency: Option<u8>,

    /// Maximum retries for transient failures (0-10)
    #[arg(short = 'r', long, value_parser = clap::value_parser!(u8).range(0..=10))]
    pub max_retries: Option<u8>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum LedgerCommand {
    /// List blacklisted URLs, most recent first
    List,
    /// Remove every entry
    Clear,
    /// Remove one URL so it is attempted again
    Remove {
        /// URL to remove
        url: String,
    },
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_ingest_defaults() {
        let cli = Cli::try_parse_from(["media-ingest", "ingest", "post-1"]).unwrap();
        assert_eq!(cli.verbose, 0);
        assert!(!cli.quiet);
        assert_eq!(cli.db, PathBuf::from("media-ingest.db"));
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.id, "post-1");
        assert_eq!(args.owner, "local");
        assert!(args.concurrency.is_none());
        assert!(args.max_retries.is_none());
    }

    #[test]
    fn test_cli_verbose_flag_increments_count() {
        let cli = Cli::try_parse_from(["media-ingest", "-vv", "ledger", "list"]).unwrap();
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn test_cli_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["media-ingest", "export", "post-1", "--db", "x.db", "-q"]).unwrap();
        assert_eq!(cli.db, PathBuf::from("x.db"));
        assert!(cli.quiet);
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        let err = Cli::try_parse_from(["media-ingest", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn test_cli_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["media-ingest"]).is_err());
    }

    #[test]
    fn test_cli_concurrency_range_enforced() {
        let err = Cli::try_parse_from(["media-ingest", "ingest", "p", "-c", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let err = Cli::try_parse_from(["media-ingest", "ingest", "p", "-c", "65"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_cli_max_retries_over_limit_rejected() {
        let err = Cli::try_parse_from(["media-ingest", "ingest", "p", "-r", "11"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
        let cli = Cli::try_parse_from(["media-ingest", "ingest", "p", "-r", "0"]).unwrap();
        let Command::Ingest(args) = cli.command else {
            panic!("expected ingest");
        };
        assert_eq!(args.max_retries, Some(0));
    }

    #[test]
    fn test_cli_ledger_remove_takes_url() {
        let cli = Cli::try_parse_from(["media-ingest", "ledger", "remove", "https://ext.example/a.jpg"]).unwrap();
        let Command::Ledger {
            command: LedgerCommand::Remove { url },
        } = cli.command
        else {
            panic!("expected ledger remove");
        };
        assert_eq!(url, "https://ext.example/a.jpg");
    }

    #[test]
    fn test_cli_bulk_accepts_no_ids() {
        let cli = Cli::try_parse_from(["media-ingest", "bulk"]).unwrap();
        assert!(matches!(cli.command, Command::Bulk { ids } if ids.is_empty()));
    }
}
