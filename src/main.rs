//! # Learning Sync CLI (`lsync`)
//!
//! Scrapes a week of portal assignments and writes them to Notion.
//!
//! ## Usage
//!
//! ```bash
//! lsync [--config ./lsync.toml] [--verbose] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `lsync sync` | Scrape the week and create/update Notion pages |
//! | `lsync check` | Validate the Notion database and list class tags |
//! | `lsync parse-week <file>` | Parse a saved week fragment offline |
//! | `lsync login-url` | Print the portal's Google sign-in URL |
//!
//! Configuration is read from the optional TOML file and the environment
//! (see [`learning_sync::config`]).

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use learning_sync::config;
use learning_sync::inspect;
use learning_sync::sync::{run_sync, SyncOptions};

/// Learning Sync: copy a week of portal assignments into a Notion calendar.
#[derive(Parser)]
#[command(
    name = "lsync",
    about = "Scrape Learning portal assignments into a Notion calendar database",
    version
)]
struct Cli {
    /// Optional TOML configuration file. Environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log debug output to stderr.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape one week and create or update its assignments in Notion.
    ///
    /// Pages are matched on the assignment link. Any scrape or parse
    /// failure stops the run before Notion is written to.
    Sync {
        /// First day of the week to scrape (YYYY-MM-DD). Defaults to the
        /// portal's current week.
        #[arg(long, value_parser = parse_date)]
        start_date: Option<NaiveDate>,

        /// Show the create/update plan without writing to Notion.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check the Notion database schema and list its class tags.
    Check,

    /// Parse a saved week calendar fragment and print its assignments.
    ParseWeek {
        /// Path to the HTML fragment.
        path: PathBuf,
    },

    /// Print the URL that starts Google sign-in for the portal.
    LoginUrl,
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("invalid date '{}': {}", s, e))
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Commands that don't require config
    if let Commands::ParseWeek { path } = &cli.command {
        return inspect::run_parse_week(path);
    }

    let cfg = config::load_config(cli.config.as_deref()).context("Failed to load configuration")?;
    tracing::debug!(portal = ?cfg.portal, store = ?cfg.store, "configuration resolved");

    match cli.command {
        Commands::Sync {
            start_date,
            dry_run,
        } => {
            run_sync(
                &cfg,
                &SyncOptions {
                    start_date,
                    dry_run,
                },
            )
            .await?;
        }
        Commands::Check => {
            inspect::run_check(&cfg).await?;
        }
        Commands::LoginUrl => {
            println!("{}", cfg.portal.sign_in_url()?);
        }
        Commands::ParseWeek { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
