//! # notion-mirror CLI interface
//! This module implements the CLI interface for notion-mirror: command parsing,
//! argument validation, and the async entrypoint shared by `main` and the tests.
//!
//! All sync logic lives in the [`notion-mirror-core`] crate. This module wires the
//! concrete Notion and GitHub clients into it.
//!
//! ## Subcommands
//! - `sync --config <file> [--dry-run]`: mirror the configured containers and pages.
//! - `analyze --config <file>`: report which properties suit categorization.
//!
//! [`notion-mirror-core`]: ../../notion-mirror-core/
use crate::analyze::{analyze_containers, render_report};
use crate::github::GitHubClient;
use crate::load_config::load_config;
use crate::notion::NotionClient;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use notion_mirror_core::commit::CommitOutcome;
use notion_mirror_core::synchronise::synchronise;
use std::path::PathBuf;
use std::time::Duration;

/// Per-request HTTP timeout.
pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// CLI for notion-mirror: mirror Notion databases and pages into a GitHub repository.
#[derive(Parser)]
#[clap(
    name = "notion-mirror",
    version,
    about = "Mirror Notion databases and pages into a GitHub repository as markdown"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Synchronize the configured Notion content into the destination repository
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Compute changes without publishing, deleting, or saving the ledger
        #[clap(long)]
        dry_run: bool,
    },
    /// Suggest category properties for the configured databases
    Analyze {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, dry_run } => {
            let config = load_config(config)?;
            let options = config.sync_options(dry_run);
            options.trace_loaded();
            tracing::info!(command = "sync", "Starting synchronisation process");

            let source = NotionClient::new(&config.secrets.notion_api_key, HTTP_TIMEOUT)
                .context("Failed to construct Notion client")?;
            let store = GitHubClient::connect(
                &config.destination.owner,
                &config.destination.repo,
                config.destination.branch.as_deref(),
                &config.secrets.github_token,
                HTTP_TIMEOUT,
            )
            .await
            .context("GitHub repository preflight failed")?;

            match synchronise(&source, &store, &options).await {
                Ok(report) => {
                    let mode = match &report.commit {
                        CommitOutcome::Nothing => "nothing",
                        CommitOutcome::Atomic { .. } => "atomic",
                        CommitOutcome::PerFile { .. } => "per_file",
                    };
                    tracing::info!(
                        command = "sync",
                        published = report.published(),
                        mode,
                        failed = report.failed_documents.len(),
                        "Synchronisation complete"
                    );
                    println!(
                        "Synchronisation complete: {} of {} changed documents published ({mode}), {} failed, {} moved",
                        report.published(),
                        report.candidates,
                        report.failed_documents.len(),
                        report.moves.len()
                    );
                    Ok(())
                }
                Err(e) => {
                    tracing::error!(command = "sync", error = %e, "Synchronisation failed");
                    Err(e.into())
                }
            }
        }
        Commands::Analyze { config } => {
            let config = load_config(config)?;
            let options = config.sync_options(true);
            tracing::info!(command = "analyze", containers = options.containers.len(), "Starting analysis");
            let source = NotionClient::new(&config.secrets.notion_api_key, HTTP_TIMEOUT)
                .context("Failed to construct Notion client")?;
            let analyses = analyze_containers(&source, &options.containers, &options.retry).await;
            print!("{}", render_report(&analyses)?);
            Ok(())
        }
    }
}
