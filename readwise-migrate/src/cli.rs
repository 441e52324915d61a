/// CLI glue for readwise-migrate: argument parsing, client wiring and the
/// user-visible outcome of a run.
///
/// All migration logic (fetching, transforming, uploading, caching) lives in
/// [`readwise-migrate-core`]. This module only turns a parsed [`Cli`] into a
/// call to `synchronise` and decides whether the run counts as a failure.
///
/// [`readwise-migrate-core`]: ../../readwise_migrate_core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use readwise_migrate_core::client::ReadwiseClient;
use readwise_migrate_core::contract::ReadwiseApi;
use readwise_migrate_core::synchronise::synchronise;
use std::path::PathBuf;

/// Copy Readwise highlights and Reader documents from one account to another.
#[derive(Parser)]
#[clap(
    name = "readwise-migrate",
    version,
    about = "Copy Readwise highlights and Reader documents from one account to another"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch everything from the source account and upload it to the target account
    Sync {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Upload from the cache files of a previous run instead of fetching
        #[clap(long)]
        from_cache: bool,
    },
}

/// Async CLI entrypoint for integration tests and main().
///
/// Returns an error when the config is unusable, when a cache file cannot be
/// read or written, or when the migration finished with anything lost.
pub async fn run(cli: Cli) -> Result<()> {
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Sync { config, from_cache } => {
            let config = load_config(config, from_cache)?;
            tracing::info!(command = "sync", "Starting migration");

            let target = ReadwiseClient::new(&config.base_url, config.target_token.clone())
                .context("Failed to build target account client")?;
            let source = match &config.source_token {
                Some(token) if !config.sync.upload_from_file => Some(
                    ReadwiseClient::new(&config.base_url, token.clone())
                        .context("Failed to build source account client")?,
                ),
                _ => None,
            };

            let report = synchronise(
                &config.sync,
                source.as_ref().map(|c| c as &dyn ReadwiseApi),
                &target,
            )
            .await
            .map_err(|e| {
                tracing::error!(command = "sync", error = %e, "Migration failed");
                anyhow::Error::new(e)
            })?;

            println!("Migration finished.\nReport:");
            println!("{:#?}", report);

            if report.is_complete() {
                tracing::info!(command = "sync", "Migration complete");
                Ok(())
            } else {
                tracing::error!(command = "sync", "Migration incomplete, see report");
                anyhow::bail!("migration did not complete: some records were not transferred")
            }
        }
    }
}
