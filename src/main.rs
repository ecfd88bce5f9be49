// SPDX-License-Identifier: MIT OR Apache-2.0

//! modsim - Learning module similarity tool
//!
//! Ranks learning modules by semantic similarity, either from locally cached
//! embeddings or through a remote vector store.

mod cli;
mod commands;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use clap_complete::generate;
use cli::{Cli, Commands};
use modsim::config::Config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    // Initialize tracing with MODSIM_LOG env var (e.g., MODSIM_LOG=debug modsim similar)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("MODSIM_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let format = cli.format;
    let compact = cli.compact;
    let config = match cli.config.as_deref() {
        Some(path) => Config::load_explicit(path),
        None => Config::load(),
    };

    match cli.command {
        Commands::Similar {
            input,
            cache_dir,
            force_recompute,
            target,
            threshold,
            limit,
        } => {
            let options = commands::similar::SimilarOptions {
                input,
                cache_dir,
                force_recompute,
                target,
                threshold,
                limit,
            };
            commands::similar::run(&config, options, format, compact)?;
        }
        Commands::Ingest { input, reset } => {
            commands::ingest::run(&config, input, reset, format, compact)?;
        }
        Commands::Query {
            input,
            target,
            limit,
        } => {
            commands::query::run(&config, input, target, limit, format, compact)?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            generate(shell, &mut cmd, "modsim", &mut std::io::stdout());
        }
    }

    Ok(())
}
