// SPDX-License-Identifier: MIT OR Apache-2.0

//! CLI argument parsing using clap

use clap::{Args, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

/// modsim - Learning module similarity tool
///
/// Embeds a corpus of learning modules and lists the modules most similar to
/// a target, either locally with cached embeddings or through a vector store.
#[derive(Parser, Debug)]
#[command(name = "modsim")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Compact JSON output (no pretty formatting)
    #[arg(long, global = true)]
    pub compact: bool,

    /// Read configuration from this file instead of .modsimrc.toml
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for results
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Selects the target module
#[derive(Args, Debug, Clone, Default)]
pub struct TargetArgs {
    /// Title prefix of the target module
    #[arg(short, long, conflicts_with = "module_id")]
    pub target: Option<String>,

    /// Exact module_id of the target module
    #[arg(long)]
    pub module_id: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank modules by cosine similarity using locally cached embeddings
    Similar {
        /// Directory of module JSON files
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Directory for the embedding cache
        #[arg(long)]
        cache_dir: Option<PathBuf>,

        /// Recompute embeddings even when the cache is valid
        #[arg(short, long)]
        force_recompute: bool,

        #[command(flatten)]
        target: TargetArgs,

        /// Minimum cosine similarity
        #[arg(long, allow_negative_numbers = true)]
        threshold: Option<f32>,

        /// Maximum number of results to print
        #[arg(short = 'm', long)]
        limit: Option<usize>,
    },

    /// Import the corpus into the vector store (at most once)
    Ingest {
        /// Directory of module JSON files
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Drop and recreate the collection before importing
        #[arg(long)]
        reset: bool,
    },

    /// Rank modules by vector-store distance
    Query {
        /// Directory of module JSON files
        #[arg(short, long)]
        input: Option<PathBuf>,

        #[command(flatten)]
        target: TargetArgs,

        /// Maximum number of results to print
        #[arg(short = 'm', long)]
        limit: Option<usize>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_similar_flags() {
        let cli = Cli::parse_from([
            "modsim",
            "--format",
            "json",
            "similar",
            "--force-recompute",
            "--target",
            "Intro",
            "--threshold",
            "0.4",
        ]);
        assert_eq!(cli.format, OutputFormat::Json);
        match cli.command {
            Commands::Similar {
                force_recompute,
                target,
                threshold,
                ..
            } => {
                assert!(force_recompute);
                assert_eq!(target.target.as_deref(), Some("Intro"));
                assert_eq!(threshold, Some(0.4));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_target_and_module_id_conflict() {
        let result = Cli::try_parse_from([
            "modsim",
            "query",
            "--target",
            "Intro",
            "--module-id",
            "m1",
        ]);
        assert!(result.is_err());
    }
}
