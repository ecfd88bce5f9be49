// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote similarity search through the vector store

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::cli::{OutputFormat, TargetArgs};
use modsim::config::Config;
use modsim::output::{print_json, render_results, use_colors, RankingReport};
use modsim::remote::{SimilarityQueryAdapter, WeaviateClient};

/// Run the query command
pub fn run(
    config: &Config,
    input: Option<PathBuf>,
    target: TargetArgs,
    limit: Option<usize>,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let input = input.unwrap_or_else(|| config.corpus().dir());
    let corpus = super::load_corpus(&input)?;

    let target_index = super::resolve_target(&corpus, &target, config.search().target_prefix())?;
    let module = corpus
        .get(target_index)
        .context("Resolved target is outside the corpus")?;
    let limit = limit.unwrap_or_else(|| config.search().limit());

    let client = WeaviateClient::connect(config.remote())?;
    let results = SimilarityQueryAdapter::new(&client).query_similar(module, limit)?;

    match format {
        OutputFormat::Json => print_json(&RankingReport::new(module, &results), compact)?,
        OutputFormat::Text => print!("{}", render_results(module, &results, use_colors())),
    }

    Ok(())
}
