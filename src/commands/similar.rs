// SPDX-License-Identifier: MIT OR Apache-2.0

//! Local similarity search over cached embeddings

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;

use crate::cli::{OutputFormat, TargetArgs};
use modsim::config::Config;
use modsim::embedding::{
    build_provider, resolve_model_id, ArchiveCacheStore, CacheSource, EmbeddingCache,
};
use modsim::output::{print_json, render_results, status, use_colors, RankingReport};
use modsim::similarity::{find_similar, validate_threshold};

/// Options of the `similar` subcommand
#[derive(Debug, Default)]
pub struct SimilarOptions {
    pub input: Option<PathBuf>,
    pub cache_dir: Option<PathBuf>,
    pub force_recompute: bool,
    pub target: TargetArgs,
    pub threshold: Option<f32>,
    pub limit: Option<usize>,
}

/// Run the similar command
pub fn run(config: &Config, options: SimilarOptions, format: OutputFormat, compact: bool) -> Result<()> {
    let threshold = validate_threshold(
        options
            .threshold
            .unwrap_or_else(|| config.search().threshold()),
    )?;
    let input = options.input.unwrap_or_else(|| config.corpus().dir());
    let corpus = super::load_corpus(&input)?;

    let target_index =
        super::resolve_target(&corpus, &options.target, config.search().target_prefix())?;
    let target = corpus
        .get(target_index)
        .context("Resolved target is outside the corpus")?;
    debug!("Target module {} at index {}", target.module_id, target_index);

    let model_id = resolve_model_id(config.embeddings())?;
    let cache_dir = options.cache_dir.unwrap_or_else(|| config.cache().dir());
    let cache = EmbeddingCache::new(ArchiveCacheStore::new(&cache_dir))
        .with_key(config.cache().name())
        .with_progress(config.cache().progress());

    let (embeddings, source) = cache
        .load_or_compute_lazy(&corpus, &model_id, options.force_recompute, || {
            build_provider(config.embeddings())
        })
        .with_context(|| format!("Failed to embed corpus from {}", input.display()))?;
    match source {
        CacheSource::Hit => status("Using cached embeddings"),
        CacheSource::Computed => status(&format!(
            "Computed new embeddings for {} modules",
            embeddings.len()
        )),
        CacheSource::Empty => {}
    }

    let limit = options.limit.unwrap_or_else(|| config.search().limit());

    let mut results = find_similar(target_index, &embeddings, &corpus, threshold)?;
    results.truncate(limit);

    match format {
        OutputFormat::Json => print_json(&RankingReport::new(target, &results), compact)?,
        OutputFormat::Text => print!("{}", render_results(target, &results, use_colors())),
    }

    Ok(())
}
