// SPDX-License-Identifier: MIT OR Apache-2.0

//! Subcommand runners

pub mod ingest;
pub mod query;
pub mod similar;

use anyhow::Result;
use std::path::Path;

use crate::cli::TargetArgs;
use modsim::corpus::Corpus;
use modsim::output::status;

/// Load the corpus and report its size
fn load_corpus(dir: &Path) -> Result<Corpus> {
    let corpus = Corpus::load_dir(dir)?;
    status(&format!(
        "Loaded {} modules from {}",
        corpus.len(),
        dir.display()
    ));
    Ok(corpus)
}

/// Resolve the target module: explicit id, then explicit prefix, then the configured prefix
fn resolve_target(corpus: &Corpus, args: &TargetArgs, default_prefix: &str) -> Result<usize> {
    match (&args.module_id, &args.target) {
        (Some(id), _) => corpus.find_by_id(id),
        (None, Some(prefix)) => corpus.find_by_title_prefix(prefix),
        (None, None) => corpus.find_by_title_prefix(default_prefix),
    }
}
