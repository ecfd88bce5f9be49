// SPDX-License-Identifier: MIT OR Apache-2.0

//! Import the corpus into the vector store

use anyhow::Result;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::OutputFormat;
use modsim::config::Config;
use modsim::output::{print_json, status};
use modsim::remote::{
    CollectionSchema, CollectionState, IngestOutcome, IngestionController, WeaviateClient,
};

/// Ingest result for JSON output
#[derive(Debug, Serialize)]
struct IngestReport<'a> {
    collection: &'a str,
    #[serde(flatten)]
    outcome: IngestOutcome,
    state: CollectionState,
}

/// Run the ingest command
pub fn run(
    config: &Config,
    input: Option<PathBuf>,
    reset: bool,
    format: OutputFormat,
    compact: bool,
) -> Result<()> {
    let input = input.unwrap_or_else(|| config.corpus().dir());
    let corpus = super::load_corpus(&input)?;

    let remote = config.remote();
    let client = WeaviateClient::connect(remote)?;
    let controller =
        IngestionController::new(&client, CollectionSchema::modules(remote.vectorizer()))
            .with_batch_size(remote.batch_size());

    controller.ensure_schema(reset)?;
    let outcome = controller.ingest(&corpus)?;
    let state = controller.probe()?;

    match format {
        OutputFormat::Json => print_json(
            &IngestReport {
                collection: remote.collection(),
                outcome,
                state,
            },
            compact,
        )?,
        OutputFormat::Text => {
            match outcome {
                IngestOutcome::Skipped => {
                    status("Collection already holds data; skipped import")
                }
                IngestOutcome::Imported { count } => {
                    status(&format!("Imported {} modules", count))
                }
            }
            println!("Collection {} is {}", remote.collection(), state);
        }
    }

    Ok(())
}
