// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error taxonomy shared by the local and remote pipelines.
//!
//! Library functions return `anyhow::Result`; these variants travel inside the
//! `anyhow::Error` so callers can `downcast_ref::<ModsimError>()` when they need
//! to branch on the failure kind.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModsimError {
    /// The corpus directory or one of its files could not be read.
    #[error("failed to load corpus from {path}: {reason}")]
    CorpusLoad { path: PathBuf, reason: String },

    /// A record in a corpus file is missing a field or has the wrong shape.
    #[error("malformed module record at {path}[{position}]: {reason}")]
    MalformedModule {
        path: PathBuf,
        position: usize,
        reason: String,
    },

    /// No module matched the requested lookup.
    #[error("no module found matching {0}")]
    ModuleNotFound(String),

    /// The target index does not address a module of the corpus.
    #[error("target index {index} out of range for corpus of {len} modules")]
    InvalidTarget { index: usize, len: usize },

    /// A similarity threshold outside the cosine range or not a number.
    #[error("threshold {0} must be a number between -1 and 1")]
    InvalidThreshold(f32),

    /// Embeddings and corpus disagree on their length.
    #[error("{embeddings} embeddings for {modules} modules")]
    LengthMismatch { embeddings: usize, modules: usize },

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider returned an unusable batch.
    #[error("embedding provider returned {actual} vectors for a batch of {expected}")]
    ProviderOutput { expected: usize, actual: usize },

    /// The remote collection could not be probed, created or reset.
    #[error("vector store setup failed: {0}")]
    SchemaSetup(String),

    /// Writing modules to the remote collection failed.
    #[error("ingestion failed: {0}")]
    Ingestion(String),

    /// The remote store answered with an error or an unexpected payload.
    #[error("vector store error: {0}")]
    Store(String),
}
