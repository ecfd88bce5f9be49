// SPDX-License-Identifier: MIT OR Apache-2.0

//! Remote vector-store backend
//!
//! Modules are imported once into a server-side collection which then answers
//! near-text queries. Ranking happens on the server; scores come back as
//! distances.

pub mod client;
pub mod ingest;
pub mod query;

pub use client::{
    BatchReport, CollectionSchema, NearTextHit, StoredObject, VectorStore, WeaviateClient,
    MODULE_PROPERTIES,
};
pub use ingest::{CollectionState, IngestOutcome, IngestionController};
pub use query::{SimilarityQueryAdapter, DEFAULT_QUERY_LIMIT};
