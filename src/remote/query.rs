// SPDX-License-Identifier: MIT OR Apache-2.0

//! Nearest-neighbour queries against the remote collection.

use anyhow::Result;
use tracing::debug;

use super::client::VectorStore;
use crate::corpus::Module;
use crate::similarity::{Score, SimilarityResult};

pub const DEFAULT_QUERY_LIMIT: usize = 5;

/// Turns a module into a near-text query and the hits into ranked results.
///
/// Results carry [`Score::Distance`]: smaller is closer, and they are never
/// mixed with the cosine scores of the local path.
pub struct SimilarityQueryAdapter<'a, S: VectorStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: VectorStore + ?Sized> SimilarityQueryAdapter<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Up to `limit` modules nearest to `module`, excluding the module itself.
    pub fn query_similar(&self, module: &Module, limit: usize) -> Result<Vec<SimilarityResult>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        // One extra hit covers the query module matching itself.
        let hits = self
            .store
            .near_text(&module.embedding_text(), limit + 1)?;
        debug!("near_text returned {} hits for {}", hits.len(), module.module_id);

        Ok(hits
            .into_iter()
            .filter(|hit| hit.module_id != module.module_id)
            .take(limit)
            .map(|hit| SimilarityResult {
                module_id: hit.module_id,
                title: hit.title,
                score: Score::Distance(hit.distance),
            })
            .collect())
    }
}
