// SPDX-License-Identifier: MIT OR Apache-2.0

//! Similarity ranking over in-memory embeddings.
//!
//! Scores carry their scale: local results are cosine similarities (larger is
//! closer) while remote results are raw distances (smaller is closer). The two
//! kinds are never ordered against each other.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

use crate::corpus::Corpus;
use crate::errors::ModsimError;

/// Default minimum similarity for local results.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

/// A score together with the scale it was measured on.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum Score {
    /// Cosine similarity in [-1, 1]; larger is closer.
    Cosine(f32),
    /// Vector-store distance; smaller is closer.
    Distance(f32),
}

impl Score {
    pub fn value(&self) -> f32 {
        match self {
            Score::Cosine(v) | Score::Distance(v) => *v,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Score::Cosine(_) => "Similarity",
            Score::Distance(_) => "Distance",
        }
    }

    /// Orders two scores best-first. `None` when the scales differ.
    pub fn rank_cmp(&self, other: &Score) -> Option<Ordering> {
        match (self, other) {
            (Score::Cosine(a), Score::Cosine(b)) => Some(b.total_cmp(a)),
            (Score::Distance(a), Score::Distance(b)) => Some(a.total_cmp(b)),
            _ => None,
        }
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:.2}", self.label(), self.value())
    }
}

/// A ranked neighbour of the target module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityResult {
    pub module_id: String,
    pub title: String,
    pub score: Score,
}

/// Computes cosine similarity between two vectors.
///
/// Zero-norm vectors and dimension mismatches score 0 so NaN never reaches a
/// comparison.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let magnitude_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let magnitude_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if magnitude_a == 0.0 || magnitude_b == 0.0 {
        return 0.0;
    }

    let similarity = dot_product / (magnitude_a * magnitude_b);
    if similarity.is_finite() {
        similarity
    } else {
        0.0
    }
}

/// Accepts thresholds inside the cosine range [-1, 1].
pub fn validate_threshold(threshold: f32) -> Result<f32> {
    if (-1.0..=1.0).contains(&threshold) {
        Ok(threshold)
    } else {
        Err(ModsimError::InvalidThreshold(threshold).into())
    }
}

/// Modules whose embedding is at least `threshold` similar to the target's.
///
/// The target itself is excluded. Results are sorted by descending similarity;
/// equal scores keep corpus order.
pub fn find_similar(
    target_index: usize,
    embeddings: &[Vec<f32>],
    corpus: &Corpus,
    threshold: f32,
) -> Result<Vec<SimilarityResult>> {
    let threshold = validate_threshold(threshold)?;
    if embeddings.len() != corpus.len() {
        return Err(ModsimError::LengthMismatch {
            embeddings: embeddings.len(),
            modules: corpus.len(),
        }
        .into());
    }
    let target = embeddings
        .get(target_index)
        .ok_or(ModsimError::InvalidTarget {
            index: target_index,
            len: embeddings.len(),
        })?;

    let mut scored: Vec<(usize, f32)> = embeddings
        .iter()
        .enumerate()
        .filter(|(idx, _)| *idx != target_index)
        .map(|(idx, vector)| (idx, cosine_similarity(target, vector)))
        .filter(|(_, score)| *score >= threshold)
        .collect();

    // Stable sort: ties stay in ascending index order.
    scored.sort_by(|a, b| b.1.total_cmp(&a.1));

    Ok(scored
        .into_iter()
        .filter_map(|(idx, score)| {
            corpus.get(idx).map(|module| SimilarityResult {
                module_id: module.module_id.clone(),
                title: module.title.clone(),
                score: Score::Cosine(score),
            })
        })
        .collect())
}
