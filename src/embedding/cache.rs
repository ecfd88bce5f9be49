// SPDX-License-Identifier: MIT OR Apache-2.0

//! Whole-corpus embedding cache.
//!
//! Embeddings are reused only when the persisted entry was computed for the
//! same corpus fingerprint and the same model. Any other state, including an
//! unreadable entry, leads to a full recomputation which then replaces the
//! stored entry in one write.

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use crate::corpus::Corpus;
use crate::embedding::provider::{EmbeddingProvider, DEFAULT_BATCH_SIZE};
use crate::embedding::store::{CacheEntry, CacheStore};
use crate::errors::ModsimError;

/// Default key under which corpus embeddings are stored.
pub const DEFAULT_CACHE_KEY: &str = "embeddings";

/// Where the returned embeddings came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
    /// Served from a valid persisted entry.
    Hit,
    /// Computed by the provider and persisted.
    Computed,
    /// Empty corpus; nothing to compute or persist.
    Empty,
}

pub struct EmbeddingCache<S> {
    store: S,
    key: String,
    show_progress: bool,
}

impl<S: CacheStore> EmbeddingCache<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            key: DEFAULT_CACHE_KEY.to_string(),
            show_progress: false,
        }
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    /// Draw a per-batch progress bar on stderr while recomputing.
    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Returns one embedding per module, in corpus order.
    pub fn load_or_compute(
        &self,
        corpus: &Corpus,
        provider: &mut dyn EmbeddingProvider,
        force: bool,
    ) -> Result<Vec<Vec<f32>>> {
        self.load_or_compute_with_source(corpus, provider, force)
            .map(|(vectors, _)| vectors)
    }

    /// Like [`load_or_compute`](Self::load_or_compute), also reporting whether
    /// the cache was hit.
    pub fn load_or_compute_with_source(
        &self,
        corpus: &Corpus,
        provider: &mut dyn EmbeddingProvider,
        force: bool,
    ) -> Result<(Vec<Vec<f32>>, CacheSource)> {
        let model_id = provider.model_id().to_string();
        self.resolve(corpus, &model_id, force, |texts| {
            Ok((self.compute(texts, provider)?, model_id.clone()))
        })
    }

    /// Looks up embeddings for `model_id` and builds a provider only on a miss.
    ///
    /// `model_id` must be the id the built provider will report; the entry is
    /// stored under the id the provider actually reports.
    pub fn load_or_compute_lazy<F>(
        &self,
        corpus: &Corpus,
        model_id: &str,
        force: bool,
        make_provider: F,
    ) -> Result<(Vec<Vec<f32>>, CacheSource)>
    where
        F: FnOnce() -> Result<Box<dyn EmbeddingProvider>>,
    {
        self.resolve(corpus, model_id, force, |texts| {
            let mut provider = make_provider()?;
            if provider.model_id() != model_id {
                warn!(
                    "Provider reports model {} but {} was requested",
                    provider.model_id(),
                    model_id
                );
            }
            let vectors = self.compute(texts, provider.as_mut())?;
            Ok((vectors, provider.model_id().to_string()))
        })
    }

    fn resolve<F>(
        &self,
        corpus: &Corpus,
        model_id: &str,
        force: bool,
        compute: F,
    ) -> Result<(Vec<Vec<f32>>, CacheSource)>
    where
        F: FnOnce(&[String]) -> Result<(Vec<Vec<f32>>, String)>,
    {
        if corpus.is_empty() {
            return Ok((Vec::new(), CacheSource::Empty));
        }

        let fingerprint = corpus.fingerprint();

        if force {
            info!("Recomputation forced; ignoring cached embeddings");
        } else if let Some(vectors) = self.lookup(&fingerprint, model_id, corpus.len()) {
            info!("Using {} cached embeddings", vectors.len());
            return Ok((vectors, CacheSource::Hit));
        }

        info!("Computing new embeddings with {model_id}");
        let (vectors, computed_by) = compute(&corpus.texts())?;

        let entry = CacheEntry::new(fingerprint, computed_by, vectors);
        self.store.write(&self.key, &entry)?;
        debug!("Saved embeddings to cache key {}", self.key);

        Ok((entry.vectors, CacheSource::Computed))
    }

    /// Drops the persisted entry.
    pub fn invalidate(&self) -> Result<()> {
        self.store.remove(&self.key)
    }

    fn lookup(&self, fingerprint: &str, model_id: &str, corpus_len: usize) -> Option<Vec<Vec<f32>>> {
        let entry = match self.store.read(&self.key) {
            Ok(Some(entry)) => entry,
            Ok(None) => {
                debug!("No cached embeddings under key {}", self.key);
                return None;
            }
            Err(err) => {
                warn!("Ignoring unreadable embedding cache: {err:#}");
                return None;
            }
        };

        if entry.matches(fingerprint, model_id, corpus_len) {
            Some(entry.vectors)
        } else {
            debug!(
                "Cached embeddings are stale (model {}, {} modules)",
                entry.model_id, entry.count
            );
            None
        }
    }

    fn compute(
        &self,
        texts: &[String],
        provider: &mut dyn EmbeddingProvider,
    ) -> Result<Vec<Vec<f32>>> {
        let batch_size = match provider.batch_size() {
            0 => DEFAULT_BATCH_SIZE,
            n => n,
        };
        let batches = texts.len().div_ceil(batch_size);

        let pb = if self.show_progress {
            ProgressBar::new(batches as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) =
            ProgressStyle::default_bar().template("[{bar:40.cyan/blue}] {pos}/{len} batches | {msg}")
        {
            pb.set_style(style.progress_chars("##."));
        }
        pb.set_message("Computing embeddings");

        let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(texts.len());
        let mut dimension: Option<usize> = None;

        for batch in texts.chunks(batch_size) {
            let embedded = match provider.embed_texts(batch) {
                Ok(embedded) => embedded,
                Err(err) => {
                    pb.abandon();
                    return Err(err);
                }
            };
            if embedded.len() != batch.len() {
                pb.abandon();
                return Err(ModsimError::ProviderOutput {
                    expected: batch.len(),
                    actual: embedded.len(),
                }
                .into());
            }
            for vector in embedded {
                let expected = *dimension.get_or_insert(vector.len());
                if vector.len() != expected {
                    pb.abandon();
                    return Err(ModsimError::DimensionMismatch {
                        expected,
                        actual: vector.len(),
                    }
                    .into());
                }
                vectors.push(vector);
            }
            pb.inc(1);
        }

        pb.finish_and_clear();
        Ok(vectors)
    }
}
