// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding module - computes and caches module embeddings
//!
//! Providers turn module texts into vectors; the cache keeps the vectors of a
//! whole corpus on disk and reuses them while corpus and model are unchanged.

pub mod cache;
pub mod provider;
pub mod store;

pub use cache::{CacheSource, EmbeddingCache, DEFAULT_CACHE_KEY};
pub use provider::{
    build_provider, resolve_model_id, CommandProvider, DummyProvider, EmbeddingProvider,
    EmbeddingProviderConfig, FastEmbedder,
};
pub use store::{ArchiveCacheStore, CacheEntry, CacheMetadata, CacheStore, MemoryCacheStore};
