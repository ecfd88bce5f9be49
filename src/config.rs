// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration file support for modsim
//!
//! Loads configuration from .modsimrc.toml in current directory or ~/.config/modsim/config.toml

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::embedding::provider::{DEFAULT_BATCH_SIZE, MPNET_MODEL_ID};
use crate::similarity::DEFAULT_THRESHOLD;

/// Config file name looked up in the current directory
pub const CONFIG_FILE: &str = ".modsimrc.toml";

/// Embedding provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderType {
    #[default]
    Builtin,
    Command,
    Dummy,
}

/// Corpus configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CorpusConfig {
    /// Directory holding the module JSON files
    pub dir: Option<PathBuf>,
}

impl CorpusConfig {
    /// Get corpus directory (defaults to "input")
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("input"))
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Provider type (builtin, command, dummy)
    pub provider: Option<EmbeddingProviderType>,
    /// Model identifier for the embedding provider
    pub model: Option<String>,
    /// Command to execute for command provider
    pub command: Option<String>,
    /// Number of texts per provider call
    pub batch_size: Option<usize>,
    /// Vector dimension of the dummy provider
    pub dimension: Option<usize>,
}

impl EmbeddingConfig {
    /// Get provider type (defaults to Builtin)
    pub fn provider(&self) -> EmbeddingProviderType {
        self.provider.unwrap_or_default()
    }

    /// Get model identifier (defaults to all-mpnet-base-v2)
    pub fn model(&self) -> &str {
        self.model.as_deref().unwrap_or(MPNET_MODEL_ID)
    }

    /// Get command (defaults to "embedder")
    pub fn command(&self) -> &str {
        self.command.as_deref().unwrap_or("embedder")
    }

    /// Get batch size (defaults to 32)
    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|&n| n > 0).unwrap_or(DEFAULT_BATCH_SIZE)
    }

    /// Get dummy dimension (defaults to 384)
    pub fn dimension(&self) -> usize {
        self.dimension.unwrap_or(384)
    }
}

/// Embedding cache configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Directory for cache artifacts
    pub dir: Option<PathBuf>,
    /// Base name of the cache artifacts
    pub name: Option<String>,
    /// Whether to draw a progress bar while embedding
    pub progress: Option<bool>,
}

impl CacheConfig {
    /// Get cache directory (defaults to "cache")
    pub fn dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| PathBuf::from("cache"))
    }

    /// Get cache key (defaults to "embeddings")
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("embeddings")
    }

    /// Get progress setting (defaults to true)
    pub fn progress(&self) -> bool {
        self.progress.unwrap_or(true)
    }
}

/// Similarity search configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Minimum cosine similarity for local results
    pub threshold: Option<f32>,
    /// Number of results to print
    pub limit: Option<usize>,
    /// Title prefix selecting the target module
    pub target_prefix: Option<String>,
}

impl SearchConfig {
    /// Get threshold (defaults to 0.6)
    pub fn threshold(&self) -> f32 {
        self.threshold.unwrap_or(DEFAULT_THRESHOLD)
    }

    /// Get result limit (defaults to 5)
    pub fn limit(&self) -> usize {
        self.limit.unwrap_or(5)
    }

    /// Get target title prefix (defaults to "Parallel Programming")
    pub fn target_prefix(&self) -> &str {
        self.target_prefix
            .as_deref()
            .unwrap_or("Parallel Programming")
    }
}

/// Remote vector store configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// Base URL of the vector store
    pub url: Option<String>,
    /// Collection (class) name
    pub collection: Option<String>,
    /// Server-side vectorizer module for the collection
    pub vectorizer: Option<String>,
    /// Objects per import request
    pub batch_size: Option<usize>,
    /// Request timeout in seconds
    pub timeout_secs: Option<u64>,
    /// API key; WEAVIATE_API_KEY takes precedence
    pub api_key: Option<String>,
}

impl RemoteConfig {
    /// Get URL (defaults to http://localhost:8080)
    pub fn url(&self) -> &str {
        self.url.as_deref().unwrap_or("http://localhost:8080")
    }

    /// Get collection name (defaults to "Module")
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or("Module")
    }

    /// Get vectorizer (defaults to "text2vec-transformers")
    pub fn vectorizer(&self) -> &str {
        self.vectorizer
            .as_deref()
            .unwrap_or("text2vec-transformers")
    }

    /// Get import batch size (defaults to 100)
    pub fn batch_size(&self) -> usize {
        self.batch_size.filter(|&n| n > 0).unwrap_or(100)
    }

    /// Get timeout (defaults to 30 seconds)
    pub fn timeout_secs(&self) -> u64 {
        self.timeout_secs.unwrap_or(30)
    }

    /// Get API key from environment or config
    pub fn api_key(&self) -> Option<String> {
        std::env::var("WEAVIATE_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
            .or_else(|| self.api_key.clone())
    }
}

/// Configuration loaded from .modsimrc.toml or ~/.config/modsim/config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Corpus configuration
    pub corpus: CorpusConfig,

    /// Embedding configuration
    pub embeddings: EmbeddingConfig,

    /// Cache configuration
    pub cache: CacheConfig,

    /// Search configuration
    pub search: SearchConfig,

    /// Remote store configuration
    pub remote: RemoteConfig,
}

impl Config {
    /// Load configuration from files
    ///
    /// Precedence (highest to lowest):
    /// 1. .modsimrc.toml in current directory
    /// 2. ~/.config/modsim/config.toml
    pub fn load() -> Self {
        if let Some(config) = Self::load_from_path(Path::new(CONFIG_FILE)) {
            return config;
        }

        if let Some(home) = dirs::home_dir() {
            let config_path = home.join(".config").join("modsim").join("config.toml");
            if let Some(config) = Self::load_from_path(&config_path) {
                return config;
            }
        }

        Self::default()
    }

    /// Load configuration from an explicit path, falling back to defaults
    pub fn load_explicit(path: &Path) -> Self {
        Self::load_from_path(path).unwrap_or_default()
    }

    fn load_from_path(path: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&content) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }

    /// Get the corpus configuration
    pub fn corpus(&self) -> &CorpusConfig {
        &self.corpus
    }

    /// Get the embedding configuration
    pub fn embeddings(&self) -> &EmbeddingConfig {
        &self.embeddings
    }

    /// Get the cache configuration
    pub fn cache(&self) -> &CacheConfig {
        &self.cache
    }

    /// Get the search configuration
    pub fn search(&self) -> &SearchConfig {
        &self.search
    }

    /// Get the remote store configuration
    pub fn remote(&self) -> &RemoteConfig {
        &self.remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.corpus().dir(), PathBuf::from("input"));
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Builtin);
        assert_eq!(config.embeddings().model(), MPNET_MODEL_ID);
        assert_eq!(config.embeddings().batch_size(), 32);
        assert_eq!(config.cache().name(), "embeddings");
        assert!((config.search().threshold() - 0.6).abs() < f32::EPSILON);
        assert_eq!(config.search().limit(), 5);
        assert_eq!(config.remote().collection(), "Module");
    }

    #[test]
    fn test_parse_sections() {
        let config: Config = toml::from_str(
            r#"
[corpus]
dir = "modules"

[embeddings]
provider = "dummy"
batch_size = 0
dimension = 8

[search]
threshold = 0.25
target_prefix = "Intro"

[remote]
url = "http://weaviate:8080"
batch_size = 50
"#,
        )
        .unwrap();

        assert_eq!(config.corpus().dir(), PathBuf::from("modules"));
        assert_eq!(config.embeddings().provider(), EmbeddingProviderType::Dummy);
        assert_eq!(config.embeddings().batch_size(), 32);
        assert_eq!(config.embeddings().dimension(), 8);
        assert!((config.search().threshold() - 0.25).abs() < f32::EPSILON);
        assert_eq!(config.search().target_prefix(), "Intro");
        assert_eq!(config.remote().url(), "http://weaviate:8080");
        assert_eq!(config.remote().batch_size(), 50);
    }

    #[test]
    fn test_load_explicit_falls_back_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.toml");
        std::fs::write(&path, "[search\nthreshold = ").unwrap();

        let config = Config::load_explicit(&path);
        assert_eq!(config.search().limit(), 5);
    }
}
