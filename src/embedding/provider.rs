// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding provider interface and implementations.
//!
//! Providers are treated as opaque `texts -> vectors` functions. The builtin
//! provider runs sentence-transformers models on CPU through fastembed.

use anyhow::{bail, Context, Result};
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::env;
use std::io::Write;
use std::process::{Command, Stdio};
use tracing::{debug, warn};

use crate::config::{EmbeddingConfig, EmbeddingProviderType};

pub const MPNET_MODEL_ID: &str = "sentence-transformers/all-mpnet-base-v2";
pub const MINILM_MODEL_ID: &str = "sentence-transformers/all-MiniLM-L6-v2";

pub const DEFAULT_BATCH_SIZE: usize = 32;
const MAX_BATCH_SIZE: usize = 1024;
const DEFAULT_MAX_CHARS: usize = 2000;
const DUMMY_MODEL_ID: &str = "dummy";

/// Configuration for the builtin fastembed provider.
#[derive(Debug, Clone)]
pub struct EmbeddingProviderConfig {
    pub model: EmbeddingModel,
    pub model_id: String,
    pub batch_size: usize,
    pub max_chars: usize,
    pub normalize: bool,
}

impl EmbeddingProviderConfig {
    /// Builds the provider config from the `[embeddings]` section, letting the
    /// `FASTEMBED_*` environment variables override it.
    pub fn from_config(config: &EmbeddingConfig) -> Result<Self> {
        let requested = env_or("FASTEMBED_MODEL", config.model().to_string(), |v| {
            Some(v.to_string())
        })?;
        let (model, model_id) = parse_model(&requested)?;

        let requested_batch = env_or("FASTEMBED_BATCH_SIZE", config.batch_size(), |v| {
            v.parse().ok()
        })?;
        let batch_size = match requested_batch {
            0 => DEFAULT_BATCH_SIZE,
            n if n > MAX_BATCH_SIZE => {
                warn!("Batch size {n} exceeds max {MAX_BATCH_SIZE}; clamping");
                MAX_BATCH_SIZE
            }
            n => n,
        };

        let max_chars = match env_or("FASTEMBED_MAX_CHARS", DEFAULT_MAX_CHARS, |v| v.parse().ok())? {
            0 => DEFAULT_MAX_CHARS,
            n => n,
        };

        Ok(Self {
            model,
            model_id,
            batch_size,
            max_chars,
            normalize: env_or("FASTEMBED_NORMALIZE", true, parse_flag)?,
        })
    }
}

impl Default for EmbeddingProviderConfig {
    fn default() -> Self {
        Self {
            model: EmbeddingModel::AllMpnetBaseV2,
            model_id: MPNET_MODEL_ID.to_string(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_chars: DEFAULT_MAX_CHARS,
            normalize: true,
        }
    }
}

/// Trait for embedding providers.
pub trait EmbeddingProvider: Send {
    /// Returns the model identifier. Cached embeddings are keyed by it.
    fn model_id(&self) -> &str;

    /// Returns the batch size used by the provider.
    fn batch_size(&self) -> usize;

    /// Generates one embedding per text, in input order.
    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates an embedding for a single text.
    fn embed_one(&mut self, text: &str) -> Result<Vec<f32>> {
        let mut result = self.embed_texts(&[text.to_string()])?;
        result
            .pop()
            .ok_or_else(|| anyhow::anyhow!("No embedding returned"))
    }
}

/// Model id the configured provider reports, resolved without loading a model.
pub fn resolve_model_id(config: &EmbeddingConfig) -> Result<String> {
    Ok(match config.provider() {
        EmbeddingProviderType::Builtin => EmbeddingProviderConfig::from_config(config)?.model_id,
        EmbeddingProviderType::Command => config.model().to_string(),
        EmbeddingProviderType::Dummy => DUMMY_MODEL_ID.to_string(),
    })
}

/// Builds the provider selected by the `[embeddings]` configuration.
pub fn build_provider(config: &EmbeddingConfig) -> Result<Box<dyn EmbeddingProvider>> {
    let provider: Box<dyn EmbeddingProvider> = match config.provider() {
        EmbeddingProviderType::Builtin => {
            let provider_config = EmbeddingProviderConfig::from_config(config)?;
            Box::new(FastEmbedder::new(provider_config)?)
        }
        EmbeddingProviderType::Command => Box::new(
            CommandProvider::new(config.command().to_string(), config.model().to_string())
                .with_batch_size(config.batch_size()),
        ),
        EmbeddingProviderType::Dummy => Box::new(
            DummyProvider::new(config.dimension()).with_batch_size(config.batch_size()),
        ),
    };
    debug!("Using embedding model {}", provider.model_id());
    Ok(provider)
}

/// FastEmbed provider for sentence-transformers models.
pub struct FastEmbedder {
    embedder: TextEmbedding,
    config: EmbeddingProviderConfig,
}

impl FastEmbedder {
    pub fn new(config: EmbeddingProviderConfig) -> Result<Self> {
        let init = InitOptions::new(config.model.clone());
        let embedder =
            TextEmbedding::try_new(init).context("Failed to initialize fastembed model")?;

        Ok(Self { embedder, config })
    }
}

impl EmbeddingProvider for FastEmbedder {
    fn model_id(&self) -> &str {
        &self.config.model_id
    }

    fn batch_size(&self) -> usize {
        self.config.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let prepared = truncate_texts(texts, self.config.max_chars);
        let mut embeddings = self
            .embedder
            .embed(&prepared, Some(self.config.batch_size))?;

        if self.config.normalize {
            for embedding in embeddings.iter_mut() {
                l2_normalize(embedding);
            }
        }

        Ok(embeddings)
    }
}

/// Command provider that shells out to an external process.
///
/// The command receives `{"model": ..., "texts": [...]}` on stdin and prints
/// either a JSON array of vectors or an object carrying one under
/// `embeddings`, `vectors` or `data`.
pub struct CommandProvider {
    command: String,
    model: String,
    batch_size: usize,
}

impl CommandProvider {
    pub fn new(command: String, model: String) -> Self {
        Self {
            command,
            model,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    fn run_command(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let payload = serde_json::to_vec(&CommandRequest {
            model: &self.model,
            texts,
        })?;

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(&self.command)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn embedding command: {}", self.command))?;

        // Dropping stdin after the write closes the pipe so the command sees EOF.
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&payload)
                .context("Failed to send texts to embedding command")?;
        }

        let output = child
            .wait_with_output()
            .context("Failed to collect embedding command output")?;
        if !output.status.success() {
            bail!(
                "Embedding command exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        parse_vectors(&output.stdout)
    }
}

impl EmbeddingProvider for CommandProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        self.run_command(texts)
    }
}

/// Dummy provider that returns zero vectors (for testing/offline runs).
pub struct DummyProvider {
    model: String,
    dimension: usize,
    batch_size: usize,
}

impl DummyProvider {
    /// Creates a new dummy provider with specified dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            model: DUMMY_MODEL_ID.to_string(),
            dimension,
            batch_size: DEFAULT_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }
}

impl EmbeddingProvider for DummyProvider {
    fn model_id(&self) -> &str {
        &self.model
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }

    fn embed_texts(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|_| vec![0.0; self.dimension]).collect())
    }
}

#[derive(Serialize)]
struct CommandRequest<'a> {
    model: &'a str,
    texts: &'a [String],
}

/// Accepted shapes of the embedding command's stdout.
#[derive(Deserialize)]
#[serde(untagged)]
enum CommandOutput {
    Rows(Vec<Vec<f32>>),
    Wrapped {
        #[serde(alias = "vectors", alias = "data")]
        embeddings: Vec<Vec<f32>>,
    },
}

fn parse_vectors(stdout: &[u8]) -> Result<Vec<Vec<f32>>> {
    let parsed: CommandOutput = serde_json::from_slice(stdout).context(
        "Embedding command must print a JSON array of vectors or an object with 'embeddings'",
    )?;
    Ok(match parsed {
        CommandOutput::Rows(rows) | CommandOutput::Wrapped { embeddings: rows } => rows,
    })
}

fn truncate_texts<'a>(texts: &'a [String], max_chars: usize) -> Vec<Cow<'a, str>> {
    texts
        .iter()
        .map(|text| truncate_to_chars(text.as_str(), max_chars))
        .collect()
}

fn truncate_to_chars<'a>(input: &'a str, max_chars: usize) -> Cow<'a, str> {
    if max_chars == 0 {
        return Cow::Borrowed("");
    }

    match input.char_indices().nth(max_chars) {
        Some((idx, _)) => Cow::Owned(input[..idx].to_string()),
        None => Cow::Borrowed(input),
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm == 0.0 {
        return;
    }
    for value in vector.iter_mut() {
        *value /= norm;
    }
}

/// Maps a user-facing model name to the fastembed model and its canonical id.
fn parse_model(raw: &str) -> Result<(EmbeddingModel, String)> {
    let value = raw.trim();
    if value.is_empty() {
        return Ok((EmbeddingModel::AllMpnetBaseV2, MPNET_MODEL_ID.to_string()));
    }

    match value.to_lowercase().as_str() {
        "mpnet" | "all-mpnet-base-v2" | "sentence-transformers/all-mpnet-base-v2" => {
            Ok((EmbeddingModel::AllMpnetBaseV2, MPNET_MODEL_ID.to_string()))
        }
        "minilm"
        | "all-minilm-l6-v2"
        | "allminilm-l6-v2"
        | "sentence-transformers/all-minilm-l6-v2" => {
            Ok((EmbeddingModel::AllMiniLML6V2, MINILM_MODEL_ID.to_string()))
        }
        other => bail!(
            "Unsupported embedding model '{}'. Supported values: {}, {}",
            other,
            MPNET_MODEL_ID,
            MINILM_MODEL_ID
        ),
    }
}

/// Reads an override from the environment; unset or blank keeps `default`.
fn env_or<T>(name: &str, default: T, parse: impl Fn(&str) -> Option<T>) -> Result<T> {
    let raw = match env::var(name) {
        Ok(raw) => raw,
        Err(env::VarError::NotPresent) => return Ok(default),
        Err(err) => return Err(err).with_context(|| format!("Failed to read {name}")),
    };
    let value = raw.trim();
    if value.is_empty() {
        return Ok(default);
    }
    parse(value).with_context(|| format!("Invalid {name} value: {value}"))
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
