// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence for whole-corpus embedding cache entries.
//!
//! An entry is always read and written as a unit. The on-disk store keeps the
//! embedding matrix in a deflate-compressed zip archive next to a JSON
//! metadata sidecar:
//!
//! ```text
//! cache/
//!   embeddings.zip        data_hash + embeddings.bin (u32 rows, u32 cols, f32 LE row-major)
//!   embeddings.meta.json  {data_hash, model_name, timestamp, num_modules}
//! ```

use anyhow::{anyhow, bail, Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

use crate::errors::ModsimError;

const MATRIX_ENTRY: &str = "embeddings.bin";
const DATA_HASH_ENTRY: &str = "data_hash";
const MATRIX_HEADER_LEN: usize = 8;

/// A complete set of corpus embeddings together with what they were computed from.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Corpus fingerprint the vectors belong to
    pub fingerprint: String,
    /// Embedding model that produced the vectors
    pub model_id: String,
    /// When the vectors were computed
    pub created_at: DateTime<Utc>,
    /// One vector per module, in corpus order
    pub vectors: Vec<Vec<f32>>,
    /// Number of modules the entry was computed for
    pub count: usize,
}

impl CacheEntry {
    pub fn new(fingerprint: String, model_id: String, vectors: Vec<Vec<f32>>) -> Self {
        let count = vectors.len();
        Self {
            fingerprint,
            model_id,
            created_at: Utc::now(),
            vectors,
            count,
        }
    }

    /// Whether this entry was computed for the given corpus state and model.
    pub fn matches(&self, fingerprint: &str, model_id: &str, corpus_len: usize) -> bool {
        self.fingerprint == fingerprint
            && self.model_id == model_id
            && self.count == corpus_len
            && self.vectors.len() == corpus_len
    }
}

/// Sidecar metadata written next to the embedding archive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub data_hash: String,
    pub model_name: String,
    pub timestamp: DateTime<Utc>,
    pub num_modules: usize,
}

impl From<&CacheEntry> for CacheMetadata {
    fn from(entry: &CacheEntry) -> Self {
        Self {
            data_hash: entry.fingerprint.clone(),
            model_name: entry.model_id.clone(),
            timestamp: entry.created_at,
            num_modules: entry.count,
        }
    }
}

/// Keyed storage for cache entries.
pub trait CacheStore {
    /// Returns the entry stored under `key`, `None` if there is none.
    ///
    /// Errors mean the stored artifacts exist but cannot be trusted.
    fn read(&self, key: &str) -> Result<Option<CacheEntry>>;

    /// Replaces whatever is stored under `key` with `entry`.
    fn write(&self, key: &str, entry: &CacheEntry) -> Result<()>;

    /// Drops the entry stored under `key`, if any.
    fn remove(&self, key: &str) -> Result<()>;
}

/// Filesystem store keeping one zip archive plus metadata sidecar per key.
pub struct ArchiveCacheStore {
    dir: PathBuf,
}

impl ArchiveCacheStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn archive_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.zip"))
    }

    pub fn metadata_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.meta.json"))
    }

    /// Reads only the sidecar metadata.
    pub fn read_metadata(&self, key: &str) -> Result<Option<CacheMetadata>> {
        let path = self.metadata_path(key);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read cache metadata: {}", path.display()))?;
        let metadata = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse cache metadata: {}", path.display()))?;
        Ok(Some(metadata))
    }

    fn write_archive(&self, path: &Path, entry: &CacheEntry) -> Result<()> {
        let file = File::create(path)
            .with_context(|| format!("Failed to create cache archive: {}", path.display()))?;
        let mut zip = ZipWriter::new(BufWriter::new(file));
        let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

        zip.start_file(DATA_HASH_ENTRY, options)?;
        zip.write_all(entry.fingerprint.as_bytes())?;
        zip.start_file(MATRIX_ENTRY, options)?;
        zip.write_all(&encode_matrix(&entry.vectors)?)?;

        let mut writer = zip.finish()?;
        writer.flush()?;
        writer.get_ref().sync_all()?;
        Ok(())
    }

    fn read_archive(&self, path: &Path, expected_rows: usize) -> Result<(String, Vec<Vec<f32>>)> {
        let file = File::open(path)
            .with_context(|| format!("Failed to open cache archive: {}", path.display()))?;
        let mut archive = ZipArchive::new(file)
            .with_context(|| format!("Invalid cache archive: {}", path.display()))?;

        let mut data_hash = String::new();
        archive
            .by_name(DATA_HASH_ENTRY)?
            .read_to_string(&mut data_hash)?;

        let mut matrix = Vec::new();
        archive.by_name(MATRIX_ENTRY)?.read_to_end(&mut matrix)?;

        Ok((data_hash, decode_matrix(&matrix, expected_rows)?))
    }
}

impl CacheStore for ArchiveCacheStore {
    fn read(&self, key: &str) -> Result<Option<CacheEntry>> {
        let archive_path = self.archive_path(key);
        let metadata = match self.read_metadata(key)? {
            Some(metadata) => metadata,
            None => return Ok(None),
        };
        if !archive_path.exists() {
            return Ok(None);
        }

        let (data_hash, vectors) = self.read_archive(&archive_path, metadata.num_modules)?;
        if data_hash != metadata.data_hash {
            bail!(
                "Cache archive {} does not belong to its metadata",
                archive_path.display()
            );
        }
        if vectors.len() != metadata.num_modules {
            bail!(
                "Cache archive {} holds {} rows, metadata claims {}",
                archive_path.display(),
                vectors.len(),
                metadata.num_modules
            );
        }

        Ok(Some(CacheEntry {
            fingerprint: metadata.data_hash,
            model_id: metadata.model_name,
            created_at: metadata.timestamp,
            vectors,
            count: metadata.num_modules,
        }))
    }

    fn write(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| {
            format!("Failed to create cache directory: {}", self.dir.display())
        })?;

        let archive_path = self.archive_path(key);
        let metadata_path = self.metadata_path(key);

        // Without a sidecar the old archive is never trusted, so a crash below
        // leaves a miss rather than a mismatched pair.
        if metadata_path.exists() {
            fs::remove_file(&metadata_path).with_context(|| {
                format!("Failed to remove stale metadata: {}", metadata_path.display())
            })?;
        }

        let archive_tmp = self.dir.join(format!("{key}.zip.tmp"));
        let published = self.write_archive(&archive_tmp, entry).and_then(|()| {
            fs::rename(&archive_tmp, &archive_path).with_context(|| {
                format!("Failed to publish cache archive: {}", archive_path.display())
            })
        });
        if let Err(err) = published {
            if archive_tmp.exists() {
                if let Err(cleanup) = fs::remove_file(&archive_tmp) {
                    warn!(
                        "Failed to remove {}: {}",
                        archive_tmp.display(),
                        cleanup
                    );
                }
            }
            return Err(err);
        }

        let metadata_tmp = self.dir.join(format!("{key}.meta.json.tmp"));
        let json = serde_json::to_string_pretty(&CacheMetadata::from(entry))
            .context("Failed to serialize cache metadata")?;
        fs::write(&metadata_tmp, json)
            .with_context(|| format!("Failed to write cache metadata: {}", metadata_tmp.display()))?;
        fs::rename(&metadata_tmp, &metadata_path).with_context(|| {
            format!("Failed to publish cache metadata: {}", metadata_path.display())
        })?;

        debug!(
            "Wrote {} embeddings to {}",
            entry.count,
            archive_path.display()
        );
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        for path in [self.metadata_path(key), self.archive_path(key)] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
            }
        }
        Ok(())
    }
}

/// In-memory store, mainly for tests.
#[derive(Default)]
pub struct MemoryCacheStore {
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCacheStore {
    fn read(&self, key: &str) -> Result<Option<CacheEntry>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cache store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn write(&self, key: &str, entry: &CacheEntry) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cache store lock poisoned"))?;
        entries.insert(key.to_string(), entry.clone());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("cache store lock poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

fn encode_matrix(vectors: &[Vec<f32>]) -> Result<Vec<u8>> {
    let cols = vectors.first().map(Vec::len).unwrap_or(0);
    if let Some(bad) = vectors.iter().find(|v| v.len() != cols) {
        return Err(ModsimError::DimensionMismatch {
            expected: cols,
            actual: bad.len(),
        }
        .into());
    }

    let rows = u32::try_from(vectors.len()).context("Too many rows for cache archive")?;
    let cols_u32 = u32::try_from(cols).context("Too many columns for cache archive")?;

    let mut out = Vec::with_capacity(MATRIX_HEADER_LEN + vectors.len() * cols * 4);
    out.extend_from_slice(&rows.to_le_bytes());
    out.extend_from_slice(&cols_u32.to_le_bytes());
    for value in vectors.iter().flatten() {
        out.extend_from_slice(&value.to_le_bytes());
    }
    Ok(out)
}

/// Decodes a matrix that must hold exactly `expected_rows` rows.
///
/// The header is checked against `expected_rows` and the body length before
/// anything is allocated.
fn decode_matrix(bytes: &[u8], expected_rows: usize) -> Result<Vec<Vec<f32>>> {
    if bytes.len() < MATRIX_HEADER_LEN {
        bail!("Embedding matrix header truncated");
    }
    let rows = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let cols = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
    let body = &bytes[MATRIX_HEADER_LEN..];

    if rows != expected_rows {
        return Err(ModsimError::LengthMismatch {
            embeddings: rows,
            modules: expected_rows,
        })
        .context("Embedding matrix header disagrees with cache metadata");
    }
    if rows > 0 && cols == 0 {
        bail!("Embedding matrix has {} rows of zero width", rows);
    }

    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(4))
        .ok_or_else(|| anyhow!("Embedding matrix shape overflows"))?;
    if body.len() != expected {
        bail!(
            "Embedding matrix is {} bytes, shape {}x{} needs {}",
            body.len(),
            rows,
            cols,
            expected
        );
    }

    let values: Vec<f32> = body
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();

    if rows == 0 {
        return Ok(Vec::new());
    }
    Ok(values.chunks_exact(cols).map(<[f32]>::to_vec).collect())
}
