// SPDX-License-Identifier: MIT OR Apache-2.0

//! Learning module records and the corpus they form.
//!
//! A corpus is loaded from a directory of JSON files, each holding an array of
//! module objects. Positions in the corpus are significant: embeddings are
//! stored positionally and indexed against the module at the same position.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::errors::ModsimError;

/// A single learning module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub module_id: String,
    pub title: String,
    pub content: String,
    pub learning_outcomes: String,
}

impl Module {
    pub fn new(
        module_id: impl Into<String>,
        title: impl Into<String>,
        content: impl Into<String>,
        learning_outcomes: impl Into<String>,
    ) -> Self {
        Self {
            module_id: module_id.into(),
            title: title.into(),
            content: content.into(),
            learning_outcomes: learning_outcomes.into(),
        }
    }

    /// Canonical text used to embed this module.
    ///
    /// Both backends build their query text with this, so the local and remote
    /// rankings are computed over the same representation.
    pub fn embedding_text(&self) -> String {
        format!("{} {} {}", self.title, self.content, self.learning_outcomes)
    }
}

/// Ordered, immutable snapshot of modules for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Corpus {
    modules: Vec<Module>,
}

impl Corpus {
    pub fn new(modules: Vec<Module>) -> Self {
        Self { modules }
    }

    /// Loads every `*.json` file directly inside `dir`.
    ///
    /// Files are concatenated in file-name order. Any unreadable file or
    /// malformed record aborts the load.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(ModsimError::CorpusLoad {
                path: dir.to_path_buf(),
                reason: "not a directory".to_string(),
            }
            .into());
        }

        let mut files: Vec<PathBuf> = Vec::new();
        for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
            let entry = entry.map_err(|err| ModsimError::CorpusLoad {
                path: dir.to_path_buf(),
                reason: err.to_string(),
            })?;
            let path = entry.path();
            let is_json = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.eq_ignore_ascii_case("json"))
                .unwrap_or(false);
            if entry.file_type().is_file() && is_json {
                files.push(path.to_path_buf());
            }
        }
        files.sort();

        let mut modules = Vec::new();
        for path in &files {
            let loaded = load_file(path)?;
            debug!("Loaded {} modules from {}", loaded.len(), path.display());
            modules.extend(loaded);
        }

        info!(
            "Loaded {} total modules from {} files",
            modules.len(),
            files.len()
        );
        Ok(Self { modules })
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn get(&self, index: usize) -> Option<&Module> {
        self.modules.get(index)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Embedding texts in corpus order.
    pub fn texts(&self) -> Vec<String> {
        self.modules.iter().map(Module::embedding_text).collect()
    }

    /// Content hash of the whole corpus.
    ///
    /// Hashes key-sorted JSON so the digest depends only on module content and
    /// order, never on how modules were split across files or on field order.
    pub fn fingerprint(&self) -> String {
        let value = serde_json::to_value(&self.modules).unwrap_or(Value::Null);
        let mut canonical = String::new();
        write_canonical(&value, &mut canonical);
        blake3::hash(canonical.as_bytes()).to_hex().to_string()
    }

    /// Index of the first module whose title starts with `prefix`.
    pub fn find_by_title_prefix(&self, prefix: &str) -> Result<usize> {
        self.modules
            .iter()
            .position(|m| m.title.starts_with(prefix))
            .ok_or_else(|| ModsimError::ModuleNotFound(format!("title prefix '{prefix}'")).into())
    }

    /// Index of the module with the given id.
    pub fn find_by_id(&self, module_id: &str) -> Result<usize> {
        self.modules
            .iter()
            .position(|m| m.module_id == module_id)
            .ok_or_else(|| ModsimError::ModuleNotFound(format!("module_id '{module_id}'")).into())
    }
}

fn load_file(path: &Path) -> Result<Vec<Module>> {
    let content = std::fs::read_to_string(path).map_err(|err| ModsimError::CorpusLoad {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;
    let raw: Value = serde_json::from_str(&content).map_err(|err| ModsimError::CorpusLoad {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let records = match raw {
        Value::Array(records) => records,
        _ => {
            return Err(ModsimError::CorpusLoad {
                path: path.to_path_buf(),
                reason: "expected a JSON array of modules".to_string(),
            }
            .into())
        }
    };

    records
        .into_iter()
        .enumerate()
        .map(|(position, record)| {
            serde_json::from_value::<Module>(record).map_err(|err| {
                anyhow::Error::from(ModsimError::MalformedModule {
                    path: path.to_path_buf(),
                    position,
                    reason: err.to_string(),
                })
            })
        })
        .collect()
}

/// Writes `value` as compact JSON with object keys sorted at every level.
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => write_object(map, out),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

fn write_object(map: &Map<String, Value>, out: &mut String) {
    let mut keys: Vec<&String> = map.keys().collect();
    keys.sort();
    out.push('{');
    for (i, key) in keys.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        out.push_str(&Value::String((*key).clone()).to_string());
        out.push(':');
        write_canonical(&map[key.as_str()], out);
    }
    out.push('}');
}
