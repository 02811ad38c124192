//! # File-Tree Adapter
//!
//! One JSON document per entity under a data root:
//!
//! ```text
//! <root>/characters/<id>.json
//! <root>/events/<id>.json
//! <root>/sources.json
//! ```
//!
//! `sources.json` maps source ids to their metadata fields. File keys are
//! the entity ids; the ingestion gate enforces that the `id` field inside
//! each document matches its key.

use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

use super::{DocumentStore, RawDocument};
use crate::types::{EntityKind, SourceMeta, TestamentError};

/// Directory-backed document store.
#[derive(Debug, Clone)]
pub struct FileTreeStore {
    root: PathBuf,
}

impl FileTreeStore {
    /// Open a store over the given data root.
    ///
    /// # Errors
    /// Returns a configuration error when the root exists but is not a
    /// directory. A missing root is accepted; it is created on first save.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, TestamentError> {
        let root = root.into();
        if root.exists() && !root.is_dir() {
            return Err(TestamentError::Configuration(format!(
                "data root '{}' is not a directory",
                root.display()
            )));
        }
        Ok(Self { root })
    }

    /// The data root this store reads from.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn character_dir(&self) -> PathBuf {
        self.root.join("characters")
    }

    fn event_dir(&self) -> PathBuf {
        self.root.join("events")
    }

    fn sources_path(&self) -> PathBuf {
        self.root.join("sources.json")
    }

    fn list_keys(dir: &Path) -> Result<Vec<String>, TestamentError> {
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(dir)
            .map_err(|e| TestamentError::Storage(format!("cannot read '{}': {e}", dir.display())))?;

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                TestamentError::Storage(format!("cannot read '{}': {e}", dir.display()))
            })?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    keys.push(stem.to_string());
                }
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn read_document(path: &Path, kind: EntityKind, id: &str) -> Result<RawDocument, TestamentError> {
        if !path.exists() {
            return Err(TestamentError::not_found(kind, id));
        }
        let text = fs::read_to_string(path)
            .map_err(|e| TestamentError::Storage(format!("cannot read '{}': {e}", path.display())))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            TestamentError::Storage(format!("invalid JSON in '{}': {e}", path.display()))
        })?;
        match value {
            Value::Object(map) => Ok(map),
            other => Err(TestamentError::Storage(format!(
                "document '{}' must be a JSON object, found {}",
                path.display(),
                json_kind(&other)
            ))),
        }
    }

    fn write_document(path: &Path, doc: &RawDocument) -> Result<(), TestamentError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                TestamentError::Storage(format!("cannot create '{}': {e}", parent.display()))
            })?;
        }
        let text = serde_json::to_string_pretty(doc)
            .map_err(|e| TestamentError::Storage(format!("cannot serialize document: {e}")))?;
        fs::write(path, text)
            .map_err(|e| TestamentError::Storage(format!("cannot write '{}': {e}", path.display())))
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
}

impl DocumentStore for FileTreeStore {
    fn list_character_ids(&self) -> Result<Vec<String>, TestamentError> {
        Self::list_keys(&self.character_dir())
    }

    fn list_event_ids(&self) -> Result<Vec<String>, TestamentError> {
        Self::list_keys(&self.event_dir())
    }

    fn load_character_raw(&self, id: &str) -> Result<RawDocument, TestamentError> {
        let path = self.character_dir().join(format!("{id}.json"));
        Self::read_document(&path, EntityKind::Character, id)
    }

    fn load_event_raw(&self, id: &str) -> Result<RawDocument, TestamentError> {
        let path = self.event_dir().join(format!("{id}.json"));
        Self::read_document(&path, EntityKind::Event, id)
    }

    fn save_character_raw(&mut self, id: &str, doc: RawDocument) -> Result<(), TestamentError> {
        let path = self.character_dir().join(format!("{id}.json"));
        Self::write_document(&path, &doc)
    }

    fn save_event_raw(&mut self, id: &str, doc: RawDocument) -> Result<(), TestamentError> {
        let path = self.event_dir().join(format!("{id}.json"));
        Self::write_document(&path, &doc)
    }

    fn load_sources(&self) -> Result<Vec<SourceMeta>, TestamentError> {
        let path = self.sources_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let text = fs::read_to_string(&path)
            .map_err(|e| TestamentError::Storage(format!("cannot read '{}': {e}", path.display())))?;
        let value: Value = serde_json::from_str(&text).map_err(|e| {
            TestamentError::Storage(format!("invalid JSON in '{}': {e}", path.display()))
        })?;
        let Value::Object(map) = value else {
            return Err(TestamentError::Storage(format!(
                "'{}' must map source ids to metadata objects",
                path.display()
            )));
        };

        let mut sources = Vec::new();
        for (key, fields) in map {
            let Value::Object(mut obj) = fields else {
                return Err(TestamentError::Storage(format!(
                    "source '{key}' in '{}' must be an object",
                    path.display()
                )));
            };
            obj.insert("source_id".to_string(), Value::String(key.clone()));
            let meta: SourceMeta = serde_json::from_value(Value::Object(obj)).map_err(|e| {
                TestamentError::Storage(format!("source '{key}' is malformed: {e}"))
            })?;
            sources.push(meta);
        }
        sources.sort_by(|a, b| a.source_id.cmp(&b.source_id));
        Ok(sources)
    }
}

// =============================================================================
// TESTS
// =============================================================================
