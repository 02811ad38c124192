//! # Storage Backend Port
//!
//! Raw-document access behind a trait, so the engine stays independent of
//! the persistence layout.
//!
//! A `RawDocument` is a self-describing tree: a string-keyed map whose
//! leaves are scalars, lists, or nested maps. Adapters hand the engine raw
//! trees and typed source metadata; the engine never parses a
//! persistence-specific syntax itself.
//!
//! Two adapters ship with the crate:
//! - `MemoryStore`: in-memory maps, the default for embedding and tests
//! - `FileTreeStore`: one JSON document per entity under a data root

mod file_tree;

pub use file_tree::FileTreeStore;

use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::types::{SourceMeta, TestamentError};

/// A raw entity document as stored by an adapter.
pub type RawDocument = Map<String, Value>;

// =============================================================================
// DOCUMENT STORE TRAIT
// =============================================================================

/// The port every storage adapter implements.
///
/// Readers may run concurrently; writes are serialized by the engine. Each
/// operation either returns a value or a structured error. Adapters do not
/// retry; that is the embedder's decision.
pub trait DocumentStore: Send + Sync {
    /// Keys of every stored character document, sorted.
    fn list_character_ids(&self) -> Result<Vec<String>, TestamentError>;

    /// Keys of every stored event document, sorted.
    fn list_event_ids(&self) -> Result<Vec<String>, TestamentError>;

    /// Load a raw character document by key.
    fn load_character_raw(&self, id: &str) -> Result<RawDocument, TestamentError>;

    /// Load a raw event document by key.
    fn load_event_raw(&self, id: &str) -> Result<RawDocument, TestamentError>;

    /// Persist a raw character document under the given key.
    fn save_character_raw(&mut self, id: &str, doc: RawDocument) -> Result<(), TestamentError>;

    /// Persist a raw event document under the given key.
    fn save_event_raw(&mut self, id: &str, doc: RawDocument) -> Result<(), TestamentError>;

    /// Load the source registry. An empty registry is reported as-is; the
    /// ingestion gate decides whether that is fatal.
    fn load_sources(&self) -> Result<Vec<SourceMeta>, TestamentError>;
}

// =============================================================================
// IN-MEMORY ADAPTER
// =============================================================================

/// In-memory document store.
///
/// Keys iterate in sorted order because the maps are `BTreeMap`s.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    characters: BTreeMap<String, RawDocument>,
    events: BTreeMap<String, RawDocument>,
    sources: Vec<SourceMeta>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a character document.
    #[must_use]
    pub fn with_character(mut self, id: impl Into<String>, doc: RawDocument) -> Self {
        self.characters.insert(id.into(), doc);
        self
    }

    /// Add or replace an event document.
    #[must_use]
    pub fn with_event(mut self, id: impl Into<String>, doc: RawDocument) -> Self {
        self.events.insert(id.into(), doc);
        self
    }

    /// Replace the source registry.
    #[must_use]
    pub fn with_sources(mut self, sources: Vec<SourceMeta>) -> Self {
        self.sources = sources;
        self
    }
}

impl DocumentStore for MemoryStore {
    fn list_character_ids(&self) -> Result<Vec<String>, TestamentError> {
        Ok(self.characters.keys().cloned().collect())
    }

    fn list_event_ids(&self) -> Result<Vec<String>, TestamentError> {
        Ok(self.events.keys().cloned().collect())
    }

    fn load_character_raw(&self, id: &str) -> Result<RawDocument, TestamentError> {
        self.characters.get(id).cloned().ok_or_else(|| {
            TestamentError::not_found(crate::types::EntityKind::Character, id)
        })
    }

    fn load_event_raw(&self, id: &str) -> Result<RawDocument, TestamentError> {
        self.events
            .get(id)
            .cloned()
            .ok_or_else(|| TestamentError::not_found(crate::types::EntityKind::Event, id))
    }

    fn save_character_raw(&mut self, id: &str, doc: RawDocument) -> Result<(), TestamentError> {
        self.characters.insert(id.to_string(), doc);
        Ok(())
    }

    fn save_event_raw(&mut self, id: &str, doc: RawDocument) -> Result<(), TestamentError> {
        self.events.insert(id.to_string(), doc);
        Ok(())
    }

    fn load_sources(&self) -> Result<Vec<SourceMeta>, TestamentError> {
        Ok(self.sources.clone())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SourceId;
    use serde_json::json;

    fn doc(value: Value) -> RawDocument {
        value.as_object().cloned().expect("object document")
    }

    #[test]
    fn memory_store_lists_keys_sorted() {
        let store = MemoryStore::new()
            .with_character("peter", doc(json!({"id": "peter"})))
            .with_character("andrew", doc(json!({"id": "andrew"})));

        assert_eq!(
            store.list_character_ids().expect("list"),
            vec!["andrew", "peter"]
        );
    }

    #[test]
    fn memory_store_roundtrips_documents() {
        let mut store = MemoryStore::new();
        let document = doc(json!({"id": "crucifixion", "label": "The Crucifixion"}));

        store
            .save_event_raw("crucifixion", document.clone())
            .expect("save");
        assert_eq!(store.load_event_raw("crucifixion").expect("load"), document);
    }

    #[test]
    fn missing_document_is_not_found() {
        let store = MemoryStore::new();
        let result = store.load_character_raw("nobody");
        assert!(matches!(
            result,
            Err(TestamentError::DataNotFound { .. })
        ));
    }

    #[test]
    fn sources_roundtrip() {
        let meta = SourceMeta {
            source_id: SourceId::new("mark").expect("source"),
            date_range: Some("65-75 CE".to_string()),
            ..SourceMeta::default()
        };
        let store = MemoryStore::new().with_sources(vec![meta.clone()]);

        assert_eq!(store.load_sources().expect("load"), vec![meta]);
    }
}
