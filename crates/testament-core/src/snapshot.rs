//! # Snapshot and Index Layer
//!
//! The immutable triple `{characters, events, sources}` every read
//! operation runs against, plus the indexes built eagerly on load.
//!
//! Writers never mutate a snapshot; they build a new one and publish it
//! atomically. Readers hold an `Arc<Snapshot>` for the duration of their
//! operation, so a concurrent write can never expose partial state.
//!
//! All maps are `BTreeMap`s, so every iteration and listing is id-sorted
//! and independent of insertion order.

use std::collections::{BTreeMap, BTreeSet};

use crate::types::{
    normalize_tag, Character, EntityId, Event, SourceId, SourceMeta, ValidationIssue,
};

// =============================================================================
// INDEX
// =============================================================================

/// In-memory indexes over a snapshot, rebuilt on every publication.
#[derive(Debug, Clone, Default)]
pub struct Index {
    /// Lowercased tag to character ids.
    by_tag_characters: BTreeMap<String, BTreeSet<EntityId>>,
    /// Lowercased tag to event ids.
    by_tag_events: BTreeMap<String, BTreeSet<EntityId>>,
    /// Role string to character ids.
    by_role: BTreeMap<String, BTreeSet<EntityId>>,
    /// Source to characters it profiles.
    by_source_characters: BTreeMap<SourceId, BTreeSet<EntityId>>,
    /// Source to events it reports.
    by_source_events: BTreeMap<SourceId, BTreeSet<EntityId>>,
    /// Character to events it participates in.
    by_participant: BTreeMap<EntityId, BTreeSet<EntityId>>,
}

impl Index {
    fn build(
        characters: &BTreeMap<EntityId, Character>,
        events: &BTreeMap<EntityId, Event>,
    ) -> Self {
        let mut index = Self::default();

        for (id, character) in characters {
            for tag in &character.tags {
                index
                    .by_tag_characters
                    .entry(normalize_tag(tag))
                    .or_default()
                    .insert(id.clone());
            }
            for role in &character.roles {
                index
                    .by_role
                    .entry(role.clone())
                    .or_default()
                    .insert(id.clone());
            }
            for profile in &character.source_profiles {
                index
                    .by_source_characters
                    .entry(profile.source_id.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }

        for (id, event) in events {
            for tag in &event.tags {
                index
                    .by_tag_events
                    .entry(normalize_tag(tag))
                    .or_default()
                    .insert(id.clone());
            }
            for account in &event.accounts {
                index
                    .by_source_events
                    .entry(account.source_id.clone())
                    .or_default()
                    .insert(id.clone());
            }
            for participant in &event.participants {
                index
                    .by_participant
                    .entry(participant.clone())
                    .or_default()
                    .insert(id.clone());
            }
        }

        index
    }
}

// =============================================================================
// SNAPSHOT
// =============================================================================

/// The immutable corpus view all core operations consume.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    characters: BTreeMap<EntityId, Character>,
    events: BTreeMap<EntityId, Event>,
    sources: BTreeMap<SourceId, SourceMeta>,
    warnings: Vec<ValidationIssue>,
    index: Index,
}

impl Snapshot {
    /// Build a snapshot and its indexes from decoded corpus maps.
    #[must_use]
    pub fn build(
        characters: BTreeMap<EntityId, Character>,
        events: BTreeMap<EntityId, Event>,
        sources: BTreeMap<SourceId, SourceMeta>,
        warnings: Vec<ValidationIssue>,
    ) -> Self {
        let index = Index::build(&characters, &events);
        Self {
            characters,
            events,
            sources,
            warnings,
            index,
        }
    }

    /// Get a character by id.
    #[must_use]
    pub fn character(&self, id: &EntityId) -> Option<&Character> {
        self.characters.get(id)
    }

    /// Get an event by id.
    #[must_use]
    pub fn event(&self, id: &EntityId) -> Option<&Event> {
        self.events.get(id)
    }

    /// Get source metadata by id.
    #[must_use]
    pub fn source(&self, id: &SourceId) -> Option<&SourceMeta> {
        self.sources.get(id)
    }

    /// All character ids, sorted.
    #[must_use]
    pub fn character_ids(&self) -> Vec<EntityId> {
        self.characters.keys().cloned().collect()
    }

    /// All event ids, sorted.
    #[must_use]
    pub fn event_ids(&self) -> Vec<EntityId> {
        self.events.keys().cloned().collect()
    }

    /// All source ids, sorted.
    #[must_use]
    pub fn source_ids(&self) -> Vec<SourceId> {
        self.sources.keys().cloned().collect()
    }

    /// Iterate characters in id order.
    pub fn iter_characters(&self) -> impl Iterator<Item = &Character> {
        self.characters.values()
    }

    /// Iterate events in id order.
    pub fn iter_events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    /// Iterate source metadata in id order.
    pub fn iter_sources(&self) -> impl Iterator<Item = &SourceMeta> {
        self.sources.values()
    }

    /// Warnings collected while this snapshot was loaded.
    #[must_use]
    pub fn warnings(&self) -> &[ValidationIssue] {
        &self.warnings
    }

    /// Number of characters.
    #[must_use]
    pub fn character_count(&self) -> usize {
        self.characters.len()
    }

    /// Number of events.
    #[must_use]
    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    // =========================================================================
    // INDEXED QUERIES
    // =========================================================================

    /// Characters carrying the tag, compared case-insensitively.
    #[must_use]
    pub fn characters_with_tag(&self, tag: &str) -> Vec<EntityId> {
        self.index
            .by_tag_characters
            .get(&normalize_tag(tag))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events carrying the tag, compared case-insensitively.
    #[must_use]
    pub fn events_with_tag(&self, tag: &str) -> Vec<EntityId> {
        self.index
            .by_tag_events
            .get(&normalize_tag(tag))
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether any character or event carries the tag.
    #[must_use]
    pub fn is_known_tag(&self, tag: &str) -> bool {
        let needle = normalize_tag(tag);
        self.index.by_tag_characters.contains_key(&needle)
            || self.index.by_tag_events.contains_key(&needle)
    }

    /// Characters with the exact role string.
    #[must_use]
    pub fn characters_with_role(&self, role: &str) -> Vec<EntityId> {
        self.index
            .by_role
            .get(role)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Characters profiled by the source.
    #[must_use]
    pub fn characters_from_source(&self, source: &SourceId) -> Vec<EntityId> {
        self.index
            .by_source_characters
            .get(source)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events reported by the source.
    #[must_use]
    pub fn events_from_source(&self, source: &SourceId) -> Vec<EntityId> {
        self.index
            .by_source_events
            .get(source)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Events a character participates in.
    #[must_use]
    pub fn events_for_character(&self, id: &EntityId) -> Vec<EntityId> {
        self.index
            .by_participant
            .get(id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }
}

// =============================================================================
// TESTS
// =============================================================================
