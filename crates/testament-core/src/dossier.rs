//! # Dossier Builder
//!
//! Per-entity aggregate views with a stable, versioned schema. A dossier
//! composes the entity's pivots, the cross-source comparisons, the conflict
//! summaries, and the claim subgraph.
//!
//! Builders are pure functions of a snapshot; they never touch the storage
//! port. Serializing a dossier through `serde_json` yields canonically
//! ordered keys, so the same snapshot always produces identical bytes.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::claims::{claims_for_character, claims_for_event, Claim, ClaimValue};
use crate::conflicts::{detect_conflicts, ConflictSummary};
use crate::snapshot::Snapshot;
use crate::types::{
    Character, EntityId, Event, EventAccount, Parallel, Relationship, SourceId, SourceMeta,
    TextualVariant,
};

/// Version tag carried by every dossier.
pub const DOSSIER_SCHEMA_VERSION: &str = "1.0";

// =============================================================================
// SCHEMA
// =============================================================================

/// The claims for an entity plus the conflict records connecting them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClaimGraph {
    pub claims: Vec<Claim>,
    pub conflicts: Vec<ConflictSummary>,
}

/// Aggregate view of a character. The key set is published and stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharacterDossier {
    pub id: EntityId,
    pub canonical_name: String,
    pub aliases: Vec<String>,
    pub roles: Vec<String>,
    pub source_ids: Vec<SourceId>,
    pub source_metadata: BTreeMap<SourceId, SourceMeta>,
    pub traits_by_source: BTreeMap<SourceId, BTreeMap<String, String>>,
    pub references_by_source: BTreeMap<SourceId, Vec<String>>,
    pub variants_by_source: BTreeMap<SourceId, Vec<TextualVariant>>,
    pub citations_by_source: BTreeMap<SourceId, Vec<String>>,
    /// Trait name to the value each mentioning source asserts.
    pub trait_comparison: BTreeMap<String, BTreeMap<SourceId, String>>,
    /// Restriction of the comparison to non-agreeing, non-empty values.
    pub trait_conflicts: BTreeMap<String, BTreeMap<SourceId, String>>,
    pub trait_conflict_summaries: BTreeMap<String, ConflictSummary>,
    pub claim_graph: ClaimGraph,
    pub relationships: Vec<Relationship>,
    /// Parallels of the events this character participates in.
    pub parallels: Vec<Parallel>,
    pub schema_version: String,
}

/// Aggregate view of an event. The key set is published and stable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventDossier {
    pub id: EntityId,
    pub label: String,
    pub participants: Vec<EntityId>,
    pub accounts: Vec<EventAccount>,
    /// Account field to the value each reporting source asserts, for fields
    /// whose values disagree.
    pub account_conflicts: BTreeMap<String, BTreeMap<SourceId, String>>,
    pub account_conflict_summaries: BTreeMap<String, ConflictSummary>,
    pub claim_graph: ClaimGraph,
    pub parallels: Vec<Parallel>,
    pub citations: Vec<String>,
    pub textual_variants: Vec<TextualVariant>,
    pub schema_version: String,
}

// =============================================================================
// CHARACTER DOSSIER
// =============================================================================

/// Build a character dossier from precomputed claims and conflicts.
///
/// The engine injects hook-scored conflicts here; `build_character_dossier`
/// is the pure convenience over this.
#[must_use]
pub fn character_dossier(
    snapshot: &Snapshot,
    character: &Character,
    claims: Vec<Claim>,
    conflicts: Vec<ConflictSummary>,
) -> CharacterDossier {
    let source_ids = character.source_ids();

    let mut source_metadata = BTreeMap::new();
    for source_id in &source_ids {
        if let Some(meta) = snapshot.source(source_id) {
            source_metadata.insert(source_id.clone(), meta.clone());
        }
    }

    let mut traits_by_source = BTreeMap::new();
    let mut references_by_source = BTreeMap::new();
    let mut variants_by_source = BTreeMap::new();
    let mut citations_by_source = BTreeMap::new();
    for profile in &character.source_profiles {
        traits_by_source.insert(profile.source_id.clone(), profile.traits.clone());
        references_by_source.insert(profile.source_id.clone(), profile.references.clone());
        if !profile.variants.is_empty() {
            variants_by_source.insert(profile.source_id.clone(), profile.variants.clone());
        }
        if !profile.citations.is_empty() {
            citations_by_source.insert(profile.source_id.clone(), profile.citations.clone());
        }
    }

    let trait_comparison = compare_traits(character);
    let trait_conflicts = restrict_to_disagreements(&trait_comparison);
    let trait_conflict_summaries: BTreeMap<String, ConflictSummary> = conflicts
        .iter()
        .filter(|c| trait_comparison.contains_key(&c.field))
        .map(|c| (c.field.clone(), c.clone()))
        .collect();

    let parallels = participant_parallels(snapshot, &character.id);

    CharacterDossier {
        id: character.id.clone(),
        canonical_name: character.canonical_name.clone(),
        aliases: character.aliases.clone(),
        roles: character.roles.clone(),
        source_ids,
        source_metadata,
        traits_by_source,
        references_by_source,
        variants_by_source,
        citations_by_source,
        trait_comparison,
        trait_conflicts,
        trait_conflict_summaries,
        claim_graph: ClaimGraph { claims, conflicts },
        relationships: character.relationships.clone(),
        parallels,
        schema_version: DOSSIER_SCHEMA_VERSION.to_string(),
    }
}

/// Build a character dossier straight from the snapshot.
#[must_use]
pub fn build_character_dossier(snapshot: &Snapshot, character: &Character) -> CharacterDossier {
    let claims = claims_for_character(character);
    let conflicts = detect_conflicts(&claims);
    character_dossier(snapshot, character, claims, conflicts)
}

/// `trait name -> source -> value` across every source that mentions it.
#[must_use]
pub fn compare_traits(character: &Character) -> BTreeMap<String, BTreeMap<SourceId, String>> {
    let mut comparison: BTreeMap<String, BTreeMap<SourceId, String>> = BTreeMap::new();
    for profile in &character.source_profiles {
        for (trait_key, value) in &profile.traits {
            comparison
                .entry(trait_key.clone())
                .or_default()
                .insert(profile.source_id.clone(), value.clone());
        }
    }
    comparison
}

// =============================================================================
// EVENT DOSSIER
// =============================================================================

/// Build an event dossier from precomputed claims and conflicts.
#[must_use]
pub fn event_dossier(
    event: &Event,
    claims: Vec<Claim>,
    conflicts: Vec<ConflictSummary>,
) -> EventDossier {
    let account_comparison = compare_accounts(event);
    let account_conflicts = restrict_to_disagreements(&account_comparison);
    let account_conflict_summaries: BTreeMap<String, ConflictSummary> = conflicts
        .iter()
        .filter(|c| account_comparison.contains_key(&c.field))
        .map(|c| (c.field.clone(), c.clone()))
        .collect();

    EventDossier {
        id: event.id.clone(),
        label: event.label.clone(),
        participants: event.participants.clone(),
        accounts: event.accounts.clone(),
        account_conflicts,
        account_conflict_summaries,
        claim_graph: ClaimGraph { claims, conflicts },
        parallels: event.parallels.clone(),
        citations: event.citations.clone(),
        textual_variants: event.textual_variants.clone(),
        schema_version: DOSSIER_SCHEMA_VERSION.to_string(),
    }
}

/// Build an event dossier straight from the event.
#[must_use]
pub fn build_event_dossier(event: &Event) -> EventDossier {
    let claims = claims_for_event(event);
    let conflicts = detect_conflicts(&claims);
    event_dossier(event, claims, conflicts)
}

/// `account field -> source -> value` for the canonical account fields.
#[must_use]
pub fn compare_accounts(event: &Event) -> BTreeMap<String, BTreeMap<SourceId, String>> {
    let mut comparison: BTreeMap<String, BTreeMap<SourceId, String>> = BTreeMap::new();
    for account in &event.accounts {
        let fields = [
            ("summary", Some(account.summary.clone())),
            ("reference", Some(account.reference.clone())),
            ("notes", account.notes.clone()),
        ];
        for (field, value) in fields {
            let Some(value) = value else { continue };
            if value.trim().is_empty() {
                continue;
            }
            comparison
                .entry(field.to_string())
                .or_default()
                .insert(account.source_id.clone(), value);
        }
    }
    comparison
}

// =============================================================================
// SHARED PIVOT HELPERS
// =============================================================================

/// Keep only the fields whose non-absent values disagree after
/// normalization.
fn restrict_to_disagreements(
    comparison: &BTreeMap<String, BTreeMap<SourceId, String>>,
) -> BTreeMap<String, BTreeMap<SourceId, String>> {
    comparison
        .iter()
        .filter(|(_, per_source)| {
            let distinct: std::collections::BTreeSet<String> = per_source
                .values()
                .filter_map(|v| ClaimValue::Scalar(v.clone()).normalized())
                .collect();
            distinct.len() > 1
        })
        .map(|(field, per_source)| (field.clone(), per_source.clone()))
        .collect()
}

/// Parallels of every event the character participates in, in event order.
fn participant_parallels(snapshot: &Snapshot, character_id: &EntityId) -> Vec<Parallel> {
    let mut parallels = Vec::new();
    for event_id in snapshot.events_for_character(character_id) {
        if let Some(event) = snapshot.event(&event_id) {
            parallels.extend(event.parallels.iter().cloned());
        }
    }
    parallels
}

// =============================================================================
// TESTS
// =============================================================================
