//! # Ingestion and Validation Gate
//!
//! The only producer of typed entities. Raw documents from the storage port
//! pass through a strict schema gate, then a cross-reference pass enforces
//! the referential invariants over the whole corpus. One run reports every
//! violation it finds, not just the first.
//!
//! Unknown trait keys and unrecognized document fields surface as warnings;
//! shape violations and broken references are errors that reject the load.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::snapshot::Snapshot;
use crate::storage::{DocumentStore, RawDocument};
use crate::types::{
    Character, EntityId, Event, EventAccount, Parallel, Relationship, SourceId, SourceMeta,
    SourceProfile, TestamentError, TextualVariant, ValidationIssue,
};
use crate::vocabulary::{self, MAX_KEY_LENGTH, MAX_PROFILES_PER_ENTITY, MAX_VALUE_LENGTH};

// =============================================================================
// LOAD
// =============================================================================

/// Load the entire corpus through the gate and build a snapshot.
///
/// Procedure:
/// 1. Load the source registry; an empty registry is fatal.
/// 2. Decode every character and event document, collecting issues.
/// 3. Run the cross-reference pass over the decoded corpus.
/// 4. On any error-severity issue, fail with the full issue list.
///
/// # Errors
/// `TestamentError::Validation` carrying every issue found (warnings
/// included, marked by severity), or a storage error from the adapter.
pub fn load_snapshot(store: &dyn DocumentStore) -> Result<Snapshot, TestamentError> {
    load_snapshot_with(store, true)
}

/// `load_snapshot` with the cross-reference pass made optional.
///
/// The shape gate always runs; disabling validation only skips the
/// referential invariants, matching the `enable_validation` knob.
pub fn load_snapshot_with(
    store: &dyn DocumentStore,
    enforce_cross_references: bool,
) -> Result<Snapshot, TestamentError> {
    let mut issues: Vec<ValidationIssue> = Vec::new();

    // Source registry first; everything else validates against it.
    let mut sources: BTreeMap<SourceId, SourceMeta> = BTreeMap::new();
    for meta in store.load_sources()? {
        let id = meta.source_id.clone();
        if sources.insert(id.clone(), meta).is_some() {
            issues.push(ValidationIssue::error(
                id.as_str(),
                "sources",
                "duplicate source id in registry",
            ));
        }
    }
    if sources.is_empty() {
        issues.push(ValidationIssue::error(
            "sources",
            "sources",
            "source registry is missing or empty",
        ));
        return Err(TestamentError::Validation(issues));
    }

    let mut characters: BTreeMap<EntityId, Character> = BTreeMap::new();
    let mut seen_character_keys: BTreeSet<String> = BTreeSet::new();
    for key in store.list_character_ids()? {
        if !seen_character_keys.insert(key.clone()) {
            issues.push(ValidationIssue::error(
                &key,
                "id",
                "duplicate character key in storage",
            ));
            continue;
        }
        match store.load_character_raw(&key) {
            Ok(doc) => {
                if let Some(character) = decode_character(&key, &doc, &mut issues) {
                    characters.insert(character.id.clone(), character);
                }
            }
            Err(err) => {
                issues.push(ValidationIssue::error(
                    &key,
                    "id",
                    format!("failed to load character document: {err}"),
                ));
            }
        }
    }

    let mut events: BTreeMap<EntityId, Event> = BTreeMap::new();
    let mut seen_event_keys: BTreeSet<String> = BTreeSet::new();
    for key in store.list_event_ids()? {
        if !seen_event_keys.insert(key.clone()) {
            issues.push(ValidationIssue::error(
                &key,
                "id",
                "duplicate event key in storage",
            ));
            continue;
        }
        match store.load_event_raw(&key) {
            Ok(doc) => {
                if let Some(event) = decode_event(&key, &doc, &mut issues) {
                    events.insert(event.id.clone(), event);
                }
            }
            Err(err) => {
                issues.push(ValidationIssue::error(
                    &key,
                    "id",
                    format!("failed to load event document: {err}"),
                ));
            }
        }
    }

    if enforce_cross_references {
        issues.extend(check_cross_references(&characters, &events, &sources));
    }

    if issues
        .iter()
        .any(|i| i.severity == crate::types::IssueSeverity::Error)
    {
        return Err(TestamentError::Validation(issues));
    }

    tracing::debug!(
        characters = characters.len(),
        events = events.len(),
        sources = sources.len(),
        warnings = issues.len(),
        "corpus loaded"
    );

    Ok(Snapshot::build(characters, events, sources, issues))
}

// =============================================================================
// CHARACTER GATE
// =============================================================================

/// Decode one raw character document.
///
/// Returns `None` when the document has error-severity issues; all findings
/// are appended to `issues` either way.
pub fn decode_character(
    key: &str,
    doc: &RawDocument,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Character> {
    let before = error_count(issues);

    let id = expect_entity_id(doc, key, issues);
    let canonical_name = expect_string(doc, "canonical_name", key, issues);

    for field in doc.keys() {
        if !matches!(
            field.as_str(),
            "id" | "canonical_name"
                | "aliases"
                | "roles"
                | "tags"
                | "source_profiles"
                | "relationships"
                | "citations"
        ) {
            issues.push(ValidationIssue::warning(
                key,
                field,
                "unrecognized character field",
            ));
        }
    }

    let aliases = optional_string_list(doc, "aliases", key, issues);
    let roles = optional_string_list(doc, "roles", key, issues);
    let tags = decode_tags(doc, key, issues);
    let citations = optional_string_list(doc, "citations", key, issues);

    let mut source_profiles = Vec::new();
    match doc.get("source_profiles") {
        Some(Value::Array(entries)) => {
            if entries.is_empty() {
                issues.push(ValidationIssue::error(
                    key,
                    "source_profiles",
                    "at least one source profile is required",
                ));
            }
            if entries.len() > MAX_PROFILES_PER_ENTITY {
                issues.push(ValidationIssue::error(
                    key,
                    "source_profiles",
                    format!("more than {MAX_PROFILES_PER_ENTITY} profiles"),
                ));
            } else {
                for (idx, entry) in entries.iter().enumerate() {
                    if let Some(profile) = decode_source_profile(key, idx, entry, issues) {
                        source_profiles.push(profile);
                    }
                }
            }
        }
        Some(other) => {
            issues.push(
                ValidationIssue::error(key, "source_profiles", "must be a list of profiles")
                    .with_value(json_kind(other)),
            );
        }
        None => {
            issues.push(ValidationIssue::error(
                key,
                "source_profiles",
                "required field is missing",
            ));
        }
    }

    let relationships = decode_relationships(doc, key, issues);

    if error_count(issues) > before {
        return None;
    }

    Some(Character {
        id: id?,
        canonical_name: canonical_name?,
        aliases,
        roles,
        source_profiles,
        relationships,
        tags,
        citations,
    })
}

fn decode_source_profile(
    entity: &str,
    idx: usize,
    entry: &Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<SourceProfile> {
    let path = format!("source_profiles[{idx}]");
    let Value::Object(doc) = entry else {
        issues.push(
            ValidationIssue::error(entity, &path, "must be an object").with_value(json_kind(entry)),
        );
        return None;
    };

    let source_id = expect_source_id(doc, &format!("{path}.source_id"), "source_id", entity, issues);

    let mut traits = BTreeMap::new();
    match doc.get("traits") {
        Some(Value::Object(map)) => {
            for (trait_key, trait_value) in map {
                let trait_path = format!("{path}.traits.{trait_key}");
                let Value::String(value) = trait_value else {
                    issues.push(
                        ValidationIssue::error(entity, &trait_path, "trait value must be a string")
                            .with_value(json_kind(trait_value)),
                    );
                    continue;
                };
                if trait_key.len() > MAX_KEY_LENGTH || value.len() > MAX_VALUE_LENGTH {
                    issues.push(ValidationIssue::error(
                        entity,
                        &trait_path,
                        "trait key or value exceeds the size limit",
                    ));
                    continue;
                }
                if !vocabulary::is_standard_trait_key(trait_key) {
                    issues.push(
                        ValidationIssue::warning(
                            entity,
                            &trait_path,
                            "trait key is outside the standard vocabulary",
                        )
                        .with_value(trait_key.clone()),
                    );
                }
                traits.insert(trait_key.clone(), value.clone());
            }
        }
        Some(other) => {
            issues.push(
                ValidationIssue::error(
                    entity,
                    format!("{path}.traits"),
                    "must be an object of key/value pairs",
                )
                .with_value(json_kind(other)),
            );
        }
        None => {
            issues.push(ValidationIssue::error(
                entity,
                format!("{path}.traits"),
                "required field is missing",
            ));
        }
    }

    let references = match doc.get("references") {
        Some(_) => optional_string_list_at(doc, "references", &path, entity, issues),
        None => {
            issues.push(ValidationIssue::error(
                entity,
                format!("{path}.references"),
                "required field is missing",
            ));
            Vec::new()
        }
    };

    let variants = decode_variants(doc, &path, entity, issues);
    let citations = optional_string_list_at(doc, "citations", &path, entity, issues);

    Some(SourceProfile {
        source_id: source_id?,
        traits,
        references,
        variants,
        citations,
    })
}

/// Decode the relationships list, rejecting the legacy grouped shape.
fn decode_relationships(
    doc: &RawDocument,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<Relationship> {
    let entries = match doc.get("relationships") {
        None => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(Value::Object(_)) => {
            // Legacy grouped shape: {"family": [...], "disciples": [...]}.
            issues.push(ValidationIssue::error(
                entity,
                "relationships",
                "grouped relationships (map of category to list) are no longer \
                 accepted; use a flat list of relationship objects",
            ));
            return Vec::new();
        }
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, "relationships", "must be a list")
                    .with_value(json_kind(other)),
            );
            return Vec::new();
        }
    };

    let mut relationships = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let path = format!("relationships[{idx}]");
        let Value::Object(rel) = entry else {
            issues.push(
                ValidationIssue::error(entity, &path, "must be an object")
                    .with_value(json_kind(entry)),
            );
            continue;
        };

        let character_id = match rel.get("character_id") {
            Some(Value::String(s)) => match EntityId::new(s.clone()) {
                Ok(id) => Some(id),
                Err(err) => {
                    issues.push(
                        ValidationIssue::error(entity, format!("{path}.character_id"), err)
                            .with_value(s.clone()),
                    );
                    None
                }
            },
            Some(other) => {
                issues.push(
                    ValidationIssue::error(
                        entity,
                        format!("{path}.character_id"),
                        "must be a string id",
                    )
                    .with_value(json_kind(other)),
                );
                None
            }
            None => {
                issues.push(ValidationIssue::error(
                    entity,
                    format!("{path}.character_id"),
                    "required field is missing",
                ));
                None
            }
        };

        let kind = match rel.get("type") {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(other) => {
                issues.push(
                    ValidationIssue::error(
                        entity,
                        format!("{path}.type"),
                        "must be a non-empty string",
                    )
                    .with_value(json_kind(other)),
                );
                None
            }
            None => {
                issues.push(ValidationIssue::error(
                    entity,
                    format!("{path}.type"),
                    "required field is missing",
                ));
                None
            }
        };

        let sources = decode_source_id_list(rel, "sources", &path, entity, true, issues);
        let references = match rel.get("references") {
            Some(_) => optional_string_list_at(rel, "references", &path, entity, issues),
            None => {
                issues.push(ValidationIssue::error(
                    entity,
                    format!("{path}.references"),
                    "required field is missing",
                ));
                Vec::new()
            }
        };

        let notes = match rel.get("notes") {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                issues.push(
                    ValidationIssue::error(entity, format!("{path}.notes"), "must be a string")
                        .with_value(json_kind(other)),
                );
                None
            }
        };

        if let (Some(character_id), Some(kind)) = (character_id, kind) {
            relationships.push(Relationship {
                character_id,
                kind,
                sources,
                references,
                notes,
            });
        }
    }
    relationships
}

// =============================================================================
// EVENT GATE
// =============================================================================

/// Decode one raw event document.
///
/// Returns `None` when the document has error-severity issues.
pub fn decode_event(
    key: &str,
    doc: &RawDocument,
    issues: &mut Vec<ValidationIssue>,
) -> Option<Event> {
    let before = error_count(issues);

    let id = expect_entity_id(doc, key, issues);
    let label = expect_string(doc, "label", key, issues);

    for field in doc.keys() {
        if !matches!(
            field.as_str(),
            "id" | "label"
                | "participants"
                | "accounts"
                | "parallels"
                | "tags"
                | "citations"
                | "textual_variants"
        ) {
            issues.push(ValidationIssue::warning(
                key,
                field,
                "unrecognized event field",
            ));
        }
    }

    let mut participants = Vec::new();
    match doc.get("participants") {
        None => {}
        Some(Value::Array(entries)) => {
            for (idx, entry) in entries.iter().enumerate() {
                match entry {
                    Value::String(s) => match EntityId::new(s.clone()) {
                        Ok(id) => participants.push(id),
                        Err(err) => {
                            issues.push(
                                ValidationIssue::error(key, format!("participants[{idx}]"), err)
                                    .with_value(s.clone()),
                            );
                        }
                    },
                    other => {
                        issues.push(
                            ValidationIssue::error(
                                key,
                                format!("participants[{idx}]"),
                                "must be a character id string",
                            )
                            .with_value(json_kind(other)),
                        );
                    }
                }
            }
        }
        Some(other) => {
            issues.push(
                ValidationIssue::error(key, "participants", "must be a list of character ids")
                    .with_value(json_kind(other)),
            );
        }
    }

    let mut accounts = Vec::new();
    match doc.get("accounts") {
        None => {}
        Some(Value::Array(entries)) => {
            for (idx, entry) in entries.iter().enumerate() {
                if let Some(account) = decode_account(key, idx, entry, issues) {
                    accounts.push(account);
                }
            }
        }
        Some(other) => {
            issues.push(
                ValidationIssue::error(key, "accounts", "must be a list of accounts")
                    .with_value(json_kind(other)),
            );
        }
    }

    let parallels = decode_parallels(doc, key, issues);
    let tags = decode_tags(doc, key, issues);
    let citations = optional_string_list(doc, "citations", key, issues);
    let textual_variants = decode_variants_at(doc, "textual_variants", "", key, issues);

    if error_count(issues) > before {
        return None;
    }

    Some(Event {
        id: id?,
        label: label?,
        participants,
        accounts,
        parallels,
        tags,
        citations,
        textual_variants,
    })
}

fn decode_account(
    entity: &str,
    idx: usize,
    entry: &Value,
    issues: &mut Vec<ValidationIssue>,
) -> Option<EventAccount> {
    let path = format!("accounts[{idx}]");
    let Value::Object(doc) = entry else {
        issues.push(
            ValidationIssue::error(entity, &path, "must be an object").with_value(json_kind(entry)),
        );
        return None;
    };

    let source_id = expect_source_id(doc, &format!("{path}.source_id"), "source_id", entity, issues);
    let reference = expect_string_at(doc, "reference", &path, entity, issues);
    let summary = expect_string_at(doc, "summary", &path, entity, issues);

    let notes = match doc.get("notes") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.clone()),
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, format!("{path}.notes"), "must be a string")
                    .with_value(json_kind(other)),
            );
            None
        }
    };

    let variants = decode_variants(doc, &path, entity, issues);

    Some(EventAccount {
        source_id: source_id?,
        reference: reference?,
        summary: summary?,
        notes,
        variants,
    })
}

fn decode_parallels(
    doc: &RawDocument,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<Parallel> {
    let entries = match doc.get("parallels") {
        None => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, "parallels", "must be a list")
                    .with_value(json_kind(other)),
            );
            return Vec::new();
        }
    };

    let mut parallels = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let path = format!("parallels[{idx}]");
        let Value::Object(par) = entry else {
            issues.push(
                ValidationIssue::error(entity, &path, "must be an object")
                    .with_value(json_kind(entry)),
            );
            continue;
        };

        let sources = decode_source_id_list(par, "sources", &path, entity, true, issues);
        let relationship = match par.get("relationship") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.clone(),
            Some(other) => {
                issues.push(
                    ValidationIssue::error(
                        entity,
                        format!("{path}.relationship"),
                        "must be a non-empty string",
                    )
                    .with_value(json_kind(other)),
                );
                continue;
            }
            None => {
                issues.push(ValidationIssue::error(
                    entity,
                    format!("{path}.relationship"),
                    "required field is missing",
                ));
                continue;
            }
        };

        let mut references = BTreeMap::new();
        match par.get("references") {
            None => {}
            Some(Value::Object(map)) => {
                for (source, reference) in map {
                    let ref_path = format!("{path}.references.{source}");
                    let source = match SourceId::new(source.clone()) {
                        Ok(s) => s,
                        Err(err) => {
                            issues.push(ValidationIssue::error(entity, &ref_path, err));
                            continue;
                        }
                    };
                    match reference {
                        Value::String(s) => {
                            references.insert(source, s.clone());
                        }
                        other => {
                            issues.push(
                                ValidationIssue::error(entity, &ref_path, "must be a string")
                                    .with_value(json_kind(other)),
                            );
                        }
                    }
                }
            }
            Some(other) => {
                issues.push(
                    ValidationIssue::error(
                        entity,
                        format!("{path}.references"),
                        "must map source ids to references",
                    )
                    .with_value(json_kind(other)),
                );
            }
        }

        parallels.push(Parallel {
            sources,
            relationship,
            references,
        });
    }
    parallels
}

// =============================================================================
// CROSS-REFERENCE PASS
// =============================================================================

/// Enforce the referential invariants over a decoded corpus.
///
/// Every profile and account source must be in the registry, relationship
/// targets and event participants must resolve to characters, and any other
/// source reference must also be registered.
#[must_use]
pub fn check_cross_references(
    characters: &BTreeMap<EntityId, Character>,
    events: &BTreeMap<EntityId, Event>,
    sources: &BTreeMap<SourceId, SourceMeta>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let require_source =
        |entity: &EntityId, path: String, source: &SourceId, issues: &mut Vec<ValidationIssue>| {
            if !sources.contains_key(source) {
                issues.push(
                    ValidationIssue::error(
                        entity.as_str(),
                        path,
                        "source is not in the source registry",
                    )
                    .with_value(source.as_str()),
                );
            }
        };

    for (id, character) in characters {
        for (idx, profile) in character.source_profiles.iter().enumerate() {
            require_source(
                id,
                format!("source_profiles[{idx}].source_id"),
                &profile.source_id,
                &mut issues,
            );
        }
        for (idx, relationship) in character.relationships.iter().enumerate() {
            if !characters.contains_key(&relationship.character_id) {
                issues.push(
                    ValidationIssue::error(
                        id.as_str(),
                        format!("relationships[{idx}].character_id"),
                        "relationship target does not exist",
                    )
                    .with_value(relationship.character_id.as_str()),
                );
            }
            for (sidx, source) in relationship.sources.iter().enumerate() {
                require_source(
                    id,
                    format!("relationships[{idx}].sources[{sidx}]"),
                    source,
                    &mut issues,
                );
            }
        }
    }

    for (id, event) in events {
        for (idx, participant) in event.participants.iter().enumerate() {
            if !characters.contains_key(participant) {
                issues.push(
                    ValidationIssue::error(
                        id.as_str(),
                        format!("participants[{idx}]"),
                        "participant does not exist",
                    )
                    .with_value(participant.as_str()),
                );
            }
        }
        for (idx, account) in event.accounts.iter().enumerate() {
            require_source(
                id,
                format!("accounts[{idx}].source_id"),
                &account.source_id,
                &mut issues,
            );
        }
        for (idx, parallel) in event.parallels.iter().enumerate() {
            for (sidx, source) in parallel.sources.iter().enumerate() {
                require_source(
                    id,
                    format!("parallels[{idx}].sources[{sidx}]"),
                    source,
                    &mut issues,
                );
            }
            for source in parallel.references.keys() {
                require_source(
                    id,
                    format!("parallels[{idx}].references.{source}"),
                    source,
                    &mut issues,
                );
            }
        }
    }

    issues
}

// =============================================================================
// SCRIPTURE REFERENCE CHECKS
// =============================================================================

/// Books with known chapter counts, used for best-effort reference checks.
const BOOK_MAX_CHAPTER: &[(&str, u32)] = &[
    ("Matthew", 28),
    ("Mark", 16),
    ("Luke", 24),
    ("John", 21),
];

/// The outcome of parsing a scripture reference string.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReferenceCheck {
    pub valid: bool,
    pub error: Option<String>,
    pub book: Option<String>,
    pub chapter: Option<u32>,
    pub verse_start: Option<u32>,
    pub verse_end: Option<u32>,
    /// True when the book is in the internal chapter table.
    pub canonical: bool,
}

/// Parse and check a `Book C:V[-V]` reference.
///
/// References are opaque to the rest of the engine; this check exists so
/// `validate_all` can surface obviously broken citations as warnings.
#[must_use]
pub fn validate_reference(reference: &str) -> ReferenceCheck {
    let mut result = ReferenceCheck::default();
    let reference = reference.trim();
    if reference.is_empty() {
        result.error = Some("empty reference".to_string());
        return result;
    }

    let Some((book_raw, locus)) = reference.rsplit_once(' ') else {
        result.error = Some("unrecognized reference format".to_string());
        return result;
    };
    let Some((chapter_str, verses)) = locus.split_once(':') else {
        result.error = Some("unrecognized reference format".to_string());
        return result;
    };
    let (start_str, end_str) = match verses.split_once('-') {
        Some((start, end)) => (start, Some(end)),
        None => (verses, None),
    };

    let Ok(chapter) = chapter_str.parse::<u32>() else {
        result.error = Some("non-numeric chapter or verse".to_string());
        return result;
    };
    let Ok(verse_start) = start_str.parse::<u32>() else {
        result.error = Some("non-numeric chapter or verse".to_string());
        return result;
    };
    let verse_end = match end_str {
        Some(end) => match end.parse::<u32>() {
            Ok(v) => v,
            Err(_) => {
                result.error = Some("non-numeric chapter or verse".to_string());
                return result;
            }
        },
        None => verse_start,
    };

    let book = normalize_book_name(book_raw);
    result.book = Some(book.clone());
    result.chapter = Some(chapter);
    result.verse_start = Some(verse_start);
    result.verse_end = Some(verse_end);

    let Some(&(_, max_chapter)) = BOOK_MAX_CHAPTER.iter().find(|(name, _)| *name == book) else {
        result.error = Some(format!("unknown book '{book}'"));
        return result;
    };
    result.canonical = true;

    if chapter < 1 || chapter > max_chapter {
        result.error = Some(format!("book '{book}' has only {max_chapter} chapters"));
        return result;
    }
    if verse_start < 1 || verse_end < verse_start {
        result.error = Some("invalid verse range".to_string());
        return result;
    }

    result.valid = true;
    result
}

fn normalize_book_name(raw: &str) -> String {
    raw.split_whitespace()
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) if first.is_ascii_alphabetic() => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_lowercase()
                }
                _ => part.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Warnings for unparseable references in books with a known chapter table.
///
/// Free-form citations and unknown books pass silently.
#[must_use]
pub fn reference_warnings(
    characters: &BTreeMap<EntityId, Character>,
    events: &BTreeMap<EntityId, Event>,
) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    let check = |entity: &EntityId, path: String, reference: &str, issues: &mut Vec<_>| {
        let result = validate_reference(reference);
        if result.canonical && !result.valid {
            let message = result.error.unwrap_or_else(|| "invalid reference".to_string());
            issues.push(
                ValidationIssue::warning(entity.as_str(), path, message)
                    .with_value(reference.to_string()),
            );
        }
    };

    for (id, character) in characters {
        for (pidx, profile) in character.source_profiles.iter().enumerate() {
            for (ridx, reference) in profile.references.iter().enumerate() {
                check(
                    id,
                    format!("source_profiles[{pidx}].references[{ridx}]"),
                    reference,
                    &mut issues,
                );
            }
        }
    }
    for (id, event) in events {
        for (aidx, account) in event.accounts.iter().enumerate() {
            check(
                id,
                format!("accounts[{aidx}].reference"),
                &account.reference,
                &mut issues,
            );
        }
    }

    issues
}

// =============================================================================
// SERIALIZATION BACK TO RAW DOCUMENTS
// =============================================================================

/// Serialize a character into the raw document shape the gate accepts.
pub fn character_to_raw(character: &Character) -> Result<RawDocument, TestamentError> {
    entity_to_raw(character)
}

/// Serialize an event into the raw document shape the gate accepts.
pub fn event_to_raw(event: &Event) -> Result<RawDocument, TestamentError> {
    entity_to_raw(event)
}

fn entity_to_raw<T: serde::Serialize>(entity: &T) -> Result<RawDocument, TestamentError> {
    match serde_json::to_value(entity) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(TestamentError::Storage(
            "entity did not serialize to an object".to_string(),
        )),
        Err(err) => Err(TestamentError::Storage(format!(
            "entity serialization failed: {err}"
        ))),
    }
}

// =============================================================================
// DECODE HELPERS
// =============================================================================

fn error_count(issues: &[ValidationIssue]) -> usize {
    issues
        .iter()
        .filter(|i| i.severity == crate::types::IssueSeverity::Error)
        .count()
}

fn json_kind(value: &Value) -> String {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "an object",
    }
    .to_string()
}

/// Decode and check the `id` field against the storage key.
fn expect_entity_id(
    doc: &RawDocument,
    key: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<EntityId> {
    match doc.get("id") {
        Some(Value::String(s)) => match EntityId::new(s.clone()) {
            Ok(id) => {
                if id.as_str() != key {
                    issues.push(
                        ValidationIssue::error(
                            key,
                            "id",
                            format!("id '{id}' does not match storage key '{key}'"),
                        )
                        .with_value(s.clone()),
                    );
                    None
                } else {
                    Some(id)
                }
            }
            Err(err) => {
                issues.push(ValidationIssue::error(key, "id", err).with_value(s.clone()));
                None
            }
        },
        Some(other) => {
            issues.push(
                ValidationIssue::error(key, "id", "must be a string")
                    .with_value(json_kind(other)),
            );
            None
        }
        None => {
            issues.push(ValidationIssue::error(key, "id", "required field is missing"));
            None
        }
    }
}

fn expect_string(
    doc: &RawDocument,
    field: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
    expect_string_at(doc, field, "", entity, issues)
}

fn expect_string_at(
    doc: &RawDocument,
    field: &str,
    prefix: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<String> {
    let path = join_path(prefix, field);
    match doc.get(field) {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
        Some(Value::String(s)) => {
            issues.push(
                ValidationIssue::error(entity, path, "must be a non-empty string")
                    .with_value(s.clone()),
            );
            None
        }
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, path, "must be a non-empty string")
                    .with_value(json_kind(other)),
            );
            None
        }
        None => {
            issues.push(ValidationIssue::error(entity, path, "required field is missing"));
            None
        }
    }
}

fn expect_source_id(
    doc: &RawDocument,
    path: &str,
    field: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Option<SourceId> {
    match doc.get(field) {
        Some(Value::String(s)) => match SourceId::new(s.clone()) {
            Ok(id) => Some(id),
            Err(err) => {
                issues.push(ValidationIssue::error(entity, path, err).with_value(s.clone()));
                None
            }
        },
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, path, "must be a source id string")
                    .with_value(json_kind(other)),
            );
            None
        }
        None => {
            issues.push(ValidationIssue::error(entity, path, "required field is missing"));
            None
        }
    }
}

fn optional_string_list(
    doc: &RawDocument,
    field: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<String> {
    optional_string_list_at(doc, field, "", entity, issues)
}

fn optional_string_list_at(
    doc: &RawDocument,
    field: &str,
    prefix: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<String> {
    let path = join_path(prefix, field);
    match doc.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => {
            let mut result = Vec::new();
            for (idx, entry) in entries.iter().enumerate() {
                match entry {
                    Value::String(s) => result.push(s.clone()),
                    other => {
                        issues.push(
                            ValidationIssue::error(
                                entity,
                                format!("{path}[{idx}]"),
                                "must be a string",
                            )
                            .with_value(json_kind(other)),
                        );
                    }
                }
            }
            result
        }
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, path, "must be a list of strings")
                    .with_value(json_kind(other)),
            );
            Vec::new()
        }
    }
}

/// Tags must be non-empty after trimming; comparison is case-insensitive but
/// the stored value keeps its original casing.
fn decode_tags(
    doc: &RawDocument,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<String> {
    let tags = optional_string_list(doc, "tags", entity, issues);
    let mut result = Vec::new();
    for (idx, tag) in tags.into_iter().enumerate() {
        if tag.trim().is_empty() {
            issues.push(ValidationIssue::error(
                entity,
                format!("tags[{idx}]"),
                "tag is empty after trimming",
            ));
        } else {
            result.push(tag);
        }
    }
    result
}

fn decode_variants(
    doc: &RawDocument,
    prefix: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<TextualVariant> {
    decode_variants_at(doc, "variants", prefix, entity, issues)
}

fn decode_variants_at(
    doc: &RawDocument,
    field: &str,
    prefix: &str,
    entity: &str,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<TextualVariant> {
    let path = join_path(prefix, field);
    let entries = match doc.get(field) {
        None => return Vec::new(),
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, path, "must be a list of variants")
                    .with_value(json_kind(other)),
            );
            return Vec::new();
        }
    };

    let mut variants = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        let vpath = format!("{path}[{idx}]");
        let Value::Object(obj) = entry else {
            issues.push(
                ValidationIssue::error(entity, &vpath, "must be an object")
                    .with_value(json_kind(entry)),
            );
            continue;
        };
        let manuscript_family = expect_string_at(obj, "manuscript_family", &vpath, entity, issues);
        let reading = expect_string_at(obj, "reading", &vpath, entity, issues);
        let significance = expect_string_at(obj, "significance", &vpath, entity, issues);
        if let (Some(manuscript_family), Some(reading), Some(significance)) =
            (manuscript_family, reading, significance)
        {
            variants.push(TextualVariant {
                manuscript_family,
                reading,
                significance,
            });
        }
    }
    variants
}

fn decode_source_id_list(
    doc: &RawDocument,
    field: &str,
    prefix: &str,
    entity: &str,
    required: bool,
    issues: &mut Vec<ValidationIssue>,
) -> Vec<SourceId> {
    let path = join_path(prefix, field);
    let entries = match doc.get(field) {
        None => {
            if required {
                issues.push(ValidationIssue::error(entity, path, "required field is missing"));
            }
            return Vec::new();
        }
        Some(Value::Array(entries)) => entries,
        Some(other) => {
            issues.push(
                ValidationIssue::error(entity, path, "must be a list of source ids")
                    .with_value(json_kind(other)),
            );
            return Vec::new();
        }
    };

    let mut result = Vec::new();
    for (idx, entry) in entries.iter().enumerate() {
        match entry {
            Value::String(s) => match SourceId::new(s.clone()) {
                Ok(id) => result.push(id),
                Err(err) => {
                    issues.push(
                        ValidationIssue::error(entity, format!("{path}[{idx}]"), err)
                            .with_value(s.clone()),
                    );
                }
            },
            other => {
                issues.push(
                    ValidationIssue::error(
                        entity,
                        format!("{path}[{idx}]"),
                        "must be a source id string",
                    )
                    .with_value(json_kind(other)),
                );
            }
        }
    }
    result
}

fn join_path(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_string()
    } else {
        format!("{prefix}.{field}")
    }
}

// =============================================================================
// TESTS
// =============================================================================
