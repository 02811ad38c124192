//! # Core Type Definitions
//!
//! This module contains all core types for the testament engine:
//! - Entity and source identifiers (`EntityId`, `SourceId`)
//! - Corpus entities (`Character`, `Event`, `SourceProfile`, `EventAccount`)
//! - Source registry metadata (`SourceMeta`)
//! - Error types (`TestamentError`, `ValidationIssue`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Implement `Ord` where they are used as map keys, so `BTreeMap`/`BTreeSet`
//!   iteration is deterministic
//! - Keep list fields in document order; keyed fields use `BTreeMap`

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::hooks::HookPoint;

// =============================================================================
// IDENTIFIERS
// =============================================================================

/// Unique identifier for a character or event.
///
/// An `EntityId` is non-empty lowercase snake_case (`[a-z][a-z0-9_]*`) and
/// always equals the storage document key the entity was loaded from.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(try_from = "String", into = "String")]
pub struct EntityId(String);

impl EntityId {
    /// Parse an id, rejecting anything that is not lowercase snake_case.
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if is_snake_case(&s) {
            Ok(Self(s))
        } else {
            Err(format!("'{s}' is not a lowercase snake_case identifier"))
        }
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for EntityId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<EntityId> for String {
    fn from(id: EntityId) -> Self {
        id.0
    }
}

/// Short lowercase token naming a corpus source (e.g. `mark`, `paul_undisputed`).
///
/// Every `SourceId` referenced anywhere in the corpus must be present in the
/// loaded source registry.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(try_from = "String", into = "String")]
pub struct SourceId(String);

impl SourceId {
    /// Parse a source token, rejecting anything that is not lowercase snake_case.
    pub fn new(s: impl Into<String>) -> Result<Self, String> {
        let s = s.into();
        if is_snake_case(&s) {
            Ok(Self(s))
        } else {
            Err(format!("'{s}' is not a lowercase source token"))
        }
    }

    /// Get the token as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SourceId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<SourceId> for String {
    fn from(id: SourceId) -> Self {
        id.0
    }
}

/// Check for `[a-z][a-z0-9_]*`.
fn is_snake_case(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Normalize a tag for comparison and indexing.
///
/// Tags are compared by trimmed, lowercased value.
#[must_use]
pub fn normalize_tag(tag: &str) -> String {
    tag.trim().to_lowercase()
}

/// The two entity kinds the engine stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Character,
    Event,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Character => f.write_str("character"),
            Self::Event => f.write_str("event"),
        }
    }
}

// =============================================================================
// TEXTUAL VARIANTS
// =============================================================================

/// A variant reading from a manuscript family.
///
/// Captures differences between manuscript traditions (MT, LXX, P46, ...)
/// that matter for how a character or event is portrayed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextualVariant {
    /// Manuscript family or witness, e.g. "LXX" or "Codex Sinaiticus".
    pub manuscript_family: String,
    /// The specific text or value in this tradition.
    pub reading: String,
    /// Why this variant matters for interpretation.
    pub significance: String,
}

// =============================================================================
// CHARACTERS
// =============================================================================

/// Per-source character profile.
///
/// Each source presents its own portrayal of a character; the profile holds
/// that source's traits, scripture references, and optional variants and
/// bibliography keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceProfile {
    pub source_id: SourceId,
    #[serde(default)]
    pub traits: BTreeMap<String, String>,
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default)]
    pub variants: Vec<TextualVariant>,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// A directed relationship from the owning character to another character.
///
/// Relationships form a graph over characters; cycles are legal. The target
/// is stored as an id and resolved through the snapshot, never as a pointer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    /// The other character.
    pub character_id: EntityId,
    /// Relationship type, e.g. "brother" or "disciple".
    #[serde(rename = "type")]
    pub kind: String,
    /// Sources attesting this relationship.
    pub sources: Vec<SourceId>,
    /// Scripture references backing the attestation.
    #[serde(default)]
    pub references: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// A character in the corpus, with one profile per attesting source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Character {
    pub id: EntityId,
    pub canonical_name: String,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub roles: Vec<String>,
    pub source_profiles: Vec<SourceProfile>,
    #[serde(default)]
    pub relationships: Vec<Relationship>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl Character {
    /// Get the profile for a given source, if present.
    #[must_use]
    pub fn source_profile(&self, source_id: &SourceId) -> Option<&SourceProfile> {
        self.source_profiles
            .iter()
            .find(|p| &p.source_id == source_id)
    }

    /// List the attesting sources in first-seen order, without duplicates.
    #[must_use]
    pub fn source_ids(&self) -> Vec<SourceId> {
        let mut seen = std::collections::BTreeSet::new();
        let mut result = Vec::new();
        for profile in &self.source_profiles {
            if seen.insert(profile.source_id.clone()) {
                result.push(profile.source_id.clone());
            }
        }
        result
    }

    /// Check whether any profile carries the named trait (case-insensitive),
    /// falling back to tag membership.
    #[must_use]
    pub fn has_trait(&self, name: &str) -> bool {
        let needle = name.to_lowercase();
        self.source_profiles
            .iter()
            .any(|p| p.traits.keys().any(|k| k.to_lowercase() == needle))
            || self.tags.iter().any(|t| normalize_tag(t) == needle)
    }
}

// =============================================================================
// EVENTS
// =============================================================================

/// Per-source account of an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAccount {
    pub source_id: SourceId,
    /// Scripture citation for this account.
    pub reference: String,
    pub summary: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub variants: Vec<TextualVariant>,
}

/// A synoptic parallel linking the accounts of several sources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Parallel {
    pub sources: Vec<SourceId>,
    /// How the parallel accounts relate, e.g. "triple tradition".
    pub relationship: String,
    #[serde(default)]
    pub references: BTreeMap<SourceId, String>,
}

/// An event in the corpus, with one account per reporting source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Event {
    pub id: EntityId,
    pub label: String,
    #[serde(default)]
    pub participants: Vec<EntityId>,
    #[serde(default)]
    pub accounts: Vec<EventAccount>,
    #[serde(default)]
    pub parallels: Vec<Parallel>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub citations: Vec<String>,
    #[serde(default)]
    pub textual_variants: Vec<TextualVariant>,
}

impl Event {
    /// Get the account for a given source, if present.
    #[must_use]
    pub fn account(&self, source_id: &SourceId) -> Option<&EventAccount> {
        self.accounts.iter().find(|a| &a.source_id == source_id)
    }
}

// =============================================================================
// SOURCE REGISTRY
// =============================================================================

/// Metadata about a corpus source.
///
/// The source registry is a read-mostly collection of these, loaded once at
/// startup and replaced only by an explicit reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceMeta {
    pub source_id: SourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_range: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audience: Option<String>,
    #[serde(default)]
    pub depends_on: Vec<SourceId>,
}

// =============================================================================
// VALIDATION ISSUES
// =============================================================================

/// Whether an issue rejects the load or merely surfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Warning,
    Error,
}

/// A single structured validation finding.
///
/// One ingestion run reports every issue it finds, keyed by the entity and
/// the field path that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    /// Id of the offending entity, or the storage key when no id decoded.
    pub entity_id: String,
    /// Dotted path of the offending field, e.g. `source_profiles[0].source_id`.
    pub field_path: String,
    /// The offending value, when one exists.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub message: String,
}

impl ValidationIssue {
    /// Construct an error-severity issue.
    #[must_use]
    pub fn error(
        entity_id: impl Into<String>,
        field_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: IssueSeverity::Error,
            entity_id: entity_id.into(),
            field_path: field_path.into(),
            value: None,
            message: message.into(),
        }
    }

    /// Construct a warning-severity issue.
    #[must_use]
    pub fn warning(
        entity_id: impl Into<String>,
        field_path: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            entity_id: entity_id.into(),
            field_path: field_path.into(),
            value: None,
            message: message.into(),
        }
    }

    /// Attach the offending value.
    #[must_use]
    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}",
            self.entity_id, self.field_path, self.message
        )
    }
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors surfaced by public engine operations.
///
/// - No silent failures
/// - Use `Result<T, TestamentError>` for fallible operations
/// - The engine should never panic; all errors are recoverable
#[derive(Debug, Error)]
pub enum TestamentError {
    /// The requested entity is absent from storage.
    #[error("{kind} '{id}' not found")]
    DataNotFound { kind: EntityKind, id: String },

    /// Ingestion or cross-reference validation failed. Carries the full
    /// issue list for the run, not just the first finding.
    #[error("validation failed with {} error(s)", .0.len())]
    Validation(Vec<ValidationIssue>),

    /// A storage adapter operation failed.
    #[error("storage error: {0}")]
    Storage(String),

    /// A cache registry invariant was violated.
    #[error("cache error: {0}")]
    Cache(String),

    /// An option is invalid or a path is unresolvable.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An invalid scope value or malformed query.
    #[error("search error: {0}")]
    Search(String),

    /// A hook handler set the abort flag on the surrounding operation.
    #[error("operation aborted by hook at '{0}'")]
    AbortedByHook(HookPoint),
}

impl TestamentError {
    /// Shorthand for a not-found error.
    #[must_use]
    pub fn not_found(kind: EntityKind, id: impl Into<String>) -> Self {
        Self::DataNotFound {
            kind,
            id: id.into(),
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_id_accepts_snake_case() {
        assert!(EntityId::new("andrew").is_ok());
        assert!(EntityId::new("john_the_baptist").is_ok());
        assert!(EntityId::new("q2_source").is_ok());
    }

    #[test]
    fn entity_id_rejects_bad_shapes() {
        assert!(EntityId::new("").is_err());
        assert!(EntityId::new("Andrew").is_err());
        assert!(EntityId::new("2john").is_err());
        assert!(EntityId::new("john-baptist").is_err());
        assert!(EntityId::new("john baptist").is_err());
    }

    #[test]
    fn entity_id_serde_roundtrip() {
        let id = EntityId::new("peter").expect("valid id");
        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"peter\"");
        let back: EntityId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn entity_id_serde_rejects_invalid() {
        let result: Result<EntityId, _> = serde_json::from_str("\"Not Snake\"");
        assert!(result.is_err());
    }

    #[test]
    fn tag_normalization_trims_and_lowercases() {
        assert_eq!(normalize_tag("  Apocalyptic "), "apocalyptic");
        assert_eq!(normalize_tag("APOSTLE"), "apostle");
    }

    #[test]
    fn character_source_ids_deduplicate_in_order() {
        let character = Character {
            id: EntityId::new("jesus").expect("id"),
            canonical_name: "Jesus".to_string(),
            source_profiles: vec![
                SourceProfile {
                    source_id: SourceId::new("mark").expect("source"),
                    ..SourceProfile::default()
                },
                SourceProfile {
                    source_id: SourceId::new("john").expect("source"),
                    ..SourceProfile::default()
                },
                SourceProfile {
                    source_id: SourceId::new("mark").expect("source"),
                    ..SourceProfile::default()
                },
            ],
            ..Character::default()
        };

        let ids: Vec<String> = character
            .source_ids()
            .into_iter()
            .map(|s| s.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["mark", "john"]);
    }

    #[test]
    fn character_has_trait_checks_traits_and_tags() {
        let mut profile = SourceProfile {
            source_id: SourceId::new("mark").expect("source"),
            ..SourceProfile::default()
        };
        profile
            .traits
            .insert("christology".to_string(), "low".to_string());

        let character = Character {
            id: EntityId::new("jesus").expect("id"),
            canonical_name: "Jesus".to_string(),
            source_profiles: vec![profile],
            tags: vec!["Messianic".to_string()],
            ..Character::default()
        };

        assert!(character.has_trait("Christology"));
        assert!(character.has_trait("messianic"));
        assert!(!character.has_trait("eschatology"));
    }

    #[test]
    fn relationship_type_field_serializes_as_type() {
        let rel = Relationship {
            character_id: EntityId::new("peter").expect("id"),
            kind: "brother".to_string(),
            sources: vec![SourceId::new("mark").expect("source")],
            references: vec!["Mark 1:16".to_string()],
            notes: None,
        };

        let value = serde_json::to_value(&rel).expect("serialize");
        assert_eq!(value["type"], "brother");
        assert!(value.get("kind").is_none());
    }

    #[test]
    fn validation_issue_display_names_entity_and_field() {
        let issue = ValidationIssue::error("andrew", "canonical_name", "must be non-empty");
        assert_eq!(
            issue.to_string(),
            "andrew: canonical_name: must be non-empty"
        );
    }

    #[test]
    fn issue_severity_orders_warning_below_error() {
        assert!(IssueSeverity::Warning < IssueSeverity::Error);
    }
}
