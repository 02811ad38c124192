//! # Search
//!
//! Case-insensitive substring scan across characters and events, with a
//! tag-index fast path. The scan is linear in corpus size, which is
//! acceptable for a bounded corpus of dozens to hundreds of entities; exact
//! tag matches resolve through the index instead.
//!
//! The engine wraps `scan` with the search hook points; this module is the
//! pure part.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use crate::snapshot::Snapshot;
use crate::types::{EntityId, EntityKind, SourceId, TestamentError};

// =============================================================================
// SCOPE
// =============================================================================

/// Searchable domains. The same names describe where a match was found.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SearchScope {
    Traits,
    References,
    Accounts,
    Notes,
    Tags,
}

impl SearchScope {
    /// Every scope, in the order results sort.
    pub const ALL: [Self; 5] = [
        Self::Traits,
        Self::References,
        Self::Accounts,
        Self::Notes,
        Self::Tags,
    ];

    /// The snake_case label of the scope.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Traits => "traits",
            Self::References => "references",
            Self::Accounts => "accounts",
            Self::Notes => "notes",
            Self::Tags => "tags",
        }
    }
}

impl fmt::Display for SearchScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchScope {
    type Err = TestamentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "traits" => Ok(Self::Traits),
            "references" => Ok(Self::References),
            "accounts" => Ok(Self::Accounts),
            "notes" => Ok(Self::Notes),
            "tags" => Ok(Self::Tags),
            other => Err(TestamentError::Search(format!(
                "unknown search scope '{other}'"
            ))),
        }
    }
}

// =============================================================================
// MATCH RECORD
// =============================================================================

/// One match site. The key set is stable; context fields are present when
/// the match site provides them.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct SearchMatch {
    #[serde(rename = "type")]
    pub kind: EntityKind,
    pub id: EntityId,
    pub match_in: SearchScope,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<SourceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

impl SearchMatch {
    fn new(kind: EntityKind, id: EntityId, match_in: SearchScope) -> Self {
        Self {
            kind,
            id,
            match_in,
            source_id: None,
            field: None,
            value: None,
            reference: None,
            tag: None,
        }
    }
}

fn contains(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

// =============================================================================
// SCAN
// =============================================================================

/// Substring-scan the snapshot for a lowercased needle.
///
/// Emits one record per distinct match site, deduplicated and sorted by
/// (type, id, match site).
#[must_use]
pub fn scan(snapshot: &Snapshot, needle: &str, scopes: &BTreeSet<SearchScope>) -> Vec<SearchMatch> {
    let mut results = BTreeSet::new();

    if scopes.contains(&SearchScope::Traits)
        || scopes.contains(&SearchScope::References)
        || scopes.contains(&SearchScope::Tags)
    {
        for character in snapshot.iter_characters() {
            for profile in &character.source_profiles {
                if scopes.contains(&SearchScope::Traits) {
                    for (trait_key, trait_value) in &profile.traits {
                        if contains(trait_key, needle) || contains(trait_value, needle) {
                            let mut m = SearchMatch::new(
                                EntityKind::Character,
                                character.id.clone(),
                                SearchScope::Traits,
                            );
                            m.source_id = Some(profile.source_id.clone());
                            m.field = Some(trait_key.clone());
                            m.value = Some(trait_value.clone());
                            results.insert(m);
                        }
                    }
                }
                if scopes.contains(&SearchScope::References) {
                    for reference in &profile.references {
                        if contains(reference, needle) {
                            let mut m = SearchMatch::new(
                                EntityKind::Character,
                                character.id.clone(),
                                SearchScope::References,
                            );
                            m.source_id = Some(profile.source_id.clone());
                            m.reference = Some(reference.clone());
                            results.insert(m);
                        }
                    }
                }
            }
            if scopes.contains(&SearchScope::Tags) {
                for tag in &character.tags {
                    if contains(tag, needle) {
                        let mut m = SearchMatch::new(
                            EntityKind::Character,
                            character.id.clone(),
                            SearchScope::Tags,
                        );
                        m.tag = Some(tag.clone());
                        results.insert(m);
                    }
                }
            }
        }
    }

    if scopes.contains(&SearchScope::Accounts)
        || scopes.contains(&SearchScope::Notes)
        || scopes.contains(&SearchScope::Tags)
    {
        for event in snapshot.iter_events() {
            for account in &event.accounts {
                if scopes.contains(&SearchScope::Accounts)
                    && (contains(&account.summary, needle) || contains(&account.reference, needle))
                {
                    let mut m = SearchMatch::new(
                        EntityKind::Event,
                        event.id.clone(),
                        SearchScope::Accounts,
                    );
                    m.source_id = Some(account.source_id.clone());
                    m.reference = Some(account.reference.clone());
                    m.value = Some(account.summary.clone());
                    results.insert(m);
                }
                if scopes.contains(&SearchScope::Notes) {
                    if let Some(notes) = &account.notes {
                        if contains(notes, needle) {
                            let mut m = SearchMatch::new(
                                EntityKind::Event,
                                event.id.clone(),
                                SearchScope::Notes,
                            );
                            m.source_id = Some(account.source_id.clone());
                            m.reference = Some(account.reference.clone());
                            m.value = Some(notes.clone());
                            results.insert(m);
                        }
                    }
                }
            }
            if scopes.contains(&SearchScope::Tags) {
                for tag in &event.tags {
                    if contains(tag, needle) {
                        let mut m = SearchMatch::new(
                            EntityKind::Event,
                            event.id.clone(),
                            SearchScope::Tags,
                        );
                        m.tag = Some(tag.clone());
                        results.insert(m);
                    }
                }
            }
        }
    }

    results.into_iter().collect()
}

/// Seed results from the tag index when the query is exactly a known tag.
#[must_use]
pub fn tag_seed(snapshot: &Snapshot, query: &str) -> Vec<SearchMatch> {
    if !snapshot.is_known_tag(query) {
        return Vec::new();
    }

    let mut results = Vec::new();
    for id in snapshot.characters_with_tag(query) {
        let tag = snapshot
            .character(&id)
            .and_then(|c| {
                c.tags
                    .iter()
                    .find(|t| crate::types::normalize_tag(t) == crate::types::normalize_tag(query))
                    .cloned()
            });
        let mut m = SearchMatch::new(EntityKind::Character, id, SearchScope::Tags);
        m.tag = tag;
        results.push(m);
    }
    for id in snapshot.events_with_tag(query) {
        let tag = snapshot
            .event(&id)
            .and_then(|e| {
                e.tags
                    .iter()
                    .find(|t| crate::types::normalize_tag(t) == crate::types::normalize_tag(query))
                    .cloned()
            });
        let mut m = SearchMatch::new(EntityKind::Event, id, SearchScope::Tags);
        m.tag = tag;
        results.push(m);
    }
    results
}

/// Parse a scope list, defaulting to every scope when absent or empty.
pub fn parse_scopes(scope: Option<&[String]>) -> Result<BTreeSet<SearchScope>, TestamentError> {
    match scope {
        None => Ok(SearchScope::ALL.into_iter().collect()),
        Some(values) if values.is_empty() => Ok(SearchScope::ALL.into_iter().collect()),
        Some(values) => {
            let mut scopes = BTreeSet::new();
            for value in values {
                scopes.insert(value.parse::<SearchScope>()?);
            }
            Ok(scopes)
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        Character, Event, EventAccount, SourceMeta, SourceProfile, ValidationIssue,
    };
    use std::collections::BTreeMap;

    fn entity(id: &str) -> EntityId {
        EntityId::new(id).expect("valid id")
    }

    fn source(id: &str) -> SourceId {
        SourceId::new(id).expect("valid source")
    }

    fn fixture() -> Snapshot {
        let jesus = Character {
            id: entity("jesus"),
            canonical_name: "Jesus".to_string(),
            tags: vec!["Apocalyptic".to_string()],
            source_profiles: vec![SourceProfile {
                source_id: source("mark"),
                traits: BTreeMap::from([(
                    "kingdom_of_god".to_string(),
                    "The kingdom is at hand".to_string(),
                )]),
                references: vec!["Mark 1:15".to_string()],
                ..SourceProfile::default()
            }],
            ..Character::default()
        };
        let empty_tomb = Event {
            id: entity("empty_tomb"),
            label: "The Empty Tomb".to_string(),
            accounts: vec![EventAccount {
                source_id: source("mark"),
                reference: "Mark 16:1-8".to_string(),
                summary: "The women find the tomb empty".to_string(),
                notes: Some("Shorter ending".to_string()),
                variants: Vec::new(),
            }],
            tags: vec!["resurrection".to_string()],
            ..Event::default()
        };

        Snapshot::build(
            BTreeMap::from([(jesus.id.clone(), jesus)]),
            BTreeMap::from([(empty_tomb.id.clone(), empty_tomb)]),
            BTreeMap::from([(
                source("mark"),
                SourceMeta {
                    source_id: source("mark"),
                    ..SourceMeta::default()
                },
            )]),
            Vec::<ValidationIssue>::new(),
        )
    }

    fn all_scopes() -> BTreeSet<SearchScope> {
        SearchScope::ALL.into_iter().collect()
    }

    #[test]
    fn scan_finds_trait_keys_and_values() {
        let snapshot = fixture();

        let by_key = scan(&snapshot, "kingdom", &all_scopes());
        assert!(by_key
            .iter()
            .any(|m| m.match_in == SearchScope::Traits && m.id == entity("jesus")));

        let by_value = scan(&snapshot, "at hand", &all_scopes());
        assert_eq!(by_value.len(), 1);
        assert_eq!(by_value[0].field.as_deref(), Some("kingdom_of_god"));
        assert_eq!(by_value[0].source_id, Some(source("mark")));
    }

    #[test]
    fn scan_folds_haystack_case() {
        let snapshot = fixture();
        // "Shorter ending" matches a lowercase needle.
        let results = scan(&snapshot, "shorter", &all_scopes());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].value.as_deref(), Some("Shorter ending"));
    }

    #[test]
    fn scan_respects_scope_filter() {
        let snapshot = fixture();
        let only_notes: BTreeSet<SearchScope> = [SearchScope::Notes].into_iter().collect();

        let results = scan(&snapshot, "mark 16", &only_notes);
        assert!(results.is_empty());

        let results = scan(&snapshot, "shorter", &only_notes);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_in, SearchScope::Notes);
    }

    #[test]
    fn scan_finds_event_accounts_by_reference() {
        let snapshot = fixture();
        let results = scan(&snapshot, "mark 16", &all_scopes());
        assert!(results
            .iter()
            .any(|m| m.match_in == SearchScope::Accounts && m.id == entity("empty_tomb")));
    }

    #[test]
    fn results_sort_by_type_then_id_then_site() {
        let snapshot = fixture();
        let results = scan(&snapshot, "mark", &all_scopes());

        let mut sorted = results.clone();
        sorted.sort();
        assert_eq!(results, sorted);
        // Characters sort before events.
        assert_eq!(results.first().map(|m| m.kind), Some(EntityKind::Character));
    }

    #[test]
    fn tag_seed_matches_known_tags_case_insensitively() {
        let snapshot = fixture();

        let seeded = tag_seed(&snapshot, "APOCALYPTIC");
        assert_eq!(seeded.len(), 1);
        assert_eq!(seeded[0].id, entity("jesus"));
        assert_eq!(seeded[0].tag.as_deref(), Some("Apocalyptic"));

        assert!(tag_seed(&snapshot, "pharisee").is_empty());
    }

    #[test]
    fn parse_scopes_defaults_to_all_and_rejects_unknown() {
        assert_eq!(parse_scopes(None).expect("default"), all_scopes());
        assert_eq!(
            parse_scopes(Some(&[])).expect("empty defaults"),
            all_scopes()
        );

        let picked =
            parse_scopes(Some(&["traits".to_string(), "tags".to_string()])).expect("parse");
        assert_eq!(picked.len(), 2);

        let err = parse_scopes(Some(&["verses".to_string()]));
        assert!(matches!(err, Err(TestamentError::Search(_))));
    }
}
