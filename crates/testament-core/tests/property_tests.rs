//! # Property-Based Tests
//!
//! Determinism and correctness invariants checked with proptest: stable
//! dossier bytes, conflict monotonicity, round-trip neutrality of the
//! document gate, and case-insensitive tag lookup.

use proptest::collection::{btree_map, vec};
use proptest::prelude::*;
use std::collections::BTreeMap;

use testament_core::{
    claims_for_character, detect_conflicts, ingest, Character, EntityId, Snapshot, SourceId,
    SourceMeta, SourceProfile,
};

// =============================================================================
// STRATEGIES
// =============================================================================

fn snake_id() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9_]{0,10}"
}

fn trait_key() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("christology".to_string()),
        Just("ministry_location".to_string()),
        Just("resurrection_details".to_string()),
        Just("teaching_emphasis".to_string()),
        Just("opponents".to_string()),
    ]
}

fn trait_value() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("Galilee".to_string()),
        Just("Judea".to_string()),
        Just("parables".to_string()),
        Just("long discourses".to_string()),
        Just("none".to_string()),
        "[A-Za-z ]{1,20}",
    ]
}

fn character() -> impl Strategy<Value = Character> {
    let sources = vec!["mark", "matthew", "luke", "john", "paul_undisputed"];
    (
        snake_id(),
        proptest::sample::subsequence(sources, 1..=4),
        vec("[A-Za-z]{1,12}", 0..3),
        vec(btree_map(trait_key(), trait_value(), 0..4), 4),
    )
        .prop_map(|(id, source_picks, tags, trait_maps)| {
            // One profile per source, as curated corpora are laid out.
            let source_profiles = source_picks
                .into_iter()
                .zip(trait_maps)
                .map(|(source, traits)| SourceProfile {
                    source_id: SourceId::new(source).expect("valid source"),
                    traits,
                    references: vec!["Mark 1:1".to_string()],
                    ..SourceProfile::default()
                })
                .collect();
            Character {
                id: EntityId::new(id).expect("valid id"),
                canonical_name: "Someone".to_string(),
                source_profiles,
                tags,
                ..Character::default()
            }
        })
}

fn snapshot_for(character: &Character) -> Snapshot {
    let sources: BTreeMap<SourceId, SourceMeta> = character
        .source_profiles
        .iter()
        .map(|p| {
            (
                p.source_id.clone(),
                SourceMeta {
                    source_id: p.source_id.clone(),
                    ..SourceMeta::default()
                },
            )
        })
        .collect();
    Snapshot::build(
        BTreeMap::from([(character.id.clone(), character.clone())]),
        BTreeMap::new(),
        sources,
        Vec::new(),
    )
}

// =============================================================================
// PROPERTIES
// =============================================================================

proptest! {
    /// Building the same dossier twice yields byte-identical JSON.
    #[test]
    fn dossier_build_is_deterministic(character in character()) {
        let snapshot = snapshot_for(&character);

        let first = serde_json::to_string(
            &testament_core::build_character_dossier(&snapshot, &character),
        ).expect("serialize");
        let second = serde_json::to_string(
            &testament_core::build_character_dossier(&snapshot, &character),
        ).expect("serialize");

        prop_assert_eq!(first, second);
    }

    /// Claim ids are stable across rebuilds of the same entity.
    #[test]
    fn claim_fingerprints_are_stable(character in character()) {
        let first = claims_for_character(&character);
        let second = claims_for_character(&character);
        prop_assert_eq!(first, second);
    }

    /// Removing any single source profile never increases the number of
    /// detected conflicts.
    #[test]
    fn conflict_detection_is_monotone(character in character()) {
        let baseline = detect_conflicts(&claims_for_character(&character)).len();

        for removed in 0..character.source_profiles.len() {
            let mut reduced = character.clone();
            reduced.source_profiles.remove(removed);
            let count = detect_conflicts(&claims_for_character(&reduced)).len();
            prop_assert!(
                count <= baseline,
                "removing profile {} raised conflicts from {} to {}",
                removed,
                baseline,
                count
            );
        }
    }

    /// Tag lookup ignores case for any stored casing.
    #[test]
    fn tag_lookup_is_case_insensitive(
        character in character(),
        flips in vec(any::<bool>(), 12),
    ) {
        prop_assume!(!character.tags.is_empty());
        let snapshot = snapshot_for(&character);

        let tag = character.tags[0].clone();
        let mangled: String = tag
            .chars()
            .zip(flips.iter().cycle())
            .map(|(c, flip)| if *flip { c.to_ascii_uppercase() } else { c.to_ascii_lowercase() })
            .collect();

        let found = snapshot.characters_with_tag(&mangled);
        prop_assert!(found.contains(&character.id));
    }

    /// A character survives serialization to a raw document and back
    /// through the gate unchanged.
    #[test]
    fn gate_round_trip_is_neutral(character in character()) {
        let doc = ingest::character_to_raw(&character).expect("serialize");

        let mut issues = Vec::new();
        let reloaded = ingest::decode_character(character.id.as_str(), &doc, &mut issues);

        let errors: Vec<_> = issues
            .iter()
            .filter(|i| i.severity == testament_core::IssueSeverity::Error)
            .collect();
        prop_assert!(errors.is_empty(), "unexpected gate errors: {:?}", errors);
        prop_assert_eq!(reloaded.expect("decodes"), character);
    }

    /// The storage key an entity was decoded under always equals its id.
    #[test]
    fn decoded_id_matches_storage_key(character in character()) {
        let doc = ingest::character_to_raw(&character).expect("serialize");

        let mut issues = Vec::new();
        let decoded = ingest::decode_character(character.id.as_str(), &doc, &mut issues)
            .expect("decodes");
        prop_assert_eq!(decoded.id, character.id);

        // Any other key is rejected.
        let mut issues = Vec::new();
        let mismatched = ingest::decode_character("somebody_else", &doc, &mut issues);
        prop_assert!(mismatched.is_none());
    }
}
