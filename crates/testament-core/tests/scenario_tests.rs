//! # End-to-End Scenarios
//!
//! Full-engine walks over seeded corpora: ingestion, conflict detection,
//! dossiers, search, and the hook abort contracts.

use serde_json::{json, Value};
use testament_core::{
    Engine, EngineConfig, EntityId, HookPoint, MemoryStore, RawDocument, Severity, SourceId,
    SourceMeta, TestamentError,
};

fn raw(value: Value) -> RawDocument {
    value.as_object().cloned().expect("object document")
}

fn source_meta(id: &str) -> SourceMeta {
    SourceMeta {
        source_id: SourceId::new(id).expect("valid source"),
        ..SourceMeta::default()
    }
}

fn registry() -> Vec<SourceMeta> {
    vec![source_meta("mark"), source_meta("john"), source_meta("luke")]
}

// =============================================================================
// SCENARIO: MINIMAL CHARACTER
// =============================================================================

mod minimal_character {
    use super::*;

    fn engine() -> Engine {
        let store = MemoryStore::new().with_sources(registry()).with_character(
            "andrew",
            raw(json!({
                "id": "andrew",
                "canonical_name": "Andrew",
                "source_profiles": [{
                    "source_id": "mark",
                    "traits": {"role": "apostle"},
                    "references": ["Mark 1:16-18"],
                }],
            })),
        );
        Engine::open(store, EngineConfig::default()).expect("engine opens")
    }

    #[test]
    fn dossier_has_one_source_and_no_conflicts() {
        let dossier = engine().build_character_dossier("andrew").expect("builds");

        assert_eq!(dossier["source_ids"], json!(["mark"]));
        assert_eq!(dossier["trait_conflicts"], json!({}));
        assert_eq!(dossier["trait_conflict_summaries"], json!({}));
        assert_eq!(dossier["schema_version"], json!("1.0"));
    }

    #[test]
    fn claim_graph_contains_exactly_one_claim() {
        let dossier = engine().build_character_dossier("andrew").expect("builds");

        let claims = dossier["claim_graph"]["claims"]
            .as_array()
            .expect("claims list");
        assert_eq!(claims.len(), 1);

        let claim = &claims[0];
        assert_eq!(claim["subject_id"], json!("andrew"));
        assert_eq!(claim["subject_kind"], json!("character"));
        assert_eq!(claim["predicate"], json!("role"));
        assert_eq!(claim["object"], json!({"kind": "scalar", "value": "apostle"}));
        assert_eq!(claim["source_id"], json!("mark"));
    }
}

// =============================================================================
// SCENARIO: TWO-SOURCE CONFLICT
// =============================================================================

mod two_source_conflict {
    use super::*;

    fn engine() -> Engine {
        let store = MemoryStore::new().with_sources(registry()).with_character(
            "jesus",
            raw(json!({
                "id": "jesus",
                "canonical_name": "Jesus of Nazareth",
                "source_profiles": [
                    {
                        "source_id": "mark",
                        "traits": {
                            "messianic_self_understanding": "Avoids messianic titles publicly",
                        },
                        "references": ["Mark 8:30"],
                    },
                    {
                        "source_id": "john",
                        "traits": {
                            "messianic_self_understanding": "Explicitly claims divinity",
                        },
                        "references": ["John 10:30"],
                    },
                ],
            })),
        );
        Engine::open(store, EngineConfig::default()).expect("engine opens")
    }

    #[test]
    fn classifies_as_high_severity_theology() {
        let dossier = engine().build_character_dossier("jesus").expect("builds");
        let summary = &dossier["trait_conflict_summaries"]["messianic_self_understanding"];

        assert_eq!(summary["claim_type"], json!("theology"));
        assert_eq!(summary["category"], json!("theology"));
        // Two distinct non-absent values across two sources.
        assert_eq!(summary["severity"], json!("high"));
        assert_eq!(summary["sources"]["mark"], json!("Avoids messianic titles publicly"));
        assert_eq!(summary["sources"]["john"], json!("Explicitly claims divinity"));
    }

    #[test]
    fn dominant_value_ties_break_to_smallest_source_id() {
        let conflicts = engine().character_conflicts("jesus").expect("detects");
        let summary = &conflicts["messianic_self_understanding"];

        // One attestation each: "john" sorts before "mark", so John's
        // reading wins the tie.
        assert_eq!(
            summary.dominant_value.as_deref(),
            Some("Explicitly claims divinity")
        );
    }
}

// =============================================================================
// SCENARIO: CRITICAL PREDICATE
// =============================================================================

mod critical_predicate {
    use super::*;

    #[test]
    fn resurrection_conflicts_are_always_critical() {
        let store = MemoryStore::new().with_sources(registry()).with_character(
            "jesus",
            raw(json!({
                "id": "jesus",
                "canonical_name": "Jesus of Nazareth",
                "source_profiles": [
                    {
                        "source_id": "mark",
                        "traits": {"resurrection_details": "empty tomb, no appearance"},
                        "references": ["Mark 16:1-8"],
                    },
                    {
                        "source_id": "john",
                        "traits": {"resurrection_details": "multiple appearances"},
                        "references": ["John 20:11-29"],
                    },
                ],
            })),
        );
        let engine = Engine::open(store, EngineConfig::default()).expect("engine opens");

        let conflicts = engine.character_conflicts("jesus").expect("detects");
        assert_eq!(
            conflicts["resurrection_details"].severity,
            Severity::Critical
        );
    }
}

// =============================================================================
// SCENARIO: EVENT ACCOUNT CONFLICT
// =============================================================================

mod event_account_conflict {
    use super::*;

    #[test]
    fn only_the_disagreeing_field_is_reported() {
        let store = MemoryStore::new()
            .with_sources(registry())
            .with_character(
                "jesus",
                raw(json!({
                    "id": "jesus",
                    "canonical_name": "Jesus of Nazareth",
                    "source_profiles": [{
                        "source_id": "mark",
                        "traits": {},
                        "references": [],
                    }],
                })),
            )
            .with_event(
                "crucifixion",
                raw(json!({
                    "id": "crucifixion",
                    "label": "The Crucifixion",
                    "participants": ["jesus"],
                    "accounts": [
                        {
                            "source_id": "mark",
                            "reference": "Mark 15:22-39",
                            "summary": "Simon of Cyrene carries the cross",
                            "notes": "Golgotha",
                        },
                        {
                            "source_id": "john",
                            "reference": "Mark 15:22-39",
                            "summary": "Jesus carries the cross himself",
                            "notes": "Golgotha",
                        },
                    ],
                })),
            );
        let engine = Engine::open(store, EngineConfig::default()).expect("engine opens");

        let dossier = engine.build_event_dossier("crucifixion").expect("builds");
        let conflict_fields: Vec<&str> = dossier["account_conflicts"]
            .as_object()
            .expect("object")
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(conflict_fields, vec!["summary"]);

        let summary = &dossier["account_conflict_summaries"]["summary"];
        assert_eq!(
            summary["distinct_values"].as_array().map(Vec::len),
            Some(2)
        );
    }
}

// =============================================================================
// SCENARIO: HOOK ABORT ON SAVE
// =============================================================================

mod hook_abort_on_save {
    use super::*;

    #[test]
    fn aborted_save_preserves_stored_state() {
        let store = MemoryStore::new().with_sources(registry()).with_character(
            "peter",
            raw(json!({
                "id": "peter",
                "canonical_name": "Simon Peter",
                "source_profiles": [{
                    "source_id": "mark",
                    "traits": {"portrayal": "impulsive"},
                    "references": ["Mark 8:29"],
                }],
            })),
        );
        let engine = Engine::open(store, EngineConfig::default()).expect("engine opens");

        engine
            .hooks()
            .register(HookPoint::BeforeCharacterSave, 100, |ctx| {
                ctx.abort = true;
                Ok(())
            });

        let mut character = engine.get_character("peter").expect("loads");
        character.canonical_name = "Cephas".to_string();

        let result = engine.save_character(&character);
        assert!(matches!(result, Err(TestamentError::Storage(_))));

        let unchanged = engine.get_character("peter").expect("loads again");
        assert_eq!(unchanged.canonical_name, "Simon Peter");
    }
}

// =============================================================================
// SCENARIO: TAG CASE-INSENSITIVITY
// =============================================================================

mod tag_case_insensitivity {
    use super::*;

    #[test]
    fn any_casing_finds_the_tagged_character() {
        let store = MemoryStore::new().with_sources(registry()).with_character(
            "john_of_patmos",
            raw(json!({
                "id": "john_of_patmos",
                "canonical_name": "John of Patmos",
                "tags": ["Apocalyptic"],
                "source_profiles": [{
                    "source_id": "john",
                    "traits": {},
                    "references": [],
                }],
            })),
        );
        let engine = Engine::open(store, EngineConfig::default()).expect("engine opens");
        let expected = vec![EntityId::new("john_of_patmos").expect("id")];

        assert_eq!(engine.list_characters_with_tag("apocalyptic"), expected);
        assert_eq!(engine.list_characters_with_tag("APOCALYPTIC"), expected);
        assert_eq!(engine.list_characters_with_tag("Apocalyptic"), expected);
    }
}

// =============================================================================
// LEGACY SHAPE REJECTION
// =============================================================================

mod legacy_shape_rejection {
    use super::*;

    #[test]
    fn grouped_relationships_fail_the_load_naming_the_entity() {
        let store = MemoryStore::new().with_sources(registry()).with_character(
            "james",
            raw(json!({
                "id": "james",
                "canonical_name": "James",
                "source_profiles": [{
                    "source_id": "mark",
                    "traits": {},
                    "references": [],
                }],
                "relationships": {
                    "family": ["john_son_of_zebedee"],
                    "disciples": [],
                },
            })),
        );

        let result = Engine::open(store, EngineConfig::default());
        let Err(TestamentError::Validation(issues)) = result else {
            panic!("expected validation failure");
        };

        let issue = issues
            .iter()
            .find(|i| i.field_path == "relationships")
            .expect("relationships issue");
        assert_eq!(issue.entity_id, "james");
    }
}

// =============================================================================
// HOOK ISOLATION
// =============================================================================

mod hook_isolation {
    use super::*;

    fn seeded_engine() -> Engine {
        let store = MemoryStore::new().with_sources(registry()).with_character(
            "andrew",
            raw(json!({
                "id": "andrew",
                "canonical_name": "Andrew",
                "tags": ["apostle"],
                "source_profiles": [{
                    "source_id": "mark",
                    "traits": {"role": "apostle"},
                    "references": ["Mark 1:16-18"],
                }],
            })),
        );
        Engine::open(store, EngineConfig::default()).expect("engine opens")
    }

    #[test]
    fn failing_handlers_leave_results_unchanged() {
        let baseline = {
            let engine = seeded_engine();
            (
                engine.search_all("apostle", None).expect("search"),
                engine.build_character_dossier("andrew").expect("dossier"),
            )
        };

        let engine = seeded_engine();
        for point in [
            HookPoint::BeforeSearch,
            HookPoint::SearchResultFilter,
            HookPoint::BeforeDossierBuild,
            HookPoint::DossierEnrich,
        ] {
            engine.hooks().register(point, 100, |_| {
                Err(TestamentError::Cache("deliberate failure".to_string()))
            });
        }

        assert_eq!(engine.search_all("apostle", None).expect("search"), baseline.0);
        assert_eq!(
            engine.build_character_dossier("andrew").expect("dossier"),
            baseline.1
        );
    }
}

// =============================================================================
// FILE-TREE ROUND TRIP
// =============================================================================

mod file_tree_round_trip {
    use super::*;
    use testament_core::{DocumentStore, FileTreeStore};

    #[test]
    fn corpus_written_to_disk_loads_back_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("sources.json"),
            json!({"mark": {"date_range": "65-75 CE"}, "john": {}}).to_string(),
        )
        .expect("write sources");

        let mut store = FileTreeStore::open(dir.path()).expect("open store");
        store
            .save_character_raw(
                "andrew",
                raw(json!({
                    "id": "andrew",
                    "canonical_name": "Andrew",
                    "source_profiles": [{
                        "source_id": "mark",
                        "traits": {"role": "apostle"},
                        "references": ["Mark 1:16-18"],
                    }],
                })),
            )
            .expect("save character");

        let engine = Engine::open(store, EngineConfig::default()).expect("engine opens");
        let character = engine.get_character("andrew").expect("loads");
        assert_eq!(character.canonical_name, "Andrew");

        // Saving back through the engine and re-opening from the same root
        // yields the same entity.
        engine.save_character(&character).expect("saves");
        let reopened = Engine::open(
            FileTreeStore::open(dir.path()).expect("reopen store"),
            EngineConfig::default(),
        )
        .expect("engine reopens");
        assert_eq!(reopened.get_character("andrew").expect("reloads"), character);
    }
}
