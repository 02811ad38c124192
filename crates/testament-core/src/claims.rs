//! # Claim Assembly
//!
//! Flattens characters and events into attributed claims: subject,
//! predicate, object, source. Claims are derived values; they own their
//! strings and stay valid after storage mutations.
//!
//! Claim assembly is a pure function of an entity. Claim ids are
//! deterministic fingerprints of the claim content, so rebuilding the same
//! snapshot produces identical identifiers.

use serde::{Deserialize, Serialize};

use crate::types::{Character, EntityId, EntityKind, Event, SourceId};

/// Confidence assigned to claims read directly from an entity field.
pub const DIRECT_CLAIM_CONFIDENCE: f64 = 1.0;

/// Confidence assigned to claims drawn from a manuscript variant.
pub const VARIANT_CLAIM_CONFIDENCE: f64 = 0.8;

// =============================================================================
// CLAIM VALUE
// =============================================================================

/// The object of a claim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ClaimValue {
    /// Free-text assertion.
    Scalar(String),
    /// Reference to another entity.
    Ref(EntityId),
    /// A span expressed as text, e.g. a date range.
    Range(String),
}

impl ClaimValue {
    /// Normalize for agreement comparison.
    ///
    /// Scalars and ranges compare by trimmed, case-folded text; refs by id.
    /// Returns `None` when the value is absent: empty after trimming, or a
    /// `none`/`n/a` placeholder.
    #[must_use]
    pub fn normalized(&self) -> Option<String> {
        match self {
            Self::Scalar(s) | Self::Range(s) => {
                let folded = s.trim().to_lowercase();
                match folded.as_str() {
                    "" | "none" | "n/a" => None,
                    _ => Some(folded),
                }
            }
            Self::Ref(id) => Some(id.as_str().to_string()),
        }
    }

    /// The value as shown in dossiers and conflict summaries.
    #[must_use]
    pub fn display_string(&self) -> String {
        match self {
            Self::Scalar(s) | Self::Range(s) => s.clone(),
            Self::Ref(id) => id.as_str().to_string(),
        }
    }
}

// =============================================================================
// CLAIM
// =============================================================================

/// An attributed assertion derived from an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    /// Deterministic fingerprint of subject, predicate, source, and object.
    pub claim_id: String,
    pub subject_id: EntityId,
    pub subject_kind: EntityKind,
    pub predicate: String,
    pub object: ClaimValue,
    pub source_id: SourceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    /// Set when the object is drawn from a textual variant; carries the
    /// manuscript family.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant_id: Option<String>,
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl Claim {
    fn new(
        subject_id: EntityId,
        subject_kind: EntityKind,
        predicate: String,
        object: ClaimValue,
        source_id: SourceId,
        reference: Option<String>,
    ) -> Self {
        let claim_id = fingerprint(&subject_id, &predicate, &source_id, &object);
        Self {
            claim_id,
            subject_id,
            subject_kind,
            predicate,
            object,
            source_id,
            reference,
            variant_id: None,
            confidence: DIRECT_CLAIM_CONFIDENCE,
            note: None,
        }
    }

    fn with_variant(mut self, manuscript_family: &str) -> Self {
        self.variant_id = Some(manuscript_family.to_string());
        self.confidence = VARIANT_CLAIM_CONFIDENCE;
        self
    }
}

/// FNV-1a over the identity of a claim, formatted as 16 hex digits.
fn fingerprint(
    subject: &EntityId,
    predicate: &str,
    source: &SourceId,
    object: &ClaimValue,
) -> String {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;

    let canonical_object = match object {
        ClaimValue::Scalar(s) => format!("scalar:{s}"),
        ClaimValue::Ref(id) => format!("ref:{id}"),
        ClaimValue::Range(s) => format!("range:{s}"),
    };

    let mut hash = OFFSET;
    for part in [
        subject.as_str(),
        predicate,
        source.as_str(),
        &canonical_object,
    ] {
        for byte in part.as_bytes() {
            hash ^= u64::from(*byte);
            hash = hash.wrapping_mul(PRIME);
        }
        // Separator byte keeps part boundaries unambiguous.
        hash ^= u64::from(b'|');
        hash = hash.wrapping_mul(PRIME);
    }
    format!("{hash:016x}")
}

// =============================================================================
// BUILDERS
// =============================================================================

/// Flatten a character into claims.
///
/// One claim per trait per profile, one per relationship per attesting
/// source, and one per profile variant under a qualified predicate.
#[must_use]
pub fn claims_for_character(character: &Character) -> Vec<Claim> {
    let mut claims = Vec::new();

    for profile in &character.source_profiles {
        let reference = profile.references.first().cloned();
        for (trait_key, value) in &profile.traits {
            claims.push(Claim::new(
                character.id.clone(),
                EntityKind::Character,
                trait_key.clone(),
                ClaimValue::Scalar(value.clone()),
                profile.source_id.clone(),
                reference.clone(),
            ));
        }
        for variant in &profile.variants {
            claims.push(
                Claim::new(
                    character.id.clone(),
                    EntityKind::Character,
                    format!("variant:{}:reading", variant.manuscript_family),
                    ClaimValue::Scalar(variant.reading.clone()),
                    profile.source_id.clone(),
                    reference.clone(),
                )
                .with_variant(&variant.manuscript_family),
            );
        }
    }

    for relationship in &character.relationships {
        let reference = relationship.references.first().cloned();
        for source in &relationship.sources {
            let mut claim = Claim::new(
                character.id.clone(),
                EntityKind::Character,
                format!("relationship:{}", relationship.kind),
                ClaimValue::Ref(relationship.character_id.clone()),
                source.clone(),
                reference.clone(),
            );
            claim.note.clone_from(&relationship.notes);
            claims.push(claim);
        }
    }

    claims
}

/// Flatten an event into claims.
///
/// One claim per canonical account field (`summary`, `reference`, `notes`,
/// skipping empty notes) and one per account variant under a qualified
/// predicate.
#[must_use]
pub fn claims_for_event(event: &Event) -> Vec<Claim> {
    let mut claims = Vec::new();

    for account in &event.accounts {
        claims.push(Claim::new(
            event.id.clone(),
            EntityKind::Event,
            "summary".to_string(),
            ClaimValue::Scalar(account.summary.clone()),
            account.source_id.clone(),
            Some(account.reference.clone()),
        ));
        claims.push(Claim::new(
            event.id.clone(),
            EntityKind::Event,
            "reference".to_string(),
            ClaimValue::Scalar(account.reference.clone()),
            account.source_id.clone(),
            Some(account.reference.clone()),
        ));
        if let Some(notes) = &account.notes {
            if !notes.trim().is_empty() {
                claims.push(Claim::new(
                    event.id.clone(),
                    EntityKind::Event,
                    "notes".to_string(),
                    ClaimValue::Scalar(notes.clone()),
                    account.source_id.clone(),
                    Some(account.reference.clone()),
                ));
            }
        }
        for variant in &account.variants {
            claims.push(
                Claim::new(
                    event.id.clone(),
                    EntityKind::Event,
                    format!("variant:{}:summary", variant.manuscript_family),
                    ClaimValue::Scalar(variant.reading.clone()),
                    account.source_id.clone(),
                    Some(account.reference.clone()),
                )
                .with_variant(&variant.manuscript_family),
            );
        }
    }

    claims
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{EventAccount, Relationship, SourceProfile, TextualVariant};
    use std::collections::BTreeMap;

    fn entity(id: &str) -> EntityId {
        EntityId::new(id).expect("valid id")
    }

    fn source(id: &str) -> SourceId {
        SourceId::new(id).expect("valid source")
    }

    #[test]
    fn character_traits_become_scalar_claims() {
        let character = Character {
            id: entity("andrew"),
            canonical_name: "Andrew".to_string(),
            source_profiles: vec![SourceProfile {
                source_id: source("mark"),
                traits: BTreeMap::from([("portrayal".to_string(), "first-called".to_string())]),
                references: vec!["Mark 1:16-18".to_string()],
                ..SourceProfile::default()
            }],
            ..Character::default()
        };

        let claims = claims_for_character(&character);
        assert_eq!(claims.len(), 1);

        let claim = &claims[0];
        assert_eq!(claim.subject_id, entity("andrew"));
        assert_eq!(claim.subject_kind, EntityKind::Character);
        assert_eq!(claim.predicate, "portrayal");
        assert_eq!(claim.object, ClaimValue::Scalar("first-called".to_string()));
        assert_eq!(claim.source_id, source("mark"));
        assert_eq!(claim.reference.as_deref(), Some("Mark 1:16-18"));
        assert!((claim.confidence - DIRECT_CLAIM_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn relationships_emit_one_claim_per_source() {
        let character = Character {
            id: entity("andrew"),
            canonical_name: "Andrew".to_string(),
            source_profiles: vec![SourceProfile {
                source_id: source("mark"),
                ..SourceProfile::default()
            }],
            relationships: vec![Relationship {
                character_id: entity("peter"),
                kind: "brother".to_string(),
                sources: vec![source("mark"), source("john")],
                references: vec!["Mark 1:16".to_string()],
                notes: None,
            }],
            ..Character::default()
        };

        let claims = claims_for_character(&character);
        assert_eq!(claims.len(), 2);
        for claim in &claims {
            assert_eq!(claim.predicate, "relationship:brother");
            assert_eq!(claim.object, ClaimValue::Ref(entity("peter")));
        }
        assert_eq!(claims[0].source_id, source("mark"));
        assert_eq!(claims[1].source_id, source("john"));
    }

    #[test]
    fn variants_get_qualified_predicates_and_lower_confidence() {
        let character = Character {
            id: entity("goliath"),
            canonical_name: "Goliath".to_string(),
            source_profiles: vec![SourceProfile {
                source_id: source("mt"),
                variants: vec![TextualVariant {
                    manuscript_family: "LXX".to_string(),
                    reading: "four cubits".to_string(),
                    significance: "height differs across traditions".to_string(),
                }],
                ..SourceProfile::default()
            }],
            ..Character::default()
        };

        let claims = claims_for_character(&character);
        assert_eq!(claims.len(), 1);
        assert_eq!(claims[0].predicate, "variant:LXX:reading");
        assert_eq!(claims[0].variant_id.as_deref(), Some("LXX"));
        assert!((claims[0].confidence - VARIANT_CLAIM_CONFIDENCE).abs() < f64::EPSILON);
    }

    #[test]
    fn event_accounts_emit_canonical_fields_skipping_empty_notes() {
        let event = Event {
            id: entity("crucifixion"),
            label: "The Crucifixion".to_string(),
            accounts: vec![
                EventAccount {
                    source_id: source("mark"),
                    reference: "Mark 15:22-39".to_string(),
                    summary: "Crucified at Golgotha".to_string(),
                    notes: Some("Darkness at noon".to_string()),
                    variants: Vec::new(),
                },
                EventAccount {
                    source_id: source("john"),
                    reference: "John 19:17-30".to_string(),
                    summary: "It is finished".to_string(),
                    notes: Some("   ".to_string()),
                    variants: Vec::new(),
                },
            ],
            ..Event::default()
        };

        let claims = claims_for_event(&event);
        let predicates: Vec<(&str, &str)> = claims
            .iter()
            .map(|c| (c.source_id.as_str(), c.predicate.as_str()))
            .collect();

        assert_eq!(
            predicates,
            vec![
                ("mark", "summary"),
                ("mark", "reference"),
                ("mark", "notes"),
                ("john", "summary"),
                ("john", "reference"),
            ]
        );
    }

    #[test]
    fn claim_ids_are_stable_across_rebuilds() {
        let event = Event {
            id: entity("empty_tomb"),
            label: "The Empty Tomb".to_string(),
            accounts: vec![EventAccount {
                source_id: source("mark"),
                reference: "Mark 16:1-8".to_string(),
                summary: "The women flee".to_string(),
                notes: None,
                variants: Vec::new(),
            }],
            ..Event::default()
        };

        let first = claims_for_event(&event);
        let second = claims_for_event(&event);
        assert_eq!(first, second);
        assert_eq!(first[0].claim_id.len(), 16);
    }

    #[test]
    fn claim_ids_differ_when_any_component_differs() {
        let base = fingerprint(
            &entity("jesus"),
            "christology",
            &source("mark"),
            &ClaimValue::Scalar("suffering messiah".to_string()),
        );

        assert_ne!(
            base,
            fingerprint(
                &entity("jesus"),
                "christology",
                &source("john"),
                &ClaimValue::Scalar("suffering messiah".to_string()),
            )
        );
        assert_ne!(
            base,
            fingerprint(
                &entity("jesus"),
                "christology",
                &source("mark"),
                &ClaimValue::Scalar("pre-existent logos".to_string()),
            )
        );
    }

    #[test]
    fn normalization_treats_placeholders_as_absent() {
        assert_eq!(ClaimValue::Scalar("  None ".to_string()).normalized(), None);
        assert_eq!(ClaimValue::Scalar("n/a".to_string()).normalized(), None);
        assert_eq!(ClaimValue::Scalar("".to_string()).normalized(), None);
        assert_eq!(
            ClaimValue::Scalar(" Galilee ".to_string()).normalized(),
            Some("galilee".to_string())
        );
        assert_eq!(
            ClaimValue::Range("30-33 CE".to_string()).normalized(),
            Some("30-33 ce".to_string())
        );
        assert_eq!(
            ClaimValue::Ref(entity("peter")).normalized(),
            Some("peter".to_string())
        );
    }
}
