//! # Controlled Vocabulary
//!
//! Recognized trait keys and hard input limits for the ingestion gate.
//!
//! Trait keys outside the vocabulary are accepted with a warning, never an
//! error. The vocabulary keeps source profiles comparable across the corpus
//! without blocking curation of new material.

/// Recognized trait keys, grouped by theme. Comparison is case-sensitive.
pub const STANDARD_TRAIT_KEYS: &[&str] = &[
    // Core theological categories
    "christology",
    "eschatology",
    "soteriology",
    "pneumatology",
    "ecclesiology",
    // Mission and ministry
    "mission_focus",
    "teaching_emphasis",
    "ministry_location",
    "ministry_duration",
    "ministry_recipients",
    // Miracles and signs
    "miracles",
    "signs",
    "healings",
    "exorcisms",
    "nature_miracles",
    // Conflict and opposition
    "conflicts",
    "opponents",
    "trial_details",
    "accusations",
    // Death and resurrection
    "death_resurrection",
    "passion_narrative",
    "crucifixion_details",
    "resurrection_details",
    "post_resurrection_appearances",
    // Torah and law
    "torah_stance",
    "halakha_interpretation",
    "purity_laws",
    "sabbath_observance",
    "temple_attitude",
    // Identity and titles
    "messianic_claims",
    "divine_sonship",
    "prophetic_identity",
    "authority_claims",
    // Relationship dynamics
    "discipleship_model",
    "family_relations",
    "gender_inclusivity",
    "social_justice",
    // Literary and rhetorical features
    "parables",
    "apocalyptic_discourse",
    "wisdom_sayings",
    "pronouncement_stories",
    "controversy_stories",
    // Contextual positioning
    "jewish_context",
    "greco_roman_context",
    "political_stance",
    "economic_teaching",
    // Character traits
    "portrayal",
    "character_development",
    "emotions",
    "virtues",
    "vices",
    // Eschatological themes
    "kingdom_of_god",
    "future_hope",
    "judgment_themes",
    "imminent_expectation",
    "realized_eschatology",
    // Spirit and supernatural
    "spirit_activity",
    "angelic_encounters",
    "demonic_opposition",
    "visions",
    "revelations",
    // Community and ethics
    "ethical_teaching",
    "community_formation",
    "ritual_practices",
    "prayer_life",
    "table_fellowship",
];

/// Check whether a trait key is part of the controlled vocabulary.
///
/// Linear scan; the vocabulary is small and this runs only at ingestion.
#[must_use]
pub fn is_standard_trait_key(key: &str) -> bool {
    STANDARD_TRAIT_KEYS.contains(&key)
}

// =============================================================================
// INPUT VALIDATION LIMITS
// =============================================================================

/// Maximum length for trait keys and other field names.
///
/// Keys longer than this are rejected by the ingestion gate.
pub const MAX_KEY_LENGTH: usize = 256;

/// Maximum length for trait values, summaries, and notes.
///
/// Values longer than this (64KB) are rejected by the ingestion gate.
/// This prevents memory exhaustion from malformed documents.
pub const MAX_VALUE_LENGTH: usize = 65536;

/// Maximum number of source profiles or accounts on a single entity.
pub const MAX_PROFILES_PER_ENTITY: usize = 256;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vocabulary_has_no_duplicates() {
        let unique: std::collections::BTreeSet<_> = STANDARD_TRAIT_KEYS.iter().collect();
        assert_eq!(unique.len(), STANDARD_TRAIT_KEYS.len());
    }

    #[test]
    fn recognizes_standard_keys() {
        assert!(is_standard_trait_key("christology"));
        assert!(is_standard_trait_key("table_fellowship"));
        assert!(is_standard_trait_key("resurrection_details"));
    }

    #[test]
    fn rejects_unknown_and_case_variants() {
        assert!(!is_standard_trait_key("Christology"));
        assert!(!is_standard_trait_key("favorite_color"));
        assert!(!is_standard_trait_key(""));
    }
}
