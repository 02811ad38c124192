//! # Conflict Detection
//!
//! Groups claims by (subject, predicate), decides whether the group
//! disagrees, classifies the disagreement, scores its severity, and
//! attaches harmonization hints.
//!
//! Everything here is a deterministic function of the input claims and the
//! fixed keyword tables. Iteration runs over sorted keys; ties break
//! lexicographically.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::claims::Claim;
use crate::types::{EntityId, SourceId};

// =============================================================================
// TAXONOMY
// =============================================================================

/// Topical classification of a claim, derived from its predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimType {
    Chronology,
    Theology,
    Geography,
    Narrative,
    Identity,
    Textual,
}

impl ClaimType {
    /// The snake_case label used in summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Chronology => "chronology",
            Self::Theology => "theology",
            Self::Geography => "geography",
            Self::Narrative => "narrative",
            Self::Identity => "identity",
            Self::Textual => "textual",
        }
    }

    /// Coarse category projection of the claim type.
    #[must_use]
    pub const fn category(self) -> Category {
        match self {
            Self::Chronology => Category::Chronology,
            Self::Theology => Category::Theology,
            Self::Geography => Category::Geography,
            Self::Narrative => Category::Narrative,
            Self::Identity | Self::Textual => Category::Other,
        }
    }
}

impl fmt::Display for ClaimType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse conflict category, a projection of `ClaimType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Chronology,
    Theology,
    Geography,
    Narrative,
    Other,
}

/// Conflict severity, totally ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// The snake_case label used in summaries.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            other => Err(format!("unknown severity '{other}'")),
        }
    }
}

/// Finer shape of a conflict, inferred from the predicate suffix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Sequence,
    Dating,
    Emphasis,
    Identity,
    Value,
}

impl Shape {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Sequence => "sequence",
            Self::Dating => "dating",
            Self::Emphasis => "emphasis",
            Self::Identity => "identity",
            Self::Value => "value",
        }
    }
}

// =============================================================================
// KEYWORD TABLES
// =============================================================================

const CHRONOLOGY_KEYWORDS: &[&str] = &[
    "chronolog", "date", "when", "time", "before", "after", "sequence", "order", "timeline",
    "duration", "reference",
];

const THEOLOGY_KEYWORDS: &[&str] = &[
    "christolog",
    "theolog",
    "divin",
    "messianic",
    "resurrect",
    "salvation",
    "soteriolog",
    "eschatolog",
    "pneumatolog",
    "spirit",
    "kingdom",
    "sonship",
    "nature",
    "mission",
    "authority",
    "miracle",
];

const GEOGRAPHY_KEYWORDS: &[&str] = &[
    "location", "where", "place", "city", "region", "village", "route",
];

const IDENTITY_KEYWORDS: &[&str] = &["name", "title", "alias", "role", "identity"];

const TEXTUAL_KEYWORDS: &[&str] = &["manuscript", "variant", "reading", "textual"];

const CRITICAL_SEVERITY_KEYWORDS: &[&str] = &["resurrection", "divinity", "existence"];

const MEDIUM_SEVERITY_KEYWORDS: &[&str] = &["date", "location", "order"];

const LOW_SEVERITY_KEYWORDS: &[&str] = &["wording"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

/// Classify a predicate into the claim taxonomy.
///
/// Qualified predicates win first: `relationship:` is identity, variant
/// vocabulary is textual. Numerical predicates fold under narrative.
#[must_use]
pub fn classify_claim_type(predicate: &str) -> ClaimType {
    let p = predicate.to_lowercase();
    if p.starts_with("relationship:") {
        return ClaimType::Identity;
    }
    if contains_any(&p, TEXTUAL_KEYWORDS) {
        return ClaimType::Textual;
    }
    if contains_any(&p, CHRONOLOGY_KEYWORDS) {
        return ClaimType::Chronology;
    }
    if contains_any(&p, THEOLOGY_KEYWORDS) {
        return ClaimType::Theology;
    }
    if contains_any(&p, GEOGRAPHY_KEYWORDS) {
        return ClaimType::Geography;
    }
    if contains_any(&p, IDENTITY_KEYWORDS) {
        return ClaimType::Identity;
    }
    ClaimType::Narrative
}

fn infer_shape(predicate: &str) -> Shape {
    let p = predicate.to_lowercase();
    if p.starts_with("relationship:") || contains_any(&p, IDENTITY_KEYWORDS) {
        return Shape::Identity;
    }
    if contains_any(&p, &["sequence", "order"]) {
        return Shape::Sequence;
    }
    if contains_any(&p, &["date", "dating", "timeline", "when"]) {
        return Shape::Dating;
    }
    if contains_any(&p, &["emphasis", "summary", "focus", "stance", "attitude"]) {
        return Shape::Emphasis;
    }
    Shape::Value
}

/// Compose the finer conflict tag, e.g. `chronology_sequence`.
#[must_use]
pub fn conflict_type_for(predicate: &str, claim_type: ClaimType) -> String {
    format!("{}_{}", claim_type.as_str(), infer_shape(predicate).as_str())
}

/// Score severity from the predicate rule table, falling back to the
/// structural disagreement heuristics.
#[must_use]
pub fn severity_for(predicate: &str, distinct_values: usize, contributing_sources: usize) -> Severity {
    let p = predicate.to_lowercase();
    if contains_any(&p, CRITICAL_SEVERITY_KEYWORDS) {
        return Severity::Critical;
    }
    if contains_any(&p, MEDIUM_SEVERITY_KEYWORDS) {
        return Severity::Medium;
    }
    if contains_any(&p, LOW_SEVERITY_KEYWORDS) {
        return Severity::Low;
    }
    if distinct_values == contributing_sources {
        Severity::High
    } else if distinct_values == 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

// =============================================================================
// HARMONIZATION HINTS
// =============================================================================

/// A non-prescriptive hint about how downstream consumers might reconcile
/// disagreeing sources. Never asserted as truth.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarmonizationMove {
    #[serde(rename = "move")]
    pub name: String,
    pub description: String,
    pub impact: String,
}

impl HarmonizationMove {
    fn new(name: &str, description: impl Into<String>, impact: &str) -> Self {
        Self {
            name: name.to_string(),
            description: description.into(),
            impact: impact.to_string(),
        }
    }
}

fn harmonization_moves(
    claim_type: ClaimType,
    dominant_value: Option<&str>,
    distinct_values: usize,
) -> Vec<HarmonizationMove> {
    let mut moves = Vec::new();

    match claim_type {
        ClaimType::Chronology => {
            moves.push(HarmonizationMove::new(
                "anchor_by_range",
                "Use a date/sequence range broad enough to contain every attested ordering.",
                "low",
            ));
            if let Some(dominant) = dominant_value {
                moves.push(HarmonizationMove::new(
                    "prefer_majority_sequence",
                    format!(
                        "Present '{dominant}' as the dominant ordering while annotating minority views."
                    ),
                    "medium",
                ));
            }
        }
        ClaimType::Theology => {
            moves.push(HarmonizationMove::new(
                "surface_multivoice",
                "Keep all theological emphases visible and note the audience or source context for each.",
                "low",
            ));
        }
        ClaimType::Geography => {
            moves.push(HarmonizationMove::new(
                "broaden_location",
                "Express the location at a higher level (region/route) to accommodate each specific locale.",
                "low",
            ));
        }
        ClaimType::Identity => {
            moves.push(HarmonizationMove::new(
                "capture_as_alias",
                "Retain all titles/epithets as aliases with source attributions instead of forcing a single one.",
                "low",
            ));
        }
        ClaimType::Textual => {
            moves.push(HarmonizationMove::new(
                "note_variant_stack",
                "List each manuscript reading with its family instead of collapsing to one.",
                "low",
            ));
        }
        ClaimType::Narrative => {
            moves.push(HarmonizationMove::new(
                "annotate_divergence",
                "Preserve each version and annotate the divergence inline.",
                "low",
            ));
        }
    }

    if distinct_values >= 3 {
        moves.push(HarmonizationMove::new(
            "flag_high_disagreement",
            "Mark this as high disagreement to alert downstream consumers.",
            "low",
        ));
    }

    moves
}

// =============================================================================
// CONFLICT SUMMARY
// =============================================================================

/// One detected conflict, keyed by the disputed field.
///
/// The key set is stable; downstream consumers rely on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictSummary {
    /// The disputed predicate.
    pub field: String,
    pub severity: Severity,
    pub category: Category,
    pub claim_type: ClaimType,
    pub conflict_type: String,
    /// Attested non-absent value per source.
    pub sources: BTreeMap<SourceId, String>,
    /// One representative per distinct non-absent value, sorted.
    pub distinct_values: Vec<String>,
    pub dominant_value: Option<String>,
    pub harmonization_moves: Vec<HarmonizationMove>,
    pub notes: String,
    pub rationale: String,
}

// =============================================================================
// DETECTION
// =============================================================================

struct ConflictGroup<'a> {
    subject_id: &'a EntityId,
    predicate: &'a str,
    claims: Vec<&'a Claim>,
}

/// Detect conflicts within a set of claims.
///
/// A group is a candidate when at least two distinct sources assert the
/// same (subject, predicate). It is a conflict when the asserted values
/// disagree after normalization. An absent value (empty, `none`, `n/a`)
/// among agreeing values is not a conflict; among disagreeing values it
/// counts as one more distinct position.
#[must_use]
pub fn detect_conflicts(claims: &[Claim]) -> Vec<ConflictSummary> {
    let mut groups: BTreeMap<(&EntityId, &str), ConflictGroup<'_>> = BTreeMap::new();
    for claim in claims {
        groups
            .entry((&claim.subject_id, claim.predicate.as_str()))
            .or_insert_with(|| ConflictGroup {
                subject_id: &claim.subject_id,
                predicate: &claim.predicate,
                claims: Vec::new(),
            })
            .claims
            .push(claim);
    }

    let mut conflicts = Vec::new();
    for group in groups.values() {
        if let Some(summary) = summarize_group(group) {
            conflicts.push(summary);
        }
    }
    conflicts
}

fn summarize_group(group: &ConflictGroup<'_>) -> Option<ConflictSummary> {
    // Last claim per source wins, as with repeated profile entries.
    let mut value_by_source: BTreeMap<&SourceId, &Claim> = BTreeMap::new();
    for &claim in &group.claims {
        value_by_source.insert(&claim.source_id, claim);
    }
    if value_by_source.len() < 2 {
        return None;
    }

    // Bucket sources by normalized value; absent values are tracked apart.
    let mut buckets: BTreeMap<String, Vec<&Claim>> = BTreeMap::new();
    let mut absent_present = false;
    for &claim in value_by_source.values() {
        match claim.object.normalized() {
            Some(normalized) => buckets.entry(normalized).or_default().push(claim),
            None => absent_present = true,
        }
    }
    if buckets.len() < 2 {
        return None;
    }

    let distinct_count = buckets.len() + usize::from(absent_present);
    let contributing_sources = value_by_source.len();

    let sources: BTreeMap<SourceId, String> = buckets
        .values()
        .flatten()
        .map(|claim| (claim.source_id.clone(), claim.object.display_string()))
        .collect();

    let distinct_values: Vec<String> = {
        let mut representatives: Vec<String> = buckets
            .values()
            .map(|claims| {
                claims
                    .iter()
                    .map(|c| c.object.display_string())
                    .min()
                    .unwrap_or_default()
            })
            .collect();
        representatives.sort();
        representatives
    };

    let dominant_value = pick_dominant(&buckets);

    let claim_type = classify_claim_type(group.predicate);
    let conflict_type = conflict_type_for(group.predicate, claim_type);
    let severity = severity_for(group.predicate, distinct_count, contributing_sources);
    let harmonization_moves =
        harmonization_moves(claim_type, dominant_value.as_deref(), distinct_count);

    Some(ConflictSummary {
        field: group.predicate.to_string(),
        severity,
        category: claim_type.category(),
        claim_type,
        conflict_type: conflict_type.clone(),
        sources,
        distinct_values,
        dominant_value,
        harmonization_moves,
        notes: format!(
            "{distinct_count} distinct value(s) across {contributing_sources} source(s)"
        ),
        rationale: format!(
            "{distinct_count} distinct value(s) across {contributing_sources} source(s); \
             type={conflict_type} subject={}",
            group.subject_id
        ),
    })
}

/// The most-attested value. Ties break to the value asserted by the
/// lexicographically smallest source id.
fn pick_dominant(buckets: &BTreeMap<String, Vec<&Claim>>) -> Option<String> {
    let top_count = buckets.values().map(Vec::len).max()?;
    let top_sources: BTreeSet<&SourceId> = buckets
        .values()
        .filter(|claims| claims.len() == top_count)
        .flatten()
        .map(|claim| &claim.source_id)
        .collect();
    let winner = top_sources.into_iter().next()?;
    buckets
        .values()
        .flatten()
        .find(|claim| &claim.source_id == winner)
        .map(|claim| claim.object.display_string())
}

// =============================================================================
// TESTS
// =============================================================================
