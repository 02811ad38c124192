//! # testament-core
//!
//! A contradiction-aware engine over a curated corpus of biblical
//! characters and events.
//!
//! The crate ingests typed documents through a strict validation gate,
//! flattens them into a claim graph of attributed assertions, detects and
//! classifies inter-source conflicts, and emits stable, versioned dossiers
//! for downstream tools. An in-memory index layer answers tag, role,
//! source, and participant queries, and a hook runtime interposes at the
//! canonical lifecycle boundaries.
//!
//! ## Architectural Constraints
//!
//! - Deterministic: all keyed state uses `BTreeMap`/`BTreeSet`, outputs
//!   iterate in sorted order, and derived values carry stable fingerprints
//! - Snapshot-based: readers run in parallel against an immutable snapshot;
//!   writers are serialized and publish atomically
//! - No async, no network; the only I/O sits behind the storage port

// =============================================================================
// MODULES
// =============================================================================

pub mod cache;
pub mod claims;
pub mod config;
pub mod conflicts;
pub mod dossier;
pub mod engine;
pub mod hooks;
pub mod ingest;
pub mod search;
pub mod snapshot;
pub mod storage;
pub mod types;
pub mod vocabulary;

// =============================================================================
// RE-EXPORTS: Core Types
// =============================================================================

pub use types::{
    Character, EntityId, EntityKind, Event, EventAccount, IssueSeverity, Parallel, Relationship,
    SourceId, SourceMeta, SourceProfile, TestamentError, TextualVariant, ValidationIssue,
};

// =============================================================================
// RE-EXPORTS: Engine Surface
// =============================================================================

pub use cache::CacheRegistry;
pub use claims::{claims_for_character, claims_for_event, Claim, ClaimValue};
pub use config::{EngineConfig, LogLevel};
pub use conflicts::{
    classify_claim_type, detect_conflicts, Category, ClaimType, ConflictSummary,
    HarmonizationMove, Severity,
};
pub use dossier::{
    build_character_dossier, build_event_dossier, CharacterDossier, ClaimGraph, EventDossier,
    DOSSIER_SCHEMA_VERSION,
};
pub use engine::{Engine, ValidationReport};
pub use hooks::{HandlerId, HookContext, HookPoint, HookRegistry};
pub use ingest::{load_snapshot, validate_reference, ReferenceCheck};
pub use search::{SearchMatch, SearchScope};
pub use snapshot::Snapshot;
pub use storage::{DocumentStore, FileTreeStore, MemoryStore, RawDocument};
pub use vocabulary::STANDARD_TRAIT_KEYS;
