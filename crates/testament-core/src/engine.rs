//! # Engine
//!
//! Ties the storage port, the published snapshot, the hook runtime, and the
//! cache registry into the public operation surface.
//!
//! Concurrency model: parallel readers over an immutable snapshot,
//! serialized writers. Readers clone an `Arc<Snapshot>` and work against it
//! for the whole operation; writers hold the store lock, publish a fresh
//! snapshot atomically, then invalidate caches. Locks are never held across
//! hook dispatch.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;
use std::sync::{Arc, RwLock};

use crate::cache::CacheRegistry;
use crate::claims::{claims_for_character, claims_for_event, Claim};
use crate::config::EngineConfig;
use crate::conflicts::{detect_conflicts, ConflictSummary, Severity};
use crate::dossier::{self, DOSSIER_SCHEMA_VERSION};
use crate::hooks::{HookContext, HookPoint, HookRegistry};
use crate::ingest;
use crate::search::{self, SearchMatch, SearchScope};
use crate::snapshot::Snapshot;
use crate::storage::{DocumentStore, FileTreeStore};
use crate::types::{
    Character, EntityId, EntityKind, Event, IssueSeverity, TestamentError, ValidationIssue,
};

// =============================================================================
// VALIDATION REPORT
// =============================================================================

/// Outcome of a `validate_all` run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationIssue>,
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationReport {
    /// True when no error-severity issue was found.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

// =============================================================================
// CONFLICT CACHE
// =============================================================================

/// Bounded per-entity memo of conflict summaries. Oldest entry is evicted
/// first; a capacity of zero disables caching.
#[derive(Debug, Default)]
struct ConflictCache {
    capacity: usize,
    entries: BTreeMap<(EntityKind, EntityId), Vec<ConflictSummary>>,
    order: VecDeque<(EntityKind, EntityId)>,
}

impl ConflictCache {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            ..Self::default()
        }
    }

    fn get(&self, key: &(EntityKind, EntityId)) -> Option<Vec<ConflictSummary>> {
        self.entries.get(key).cloned()
    }

    fn insert(&mut self, key: (EntityKind, EntityId), value: Vec<ConflictSummary>) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.insert(key.clone(), value).is_none() {
            self.order.push_back(key);
        }
        while self.entries.len() > self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn set_capacity(&mut self, capacity: usize) {
        self.capacity = capacity;
        self.clear();
    }
}

// =============================================================================
// ENGINE
// =============================================================================

/// The contradiction-aware engine over one document store.
pub struct Engine {
    config: RwLock<EngineConfig>,
    store: RwLock<Box<dyn DocumentStore>>,
    snapshot: RwLock<Arc<Snapshot>>,
    hooks: HookRegistry,
    caches: CacheRegistry,
    conflict_cache: Arc<RwLock<ConflictCache>>,
}

impl Engine {
    /// Construct an engine without loading the corpus. Use `open` for the
    /// usual load-and-start path.
    pub fn new(
        store: impl DocumentStore + 'static,
        config: EngineConfig,
    ) -> Result<Self, TestamentError> {
        let hooks = HookRegistry::new();
        if !config.hooks_enabled {
            hooks.disable();
        }

        let conflict_cache = Arc::new(RwLock::new(ConflictCache::with_capacity(
            config.cache_size,
        )));
        let caches = CacheRegistry::new();
        let cache_handle = Arc::clone(&conflict_cache);
        caches.register("conflict_summaries", move || {
            cache_handle
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .clear();
        })?;

        Ok(Self {
            config: RwLock::new(config),
            store: RwLock::new(Box::new(store)),
            snapshot: RwLock::new(Arc::new(Snapshot::default())),
            hooks,
            caches,
            conflict_cache,
        })
    }

    /// Load the corpus from the store, publish the first snapshot, and fire
    /// the startup hook.
    pub fn open(
        store: impl DocumentStore + 'static,
        config: EngineConfig,
    ) -> Result<Self, TestamentError> {
        let engine = Self::new(store, config)?;
        engine.reload()?;
        let snapshot = engine.current_snapshot();
        let _ = engine.hooks.fire(
            HookPoint::Startup,
            json!({
                "characters": snapshot.character_count(),
                "events": snapshot.event_count(),
            }),
        );
        Ok(engine)
    }

    /// Open over the file-tree adapter rooted at `config.data_root`.
    pub fn open_from_config(config: EngineConfig) -> Result<Self, TestamentError> {
        let Some(root) = config.data_root.clone() else {
            return Err(TestamentError::Configuration(
                "data_root is required to open from configuration".to_string(),
            ));
        };
        let store = FileTreeStore::open(root)?;
        Self::open(store, config)
    }

    /// The hook registry, for registering handlers.
    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    /// The cache registry, for registering external invalidators.
    #[must_use]
    pub fn caches(&self) -> &CacheRegistry {
        &self.caches
    }

    /// A copy of the active configuration.
    #[must_use]
    pub fn config(&self) -> EngineConfig {
        self.config.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// The currently published snapshot.
    #[must_use]
    pub fn current_snapshot(&self) -> Arc<Snapshot> {
        Arc::clone(&self.snapshot.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Re-run ingestion against the store and publish a fresh snapshot.
    ///
    /// Registered caches are invalidated after publication.
    pub fn reload(&self) -> Result<(), TestamentError> {
        let enforce = self
            .config
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .enable_validation;
        let snapshot = {
            let store = self.store.read().unwrap_or_else(|e| e.into_inner());
            ingest::load_snapshot_with(store.as_ref(), enforce)?
        };
        *self.snapshot.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(snapshot);
        self.caches.invalidate_all();
        Ok(())
    }

    /// Replace the configuration at runtime.
    ///
    /// Re-publishes the snapshot (reloading the source registry), clears
    /// caches, and fires `config_change`. When the new configuration names
    /// a data root, the store is replaced by a file-tree adapter over it.
    pub fn reconfigure(&self, config: EngineConfig) -> Result<(), TestamentError> {
        if let Some(root) = config.data_root.clone() {
            let store = FileTreeStore::open(root)?;
            *self.store.write().unwrap_or_else(|e| e.into_inner()) = Box::new(store);
        }

        if config.hooks_enabled {
            self.hooks.enable();
        } else {
            self.hooks.disable();
        }
        self.conflict_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .set_capacity(config.cache_size);

        let payload = json!({
            "cache_size": config.cache_size,
            "enable_validation": config.enable_validation,
            "hooks_enabled": config.hooks_enabled,
            "log_level": config.log_level.as_str(),
        });
        *self.config.write().unwrap_or_else(|e| e.into_inner()) = config;

        self.reload()?;
        let _ = self.hooks.fire(HookPoint::ConfigChange, payload);
        Ok(())
    }

    /// Fire the shutdown hook. The engine stays usable; this is the
    /// counterpart of the startup notification.
    pub fn shutdown(&self) {
        let _ = self.hooks.fire(HookPoint::Shutdown, Value::Null);
    }

    // =========================================================================
    // ENTITY ACCESS
    // =========================================================================

    /// Load a character by id.
    ///
    /// # Errors
    /// `AbortedByHook` when a `before_character_load` handler aborts;
    /// `DataNotFound` when the id does not resolve.
    pub fn get_character(&self, id: &str) -> Result<Character, TestamentError> {
        let ctx = self
            .hooks
            .fire(HookPoint::BeforeCharacterLoad, json!(id));
        if ctx.abort {
            return Err(TestamentError::AbortedByHook(HookPoint::BeforeCharacterLoad));
        }
        let id = ctx.data.as_str().unwrap_or(id).to_string();

        let entity_id = EntityId::new(id.clone())
            .map_err(|_| TestamentError::not_found(EntityKind::Character, &id))?;
        let snapshot = self.current_snapshot();
        let character = snapshot
            .character(&entity_id)
            .cloned()
            .ok_or_else(|| TestamentError::not_found(EntityKind::Character, &id))?;

        let ctx = self.hooks.fire(
            HookPoint::AfterCharacterLoad,
            serde_json::to_value(&character).unwrap_or(Value::Null),
        );
        Ok(read_back(ctx, character, HookPoint::AfterCharacterLoad))
    }

    /// Load an event by id.
    pub fn get_event(&self, id: &str) -> Result<Event, TestamentError> {
        let ctx = self.hooks.fire(HookPoint::BeforeEventLoad, json!(id));
        if ctx.abort {
            return Err(TestamentError::AbortedByHook(HookPoint::BeforeEventLoad));
        }
        let id = ctx.data.as_str().unwrap_or(id).to_string();

        let entity_id = EntityId::new(id.clone())
            .map_err(|_| TestamentError::not_found(EntityKind::Event, &id))?;
        let snapshot = self.current_snapshot();
        let event = snapshot
            .event(&entity_id)
            .cloned()
            .ok_or_else(|| TestamentError::not_found(EntityKind::Event, &id))?;

        let ctx = self.hooks.fire(
            HookPoint::AfterEventLoad,
            serde_json::to_value(&event).unwrap_or(Value::Null),
        );
        Ok(read_back(ctx, event, HookPoint::AfterEventLoad))
    }

    /// Persist a character through the storage port and republish.
    ///
    /// # Errors
    /// A storage error naming the hook when `before_character_save` aborts;
    /// the store is left untouched in that case.
    pub fn save_character(&self, character: &Character) -> Result<(), TestamentError> {
        let ctx = self.hooks.fire(
            HookPoint::BeforeCharacterSave,
            serde_json::to_value(character).unwrap_or(Value::Null),
        );
        if ctx.abort {
            return Err(TestamentError::Storage(format!(
                "save of character '{}' refused by {} hook",
                character.id,
                HookPoint::BeforeCharacterSave
            )));
        }
        let character = read_back(ctx, character.clone(), HookPoint::BeforeCharacterSave);

        let raw = ingest::character_to_raw(&character)?;
        if self.config().enable_validation {
            let mut issues = Vec::new();
            if ingest::decode_character(character.id.as_str(), &raw, &mut issues).is_none() {
                return Err(TestamentError::Validation(issues));
            }
        }

        {
            let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
            store.save_character_raw(character.id.as_str(), raw)?;
        }
        self.reload()?;

        let _ = self.hooks.fire(
            HookPoint::AfterCharacterSave,
            serde_json::to_value(&character).unwrap_or(Value::Null),
        );
        Ok(())
    }

    /// Persist an event through the storage port and republish.
    pub fn save_event(&self, event: &Event) -> Result<(), TestamentError> {
        let ctx = self.hooks.fire(
            HookPoint::BeforeEventSave,
            serde_json::to_value(event).unwrap_or(Value::Null),
        );
        if ctx.abort {
            return Err(TestamentError::Storage(format!(
                "save of event '{}' refused by {} hook",
                event.id,
                HookPoint::BeforeEventSave
            )));
        }
        let event = read_back(ctx, event.clone(), HookPoint::BeforeEventSave);

        let raw = ingest::event_to_raw(&event)?;
        if self.config().enable_validation {
            let mut issues = Vec::new();
            if ingest::decode_event(event.id.as_str(), &raw, &mut issues).is_none() {
                return Err(TestamentError::Validation(issues));
            }
        }

        {
            let mut store = self.store.write().unwrap_or_else(|e| e.into_inner());
            store.save_event_raw(event.id.as_str(), raw)?;
        }
        self.reload()?;

        let _ = self.hooks.fire(
            HookPoint::AfterEventSave,
            serde_json::to_value(&event).unwrap_or(Value::Null),
        );
        Ok(())
    }

    // =========================================================================
    // LISTINGS AND TAG QUERIES
    // =========================================================================

    /// All character ids, sorted.
    #[must_use]
    pub fn list_character_ids(&self) -> Vec<EntityId> {
        self.current_snapshot().character_ids()
    }

    /// All event ids, sorted.
    #[must_use]
    pub fn list_event_ids(&self) -> Vec<EntityId> {
        self.current_snapshot().event_ids()
    }

    /// Ids of characters carrying the tag, case-insensitively.
    #[must_use]
    pub fn list_characters_with_tag(&self, tag: &str) -> Vec<EntityId> {
        let ctx = self.hooks.fire(
            HookPoint::BeforeQuery,
            json!({"query": "characters_with_tag", "tag": tag}),
        );
        if ctx.abort {
            return Vec::new();
        }
        let result = self.current_snapshot().characters_with_tag(tag);
        let _ = self.hooks.fire(
            HookPoint::AfterQuery,
            json!({"query": "characters_with_tag", "matches": result.len()}),
        );
        result
    }

    /// Ids of events carrying the tag, case-insensitively.
    #[must_use]
    pub fn list_events_with_tag(&self, tag: &str) -> Vec<EntityId> {
        let ctx = self.hooks.fire(
            HookPoint::BeforeQuery,
            json!({"query": "events_with_tag", "tag": tag}),
        );
        if ctx.abort {
            return Vec::new();
        }
        let result = self.current_snapshot().events_with_tag(tag);
        let _ = self.hooks.fire(
            HookPoint::AfterQuery,
            json!({"query": "events_with_tag", "matches": result.len()}),
        );
        result
    }

    /// Ids of events a character participates in.
    #[must_use]
    pub fn list_events_for_character(&self, id: &str) -> Vec<EntityId> {
        match EntityId::new(id) {
            Ok(entity_id) => self.current_snapshot().events_for_character(&entity_id),
            Err(_) => Vec::new(),
        }
    }

    // =========================================================================
    // VALIDATION
    // =========================================================================

    /// Re-run the full gate and cross-reference pass over the store.
    ///
    /// Aggregates every issue into one report. A `before_validation` abort
    /// yields an empty error list plus a warning noting the abort.
    pub fn validate_all(&self) -> Result<ValidationReport, TestamentError> {
        let ctx = self.hooks.fire(HookPoint::BeforeValidation, Value::Null);
        if ctx.abort {
            return Ok(ValidationReport {
                errors: Vec::new(),
                warnings: vec![ValidationIssue::warning(
                    "validation",
                    "before_validation",
                    "validation aborted by hook; no checks were run",
                )],
            });
        }

        let outcome = {
            let store = self.store.read().unwrap_or_else(|e| e.into_inner());
            ingest::load_snapshot_with(store.as_ref(), true)
        };

        let mut report = ValidationReport::default();
        match outcome {
            Ok(snapshot) => {
                for issue in snapshot.warnings() {
                    report.warnings.push(issue.clone());
                }
                let characters: BTreeMap<EntityId, Character> = snapshot
                    .iter_characters()
                    .map(|c| (c.id.clone(), c.clone()))
                    .collect();
                let events: BTreeMap<EntityId, Event> = snapshot
                    .iter_events()
                    .map(|e| (e.id.clone(), e.clone()))
                    .collect();
                report
                    .warnings
                    .extend(ingest::reference_warnings(&characters, &events));
            }
            Err(TestamentError::Validation(issues)) => {
                for issue in issues {
                    match issue.severity {
                        IssueSeverity::Error => report.errors.push(issue),
                        IssueSeverity::Warning => report.warnings.push(issue),
                    }
                }
            }
            Err(other) => return Err(other),
        }

        for error in &report.errors {
            let _ = self.hooks.fire(
                HookPoint::ValidationError,
                serde_json::to_value(error).unwrap_or(Value::Null),
            );
        }
        let _ = self.hooks.fire(
            HookPoint::AfterValidation,
            serde_json::to_value(&report).unwrap_or(Value::Null),
        );

        Ok(report)
    }

    // =========================================================================
    // CONFLICT DETECTION
    // =========================================================================

    /// Conflict summaries for a character, keyed by disputed field.
    pub fn character_conflicts(
        &self,
        id: &str,
    ) -> Result<BTreeMap<String, ConflictSummary>, TestamentError> {
        let character = self.get_character(id)?;
        let claims = claims_for_character(&character);
        let summaries =
            self.detect_with_hooks(EntityKind::Character, character.id.clone(), &claims);
        Ok(summaries
            .into_iter()
            .map(|s| (s.field.clone(), s))
            .collect())
    }

    /// Conflict summaries for an event, keyed by disputed field.
    pub fn event_conflicts(
        &self,
        id: &str,
    ) -> Result<BTreeMap<String, ConflictSummary>, TestamentError> {
        let event = self.get_event(id)?;
        let claims = claims_for_event(&event);
        let summaries = self.detect_with_hooks(EntityKind::Event, event.id.clone(), &claims);
        Ok(summaries
            .into_iter()
            .map(|s| (s.field.clone(), s))
            .collect())
    }

    /// Run conflict detection with cache and hook interposition.
    ///
    /// `before_conflict_detection` abort yields a no-op (empty) result.
    /// `conflict_severity_score` may override each summary's severity.
    fn detect_with_hooks(
        &self,
        kind: EntityKind,
        id: EntityId,
        claims: &[Claim],
    ) -> Vec<ConflictSummary> {
        let key = (kind, id);
        let cached = {
            let cache = self.conflict_cache.read().unwrap_or_else(|e| e.into_inner());
            cache.get(&key)
        };
        let cache_meta = json!({"kind": key.0, "id": key.1.as_str(), "cache": "conflict_summaries"});
        if let Some(hit) = cached {
            let _ = self.hooks.fire(HookPoint::CacheHit, cache_meta);
            return hit;
        }
        let _ = self.hooks.fire(HookPoint::CacheMiss, cache_meta);

        let ctx = self.hooks.fire(
            HookPoint::BeforeConflictDetection,
            json!({"kind": key.0, "id": key.1.as_str(), "claims": claims.len()}),
        );
        if ctx.abort {
            return Vec::new();
        }

        let mut summaries = detect_conflicts(claims);

        if self.hooks.handler_count(HookPoint::ConflictSeverityScore) > 0 {
            for summary in &mut summaries {
                let ctx = self.hooks.fire(
                    HookPoint::ConflictSeverityScore,
                    serde_json::to_value(&*summary).unwrap_or(Value::Null),
                );
                if let Some(label) = ctx.data.get("severity").and_then(Value::as_str) {
                    match Severity::from_str(label) {
                        Ok(severity) => summary.severity = severity,
                        Err(err) => {
                            tracing::warn!(
                                field = %summary.field,
                                error = %err,
                                "ignoring invalid severity override"
                            );
                        }
                    }
                }
            }
        }

        let _ = self.hooks.fire(
            HookPoint::AfterConflictDetection,
            serde_json::to_value(&summaries).unwrap_or(Value::Null),
        );

        self.conflict_cache
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key, summaries.clone());
        summaries
    }

    // =========================================================================
    // DOSSIERS
    // =========================================================================

    /// Build a character dossier, with enrichment hooks applied.
    ///
    /// A `before_dossier_build` abort yields the minimal record
    /// `{id, schema_version, aborted: true}`.
    pub fn build_character_dossier(&self, id: &str) -> Result<Value, TestamentError> {
        let ctx = self.hooks.fire(
            HookPoint::BeforeDossierBuild,
            json!({"id": id, "type": EntityKind::Character}),
        );
        if ctx.abort {
            return Ok(minimal_dossier(id));
        }

        let character = self.get_character(id)?;
        let snapshot = self.current_snapshot();
        let claims = claims_for_character(&character);
        let conflicts =
            self.detect_with_hooks(EntityKind::Character, character.id.clone(), &claims);

        let dossier = dossier::character_dossier(&snapshot, &character, claims, conflicts);
        let value = serde_json::to_value(&dossier)
            .map_err(|e| TestamentError::Storage(format!("dossier serialization failed: {e}")))?;
        Ok(self.finish_dossier(value))
    }

    /// Build an event dossier, with enrichment hooks applied.
    pub fn build_event_dossier(&self, id: &str) -> Result<Value, TestamentError> {
        let ctx = self.hooks.fire(
            HookPoint::BeforeDossierBuild,
            json!({"id": id, "type": EntityKind::Event}),
        );
        if ctx.abort {
            return Ok(minimal_dossier(id));
        }

        let event = self.get_event(id)?;
        let claims = claims_for_event(&event);
        let conflicts = self.detect_with_hooks(EntityKind::Event, event.id.clone(), &claims);

        let dossier = dossier::event_dossier(&event, claims, conflicts);
        let value = serde_json::to_value(&dossier)
            .map_err(|e| TestamentError::Storage(format!("dossier serialization failed: {e}")))?;
        Ok(self.finish_dossier(value))
    }

    /// The enrichment point fires between field computation and
    /// finalization; a handler that leaves the dossier as a non-object is
    /// discarded.
    fn finish_dossier(&self, value: Value) -> Value {
        let enriched = self.hooks.fire(HookPoint::DossierEnrich, value.clone());
        let finalized = if enriched.data.is_object() {
            enriched.data
        } else {
            tracing::warn!("dossier enrichment produced a non-object; keeping original");
            value
        };
        let _ = self
            .hooks
            .fire(HookPoint::AfterDossierBuild, finalized.clone());
        finalized
    }

    // =========================================================================
    // SEARCH
    // =========================================================================

    /// Search characters and events for a case-insensitive substring.
    ///
    /// # Errors
    /// `Search` for an empty query or an unknown scope value.
    pub fn search_all(
        &self,
        query: &str,
        scope: Option<&[String]>,
    ) -> Result<Vec<SearchMatch>, TestamentError> {
        if query.trim().is_empty() {
            return Err(TestamentError::Search("query must be non-empty".to_string()));
        }
        let scopes = search::parse_scopes(scope)?;

        let ctx = self.hooks.fire(
            HookPoint::BeforeSearch,
            json!({
                "query": query,
                "scope": scopes.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
            }),
        );
        if ctx.abort {
            return Ok(Vec::new());
        }
        let query = ctx
            .data
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or(query)
            .to_string();
        let needle = query.trim().to_lowercase();

        let snapshot = self.current_snapshot();
        let mut results: std::collections::BTreeSet<SearchMatch> = std::collections::BTreeSet::new();
        if scopes.contains(&SearchScope::Tags) {
            results.extend(search::tag_seed(&snapshot, query.trim()));
        }
        results.extend(search::scan(&snapshot, &needle, &scopes));

        let mut filtered = Vec::new();
        for result in results {
            if self.hooks.handler_count(HookPoint::SearchResultFilter) == 0 {
                filtered.push(result);
                continue;
            }
            let ctx = self.hooks.fire(
                HookPoint::SearchResultFilter,
                serde_json::to_value(&result).unwrap_or(Value::Null),
            );
            if ctx.abort {
                continue;
            }
            filtered.push(read_back(ctx, result, HookPoint::SearchResultFilter));
        }

        let ranked = if self.hooks.handler_count(HookPoint::SearchResultRank) > 0 {
            let ctx = self.hooks.fire(
                HookPoint::SearchResultRank,
                serde_json::to_value(&filtered).unwrap_or(Value::Null),
            );
            read_back(ctx, filtered, HookPoint::SearchResultRank)
        } else {
            filtered
        };

        let _ = self.hooks.fire(
            HookPoint::AfterSearch,
            json!({"query": query, "matches": ranked.len()}),
        );
        Ok(ranked)
    }

    // =========================================================================
    // EXPORT
    // =========================================================================

    /// Assemble every dossier into one export bundle.
    ///
    /// Only the `json` format is native; `export_format_resolve` handlers
    /// may rewrite an alias onto it. A `before_export` abort yields an
    /// empty bundle.
    pub fn export_all(&self, format: &str) -> Result<Value, TestamentError> {
        let ctx = self
            .hooks
            .fire(HookPoint::BeforeExport, json!({"format": format}));
        if ctx.abort {
            return Ok(json!({
                "format": format,
                "characters": [],
                "events": [],
            }));
        }

        let resolve = self
            .hooks
            .fire(HookPoint::ExportFormatResolve, json!(format));
        let resolved = resolve.data.as_str().unwrap_or(format).to_string();
        if resolved != "json" {
            return Err(TestamentError::Configuration(format!(
                "unsupported export format '{resolved}'"
            )));
        }

        let snapshot = self.current_snapshot();
        let mut characters = Vec::new();
        for id in snapshot.character_ids() {
            characters.push(self.build_character_dossier(id.as_str())?);
        }
        let mut events = Vec::new();
        for id in snapshot.event_ids() {
            events.push(self.build_event_dossier(id.as_str())?);
        }

        let bundle = json!({
            "format": resolved,
            "characters": characters,
            "events": events,
        });
        let _ = self.hooks.fire(HookPoint::AfterExport, bundle.clone());
        Ok(bundle)
    }
}

/// Minimal dossier returned when a build is aborted by hook.
fn minimal_dossier(id: &str) -> Value {
    json!({
        "id": id,
        "schema_version": DOSSIER_SCHEMA_VERSION,
        "aborted": true,
    })
}

/// Deserialize hook-modified data back into its typed form, keeping the
/// original when the data no longer fits the type.
fn read_back<T: DeserializeOwned>(ctx: HookContext, original: T, point: HookPoint) -> T {
    match serde_json::from_value(ctx.data) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(
                point = %point,
                error = %err,
                "hook data no longer matches the expected shape; keeping original"
            );
            original
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
