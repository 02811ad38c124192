//! # Hook Runtime
//!
//! Priority-ordered interposition at the engine's lifecycle boundaries.
//!
//! A `HookContext` flows through the handlers registered for a point. Lower
//! priority runs first; ties run in registration order. A handler may mutate
//! the context data or set `abort`, which stops dispatch immediately and
//! makes the surrounding operation follow its abort contract.
//!
//! Handler failures are isolated: a failing handler is logged and dispatch
//! continues with the context as it stood before that handler ran. Hooks
//! never take an operation down with them unless they set `abort` first.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::types::TestamentError;

// =============================================================================
// HOOK POINTS
// =============================================================================

/// Every lifecycle point the engine can interpose on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum HookPoint {
    // Data lifecycle
    BeforeCharacterLoad,
    AfterCharacterLoad,
    BeforeCharacterSave,
    AfterCharacterSave,
    BeforeEventLoad,
    AfterEventLoad,
    BeforeEventSave,
    AfterEventSave,

    // Validation
    BeforeValidation,
    AfterValidation,
    ValidationError,

    // Query and cache
    BeforeQuery,
    AfterQuery,
    CacheHit,
    CacheMiss,

    // Search
    BeforeSearch,
    AfterSearch,
    SearchResultFilter,
    SearchResultRank,

    // Dossiers
    BeforeDossierBuild,
    DossierEnrich,
    AfterDossierBuild,

    // Export
    BeforeExport,
    AfterExport,
    ExportFormatResolve,

    // Conflict detection
    BeforeConflictDetection,
    AfterConflictDetection,
    ConflictSeverityScore,

    // System
    Startup,
    Shutdown,
    ConfigChange,
}

impl HookPoint {
    /// The snake_case name of the point, as exposed to handlers.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BeforeCharacterLoad => "before_character_load",
            Self::AfterCharacterLoad => "after_character_load",
            Self::BeforeCharacterSave => "before_character_save",
            Self::AfterCharacterSave => "after_character_save",
            Self::BeforeEventLoad => "before_event_load",
            Self::AfterEventLoad => "after_event_load",
            Self::BeforeEventSave => "before_event_save",
            Self::AfterEventSave => "after_event_save",
            Self::BeforeValidation => "before_validation",
            Self::AfterValidation => "after_validation",
            Self::ValidationError => "validation_error",
            Self::BeforeQuery => "before_query",
            Self::AfterQuery => "after_query",
            Self::CacheHit => "cache_hit",
            Self::CacheMiss => "cache_miss",
            Self::BeforeSearch => "before_search",
            Self::AfterSearch => "after_search",
            Self::SearchResultFilter => "search_result_filter",
            Self::SearchResultRank => "search_result_rank",
            Self::BeforeDossierBuild => "before_dossier_build",
            Self::DossierEnrich => "dossier_enrich",
            Self::AfterDossierBuild => "after_dossier_build",
            Self::BeforeExport => "before_export",
            Self::AfterExport => "after_export",
            Self::ExportFormatResolve => "export_format_resolve",
            Self::BeforeConflictDetection => "before_conflict_detection",
            Self::AfterConflictDetection => "after_conflict_detection",
            Self::ConflictSeverityScore => "conflict_severity_score",
            Self::Startup => "startup",
            Self::Shutdown => "shutdown",
            Self::ConfigChange => "config_change",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// CONTEXT
// =============================================================================

/// Context object passed through the handlers of one dispatch.
#[derive(Debug, Clone)]
pub struct HookContext {
    /// The point that triggered this dispatch.
    pub point: HookPoint,
    /// The primary payload. Handlers may replace or mutate it.
    pub data: Value,
    /// Read-only side information about the operation.
    pub metadata: BTreeMap<String, Value>,
    /// Set to stop dispatch and abort the surrounding operation.
    pub abort: bool,
}

impl HookContext {
    /// Create a context with empty metadata.
    #[must_use]
    pub fn new(point: HookPoint, data: Value) -> Self {
        Self {
            point,
            data,
            metadata: BTreeMap::new(),
            abort: false,
        }
    }

    /// Attach a metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

/// A registered hook handler.
///
/// Handlers mutate the context in place. Returning `Err` marks the handler
/// as failed; dispatch logs the failure and continues with the context
/// unchanged for that step.
pub type Handler = Arc<dyn Fn(&mut HookContext) -> Result<(), TestamentError> + Send + Sync>;

/// Opaque token returned by `register`, used to unregister.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct HandlerId(u64);

struct RegisteredHandler {
    id: HandlerId,
    priority: i32,
    handler: Handler,
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Registry of hook handlers, one per engine.
///
/// Registration is rare (configuration time) and dispatch is frequent, so
/// the handler table sits behind a read-biased lock. Dispatch snapshots the
/// handler list and releases the lock before running any handler, so
/// handlers may re-enter the engine.
pub struct HookRegistry {
    handlers: RwLock<BTreeMap<HookPoint, Vec<RegisteredHandler>>>,
    enabled: AtomicBool,
    next_id: AtomicU64,
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("enabled", &self.enabled.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HookRegistry {
    /// Create an enabled registry with no handlers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(BTreeMap::new()),
            enabled: AtomicBool::new(true),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a handler at the given point.
    ///
    /// Lower priority runs first; equal priorities run in registration
    /// order. The default priority used across the engine is 100.
    pub fn register<F>(&self, point: HookPoint, priority: i32, handler: F) -> HandlerId
    where
        F: Fn(&mut HookContext) -> Result<(), TestamentError> + Send + Sync + 'static,
    {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let mut table = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let slot = table.entry(point).or_default();
        slot.push(RegisteredHandler {
            id,
            priority,
            handler: Arc::new(handler),
        });
        // Stable by registration id, so equal priorities keep their order.
        slot.sort_by_key(|h| (h.priority, h.id));
        tracing::debug!(point = %point, priority, "registered hook handler");
        id
    }

    /// Remove a previously registered handler. Returns false when the id is
    /// not registered at that point.
    pub fn unregister(&self, point: HookPoint, id: HandlerId) -> bool {
        let mut table = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let Some(slot) = table.get_mut(&point) else {
            return false;
        };
        let before = slot.len();
        slot.retain(|h| h.id != id);
        before != slot.len()
    }

    /// Remove every handler. Intended for test teardown.
    pub fn clear(&self) {
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of handlers registered at a point.
    #[must_use]
    pub fn handler_count(&self, point: HookPoint) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&point)
            .map_or(0, Vec::len)
    }

    /// Enable dispatch.
    pub fn enable(&self) {
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Disable dispatch. Disabled dispatch returns the input context
    /// untouched without taking the handler lock.
    pub fn disable(&self) {
        self.enabled.store(false, Ordering::Relaxed);
    }

    /// Whether dispatch is enabled.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Run the handlers registered at a point over the given context.
    ///
    /// Dispatch stops at the first handler that sets `abort`. A handler
    /// that returns `Err` is logged and skipped; the context continues
    /// unchanged from before that handler.
    #[must_use]
    pub fn dispatch(&self, mut ctx: HookContext) -> HookContext {
        if !self.is_enabled() {
            return ctx;
        }

        let snapshot: Vec<(HandlerId, i32, Handler)> = {
            let table = self.handlers.read().unwrap_or_else(|e| e.into_inner());
            match table.get(&ctx.point) {
                Some(slot) => slot
                    .iter()
                    .map(|h| (h.id, h.priority, Arc::clone(&h.handler)))
                    .collect(),
                None => return ctx,
            }
        };

        for (id, priority, handler) in snapshot {
            let checkpoint = ctx.clone();
            match handler(&mut ctx) {
                Ok(()) => {
                    if ctx.abort {
                        tracing::debug!(
                            point = %ctx.point,
                            priority,
                            "hook aborted operation"
                        );
                        break;
                    }
                }
                Err(err) => {
                    tracing::warn!(
                        point = %checkpoint.point,
                        priority,
                        handler = ?id,
                        error = %err,
                        "hook handler failed; continuing"
                    );
                    ctx = checkpoint;
                }
            }
        }

        ctx
    }

    /// Dispatch with a payload and empty metadata.
    #[must_use]
    pub fn fire(&self, point: HookPoint, data: Value) -> HookContext {
        self.dispatch(HookContext::new(point, data))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn handlers_run_in_priority_order() {
        let registry = HookRegistry::new();
        registry.register(HookPoint::Startup, 200, |ctx| {
            if let Value::Array(log) = &mut ctx.data {
                log.push(json!("late"));
            }
            Ok(())
        });
        registry.register(HookPoint::Startup, 10, |ctx| {
            if let Value::Array(log) = &mut ctx.data {
                log.push(json!("early"));
            }
            Ok(())
        });

        let ctx = registry.fire(HookPoint::Startup, json!([]));
        assert_eq!(ctx.data, json!(["early", "late"]));
    }

    #[test]
    fn equal_priorities_keep_registration_order() {
        let registry = HookRegistry::new();
        for label in ["first", "second", "third"] {
            registry.register(HookPoint::Startup, 100, move |ctx| {
                if let Value::Array(log) = &mut ctx.data {
                    log.push(json!(label));
                }
                Ok(())
            });
        }

        let ctx = registry.fire(HookPoint::Startup, json!([]));
        assert_eq!(ctx.data, json!(["first", "second", "third"]));
    }

    #[test]
    fn abort_stops_remaining_handlers() {
        let registry = HookRegistry::new();
        registry.register(HookPoint::BeforeCharacterSave, 50, |ctx| {
            ctx.abort = true;
            Ok(())
        });
        registry.register(HookPoint::BeforeCharacterSave, 100, |ctx| {
            ctx.data = json!("should not run");
            Ok(())
        });

        let ctx = registry.fire(HookPoint::BeforeCharacterSave, json!("original"));
        assert!(ctx.abort);
        assert_eq!(ctx.data, json!("original"));
    }

    #[test]
    fn failing_handler_is_isolated() {
        let registry = HookRegistry::new();
        registry.register(HookPoint::DossierEnrich, 10, |ctx| {
            ctx.data = json!("half-mutated");
            Err(TestamentError::Cache("boom".to_string()))
        });
        registry.register(HookPoint::DossierEnrich, 20, |ctx| {
            if let Value::Object(map) = &mut ctx.data {
                map.insert("enriched".to_string(), json!(true));
            }
            Ok(())
        });

        let ctx = registry.fire(HookPoint::DossierEnrich, json!({}));
        // The failing handler's partial mutation was rolled back and the
        // second handler saw the original data.
        assert_eq!(ctx.data, json!({"enriched": true}));
        assert!(!ctx.abort);
    }

    #[test]
    fn disabled_registry_returns_context_unchanged() {
        let registry = HookRegistry::new();
        registry.register(HookPoint::Startup, 100, |ctx| {
            ctx.data = json!("mutated");
            Ok(())
        });
        registry.disable();

        let ctx = registry.fire(HookPoint::Startup, json!("input"));
        assert_eq!(ctx.data, json!("input"));

        registry.enable();
        let ctx = registry.fire(HookPoint::Startup, json!("input"));
        assert_eq!(ctx.data, json!("mutated"));
    }

    #[test]
    fn unregister_removes_handler() {
        let registry = HookRegistry::new();
        let id = registry.register(HookPoint::Startup, 100, |ctx| {
            ctx.data = json!("mutated");
            Ok(())
        });
        assert_eq!(registry.handler_count(HookPoint::Startup), 1);

        assert!(registry.unregister(HookPoint::Startup, id));
        assert_eq!(registry.handler_count(HookPoint::Startup), 0);
        assert!(!registry.unregister(HookPoint::Startup, id));
    }

    #[test]
    fn metadata_flows_through_dispatch() {
        let registry = HookRegistry::new();
        registry.register(HookPoint::BeforeSearch, 100, |ctx| {
            assert_eq!(ctx.metadata.get("query"), Some(&json!("tomb")));
            Ok(())
        });

        let ctx = registry
            .dispatch(HookContext::new(HookPoint::BeforeSearch, Value::Null).with_meta(
                "query",
                json!("tomb"),
            ));
        assert!(!ctx.abort);
    }

    #[test]
    fn hook_point_names_are_snake_case() {
        assert_eq!(HookPoint::BeforeCharacterLoad.as_str(), "before_character_load");
        assert_eq!(HookPoint::ConflictSeverityScore.as_str(), "conflict_severity_score");
        assert_eq!(HookPoint::ConfigChange.to_string(), "config_change");
    }
}
