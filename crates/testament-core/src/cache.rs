//! # Cache Registry
//!
//! Named invalidation callbacks decoupling storage writes from the caches
//! layered over the snapshot.
//!
//! Components register a zero-argument invalidator under a name; the engine
//! calls `invalidate_all` after every successful write or reconfiguration.
//! Registry mistakes (duplicate or unknown names) surface as cache errors,
//! which callers log and never treat as fatal.

use std::fmt;
use std::sync::{Arc, RwLock};

use crate::types::TestamentError;

/// A cache invalidation callback.
pub type Invalidator = Arc<dyn Fn() + Send + Sync>;

/// Registry of cache invalidators, one per engine.
pub struct CacheRegistry {
    invalidators: RwLock<Vec<(String, Invalidator)>>,
}

impl fmt::Debug for CacheRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheRegistry")
            .field("count", &self.count())
            .finish()
    }
}

impl Default for CacheRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CacheRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            invalidators: RwLock::new(Vec::new()),
        }
    }

    /// Register an invalidator under a unique name.
    ///
    /// # Errors
    /// Returns a cache error when the name is already registered.
    pub fn register<F>(&self, name: impl Into<String>, invalidator: F) -> Result<(), TestamentError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let name = name.into();
        let mut list = self.invalidators.write().unwrap_or_else(|e| e.into_inner());
        if list.iter().any(|(n, _)| n == &name) {
            return Err(TestamentError::Cache(format!(
                "invalidator '{name}' is already registered"
            )));
        }
        list.push((name, Arc::new(invalidator)));
        Ok(())
    }

    /// Remove a registered invalidator.
    ///
    /// # Errors
    /// Returns a cache error when no invalidator with that name exists.
    pub fn unregister(&self, name: &str) -> Result<(), TestamentError> {
        let mut list = self.invalidators.write().unwrap_or_else(|e| e.into_inner());
        let before = list.len();
        list.retain(|(n, _)| n != name);
        if list.len() == before {
            return Err(TestamentError::Cache(format!(
                "invalidator '{name}' was not registered"
            )));
        }
        Ok(())
    }

    /// Call every registered invalidator in registration order.
    pub fn invalidate_all(&self) {
        let snapshot: Vec<Invalidator> = {
            let list = self.invalidators.read().unwrap_or_else(|e| e.into_inner());
            list.iter().map(|(_, f)| Arc::clone(f)).collect()
        };
        for invalidator in snapshot {
            invalidator();
        }
    }

    /// Remove every invalidator. Intended for test teardown.
    pub fn clear(&self) {
        self.invalidators
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Number of registered invalidators.
    #[must_use]
    pub fn count(&self) -> usize {
        self.invalidators
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }
}

// =============================================================================
// TESTS
// =============================================================================
