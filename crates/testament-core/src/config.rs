//! # Engine Configuration
//!
//! The recognized knobs, their defaults, and loading from an explicit value
//! map or from `TESTAMENT_*` environment variables. Unknown options are
//! rejected with a configuration error; configuration problems are fatal at
//! startup.

use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::types::TestamentError;

/// Default bound for the per-entity conflict summary cache.
pub const DEFAULT_CACHE_SIZE: usize = 128;

// =============================================================================
// LOG LEVEL
// =============================================================================

/// Log verbosity, mapped onto `tracing::Level` by the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    #[default]
    Warn,
    Error,
}

impl LogLevel {
    /// The uppercase label of the level.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "TRACE",
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
        }
    }

    /// The equivalent `tracing` level.
    #[must_use]
    pub const fn as_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = TestamentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(Self::Trace),
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARN" | "WARNING" => Ok(Self::Warn),
            "ERROR" => Ok(Self::Error),
            other => Err(TestamentError::Configuration(format!(
                "invalid log level '{other}', expected TRACE|DEBUG|INFO|WARN|ERROR"
            ))),
        }
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Data root for the file-tree adapter. `None` means the embedder
    /// supplies a store directly.
    pub data_root: Option<PathBuf>,
    /// Bound for the conflict summary cache. Zero disables caching.
    pub cache_size: usize,
    /// Run the full validation gate on load.
    pub enable_validation: bool,
    pub log_level: LogLevel,
    /// Master toggle for the hook runtime.
    pub hooks_enabled: bool,
    /// Names of hook plugins the embedder should load. Recorded only; the
    /// engine does not load code.
    pub hook_plugins: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_root: None,
            cache_size: DEFAULT_CACHE_SIZE,
            enable_validation: true,
            log_level: LogLevel::Warn,
            hooks_enabled: true,
            hook_plugins: Vec::new(),
        }
    }
}

const RECOGNIZED_OPTIONS: &[&str] = &[
    "data_root",
    "cache_size",
    "enable_validation",
    "log_level",
    "hooks_enabled",
    "hook_plugins",
];

impl EngineConfig {
    /// Build a configuration from an explicit option map.
    ///
    /// # Errors
    /// Rejects unknown options, wrong option types, negative cache sizes,
    /// unknown log levels, and data roots that do not exist.
    pub fn from_value(options: &Value) -> Result<Self, TestamentError> {
        let Value::Object(map) = options else {
            return Err(TestamentError::Configuration(
                "configuration must be an object of options".to_string(),
            ));
        };

        for key in map.keys() {
            if !RECOGNIZED_OPTIONS.contains(&key.as_str()) {
                return Err(TestamentError::Configuration(format!(
                    "unknown option '{key}'"
                )));
            }
        }

        let mut config = Self::default();

        if let Some(value) = map.get("data_root") {
            let Value::String(path) = value else {
                return Err(TestamentError::Configuration(
                    "data_root must be a path string".to_string(),
                ));
            };
            config.data_root = Some(Self::resolve_data_root(path)?);
        }

        if let Some(value) = map.get("cache_size") {
            let size = value.as_u64().ok_or_else(|| {
                TestamentError::Configuration(format!(
                    "cache_size must be a non-negative integer, got {value}"
                ))
            })?;
            config.cache_size = usize::try_from(size).map_err(|_| {
                TestamentError::Configuration(format!("cache_size {size} is out of range"))
            })?;
        }

        if let Some(value) = map.get("enable_validation") {
            config.enable_validation = value.as_bool().ok_or_else(|| {
                TestamentError::Configuration("enable_validation must be a boolean".to_string())
            })?;
        }

        if let Some(value) = map.get("log_level") {
            let Value::String(level) = value else {
                return Err(TestamentError::Configuration(
                    "log_level must be a string".to_string(),
                ));
            };
            config.log_level = level.parse()?;
        }

        if let Some(value) = map.get("hooks_enabled") {
            config.hooks_enabled = value.as_bool().ok_or_else(|| {
                TestamentError::Configuration("hooks_enabled must be a boolean".to_string())
            })?;
        }

        if let Some(value) = map.get("hook_plugins") {
            let Value::Array(entries) = value else {
                return Err(TestamentError::Configuration(
                    "hook_plugins must be a list of plugin names".to_string(),
                ));
            };
            let mut plugins = Vec::new();
            for entry in entries {
                match entry {
                    Value::String(name) if !name.trim().is_empty() => {
                        plugins.push(name.clone());
                    }
                    _ => {
                        return Err(TestamentError::Configuration(
                            "hook_plugins entries must be non-empty strings".to_string(),
                        ));
                    }
                }
            }
            config.hook_plugins = plugins;
        }

        Ok(config)
    }

    /// Build a configuration from `TESTAMENT_*` environment variables,
    /// falling back to defaults for anything unset.
    pub fn from_env() -> Result<Self, TestamentError> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("TESTAMENT_DATA_ROOT") {
            if !path.is_empty() {
                config.data_root = Some(Self::resolve_data_root(&path)?);
            }
        }
        if let Ok(size) = std::env::var("TESTAMENT_CACHE_SIZE") {
            config.cache_size = size.parse().map_err(|_| {
                TestamentError::Configuration(format!(
                    "TESTAMENT_CACHE_SIZE must be a non-negative integer, got '{size}'"
                ))
            })?;
        }
        if let Ok(flag) = std::env::var("TESTAMENT_ENABLE_VALIDATION") {
            config.enable_validation = parse_bool(&flag, "TESTAMENT_ENABLE_VALIDATION")?;
        }
        if let Ok(level) = std::env::var("TESTAMENT_LOG_LEVEL") {
            config.log_level = level.parse()?;
        }
        if let Ok(flag) = std::env::var("TESTAMENT_HOOKS_ENABLED") {
            config.hooks_enabled = parse_bool(&flag, "TESTAMENT_HOOKS_ENABLED")?;
        }
        if let Ok(plugins) = std::env::var("TESTAMENT_HOOK_PLUGINS") {
            config.hook_plugins = plugins
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        Ok(config)
    }

    fn resolve_data_root(path: &str) -> Result<PathBuf, TestamentError> {
        let path = PathBuf::from(path);
        if !path.exists() {
            return Err(TestamentError::Configuration(format!(
                "data root '{}' does not exist",
                path.display()
            )));
        }
        Ok(path)
    }
}

fn parse_bool(value: &str, option: &str) -> Result<bool, TestamentError> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(TestamentError::Configuration(format!(
            "{option} must be a boolean, got '{other}'"
        ))),
    }
}

// =============================================================================
// TESTS
// =============================================================================
