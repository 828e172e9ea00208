//! Backend selection by configuration discriminant.
//!
//! A [`BackendConfig`] names a backend (`"memory"`, `"json_file"`, or any
//! name registered by the caller) plus backend-specific options. The
//! [`BackendRegistry`] resolves it once, when the experiment is built.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{JsonFileBackend, MemoryBackend, StorageBackend};
use crate::record::Document;
use crate::{Error, Result};

/// Backend configuration: a discriminant plus backend-specific options.
///
/// ```rust
/// use trueno_pipeline::storage::BackendConfig;
///
/// let config: BackendConfig =
///     serde_json::from_str(r#"{"backend": "json_file", "path": "runs.json"}"#).unwrap();
/// assert_eq!(config.backend, "json_file");
/// assert_eq!(config.options["path"], "runs.json");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Registered backend name
    pub backend: String,
    /// Options validated by the chosen backend
    #[serde(flatten)]
    pub options: Document,
}

impl BackendConfig {
    /// Configuration for the in-memory backend.
    #[must_use]
    pub fn memory() -> Self {
        Self {
            backend: "memory".to_string(),
            options: Document::new(),
        }
    }

    /// Configuration for the single-file JSON backend.
    #[must_use]
    pub fn json_file(path: impl Into<PathBuf>) -> Self {
        let mut options = Document::new();
        options.insert(
            "path".to_string(),
            Value::String(path.into().to_string_lossy().into_owned()),
        );
        Self {
            backend: "json_file".to_string(),
            options,
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::memory()
    }
}

/// Constructor turning backend options into a backend instance.
pub type BackendConstructor =
    Box<dyn Fn(&Document) -> Result<Arc<dyn StorageBackend>> + Send + Sync>;

/// Registry mapping backend names to constructors.
pub struct BackendRegistry {
    constructors: FxHashMap<String, BackendConstructor>,
}

impl BackendRegistry {
    /// Registry with no backends.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            constructors: FxHashMap::default(),
        }
    }

    /// Registry with the built-in `memory` and `json_file` backends.
    #[must_use]
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("memory", |_| Ok(Arc::new(MemoryBackend::new())));
        registry.register("json_file", |options| {
            let path = options
                .get("path")
                .and_then(Value::as_str)
                .ok_or_else(|| {
                    Error::Configuration("json_file backend requires a 'path' option".to_string())
                })?;
            Ok(Arc::new(JsonFileBackend::open(path)?))
        });
        registry
    }

    /// Register (or replace) a backend constructor.
    pub fn register<F>(&mut self, name: impl Into<String>, constructor: F)
    where
        F: Fn(&Document) -> Result<Arc<dyn StorageBackend>> + Send + Sync + 'static,
    {
        self.constructors.insert(name.into(), Box::new(constructor));
    }

    /// Check whether a backend name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.constructors.contains_key(name)
    }

    /// Registered backend names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Build the backend a configuration names.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for an unknown backend name, or
    /// whatever the backend's constructor rejects.
    pub fn build(&self, config: &BackendConfig) -> Result<Arc<dyn StorageBackend>> {
        let constructor = self.constructors.get(&config.backend).ok_or_else(|| {
            Error::Configuration(format!(
                "unknown backend '{}' (registered: {})",
                config.backend,
                self.names().join(", ")
            ))
        })?;
        constructor(&config.options)
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("backends", &self.names())
            .finish()
    }
}
