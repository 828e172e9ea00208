//! Pipeline configuration

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::storage::BackendConfig;
use crate::{Error, Result};

/// Default ceiling on the training worker pool.
pub const DEFAULT_MAX_WORKERS: usize = 20;

/// Orchestrator settings.
///
/// ```rust
/// use trueno_pipeline::pipeline::PipelineConfig;
///
/// let config = PipelineConfig::from_json_str(
///     r#"{"workers": 4, "backend": {"backend": "json_file", "path": "runs.json"}}"#,
/// ).unwrap();
/// assert_eq!(config.workers, 4);
/// assert!(config.save);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineConfig {
    /// Requested training workers; 1 means serial
    pub workers: usize,
    /// Ceiling for `workers`; larger requests are clamped with a warning
    pub max_workers: usize,
    /// Persist the experiment after finalize
    pub save: bool,
    /// Fingerprint every dataset after load
    pub hash_data: bool,
    /// Probe trained models for params, importances and coefficients
    pub introspect: bool,
    /// Storage backend for the experiment
    pub backend: BackendConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            max_workers: DEFAULT_MAX_WORKERS,
            save: true,
            hash_data: true,
            introspect: false,
            backend: BackendConfig::memory(),
        }
    }
}

impl PipelineConfig {
    /// Parse configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the text is not a valid configuration.
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the file cannot be read, or a JSON error if it
    /// is not a valid configuration.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Worker count after validation.
    ///
    /// Requests above `max_workers` are clamped with a warning rather than
    /// rejected.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `workers` or `max_workers` is zero.
    pub fn effective_workers(&self) -> Result<usize> {
        if self.workers == 0 {
            return Err(Error::Configuration(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.max_workers == 0 {
            return Err(Error::Configuration(
                "max_workers must be at least 1".to_string(),
            ));
        }
        if self.workers > self.max_workers {
            warn!(
                requested = self.workers,
                max_workers = self.max_workers,
                "worker count above ceiling, clamping"
            );
            return Ok(self.max_workers);
        }
        Ok(self.workers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::from_json_str("{}").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.max_workers, DEFAULT_MAX_WORKERS);
        assert_eq!(config.backend, BackendConfig::memory());
    }

    #[test]
    fn test_clamp() {
        let config = PipelineConfig {
            workers: 64,
            ..PipelineConfig::default()
        };
        assert_eq!(config.effective_workers().unwrap(), DEFAULT_MAX_WORKERS);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = PipelineConfig {
            workers: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(
            config.effective_workers(),
            Err(Error::Configuration(_))
        ));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.json");
        fs::write(&path, r#"{"workers": 2, "hash_data": false}"#).unwrap();
        let config = PipelineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.workers, 2);
        assert!(!config.hash_data);
        assert!(config.save);
    }

    #[test]
    fn test_bad_json() {
        assert!(matches!(
            PipelineConfig::from_json_str(r#"{"workers": "many"}"#),
            Err(Error::Json(_))
        ));
    }
}
