//! Run Metadata - run-scoped fields stamped once at finalize time

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Run configuration echo.
pub const CONFIG_FIELD: &str = "_config";
/// Dataset name -> SHA-1 digest.
pub const DATA_HASHES_FIELD: &str = "_data_sha1_hashes";
/// Pipeline start timestamp.
pub const START_FIELD: &str = "_experiment_start";
/// Pipeline end timestamp.
pub const END_FIELD: &str = "_experiment_end";

/// Metadata describing one full pipeline run.
///
/// Stored once per experiment rather than copied onto every record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunMetadata {
    #[serde(rename = "_config")]
    config: serde_json::Value,
    #[serde(rename = "_data_sha1_hashes", skip_serializing_if = "Option::is_none", default)]
    data_hashes: Option<BTreeMap<String, String>>,
    #[serde(rename = "_experiment_start")]
    started_at: DateTime<Utc>,
    #[serde(rename = "_experiment_end")]
    ended_at: DateTime<Utc>,
}

impl RunMetadata {
    /// Create a builder with the run configuration.
    #[must_use]
    pub fn builder(config: serde_json::Value) -> RunMetadataBuilder {
        RunMetadataBuilder::new(config)
    }

    /// Get the run configuration.
    #[must_use]
    pub const fn config(&self) -> &serde_json::Value {
        &self.config
    }

    /// Get the dataset hashes, if data hashing was enabled.
    #[must_use]
    pub const fn data_hashes(&self) -> Option<&BTreeMap<String, String>> {
        self.data_hashes.as_ref()
    }

    /// Get the start timestamp.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Get the end timestamp.
    #[must_use]
    pub const fn ended_at(&self) -> DateTime<Utc> {
        self.ended_at
    }
}

/// Builder for `RunMetadata`.
#[derive(Debug)]
pub struct RunMetadataBuilder {
    config: serde_json::Value,
    data_hashes: Option<BTreeMap<String, String>>,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunMetadataBuilder {
    /// Create a new builder with the run configuration.
    #[must_use]
    pub const fn new(config: serde_json::Value) -> Self {
        Self {
            config,
            data_hashes: None,
            started_at: None,
            ended_at: None,
        }
    }

    /// Set the dataset hashes.
    #[must_use]
    pub fn data_hashes(mut self, hashes: BTreeMap<String, String>) -> Self {
        self.data_hashes = Some(hashes);
        self
    }

    /// Set the start timestamp.
    #[must_use]
    pub const fn started_at(mut self, at: DateTime<Utc>) -> Self {
        self.started_at = Some(at);
        self
    }

    /// Set the end timestamp.
    #[must_use]
    pub const fn ended_at(mut self, at: DateTime<Utc>) -> Self {
        self.ended_at = Some(at);
        self
    }

    /// Build the `RunMetadata`. Missing timestamps default to now.
    #[must_use]
    pub fn build(self) -> RunMetadata {
        let now = Utc::now();
        let started_at = self.started_at.unwrap_or(now);
        RunMetadata {
            config: self.config,
            data_hashes: self.data_hashes,
            started_at,
            ended_at: self.ended_at.unwrap_or(now),
        }
    }
}
