//! Error types for Trueno-Pipeline
//!
//! Toyota Way: Clear error messages with actionable guidance (Respect for People)

use std::fmt;

use thiserror::Error;

/// Boxed error carried from caller callbacks
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline stage, used to give failures context.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Callback validation before any work starts
    Validate,
    /// `load` callback and dataset fingerprinting
    Load,
    /// `model_iterator` callback
    Iterate,
    /// Per-model `train` callback
    Train,
    /// `finalize` callback and metadata stamping
    Finalize,
    /// Persisting the experiment
    Save,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validate => "validate",
            Self::Load => "load",
            Self::Iterate => "model_iterator",
            Self::Train => "train",
            Self::Finalize => "finalize",
            Self::Save => "save",
        };
        f.write_str(name)
    }
}

/// Trueno-Pipeline error types
#[derive(Error, Debug)]
pub enum Error {
    /// Missing callback, invalid worker count or worker/backend combination
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A value had the wrong shape (e.g. `load` did not produce a mapping)
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    /// Record field accessed by an unknown name
    #[error("Field not found: '{0}'\nCheck the field name for typos")]
    FieldNotFound(String),

    /// Backend asked to update a document identity it does not hold
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    /// Backend cannot provide the requested operation
    #[error("Operation not supported by {backend} backend: {operation}")]
    NotSupported {
        /// Backend name
        backend: &'static str,
        /// Refused operation
        operation: &'static str,
    },

    /// Write attempted on a read-only experiment
    #[error("Experiment is read-only: {0}")]
    ReadOnly(String),

    /// A `train` invocation failed; the whole run is aborted
    #[error("Training failed for model {index}{} ({model}): {source}", total_suffix(.total))]
    TrainingFailure {
        /// 1-based position of the model configuration
        index: usize,
        /// Total number of model configurations, when known
        total: Option<usize>,
        /// Debug rendering of the model configuration
        model: String,
        /// Error returned by the callback
        source: BoxError,
    },

    /// Dataset could not be fingerprinted
    #[error("Could not fingerprint dataset '{dataset}': {reason}")]
    HashingFailure {
        /// Dataset name
        dataset: String,
        /// Why hashing failed
        reason: String,
    },

    /// A `load`, `model_iterator` or `finalize` callback failed
    #[error("{stage} callback failed: {source}")]
    Callback {
        /// Stage whose callback failed
        stage: Stage,
        /// Error returned by the callback
        source: BoxError,
    },

    /// Backend storage error
    #[error("Storage error: {0}")]
    Storage(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

#[allow(clippy::ref_option)]
fn total_suffix(total: &Option<usize>) -> String {
    total.map_or_else(String::new, |t| format!("/{t}"))
}

impl Error {
    /// Stage the error is attributed to, when it carries one.
    #[must_use]
    pub const fn stage(&self) -> Option<Stage> {
        match self {
            Self::TrainingFailure { .. } => Some(Stage::Train),
            Self::HashingFailure { .. } | Self::TypeMismatch(_) => Some(Stage::Load),
            Self::Callback { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}
