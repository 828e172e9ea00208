//! Experiment - the aggregate of one pipeline run
//!
//! An [`Experiment`] owns the records produced during a run plus the
//! run-scoped [`RunMetadata`], and is bound to exactly one
//! [`StorageBackend`].
//!
//! ## Persisted shape
//!
//! ```text
//! {_kind: "experiment", _experiment_id, _config, _data_sha1_hashes, _experiment_start, _experiment_end}
//!     1 ──< N
//! {_kind: "record", _experiment_id, _model_class, _training_time_sec, ...train fields}
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use trueno_pipeline::experiment::Experiment;
//! use trueno_pipeline::storage::MemoryBackend;
//!
//! # fn main() -> trueno_pipeline::Result<()> {
//! let mut experiment = Experiment::new(Arc::new(MemoryBackend::new()));
//! let mut record = experiment.new_record();
//! record.set("precision", 0.87);
//! experiment.push(record);
//!
//! let first = experiment.save()?;
//! assert_eq!(first.inserted, 1);
//!
//! // Unmodified: saving again writes nothing.
//! let second = experiment.save()?;
//! assert_eq!(second.inserted + second.updated, 0);
//! # Ok(())
//! # }
//! ```

mod metadata;

pub use metadata::{
    RunMetadata, RunMetadataBuilder, CONFIG_FIELD, DATA_HASHES_FIELD, END_FIELD, START_FIELD,
};

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, info};

use crate::record::{Document, Record, ID_FIELD};
use crate::storage::{BackendConfig, BackendRegistry, Filter, StorageBackend};
use crate::{Error, Result};

/// Distinguishes record documents from experiment metadata documents.
pub const KIND_FIELD: &str = "_kind";
/// Links record documents to their experiment.
pub const EXPERIMENT_ID_FIELD: &str = "_experiment_id";

const KIND_RECORD: &str = "record";
const KIND_EXPERIMENT: &str = "experiment";

static SEQUENCE: AtomicU64 = AtomicU64::new(0);

fn generate_id() -> String {
    let ts = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    format!("{ts:x}-{:x}", SEQUENCE.fetch_add(1, Ordering::Relaxed))
}

/// What one [`Experiment::save`] call wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveSummary {
    /// Documents inserted through `save`
    pub inserted: usize,
    /// Documents replaced through `update`
    pub updated: usize,
}

/// Aggregate of records and run metadata bound to one backend.
pub struct Experiment {
    experiment_id: String,
    backend: Arc<dyn StorageBackend>,
    records: Vec<Record>,
    metadata: Record,
    read_only: bool,
}

impl Experiment {
    /// Create a writable experiment.
    #[must_use]
    pub fn new(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            experiment_id: generate_id(),
            backend,
            records: Vec::new(),
            metadata: Record::new(),
            read_only: false,
        }
    }

    /// Open an experiment for analysis only; every write is refused.
    #[must_use]
    pub fn read_only(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            read_only: true,
            ..Self::new(backend)
        }
    }

    /// Create an experiment whose backend is resolved from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the registry cannot build the
    /// backend.
    pub fn from_config(
        config: &BackendConfig,
        registry: &BackendRegistry,
        read_only: bool,
    ) -> Result<Self> {
        let backend = registry.build(config)?;
        debug!(backend = backend.name(), read_only, "experiment backend resolved");
        Ok(if read_only {
            Self::read_only(backend)
        } else {
            Self::new(backend)
        })
    }

    /// Get the experiment ID stamped on every persisted document.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Get the bound backend.
    #[must_use]
    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Check if the experiment refuses writes.
    #[must_use]
    pub const fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Allocate a fresh record for one training iteration.
    ///
    /// The record is owned by the caller until it is handed back with
    /// [`Experiment::push`].
    #[must_use]
    pub fn new_record(&self) -> Record {
        Record::new()
    }

    /// Track a record as part of this run.
    pub fn push(&mut self, record: Record) {
        self.records.push(record);
    }

    /// Records in insertion order.
    #[must_use]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Mutable access to the record collection, e.g. to keep only the best.
    pub fn records_mut(&mut self) -> &mut Vec<Record> {
        &mut self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Check if the experiment has no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Set a run-scoped metadata field.
    pub fn set_metadata(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.metadata.set(field, value);
    }

    /// Get a run-scoped metadata field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] if the field was never set.
    pub fn get_metadata(&self, field: &str) -> Result<&Value> {
        self.metadata.get(field)
    }

    /// All run-scoped metadata.
    #[must_use]
    pub const fn metadata(&self) -> &Record {
        &self.metadata
    }

    /// Stamp the run metadata fields.
    ///
    /// # Errors
    ///
    /// Returns a JSON error if the metadata cannot be serialized.
    pub fn stamp(&mut self, metadata: &RunMetadata) -> Result<()> {
        if let Value::Object(fields) = serde_json::to_value(metadata)? {
            for (field, value) in fields {
                self.metadata.set(field, value);
            }
        }
        Ok(())
    }

    /// Read the stamped run metadata back.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the metadata has not been stamped.
    pub fn run_metadata(&self) -> Result<RunMetadata> {
        serde_json::from_value(Value::Object(self.metadata.to_document()))
            .map_err(|e| Error::TypeMismatch(format!("run metadata incomplete: {e}")))
    }

    // Records loaded through `get` keep the kind and experiment they were
    // stored under.
    fn document_for(&self, record: &Record, kind: &str) -> Document {
        let mut document = record.to_document();
        document
            .entry(KIND_FIELD)
            .or_insert_with(|| Value::from(kind));
        document
            .entry(EXPERIMENT_ID_FIELD)
            .or_insert_with(|| Value::from(self.experiment_id.as_str()));
        document
    }

    /// Persist the experiment.
    ///
    /// Never-saved records (and the metadata) go through one batched
    /// `save`; previously saved records that changed go through `update`;
    /// clean records are skipped, so saving an unmodified experiment twice
    /// writes nothing the second time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ReadOnly`] before doing any work on a read-only
    /// experiment, [`Error::NotSupported`] if changed records need an update
    /// the backend cannot perform, and propagates backend errors.
    pub fn save(&mut self) -> Result<SaveSummary> {
        if self.read_only {
            return Err(Error::ReadOnly(format!(
                "experiment {} was opened for analysis",
                self.experiment_id
            )));
        }

        let save_metadata = self.metadata.id().is_none() && !self.metadata.is_empty();
        let update_metadata = self.metadata.id().is_some() && self.metadata.is_dirty();

        let mut inserts = Vec::new();
        if save_metadata {
            inserts.push(self.document_for(&self.metadata, KIND_EXPERIMENT));
        }
        let new_records: Vec<usize> = (0..self.records.len())
            .filter(|&i| self.records[i].id().is_none())
            .collect();
        inserts.extend(
            new_records
                .iter()
                .map(|&i| self.document_for(&self.records[i], KIND_RECORD)),
        );

        let mut updates = Vec::new();
        if update_metadata {
            updates.push(self.document_for(&self.metadata, KIND_EXPERIMENT));
        }
        let changed_records: Vec<usize> = (0..self.records.len())
            .filter(|&i| self.records[i].id().is_some() && self.records[i].is_dirty())
            .collect();
        updates.extend(
            changed_records
                .iter()
                .map(|&i| self.document_for(&self.records[i], KIND_RECORD)),
        );

        if !updates.is_empty() && !self.backend.capabilities().update {
            return Err(Error::NotSupported {
                backend: self.backend.name(),
                operation: "update",
            });
        }

        if !inserts.is_empty() {
            let ids = self.backend.save(&inserts)?;
            if ids.len() != inserts.len() {
                return Err(Error::Storage(format!(
                    "{} returned {} identities for {} documents",
                    self.backend.name(),
                    ids.len(),
                    inserts.len()
                )));
            }
            let mut ids = ids.into_iter();
            if save_metadata {
                if let Some(id) = ids.next() {
                    self.metadata.set(ID_FIELD, id);
                }
                self.metadata.mark_persisted();
            }
            for (&i, id) in new_records.iter().zip(ids) {
                self.records[i].set(ID_FIELD, id);
                self.records[i].mark_persisted();
            }
        }

        if !updates.is_empty() {
            self.backend.update(&updates)?;
            if update_metadata {
                self.metadata.mark_persisted();
            }
            for &i in &changed_records {
                self.records[i].mark_persisted();
            }
        }

        let summary = SaveSummary {
            inserted: inserts.len(),
            updated: updates.len(),
        };
        info!(
            experiment = %self.experiment_id,
            backend = self.backend.name(),
            inserted = summary.inserted,
            updated = summary.updated,
            "experiment saved"
        );
        Ok(summary)
    }

    /// Load the record documents matching `filter` from the backend,
    /// replacing the in-memory record collection.
    ///
    /// # Errors
    ///
    /// Propagates backend errors, including [`Error::NotSupported`] from a
    /// backend that cannot query.
    pub fn get(&mut self, filter: &Filter) -> Result<&[Record]> {
        let filter = Filter::new()
            .eq(KIND_FIELD, KIND_RECORD)
            .and(filter.clone());
        self.records = self
            .backend
            .get(&filter)?
            .into_iter()
            .map(Record::from_document)
            .collect();
        Ok(&self.records)
    }

    /// Fetch the best `k` stored records by `key`.
    ///
    /// # Errors
    ///
    /// Propagates backend errors.
    pub fn top_k(
        &self,
        filter: &Filter,
        key: &str,
        k: usize,
        descending: bool,
    ) -> Result<Vec<Record>> {
        let filter = Filter::new()
            .eq(KIND_FIELD, KIND_RECORD)
            .and(filter.clone());
        Ok(self
            .backend
            .get_top_k(&filter, key, k, descending)?
            .into_iter()
            .map(Record::from_document)
            .collect())
    }
}

impl fmt::Debug for Experiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Experiment")
            .field("experiment_id", &self.experiment_id)
            .field("backend", &self.backend.name())
            .field("records", &self.records.len())
            .field("read_only", &self.read_only)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use serde_json::json;

    fn experiment_with(n: usize) -> (Arc<MemoryBackend>, Experiment) {
        let backend = Arc::new(MemoryBackend::new());
        let mut experiment = Experiment::new(backend.clone());
        for i in 0..n {
            let mut record = experiment.new_record();
            record.set("i", i);
            experiment.push(record);
        }
        (backend, experiment)
    }

    #[test]
    fn test_empty_records() {
        let (_, experiment) = experiment_with(0);
        assert!(experiment.is_empty());
        assert_eq!(experiment.len(), 0);
    }

    #[test]
    fn test_save_links_records_and_metadata() {
        let (backend, mut experiment) = experiment_with(2);
        experiment.set_metadata(CONFIG_FIELD, json!({"k": 1}));
        let summary = experiment.save().unwrap();
        assert_eq!(summary, SaveSummary { inserted: 3, updated: 0 });

        let docs = backend.get(&Filter::new()).unwrap();
        assert_eq!(docs[0][KIND_FIELD], "experiment");
        assert!(docs
            .iter()
            .all(|d| d[EXPERIMENT_ID_FIELD] == experiment.experiment_id()));
        assert!(experiment.records().iter().all(|r| r.id().is_some() && !r.is_dirty()));
    }

    #[test]
    fn test_save_is_idempotent() {
        let (backend, mut experiment) = experiment_with(3);
        experiment.save().unwrap();
        let again = experiment.save().unwrap();
        assert_eq!(again, SaveSummary::default());
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn test_changed_record_updates_in_place() {
        let (backend, mut experiment) = experiment_with(2);
        experiment.save().unwrap();
        experiment.records_mut()[1].set("i", 42);
        let summary = experiment.save().unwrap();
        assert_eq!(summary, SaveSummary { inserted: 0, updated: 1 });
        assert_eq!(backend.len(), 2);
        assert_eq!(backend.get(&Filter::new().eq("i", 42)).unwrap().len(), 1);
    }

    #[test]
    fn test_read_only_fails_fast() {
        let backend = Arc::new(MemoryBackend::new());
        let mut experiment = Experiment::read_only(backend.clone());
        experiment.push(Record::new());
        assert!(matches!(experiment.save(), Err(Error::ReadOnly(_))));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_get_loads_only_records() {
        let (backend, mut experiment) = experiment_with(4);
        experiment.set_metadata(CONFIG_FIELD, json!({}));
        experiment.save().unwrap();

        let mut analysis = Experiment::read_only(backend);
        let loaded = analysis.get(&Filter::new().any_of("i", [1, 3])).unwrap();
        assert_eq!(loaded.len(), 2);
        assert!(!loaded[0].is_dirty());

        let best = analysis.top_k(&Filter::new(), "i", 1, true).unwrap();
        assert_eq!(best[0]["i"], 3);
    }

    #[test]
    fn test_editing_loaded_record_keeps_its_experiment() {
        let (backend, mut first) = experiment_with(1);
        first.save().unwrap();
        let origin = first.experiment_id().to_string();

        let mut second = Experiment::new(backend.clone());
        assert_ne!(second.experiment_id(), origin);
        second.get(&Filter::new()).unwrap();
        second.records_mut()[0].set("p", 0.9);
        assert_eq!(second.save().unwrap(), SaveSummary { inserted: 0, updated: 1 });

        let stored = backend.get(&Filter::new()).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0]["p"], 0.9);
        assert_eq!(stored[0][EXPERIMENT_ID_FIELD], origin.as_str());
        assert_eq!(stored[0][KIND_FIELD], "record");
    }

    #[test]
    fn test_stamp_and_read_back() {
        let (_, mut experiment) = experiment_with(0);
        assert!(experiment.run_metadata().is_err());
        let meta = RunMetadata::builder(json!({"load": null})).build();
        experiment.stamp(&meta).unwrap();
        assert_eq!(experiment.run_metadata().unwrap(), meta);
        assert!(experiment.get_metadata(START_FIELD).is_ok());
    }

    #[test]
    fn test_from_config() {
        let experiment =
            Experiment::from_config(&BackendConfig::memory(), &BackendRegistry::new(), true)
                .unwrap();
        assert!(experiment.is_read_only());
        assert_eq!(experiment.backend().name(), "memory");
    }
}
