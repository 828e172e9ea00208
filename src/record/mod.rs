//! Record - one training run's result document
//!
//! A `Record` is a flat, insertion-ordered JSON document with change
//! tracking against the last persisted snapshot. Only fields that differ
//! from the snapshot count as dirty, so re-assigning an unchanged value
//! never triggers a write.
//!
//! ## Usage
//!
//! ```rust
//! use trueno_pipeline::record::Record;
//!
//! let mut record = Record::new();
//! record.set("precision", 0.91);
//! assert!(record.is_dirty());
//!
//! record.mark_persisted();
//! record.set("precision", 0.91);
//! assert!(!record.is_dirty());
//! ```

mod ordering;

pub use ordering::{compare_fields, compare_optional, compare_values};

use std::collections::BTreeSet;
use std::ops::Index;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Error, Result};

/// Serialized form of a record: a flat JSON object.
pub type Document = Map<String, Value>;

/// Identity field assigned by storage backends on first save.
pub const ID_FIELD: &str = "_id";

/// Result document with dirty-field tracking.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(from = "Document", into = "Document")]
pub struct Record {
    fields: Document,
    snapshot: Document,
    changed: BTreeSet<String>,
}

impl Record {
    /// Create an empty, clean record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a record from a document whose fields are all unsaved.
    ///
    /// Every field counts as changed against the empty snapshot.
    #[must_use]
    pub fn with_fields(fields: Document) -> Self {
        let changed = fields.keys().cloned().collect();
        Self {
            fields,
            snapshot: Document::new(),
            changed,
        }
    }

    /// Rebuild a record from a persisted document. The result is clean.
    #[must_use]
    pub fn from_document(document: Document) -> Self {
        Self {
            snapshot: document.clone(),
            fields: document,
            changed: BTreeSet::new(),
        }
    }

    /// Get a field value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::FieldNotFound`] if the record has no such field.
    pub fn get(&self, field: &str) -> Result<&Value> {
        self.fields
            .get(field)
            .ok_or_else(|| Error::FieldNotFound(field.to_string()))
    }

    /// Get a field value, `None` when absent.
    #[must_use]
    pub fn try_get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    /// Check whether the record holds a field.
    #[must_use]
    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Set a field, tracking whether it now differs from the snapshot.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        let field = field.into();
        let value = value.into();
        self.track(&field, Some(&value));
        self.fields.insert(field, value);
    }

    /// Remove a field, returning its previous value.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        let removed = self.fields.shift_remove(field);
        if removed.is_some() {
            self.track(field, None);
        }
        removed
    }

    fn track(&mut self, field: &str, value: Option<&Value>) {
        if self.snapshot.get(field) == value {
            self.changed.remove(field);
        } else {
            self.changed.insert(field.to_string());
        }
    }

    /// True iff at least one field differs from the last persisted snapshot.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        !self.changed.is_empty()
    }

    /// Names of fields changed since the last snapshot, sorted.
    pub fn changed_fields(&self) -> impl Iterator<Item = &str> {
        self.changed.iter().map(String::as_str)
    }

    /// Record that the current state has been persisted.
    pub fn mark_persisted(&mut self) {
        self.snapshot = self.fields.clone();
        self.changed.clear();
    }

    /// Backend identity, once the record has been saved.
    #[must_use]
    pub fn id(&self) -> Option<&Value> {
        self.fields.get(ID_FIELD)
    }

    /// Number of fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if the record has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Iterate over fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Serializable snapshot of all fields.
    #[must_use]
    pub fn to_document(&self) -> Document {
        self.fields.clone()
    }
}

impl Index<&str> for Record {
    type Output = Value;

    /// Subscript read access.
    ///
    /// # Panics
    ///
    /// Panics if the field is absent; use [`Record::get`] to handle that case.
    fn index(&self, field: &str) -> &Value {
        match self.fields.get(field) {
            Some(value) => value,
            None => panic!("field '{field}' not found in record"),
        }
    }
}

impl PartialEq for Record {
    /// Records are equal when their fields are; tracking state is ignored.
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl From<Document> for Record {
    fn from(document: Document) -> Self {
        Self::from_document(document)
    }
}

impl From<Record> for Document {
    fn from(record: Record) -> Self {
        record.fields
    }
}
