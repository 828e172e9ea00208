//! Storage backends for experiment documents
//!
//! Every backend presents the same contract to callers regardless of how
//! much query power the underlying store has:
//!
//! - `save`: batched insert, assigns an `_id` to each document
//! - `update`: replace documents by `_id`, unknown identities fail
//! - `get`: equality / membership filter (see [`Filter`])
//! - `get_top_k`: `get`, then stable sort by a field, then truncate
//!
//! Operations a backend cannot provide are refused with
//! [`Error::NotSupported`](crate::Error::NotSupported) instead of silently
//! returning nothing. The trait defaults for `update` and `get` do exactly
//! that, so a write-only store only has to implement `save`.
//!
//! Toyota Way Principles:
//! - **Poka-Yoke**: backends advertise [`Capabilities`]; the pipeline refuses
//!   to pair a non-concurrent backend with more than one worker
//! - **Standardized work**: one filter/sort contract for every store
//!
//! ## Usage
//!
//! ```rust
//! use serde_json::json;
//! use trueno_pipeline::storage::{Filter, MemoryBackend, StorageBackend};
//!
//! # fn main() -> trueno_pipeline::Result<()> {
//! let backend = MemoryBackend::new();
//! let docs: Vec<_> = [0.7, 0.9, 0.8]
//!     .iter()
//!     .map(|p| json!({"model": "svc", "precision": p}).as_object().cloned().unwrap())
//!     .collect();
//! backend.save(&docs)?;
//!
//! let best = backend.get_top_k(&Filter::new().eq("model", "svc"), "precision", 2, true)?;
//! assert_eq!(best[0]["precision"], 0.9);
//! # Ok(())
//! # }
//! ```

mod filter;
mod json_file;
mod memory;
mod registry;

pub use filter::{Condition, Filter};
pub use json_file::JsonFileBackend;
pub use memory::MemoryBackend;
pub use registry::{BackendConfig, BackendConstructor, BackendRegistry};

use serde_json::Value;

use crate::record::{compare_fields, Document};
use crate::{Error, Result};

/// What a backend can do beyond `save`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct Capabilities {
    /// Safe to use from several worker threads at once
    pub concurrent: bool,
    /// Supports `get` / `get_top_k`
    pub query: bool,
    /// Supports `update`
    pub update: bool,
    /// A failed batch `save` leaves no documents behind
    pub atomic_batch: bool,
}

/// Persistence contract every document store must satisfy.
pub trait StorageBackend: Send + Sync {
    /// Short backend name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Capabilities this backend provides.
    fn capabilities(&self) -> Capabilities;

    /// Insert new documents, returning the identity assigned to each, in order.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the batch cannot be written. Backends whose
    /// [`Capabilities::atomic_batch`] is false document what a partial
    /// failure leaves behind.
    fn save(&self, documents: &[Document]) -> Result<Vec<Value>>;

    /// Insert a single document.
    ///
    /// # Errors
    ///
    /// Same as [`StorageBackend::save`].
    fn save_one(&self, document: &Document) -> Result<Value> {
        let mut ids = self.save(std::slice::from_ref(document))?;
        ids.pop()
            .ok_or_else(|| Error::Storage(format!("{} returned no identity", self.name())))
    }

    /// Replace existing documents identified by their `_id` field.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DocumentNotFound`] for an unknown or missing identity,
    /// or [`Error::NotSupported`] if the backend cannot update.
    fn update(&self, documents: &[Document]) -> Result<()> {
        let _ = documents;
        Err(Error::NotSupported {
            backend: self.name(),
            operation: "update",
        })
    }

    /// Fetch documents matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotSupported`] if the backend cannot query.
    fn get(&self, filter: &Filter) -> Result<Vec<Document>> {
        let _ = filter;
        Err(Error::NotSupported {
            backend: self.name(),
            operation: "get",
        })
    }

    /// Fetch the `k` documents matching `filter` with the highest (or lowest)
    /// `key`.
    ///
    /// Ties keep the order `get` returned. Documents without `key` sort last.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`StorageBackend::get`].
    fn get_top_k(
        &self,
        filter: &Filter,
        key: &str,
        k: usize,
        descending: bool,
    ) -> Result<Vec<Document>> {
        let mut documents = self.get(filter)?;
        documents.sort_by(|a, b| compare_fields(a, b, key, descending));
        documents.truncate(k);
        Ok(documents)
    }
}

/// Identities a batch assigns explicitly, so generated ones can avoid them.
fn explicit_ids(documents: &[Document]) -> Vec<&Value> {
    documents
        .iter()
        .filter_map(|document| document.get(crate::record::ID_FIELD))
        .collect()
}
