//! Embedded single-file JSON document store.
//!
//! The whole collection lives in one JSON file:
//!
//! ```text
//! {"next_id": 3, "documents": [{"_id": 1, ...}, {"_id": 2, ...}]}
//! ```
//!
//! Every write rewrites the file through a temporary sibling and an atomic
//! rename, so a failed batch leaves the previous file untouched. There is
//! no coordination between processes or file handles, which is why the
//! backend reports itself as non-concurrent.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Capabilities, Filter, StorageBackend};
use crate::record::{Document, ID_FIELD};
use crate::{Error, Result};

#[derive(Debug, Serialize, Deserialize)]
struct Collection {
    next_id: u64,
    documents: Vec<Document>,
}

impl Collection {
    fn position(&self, id: &Value) -> Option<usize> {
        self.documents
            .iter()
            .position(|d| d.get(ID_FIELD) == Some(id))
    }
}

/// JSON file-backed document store.
///
/// # Example
///
/// ```no_run
/// use trueno_pipeline::storage::{Filter, JsonFileBackend, StorageBackend};
///
/// # fn main() -> trueno_pipeline::Result<()> {
/// let store = JsonFileBackend::open("/tmp/experiments.json")?;
/// let runs = store.get(&Filter::new().eq("_kind", "record"))?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct JsonFileBackend {
    path: PathBuf,
    handle: Mutex<()>,
}

impl JsonFileBackend {
    /// Bind to the file at `path`, creating parent directories if needed.
    /// The file itself is created on first save.
    ///
    /// # Errors
    ///
    /// Returns an IO error if the parent directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            handle: Mutex::new(()),
        })
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read(&self) -> Result<Collection> {
        if !self.path.exists() {
            return Ok(Collection {
                next_id: 1,
                documents: Vec::new(),
            });
        }
        let json = fs::read_to_string(&self.path)?;
        let collection = serde_json::from_str(&json).map_err(|e| {
            Error::Storage(format!("Failed to parse {}: {e}", self.path.display()))
        })?;
        Ok(collection)
    }

    fn write(&self, collection: &Collection) -> Result<()> {
        let json = serde_json::to_string_pretty(collection)?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn with_collection<T>(&self, f: impl FnOnce(&mut Collection) -> Result<T>) -> Result<T> {
        let _handle = self
            .handle
            .lock()
            .map_err(|e| Error::Storage(format!("Failed to acquire file handle: {e}")))?;
        let mut collection = self.read()?;
        let out = f(&mut collection)?;
        self.write(&collection)?;
        Ok(out)
    }
}

impl StorageBackend for JsonFileBackend {
    fn name(&self) -> &'static str {
        "json_file"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            concurrent: false,
            query: true,
            update: true,
            atomic_batch: true,
        }
    }

    fn save(&self, documents: &[Document]) -> Result<Vec<Value>> {
        self.with_collection(|collection| {
            let reserved = super::explicit_ids(documents);
            let mut ids = Vec::with_capacity(documents.len());
            for document in documents {
                let mut document = document.clone();
                let id = match document.get(ID_FIELD) {
                    Some(id) => id.clone(),
                    None => loop {
                        let candidate = Value::from(collection.next_id);
                        collection.next_id += 1;
                        if !reserved.contains(&&candidate)
                            && collection.position(&candidate).is_none()
                        {
                            break candidate;
                        }
                    },
                };
                if collection.position(&id).is_some() {
                    return Err(Error::Storage(format!("duplicate document identity {id}")));
                }
                if let Some(explicit) = id.as_u64() {
                    collection.next_id = collection.next_id.max(explicit.saturating_add(1));
                }
                document.insert(ID_FIELD.to_string(), id.clone());
                collection.documents.push(document);
                ids.push(id);
            }
            Ok(ids)
        })
    }

    fn update(&self, documents: &[Document]) -> Result<()> {
        self.with_collection(|collection| {
            for document in documents {
                let id = document
                    .get(ID_FIELD)
                    .ok_or_else(|| Error::DocumentNotFound("document has no _id".to_string()))?;
                let position = collection
                    .position(id)
                    .ok_or_else(|| Error::DocumentNotFound(id.to_string()))?;
                collection.documents[position] = document.clone();
            }
            Ok(())
        })
    }

    fn get(&self, filter: &Filter) -> Result<Vec<Document>> {
        let _handle = self
            .handle
            .lock()
            .map_err(|e| Error::Storage(format!("Failed to acquire file handle: {e}")))?;
        let collection = self.read()?;
        Ok(collection
            .documents
            .into_iter()
            .filter(|d| filter.matches(d))
            .collect())
    }
}
