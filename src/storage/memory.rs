//! In-memory document store using `DashMap`.
//!
//! This is the default backend - data is lost on process restart.
//! For persistence, use [`JsonFileBackend`](super::JsonFileBackend).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use dashmap::DashMap;
use serde_json::Value;

use super::{Capabilities, Filter, StorageBackend};
use crate::record::{Document, ID_FIELD};
use crate::{Error, Result};

/// In-memory document store using a lock-free concurrent hashmap.
///
/// Thread-safe; batches are applied under a write gate so a batch `save`
/// or `update` is all-or-nothing, and `get` takes the same gate so readers
/// never observe half a batch. `get` returns documents in insertion order.
///
/// # Example
///
/// ```rust
/// use serde_json::json;
/// use trueno_pipeline::storage::{Filter, MemoryBackend, StorageBackend};
///
/// # fn main() -> trueno_pipeline::Result<()> {
/// let store = MemoryBackend::new();
/// let doc = json!({"model": "rf"}).as_object().cloned().unwrap();
/// let id = store.save_one(&doc)?;
/// assert_eq!(store.get(&Filter::new().eq("_id", id))?.len(), 1);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct MemoryBackend {
    // identity key -> (insertion sequence, document)
    documents: DashMap<String, (u64, Document)>,
    next_id: AtomicU64,
    next_sequence: AtomicU64,
    write_gate: Mutex<()>,
}

impl MemoryBackend {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            documents: DashMap::new(),
            next_id: AtomicU64::new(1),
            next_sequence: AtomicU64::new(0),
            write_gate: Mutex::new(()),
        }
    }

    /// Get the number of stored documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Check if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Remove all documents.
    pub fn clear(&self) {
        self.documents.clear();
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>> {
        self.write_gate
            .lock()
            .map_err(|e| Error::Storage(format!("Failed to acquire write gate: {e}")))
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn identity_key(id: &Value) -> String {
    id.to_string()
}

impl StorageBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities {
            concurrent: true,
            query: true,
            update: true,
            atomic_batch: true,
        }
    }

    fn save(&self, documents: &[Document]) -> Result<Vec<Value>> {
        let _gate = self.lock()?;

        // Validate the whole batch before touching the map.
        let reserved = super::explicit_ids(documents);
        let mut next_id = self.next_id.load(Ordering::Relaxed);
        let mut ids = Vec::with_capacity(documents.len());
        let mut seen = std::collections::HashSet::new();
        for document in documents {
            let id = match document.get(ID_FIELD) {
                Some(id) => id.clone(),
                None => loop {
                    let candidate = Value::from(next_id);
                    next_id += 1;
                    if !reserved.contains(&&candidate)
                        && !self.documents.contains_key(&identity_key(&candidate))
                    {
                        break candidate;
                    }
                },
            };
            let key = identity_key(&id);
            if self.documents.contains_key(&key) || !seen.insert(key) {
                return Err(Error::Storage(format!("duplicate document identity {id}")));
            }
            if let Some(explicit) = id.as_u64() {
                next_id = next_id.max(explicit.saturating_add(1));
            }
            ids.push(id);
        }
        self.next_id.store(next_id, Ordering::Relaxed);

        for (document, id) in documents.iter().zip(&ids) {
            let mut document = document.clone();
            document.insert(ID_FIELD.to_string(), id.clone());
            let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
            self.documents
                .insert(identity_key(id), (sequence, document));
        }
        Ok(ids)
    }

    fn update(&self, documents: &[Document]) -> Result<()> {
        let _gate = self.lock()?;

        for document in documents {
            let id = document
                .get(ID_FIELD)
                .ok_or_else(|| Error::DocumentNotFound("document has no _id".to_string()))?;
            if !self.documents.contains_key(&identity_key(id)) {
                return Err(Error::DocumentNotFound(id.to_string()));
            }
        }

        for document in documents {
            if let Some(id) = document.get(ID_FIELD) {
                if let Some(mut entry) = self.documents.get_mut(&identity_key(id)) {
                    entry.1 = document.clone();
                }
            }
        }
        Ok(())
    }

    fn get(&self, filter: &Filter) -> Result<Vec<Document>> {
        let _gate = self.lock()?;
        let mut matched: Vec<(u64, Document)> = self
            .documents
            .iter()
            .filter(|entry| filter.matches(&entry.value().1))
            .map(|entry| entry.value().clone())
            .collect();
        matched.sort_by_key(|(sequence, _)| *sequence);
        Ok(matched.into_iter().map(|(_, document)| document).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_save_assigns_ids() {
        let store = MemoryBackend::new();
        let ids = store
            .save(&[doc(json!({"a": 1})), doc(json!({"a": 2}))])
            .unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_save_rejects_duplicate_batch_atomically() {
        let store = MemoryBackend::new();
        let err = store
            .save(&[doc(json!({"_id": 7})), doc(json!({"_id": 7}))])
            .unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_generated_ids_skip_explicit_ones() {
        let store = MemoryBackend::new();
        store.save_one(&doc(json!({"_id": 1}))).unwrap();
        let ids = store.save(&[doc(json!({"a": 1})), doc(json!({"_id": 3}))]).unwrap();
        assert_eq!(ids, vec![json!(2), json!(3)]);
        assert_eq!(store.save_one(&doc(json!({"a": 2}))).unwrap(), json!(4));
    }

    #[test]
    fn test_readers_never_see_partial_batch() {
        let store = std::sync::Arc::new(MemoryBackend::new());
        let writer = {
            let store = store.clone();
            std::thread::spawn(move || {
                for _ in 0..50 {
                    let batch: Vec<Document> = (0..8).map(|i| doc(json!({"i": i}))).collect();
                    store.save(&batch).unwrap();
                }
            })
        };
        for _ in 0..200 {
            let seen = store.get(&Filter::new()).unwrap().len();
            assert_eq!(seen % 8, 0, "observed {seen} documents");
        }
        writer.join().unwrap();
        assert_eq!(store.len(), 400);
    }

    #[test]
    fn test_get_insertion_order() {
        let store = MemoryBackend::new();
        for i in 0..20 {
            store.save_one(&doc(json!({"i": i}))).unwrap();
        }
        let all = store.get(&Filter::new()).unwrap();
        let order: Vec<i64> = all.iter().map(|d| d["i"].as_i64().unwrap()).collect();
        assert_eq!(order, (0..20).collect::<Vec<_>>());
    }

    #[test]
    fn test_update_replaces() {
        let store = MemoryBackend::new();
        let id = store.save_one(&doc(json!({"p": 0.1}))).unwrap();
        let mut changed = doc(json!({"p": 0.2}));
        changed.insert("_id".to_string(), id.clone());
        store.update(&[changed]).unwrap();

        let got = store.get(&Filter::new().eq("_id", id)).unwrap();
        assert_eq!(got[0]["p"], 0.2);
    }

    #[test]
    fn test_update_unknown_id_not_found() {
        let store = MemoryBackend::new();
        let err = store.update(&[doc(json!({"_id": 99}))]).unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));

        let err = store.update(&[doc(json!({"p": 1}))]).unwrap_err();
        assert!(matches!(err, Error::DocumentNotFound(_)));
    }

    #[test]
    fn test_clear() {
        let store = MemoryBackend::default();
        store.save_one(&doc(json!({"a": 1}))).unwrap();
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_concurrent_saves() {
        use std::sync::Arc;

        let store = Arc::new(MemoryBackend::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25 {
                        store.save_one(&doc(json!({"t": t, "i": i}))).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len(), 200);
        assert_eq!(store.get(&Filter::new().eq("t", 3)).unwrap().len(), 25);
    }
}
