//! Dataset fingerprinting for reproducibility metadata
//!
//! A [`DataFingerprint`] certifies which exact data produced a result. The
//! digest is SHA-1 over a canonical encoding of the array:
//!
//! ```text
//! dtype tag | ndim (u64 LE) | dim_0..dim_n (u64 LE) | elements (LE, row-major)
//! ```
//!
//! - **Layout-insensitive**: column-major buffers are normalised to row-major
//!   before hashing, so the same logical array always hashes the same.
//! - **Shape-sensitive**: the shape is part of the digest, so a `[2, 3]` and a
//!   `[3, 2]` array over the same bytes never collide.
//! - **Dtype-sensitive**: `[1i32]` and `[1i64]` hash differently.
//!
//! Non-numeric datasets (string labels, vocabularies) are hashed over a
//! `json` tag followed by their compact JSON text with object keys sorted,
//! so key insertion order does not change the digest. A payload that cannot
//! be serialized fails with [`Error::HashingFailure`].

mod array;
mod dataset;

pub use array::{Array, Buffer, DType, Element, Layout};
pub use dataset::{Dataset, Datasets, IntoDatasets};

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use crate::{Error, Result};

/// Reproducibility hash of one named dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataFingerprint {
    dataset: String,
    digest: String,
}

impl DataFingerprint {
    /// Fingerprint a dataset.
    ///
    /// # Errors
    ///
    /// Returns [`Error::HashingFailure`] if a JSON dataset cannot be
    /// serialized.
    pub fn compute(name: impl Into<String>, dataset: &Dataset) -> Result<Self> {
        let name = name.into();
        let digest = match dataset {
            Dataset::Array(array) => hash_array(array),
            Dataset::Json(value) => hash_json(value).map_err(|e| Error::HashingFailure {
                dataset: name.clone(),
                reason: e.to_string(),
            })?,
        };
        Ok(Self {
            dataset: name,
            digest,
        })
    }

    /// Dataset name.
    #[must_use]
    pub fn dataset(&self) -> &str {
        &self.dataset
    }

    /// Hex-encoded SHA-1 digest (40 characters).
    #[must_use]
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for DataFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.dataset, self.digest)
    }
}

/// Hex SHA-1 of an array's canonical encoding.
#[must_use]
pub fn hash_array(array: &Array) -> String {
    let contiguous = array.to_contiguous();
    let mut hasher = Sha1::new();
    hasher.update(contiguous.dtype().tag().as_bytes());
    hasher.update((contiguous.ndim() as u64).to_le_bytes());
    for dim in contiguous.shape() {
        hasher.update((*dim as u64).to_le_bytes());
    }
    hasher.update(contiguous.buffer().to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Hex SHA-1 of a JSON payload's canonical encoding.
///
/// # Errors
///
/// Returns a JSON error if the payload cannot be serialized.
pub fn hash_json(value: &Value) -> std::result::Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(&canonical(value))?;
    let mut hasher = Sha1::new();
    hasher.update(b"json");
    hasher.update(bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn canonical(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let sorted: Map<String, Value> = entries
                .into_iter()
                .map(|(key, value)| (key.clone(), canonical(value)))
                .collect();
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonical).collect()),
        other => other.clone(),
    }
}

/// Fingerprint every dataset, stopping at the first failure.
///
/// # Errors
///
/// Returns [`Error::HashingFailure`] for the first dataset that cannot be
/// serialized for hashing.
pub fn fingerprint_all(datasets: &Datasets) -> Result<BTreeMap<String, String>> {
    datasets
        .iter()
        .map(|(name, dataset)| {
            DataFingerprint::compute(name.as_str(), dataset).map(|fp| (fp.dataset, fp.digest))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deterministic() {
        let a = Dataset::from(Array::from_rows(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap());
        let x = DataFingerprint::compute("X", &a).unwrap();
        let y = DataFingerprint::compute("X", &a.clone()).unwrap();
        assert_eq!(x, y);
        assert_eq!(x.digest().len(), 40);
        assert_eq!(x.to_string(), format!("X:{}", x.digest()));
    }

    #[test]
    fn test_layout_insensitive() {
        let c = Array::new(vec![2, 3], vec![1i64, 2, 3, 4, 5, 6]).unwrap();
        let f = Array::with_layout(vec![2, 3], vec![1i64, 4, 2, 5, 3, 6], Layout::ColumnMajor)
            .unwrap();
        assert_eq!(hash_array(&c), hash_array(&f));
    }

    #[test]
    fn test_shape_sensitive() {
        let data = vec![1.0f64, 2.0, 3.0, 4.0, 5.0, 6.0];
        let a = Array::new(vec![2, 3], data.clone()).unwrap();
        let b = Array::new(vec![3, 2], data.clone()).unwrap();
        let c = Array::vector(data);
        assert_ne!(hash_array(&a), hash_array(&b));
        assert_ne!(hash_array(&a), hash_array(&c));
    }

    #[test]
    fn test_dtype_sensitive() {
        assert_ne!(
            hash_array(&Array::vector(vec![1i32])),
            hash_array(&Array::vector(vec![1i64]))
        );
    }

    #[test]
    fn test_content_sensitive() {
        assert_ne!(
            hash_array(&Array::vector(vec![0.0f64, 1.0])),
            hash_array(&Array::vector(vec![0.0f64, 1.5]))
        );
    }

    #[test]
    fn test_string_labels_fingerprint() {
        let labels = Dataset::from(json!(["cat", "dog", "cat"]));
        assert!(labels.as_json().is_some());
        let fp = DataFingerprint::compute("y_train", &labels).unwrap();
        assert_eq!(fp.digest().len(), 40);
        assert_ne!(
            fp.digest(),
            DataFingerprint::compute("y_train", &Dataset::from(json!(["cat", "dog", "dog"])))
                .unwrap()
                .digest()
        );
    }

    #[test]
    fn test_json_key_order_insensitive() {
        let a = json!({"b": [1, "x"], "a": {"d": 1, "c": 2}});
        let b = json!({"a": {"c": 2, "d": 1}, "b": [1, "x"]});
        assert_eq!(hash_json(&a).unwrap(), hash_json(&b).unwrap());
        assert_ne!(hash_json(&a).unwrap(), hash_json(&json!({"a": 1})).unwrap());
    }

    #[test]
    fn test_fingerprint_all() {
        let datasets = json!({"X_train": [[1, 2], [3, 4]], "y_train": [0, 1], "names": ["a", "b"]})
            .into_datasets()
            .unwrap();
        let hashes = fingerprint_all(&datasets).unwrap();
        assert_eq!(hashes.keys().collect::<Vec<_>>(), vec!["X_train", "names", "y_train"]);
        assert_ne!(hashes["X_train"], hashes["y_train"]);
    }
}
