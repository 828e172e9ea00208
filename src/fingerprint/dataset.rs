//! Named datasets produced by the `load` callback.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use serde_json::Value;

use super::{Array, Element};
use crate::{Error, Result};

/// Datasets keyed by name, iterated in name order.
pub type Datasets = BTreeMap<String, Dataset>;

/// One dataset handed to training callbacks.
#[derive(Debug, Clone, PartialEq)]
pub enum Dataset {
    /// Dense numeric array
    Array(Array),
    /// Any other JSON payload, fingerprinted over its canonical JSON text
    Json(Value),
}

impl Dataset {
    /// The numeric array, if this dataset is one.
    #[must_use]
    pub const fn as_array(&self) -> Option<&Array> {
        match self {
            Self::Array(array) => Some(array),
            Self::Json(_) => None,
        }
    }

    /// The raw JSON payload, if this dataset is not numeric.
    #[must_use]
    pub const fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(value) => Some(value),
            Self::Array(_) => None,
        }
    }
}

impl From<Array> for Dataset {
    fn from(array: Array) -> Self {
        Self::Array(array)
    }
}

impl<T: Element> From<Vec<T>> for Dataset {
    fn from(data: Vec<T>) -> Self {
        Self::Array(Array::vector(data))
    }
}

/// Rectangular nested numeric arrays become [`Dataset::Array`] (`i64` when
/// every number is an integer, `f64` otherwise). Everything else stays JSON.
impl From<Value> for Dataset {
    fn from(value: Value) -> Self {
        numeric_array(&value).map_or(Self::Json(value), Self::Array)
    }
}

fn numeric_array(value: &Value) -> Option<Array> {
    if !matches!(value, Value::Array(_) | Value::Number(_)) {
        return None;
    }

    let mut shape = Vec::new();
    let mut cursor = value;
    while let Value::Array(items) = cursor {
        shape.push(items.len());
        match items.first() {
            Some(first) => cursor = first,
            None => break,
        }
    }

    let mut leaves = Vec::new();
    collect_leaves(value, &shape, &mut leaves)?;

    let array = if leaves.iter().all(|n| n.is_i64()) {
        let data = leaves.iter().filter_map(|n| n.as_i64()).collect();
        Array::new(shape, data)
    } else {
        let data: Vec<f64> = leaves.iter().filter_map(|n| n.as_f64()).collect();
        Array::new(shape, data)
    };
    array.ok()
}

fn collect_leaves<'a>(
    value: &'a Value,
    shape: &[usize],
    leaves: &mut Vec<&'a serde_json::Number>,
) -> Option<()> {
    match (value, shape.split_first()) {
        (Value::Number(n), None) => {
            leaves.push(n);
            Some(())
        }
        (Value::Array(items), Some((&len, rest))) if items.len() == len => items
            .iter()
            .try_for_each(|item| collect_leaves(item, rest, leaves)),
        _ => None,
    }
}

/// Conversion from whatever a `load` callback returns into [`Datasets`].
///
/// Implemented for maps of name to dataset and for JSON values; a JSON
/// value that is not an object is a [`Error::TypeMismatch`].
pub trait IntoDatasets {
    /// Convert into named datasets.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if the value is not a mapping.
    fn into_datasets(self) -> Result<Datasets>;
}

impl<K: Into<String>, D: Into<Dataset>> IntoDatasets for BTreeMap<K, D> {
    fn into_datasets(self) -> Result<Datasets> {
        Ok(self.into_iter().map(|(k, d)| (k.into(), d.into())).collect())
    }
}

impl<K: Into<String>, D: Into<Dataset>, S: BuildHasher> IntoDatasets for HashMap<K, D, S> {
    fn into_datasets(self) -> Result<Datasets> {
        Ok(self.into_iter().map(|(k, d)| (k.into(), d.into())).collect())
    }
}

impl<K: Into<String>, D: Into<Dataset>> IntoDatasets for Vec<(K, D)> {
    fn into_datasets(self) -> Result<Datasets> {
        Ok(self.into_iter().map(|(k, d)| (k.into(), d.into())).collect())
    }
}

impl IntoDatasets for Value {
    fn into_datasets(self) -> Result<Datasets> {
        match self {
            Self::Object(map) => Ok(map.into_iter().map(|(k, v)| (k, Dataset::from(v))).collect()),
            other => Err(Error::TypeMismatch(format!(
                "load must return a mapping of name -> dataset, got {}",
                json_kind(&other)
            ))),
        }
    }
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::DType;
    use serde_json::json;

    #[test]
    fn test_integer_matrix() {
        let d = Dataset::from(json!([[1, 2], [3, 4]]));
        let a = d.as_array().unwrap();
        assert_eq!(a.shape(), &[2, 2]);
        assert_eq!(a.dtype(), DType::I64);
        assert_eq!(a.row(1), Some(vec![3.0, 4.0]));
    }

    #[test]
    fn test_mixed_numbers_become_f64() {
        let d = Dataset::from(json!([0, 1.5]));
        assert_eq!(d.as_array().unwrap().dtype(), DType::F64);
    }

    #[test]
    fn test_scalar_is_zero_dim() {
        let d = Dataset::from(json!(7));
        assert_eq!(d.as_array().unwrap().shape(), &[] as &[usize]);
    }

    #[test]
    fn test_ragged_and_strings_stay_json() {
        assert!(Dataset::from(json!([[1, 2], [3]])).as_json().is_some());
        assert!(Dataset::from(json!(["a", "b"])).as_json().is_some());
        assert!(Dataset::from(json!({"k": 1})).as_json().is_some());
    }

    #[test]
    fn test_empty_array() {
        let d = Dataset::from(json!([]));
        assert_eq!(d.as_array().unwrap().shape(), &[0]);
    }

    #[test]
    fn test_value_must_be_object() {
        let err = json!([1, 2]).into_datasets().unwrap_err();
        assert!(matches!(err, Error::TypeMismatch(m) if m.contains("an array")));
    }

    #[test]
    fn test_map_conversions() {
        let mut map = HashMap::new();
        map.insert("y", vec![0i64, 1]);
        let datasets = map.into_datasets().unwrap();
        assert!(datasets["y"].as_array().is_some());

        let datasets = vec![("x", Dataset::from(vec![1.0f32]))].into_datasets().unwrap();
        assert_eq!(datasets.len(), 1);
    }
}
