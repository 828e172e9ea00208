//! Minimal filter contract: equality and membership, ANDed together.

use std::cmp::Ordering;

use serde_json::Value;

use crate::record::{compare_values, Document};
use crate::{Error, Result};

/// Condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// Field equals the value
    Eq(Value),
    /// Field equals any of the values
    AnyOf(Vec<Value>),
}

impl Condition {
    /// Check a (possibly missing) field value against the condition.
    #[must_use]
    pub fn matches(&self, value: Option<&Value>) -> bool {
        let Some(value) = value else {
            return false;
        };
        match self {
            Self::Eq(expected) => values_equal(value, expected),
            Self::AnyOf(candidates) => candidates.iter().any(|c| values_equal(value, c)),
        }
    }
}

// `1` and `1.0` are different `Value`s but the same number.
fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Ordering::Equal,
        _ => a == b,
    }
}

/// Conjunction of per-field conditions. An empty filter matches everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    conditions: Vec<(String, Condition)>,
}

impl Filter {
    /// Filter matching every document.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `field == value`.
    #[must_use]
    pub fn eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.conditions
            .push((field.into(), Condition::Eq(value.into())));
        self
    }

    /// Require `field` to equal one of `values`.
    #[must_use]
    pub fn any_of<V: Into<Value>>(
        mut self,
        field: impl Into<String>,
        values: impl IntoIterator<Item = V>,
    ) -> Self {
        let values = values.into_iter().map(Into::into).collect();
        self.conditions
            .push((field.into(), Condition::AnyOf(values)));
        self
    }

    /// Add every condition of `other` to this filter.
    #[must_use]
    pub fn and(mut self, other: Self) -> Self {
        self.conditions.extend(other.conditions);
        self
    }

    /// Build a filter from a mapping: arrays mean membership, anything else
    /// means equality.
    #[must_use]
    pub fn from_document(document: &Document) -> Self {
        let conditions = document
            .iter()
            .map(|(field, value)| {
                let condition = match value {
                    Value::Array(values) => Condition::AnyOf(values.clone()),
                    other => Condition::Eq(other.clone()),
                };
                (field.clone(), condition)
            })
            .collect();
        Self { conditions }
    }

    /// Build a filter from a JSON value, which must be an object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TypeMismatch`] if `value` is not an object.
    pub fn from_value(value: &Value) -> Result<Self> {
        value
            .as_object()
            .map(Self::from_document)
            .ok_or_else(|| Error::TypeMismatch(format!("filter must be an object, got {value}")))
    }

    /// Conditions in insertion order.
    #[must_use]
    pub fn conditions(&self) -> &[(String, Condition)] {
        &self.conditions
    }

    /// Check if the filter has no conditions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Check a document against every condition.
    #[must_use]
    pub fn matches(&self, document: &Document) -> bool {
        self.conditions
            .iter()
            .all(|(field, condition)| condition.matches(document.get(field)))
    }
}
