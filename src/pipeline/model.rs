//! Model configuration and trained-model capability traits.

use std::fmt;

use serde_json::Value;

use crate::record::Record;

/// Class name of the model configuration that produced a record.
pub const MODEL_CLASS_FIELD: &str = "_model_class";
/// Wall-clock seconds spent in `train`.
pub const TRAINING_TIME_FIELD: &str = "_training_time_sec";
/// Hyperparameters reported by the trained model.
pub const PARAMS_FIELD: &str = "_params";
/// Short model name.
pub const MODEL_NAME_FIELD: &str = "_model_name";
/// Per-feature importances, when the model exposes them.
pub const FEATURE_IMPORTANCES_FIELD: &str = "_feature_importances";
/// Linear coefficients, when the model exposes them.
pub const COEF_FIELD: &str = "_coef";

/// One caller-defined description of a trainable model.
pub trait ModelConfig: fmt::Debug + Send + Sync {
    /// Name recorded as `_model_class`. Defaults to the Rust type name.
    fn class_name(&self) -> String {
        std::any::type_name::<Self>().to_string()
    }
}

/// JSON model configurations name their class in a `"class"` string field.
impl ModelConfig for Value {
    fn class_name(&self) -> String {
        self.get("class")
            .and_then(Value::as_str)
            .map_or_else(|| "serde_json::Value".to_string(), str::to_string)
    }
}

/// Optional introspection capabilities of a trained model.
///
/// Every probe defaults to `None`; a model implements only what it can
/// report, and absent capabilities are silently skipped.
pub trait TrainedModel {
    /// Hyperparameters as a JSON mapping.
    fn params(&self) -> Option<Value> {
        None
    }

    /// Short human-readable model name.
    fn model_name(&self) -> Option<String> {
        None
    }

    /// Per-feature importances.
    fn feature_importances(&self) -> Option<Vec<f64>> {
        None
    }

    /// Linear model coefficients.
    fn coefficients(&self) -> Option<Vec<f64>> {
        None
    }
}

/// For `train` callbacks that only write metrics.
impl TrainedModel for () {}

/// Last path segment of a class name: `my_crate::models::Forest` -> `Forest`.
#[must_use]
pub fn short_name(class_name: &str) -> &str {
    // Generic arguments may contain `::` too.
    let base = class_name.split('<').next().unwrap_or(class_name);
    base.rsplit("::").next().unwrap_or(base)
}

/// Stamp whatever the trained model can report onto the record.
pub(crate) fn introspect(model: &dyn TrainedModel, class_name: &str, record: &mut Record) {
    if let Some(params) = model.params() {
        record.set(PARAMS_FIELD, params);
    }
    let name = model
        .model_name()
        .unwrap_or_else(|| short_name(class_name).to_string());
    record.set(MODEL_NAME_FIELD, name);
    if let Some(importances) = model.feature_importances() {
        record.set(FEATURE_IMPORTANCES_FIELD, importances);
    }
    if let Some(coef) = model.coefficients() {
        record.set(COEF_FIELD, coef);
    }
}
