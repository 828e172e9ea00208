//! Total ordering over JSON field values, shared by every sort path
//! (backend `get_top_k`, `analysis::top_k`).

use std::cmp::Ordering;

use serde_json::Value;

use super::Document;

// Numbers < strings < booleans < arrays/objects. Null sorts with missing.
const fn rank(value: &Value) -> u8 {
    match value {
        Value::Number(_) => 0,
        Value::String(_) => 1,
        Value::Bool(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
        Value::Null => 4,
    }
}

/// Compare two present JSON values.
///
/// Numbers compare numerically (NaN cannot occur in JSON), strings
/// lexicographically, booleans `false < true`. Arrays and objects compare
/// by their serialized text, which is stable but not meaningful.
#[must_use]
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            match (x.as_i64(), y.as_i64()) {
                (Some(x), Some(y)) => x.cmp(&y),
                _ => {
                    let x = x.as_f64().unwrap_or(0.0);
                    let y = y.as_f64().unwrap_or(0.0);
                    x.partial_cmp(&y).unwrap_or(Ordering::Equal)
                }
            }
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Null, Value::Null) => Ordering::Equal,
        _ if rank(a) != rank(b) => rank(a).cmp(&rank(b)),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Compare two possibly missing field values.
///
/// Missing values (and `null`) always sort after present ones, in both
/// directions.
#[must_use]
pub fn compare_optional(a: Option<&Value>, b: Option<&Value>, descending: bool) -> Ordering {
    let a = a.filter(|v| !v.is_null());
    let b = b.filter(|v| !v.is_null());
    match (a, b) {
        (Some(a), Some(b)) => {
            let ord = compare_values(a, b);
            if descending {
                ord.reverse()
            } else {
                ord
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Compare two documents by `key`, missing values last.
#[must_use]
pub fn compare_fields(a: &Document, b: &Document, key: &str, descending: bool) -> Ordering {
    compare_optional(a.get(key), b.get(key), descending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_numbers_mixed_int_float() {
        assert_eq!(compare_values(&json!(1), &json!(1.5)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(2)), Ordering::Equal);
        assert_eq!(compare_values(&json!(-3.0), &json!(-4)), Ordering::Greater);
    }

    #[test]
    fn test_cross_type_rank() {
        assert_eq!(compare_values(&json!(10), &json!("a")), Ordering::Less);
        assert_eq!(compare_values(&json!("z"), &json!(true)), Ordering::Less);
    }

    #[test]
    fn test_missing_sorts_last_both_directions() {
        let a = doc(json!({"p": 0.1}));
        let b = doc(json!({}));
        let c = doc(json!({"p": null}));
        assert_eq!(compare_fields(&a, &b, "p", true), Ordering::Less);
        assert_eq!(compare_fields(&a, &b, "p", false), Ordering::Less);
        assert_eq!(compare_fields(&c, &a, "p", true), Ordering::Greater);
    }

    #[test]
    fn test_descending_reverses() {
        let a = doc(json!({"p": 0.1}));
        let b = doc(json!({"p": 0.9}));
        assert_eq!(compare_fields(&a, &b, "p", false), Ordering::Less);
        assert_eq!(compare_fields(&a, &b, "p", true), Ordering::Greater);
    }
}
