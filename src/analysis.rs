//! In-memory analysis over loaded records
//!
//! Complements [`Experiment::top_k`](crate::experiment::Experiment::top_k),
//! which ranks inside the backend, with helpers that work on records already
//! in memory (e.g. after [`Experiment::get`](crate::experiment::Experiment::get)).

use std::collections::BTreeMap;

use serde_json::Value;

use crate::record::{compare_optional, Record};

/// Best `k` records by `key`.
///
/// Records missing `key` (or holding `null`) always rank last. The sort is
/// stable, so ties keep their input order.
///
/// ```rust
/// use serde_json::json;
/// use trueno_pipeline::analysis::top_k;
/// use trueno_pipeline::record::Record;
///
/// let records: Vec<Record> = [0.7, 0.9, 0.8]
///     .into_iter()
///     .map(|p| {
///         let mut r = Record::new();
///         r.set("precision", p);
///         r
///     })
///     .collect();
/// let best = top_k(&records, "precision", 2, true);
/// assert_eq!(best[0]["precision"], json!(0.9));
/// assert_eq!(best[1]["precision"], json!(0.8));
/// ```
#[must_use]
pub fn top_k<'a>(records: &'a [Record], key: &str, k: usize, descending: bool) -> Vec<&'a Record> {
    let mut ranked: Vec<&Record> = records.iter().collect();
    ranked.sort_by(|a, b| compare_optional(a.try_get(key), b.try_get(key), descending));
    ranked.truncate(k);
    ranked
}

/// Group records by the value of `key`.
///
/// Group labels are the value rendered as text: strings verbatim, other
/// values as compact JSON. Records without `key` are grouped under `"null"`.
/// Each group keeps input order.
#[must_use]
pub fn group_by<'a>(records: &'a [Record], key: &str) -> BTreeMap<String, Vec<&'a Record>> {
    let mut groups: BTreeMap<String, Vec<&Record>> = BTreeMap::new();
    for record in records {
        let label = match record.try_get(key) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => "null".to_string(),
        };
        groups.entry(label).or_default().push(record);
    }
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(class: &str, score: Option<f64>) -> Record {
        let mut r = Record::new();
        r.set("_model_class", class);
        if let Some(score) = score {
            r.set("score", score);
        }
        r
    }

    #[test]
    fn test_top_k_missing_last_both_directions() {
        let records = vec![
            record("a", Some(0.3)),
            record("b", None),
            record("c", Some(0.9)),
            record("d", Some(0.1)),
        ];

        let desc = top_k(&records, "score", 4, true);
        let classes: Vec<_> = desc.iter().map(|r| r["_model_class"].clone()).collect();
        assert_eq!(classes, vec![json!("c"), json!("a"), json!("d"), json!("b")]);

        let asc = top_k(&records, "score", 4, false);
        let classes: Vec<_> = asc.iter().map(|r| r["_model_class"].clone()).collect();
        assert_eq!(classes, vec![json!("d"), json!("a"), json!("c"), json!("b")]);
    }

    #[test]
    fn test_top_k_truncates_and_is_stable() {
        let records = vec![
            record("first", Some(0.5)),
            record("second", Some(0.5)),
            record("third", Some(0.5)),
        ];
        let best = top_k(&records, "score", 2, true);
        assert_eq!(best.len(), 2);
        assert_eq!(best[0]["_model_class"], "first");
        assert_eq!(best[1]["_model_class"], "second");
        assert!(top_k(&records, "score", 0, false).is_empty());
    }

    #[test]
    fn test_group_by() {
        let mut numeric = record("svc", Some(0.2));
        numeric.set("folds", 3);
        let records = vec![
            record("svc", Some(0.1)),
            record("forest", Some(0.4)),
            numeric,
            record("svc", None),
        ];
        let groups = group_by(&records, "_model_class");
        assert_eq!(groups.keys().collect::<Vec<_>>(), vec!["forest", "svc"]);
        assert_eq!(groups["svc"].len(), 3);

        let by_folds = group_by(&records, "folds");
        assert_eq!(by_folds["3"].len(), 1);
        assert_eq!(by_folds["null"].len(), 3);
    }
}
