//! Basic Pipeline Example
//!
//! Trains a small grid of threshold classifiers on a toy two-feature dataset,
//! records precision for each, keeps the best model name in the experiment
//! metadata and persists everything to a JSON file.
//!
//! Run with: cargo run --example basic_pipeline [-- runs.json]

use anyhow::Context;
use serde_json::{json, Value};
use trueno_pipeline::analysis::top_k;
use trueno_pipeline::fingerprint::{Array, Datasets};
use trueno_pipeline::pipeline::{ModelConfig, Pipeline, TrainedModel};
use trueno_pipeline::storage::BackendConfig;
use trueno_pipeline::{logging, Record};

/// Predicts the positive class when one feature exceeds a cutoff.
#[derive(Debug, Clone)]
struct ThresholdClassifier {
    feature: usize,
    cutoff: f64,
}

impl ModelConfig for ThresholdClassifier {
    fn class_name(&self) -> String {
        "ThresholdClassifier".to_string()
    }
}

struct Fitted(ThresholdClassifier);

impl TrainedModel for Fitted {
    fn params(&self) -> Option<Value> {
        Some(json!({"feature": self.0.feature, "cutoff": self.0.cutoff}))
    }
}

fn load(_config: Option<&Value>) -> anyhow::Result<Vec<(&'static str, Array)>> {
    let x = vec![
        vec![5.1, 3.5],
        vec![4.9, 3.0],
        vec![4.7, 3.2],
        vec![7.0, 3.2],
        vec![6.4, 3.2],
        vec![6.9, 3.1],
    ];
    let y = vec![0_i64, 0, 0, 1, 1, 1];
    Ok(vec![
        ("X_test", Array::from_rows(x.clone())?),
        ("X_train", Array::from_rows(x)?),
        ("y_test", Array::vector(y.clone())),
        ("y_train", Array::vector(y)),
    ])
}

fn model_iterator(config: Option<&Value>) -> anyhow::Result<Vec<ThresholdClassifier>> {
    let cutoffs: Vec<f64> = config
        .and_then(|c| c.get("cutoffs"))
        .map(|v| serde_json::from_value(v.clone()))
        .transpose()?
        .unwrap_or_else(|| vec![4.0, 5.0, 6.0]);
    Ok((0..2)
        .flat_map(|feature| {
            cutoffs
                .iter()
                .map(move |&cutoff| ThresholdClassifier { feature, cutoff })
        })
        .collect())
}

fn train(
    _config: Option<&Value>,
    model: &ThresholdClassifier,
    data: &Datasets,
    record: &mut Record,
) -> anyhow::Result<Fitted> {
    let x = data["X_test"].as_array().context("X_test must be an array")?;
    let y = data["y_test"].as_array().context("y_test must be an array")?.to_f64_vec();

    let (mut tp, mut fp) = (0_u32, 0_u32);
    for (i, label) in y.iter().enumerate() {
        let row = x.row(i).context("X_test must be a matrix")?;
        if row[model.feature] > model.cutoff {
            if *label > 0.5 {
                tp += 1;
            } else {
                fp += 1;
            }
        }
    }
    let precision = if tp + fp == 0 {
        0.0
    } else {
        f64::from(tp) / f64::from(tp + fp)
    };
    record.set("precision", precision);
    record.set("feature", model.feature);
    Ok(Fitted(model.clone()))
}

fn main() -> anyhow::Result<()> {
    logging::init();
    let path = std::env::args().nth(1).unwrap_or_else(|| "runs.json".to_string());

    println!("=== Trueno-Pipeline Basic Run ===\n");

    let mut pipeline = Pipeline::builder()
        .backend_config(BackendConfig::json_file(&path))
        .introspect(true)
        .run_config(json!({"model_iterator": {"cutoffs": [4.8, 5.5, 6.5]}}))
        .load(load)
        .model_iterator(model_iterator)
        .train(train)
        .finalize(|_, experiment| {
            let best = top_k(experiment.records(), "precision", 1, true)
                .first()
                .map(|r| r["_params"].clone());
            experiment.set_metadata("best_params", best.unwrap_or(Value::Null));
            Ok(())
        })
        .build()?;

    let summary = pipeline.run()?;
    println!(
        "Trained {} models in {:.3}s",
        summary.models_trained,
        summary.elapsed.as_secs_f64()
    );
    for (name, digest) in pipeline.data_hashes() {
        println!("   {name}: {digest}");
    }

    println!("\nTop 3 by precision:");
    for record in top_k(pipeline.experiment().records(), "precision", 3, true) {
        println!("   {} -> {}", record["_params"], record["precision"]);
    }
    println!(
        "\nBest params: {}",
        pipeline.experiment().get_metadata("best_params")?
    );
    println!("Saved to {path}");
    Ok(())
}
