//! Read-Only Analysis Example
//!
//! Opens the file written by `basic_pipeline` without write access, ranks the
//! stored records and groups them by feature.
//!
//! Run with: cargo run --example read_only_analysis [-- runs.json]

use trueno_pipeline::analysis::group_by;
use trueno_pipeline::experiment::Experiment;
use trueno_pipeline::storage::{BackendConfig, BackendRegistry, Filter};
use trueno_pipeline::{logging, Error};

fn main() -> anyhow::Result<()> {
    logging::init();
    let path = std::env::args().nth(1).unwrap_or_else(|| "runs.json".to_string());

    let registry = BackendRegistry::new();
    let mut experiment = Experiment::from_config(&BackendConfig::json_file(&path), &registry, true)?;

    println!("=== Trueno-Pipeline Read-Only Analysis ({path}) ===\n");

    println!("1. Best 3 records by precision (ranked in the backend):");
    for record in experiment.top_k(&Filter::new(), "precision", 3, true)? {
        println!(
            "   {} feature={} precision={}",
            record["_model_class"], record["feature"], record["precision"]
        );
    }

    println!("\n2. Records per feature:");
    let records = experiment.get(&Filter::new().any_of("feature", [0, 1]))?;
    for (feature, group) in group_by(records, "feature") {
        let mean = group
            .iter()
            .filter_map(|r| r["precision"].as_f64())
            .sum::<f64>()
            / group.len() as f64;
        println!("   feature {feature}: {} models, mean precision {mean:.3}", group.len());
    }

    println!("\n3. Attempting to save a read-only experiment...");
    experiment.set_metadata("note", "reviewed");
    match experiment.save() {
        Err(Error::ReadOnly(reason)) => println!("   refused: {reason}"),
        other => anyhow::bail!("expected a read-only refusal, got {other:?}"),
    }
    Ok(())
}
