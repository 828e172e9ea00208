//! # Trueno-Pipeline: Experiment Runner for Iterative Model Training
//!
//! **Version**: 0.1.0
//!
//! Trueno-Pipeline runs a fixed lifecycle over caller-supplied callbacks:
//! load datasets, enumerate model configurations, train each one into a
//! [`Record`](record::Record) of metrics, finalize, then persist the whole
//! [`Experiment`](experiment::Experiment) to a pluggable storage backend.
//!
//! ## Design Principles (Toyota Way Aligned)
//!
//! - **Jidoka**: the first failing stage stops the run; nothing is saved
//! - **Poka-Yoke**: worker count and backend capabilities are checked at build time
//! - **Genchi Genbutsu**: every dataset is fingerprinted, so results trace back to data
//! - **Muda elimination**: re-saving an unchanged experiment writes nothing
//!
//! ## Example Usage
//!
//! ```rust
//! use serde_json::json;
//! use trueno_pipeline::fingerprint::Array;
//! use trueno_pipeline::pipeline::Pipeline;
//!
//! let mut pipeline = Pipeline::builder()
//!     .run_config(json!({"train": {"cutoff": 0.5}}))
//!     .load(|_| Ok(vec![("X_train", Array::vector(vec![0.2, 0.7, 0.9]))]))
//!     .model_iterator(|_| Ok(vec![json!({"class": "Threshold", "cutoff": 0.5})]))
//!     .train(|_, _, datasets, record| {
//!         let x = datasets["X_train"].as_array().expect("array").to_f64_vec();
//!         record.set("positives", x.iter().filter(|v| **v > 0.5).count());
//!         Ok(())
//!     })
//!     .build()?;
//!
//! pipeline.run()?;
//! assert_eq!(pipeline.experiment().records()[0]["positives"], 2);
//! # Ok::<(), trueno_pipeline::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod analysis;
pub mod error;
pub mod experiment;
pub mod fingerprint;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod storage;

pub use error::{BoxError, Error, Result, Stage};
pub use experiment::Experiment;
pub use pipeline::{Pipeline, PipelineConfig, PipelineState};
pub use record::Record;
