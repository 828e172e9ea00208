//! Pipeline orchestrator
//!
//! Drives one experiment run through its lifecycle:
//!
//! 1. **Load**: the `load` callback produces named datasets, which are
//!    fingerprinted when `hash_data` is set.
//! 2. **Iterate**: `model_iterator` yields model configurations.
//! 3. **Train**: each configuration is trained into a fresh record, serially
//!    or on a rayon pool of `workers` threads. `_model_class` and
//!    `_training_time_sec` are stamped on every record.
//! 4. **Finalize**: the optional `finalize` callback sees the whole
//!    experiment, then the run metadata is stamped.
//! 5. **Save**: the experiment is persisted when `save` is set.
//!
//! Any failure aborts the run, moves the pipeline to [`PipelineState::Failed`]
//! and is returned to the caller. Nothing is saved for an aborted run.
//!
//! Toyota Way: Jidoka (stop the line on the first defect)

mod builder;
mod config;
mod model;
mod state;

pub use builder::PipelineBuilder;
pub use config::{PipelineConfig, DEFAULT_MAX_WORKERS};
pub use model::{
    short_name, ModelConfig, TrainedModel, COEF_FIELD, FEATURE_IMPORTANCES_FIELD,
    MODEL_CLASS_FIELD, MODEL_NAME_FIELD, PARAMS_FIELD, TRAINING_TIME_FIELD,
};
pub use state::PipelineState;

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use rayon::iter::{ParallelBridge, ParallelIterator};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::experiment::{Experiment, RunMetadata, SaveSummary};
use crate::fingerprint::{fingerprint_all, Datasets};
use crate::record::Record;
use crate::{Error, Result, Stage};

/// Model configurations produced by `model_iterator`.
pub type ModelIter<M> = Box<dyn Iterator<Item = M> + Send>;

type LoadFn = Box<dyn Fn(Option<&Value>) -> Result<Datasets> + Send + Sync>;
type IterFn<M> = Box<dyn Fn(Option<&Value>) -> Result<ModelIter<M>> + Send + Sync>;
type TrainFn<M> = Box<
    dyn Fn(Option<&Value>, &M, &Datasets, &mut Record) -> anyhow::Result<Box<dyn TrainedModel>>
        + Send
        + Sync,
>;
type FinalizeFn = Box<dyn Fn(Option<&Value>, &mut Experiment) -> Result<()> + Send + Sync>;

/// Datasets a supervised training run is expected to provide.
const EXPECTED_DATASETS: [&str; 2] = ["X_train", "y_train"];

struct Callbacks<M> {
    load: Option<LoadFn>,
    model_iterator: Option<IterFn<M>>,
    train: Option<TrainFn<M>>,
    finalize: Option<FinalizeFn>,
}

impl<M> Default for Callbacks<M> {
    fn default() -> Self {
        Self {
            load: None,
            model_iterator: None,
            train: None,
            finalize: None,
        }
    }
}

/// Outcome of a completed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    /// Records produced by `train`
    pub models_trained: usize,
    /// Length reported by the model iterator, when known up front
    pub total: Option<usize>,
    /// Wall-clock time of the whole run
    pub elapsed: Duration,
    /// What the final save wrote, if saving was enabled
    pub saved: Option<SaveSummary>,
}

/// Experiment-running pipeline over model configurations of type `M`.
///
/// ```rust
/// use serde_json::json;
/// use trueno_pipeline::fingerprint::Array;
/// use trueno_pipeline::pipeline::{Pipeline, PipelineState};
///
/// let mut pipeline = Pipeline::builder()
///     .load(|_| {
///         Ok(vec![
///             ("X_train", Array::from_rows(vec![vec![0.0, 1.0], vec![1.0, 0.0]])?),
///             ("y_train", Array::vector(vec![1_i64, 0])),
///         ])
///     })
///     .model_iterator(|_| Ok(vec![json!({"class": "Stump", "depth": 1})]))
///     .train(|_, model, _, record| {
///         record.set("depth", model["depth"].clone());
///         record.set("precision", 0.5);
///         Ok(())
///     })
///     .build()
///     .unwrap();
///
/// let summary = pipeline.run().unwrap();
/// assert_eq!(summary.models_trained, 1);
/// assert_eq!(pipeline.state(), PipelineState::Saved);
/// assert_eq!(pipeline.experiment().records()[0]["_model_class"], "Stump");
/// ```
pub struct Pipeline<M> {
    config: PipelineConfig,
    workers: usize,
    run_config: Value,
    experiment: Experiment,
    callbacks: Callbacks<M>,
    state: PipelineState,
    stage: Stage,
    failed_stage: Option<Stage>,
    data_hashes: BTreeMap<String, String>,
}

impl<M: ModelConfig + 'static> Pipeline<M> {
    /// Start building a pipeline.
    #[must_use]
    pub fn builder() -> PipelineBuilder<M> {
        PipelineBuilder::new()
    }

    fn from_parts(
        config: PipelineConfig,
        workers: usize,
        run_config: Value,
        experiment: Experiment,
        callbacks: Callbacks<M>,
    ) -> Self {
        Self {
            config,
            workers,
            run_config,
            experiment,
            callbacks,
            state: PipelineState::Created,
            stage: Stage::Validate,
            failed_stage: None,
            data_hashes: BTreeMap::new(),
        }
    }

    /// Run the pipeline once.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if a required callback is missing or
    /// the pipeline has already run; otherwise the first error raised by a
    /// callback, by fingerprinting or by the backend. The pipeline is left in
    /// [`PipelineState::Failed`] with [`Self::failed_stage`] set.
    pub fn run(&mut self) -> Result<RunSummary> {
        if self.state != PipelineState::Created {
            return Err(Error::Configuration(format!(
                "pipeline already ran (state {})",
                self.state
            )));
        }
        let started_at = Utc::now();
        let clock = Instant::now();
        match self.execute(started_at) {
            Ok((models_trained, total, saved)) => {
                let summary = RunSummary {
                    models_trained,
                    total,
                    elapsed: clock.elapsed(),
                    saved,
                };
                info!(
                    models = summary.models_trained,
                    elapsed_sec = summary.elapsed.as_secs_f64(),
                    "Pipeline finished"
                );
                Ok(summary)
            }
            Err(err) => {
                let stage = err.stage().unwrap_or(self.stage);
                error!(%stage, "Pipeline failed: {err}");
                self.failed_stage = Some(stage);
                advance(&mut self.state, PipelineState::Failed);
                Err(err)
            }
        }
    }

    fn execute(
        &mut self,
        started_at: DateTime<Utc>,
    ) -> Result<(usize, Option<usize>, Option<SaveSummary>)> {
        self.validate()?;
        let (Some(load), Some(model_iterator), Some(train)) = (
            self.callbacks.load.as_ref(),
            self.callbacks.model_iterator.as_ref(),
            self.callbacks.train.as_ref(),
        ) else {
            return Err(Error::Configuration("callbacks missing".to_string()));
        };

        self.stage = Stage::Load;
        advance(&mut self.state, PipelineState::Loading);
        info!("Pipeline started. Loading data.");
        let datasets = load(self.run_config.get("load"))?;
        if self.config.introspect {
            for name in EXPECTED_DATASETS {
                if !datasets.contains_key(name) {
                    info!("Dataset {name} not returned by load, skipping model introspection on it");
                }
            }
        }
        if self.config.hash_data {
            info!(datasets = datasets.len(), "Computing SHA-1 of datasets");
            self.data_hashes = fingerprint_all(&datasets)?;
        }

        self.stage = Stage::Iterate;
        advance(&mut self.state, PipelineState::Iterating);
        let models = model_iterator(self.run_config.get("model_iterator"))?;
        let (lower, upper) = models.size_hint();
        let total = (upper == Some(lower)).then_some(lower);

        self.stage = Stage::Train;
        advance(&mut self.state, PipelineState::Training);
        let trainer = Trainer {
            train,
            config: self.run_config.get("train"),
            datasets: &datasets,
            experiment: &self.experiment,
            introspect: self.config.introspect,
            total,
        };
        let records = if self.workers > 1 {
            trainer.run_concurrent(models, self.workers)?
        } else {
            trainer.run_serial(models)?
        };
        let models_trained = records.len();
        for record in records {
            self.experiment.push(record);
        }

        self.stage = Stage::Finalize;
        advance(&mut self.state, PipelineState::Finalizing);
        if let Some(finalize) = self.callbacks.finalize.as_ref() {
            finalize(self.run_config.get("finalize"), &mut self.experiment)?;
        }
        let mut metadata = RunMetadata::builder(self.run_config.clone())
            .started_at(started_at)
            .ended_at(Utc::now());
        if self.config.hash_data {
            metadata = metadata.data_hashes(self.data_hashes.clone());
        }
        self.experiment.stamp(&metadata.build())?;

        let saved = if self.config.save {
            self.stage = Stage::Save;
            Some(self.experiment.save()?)
        } else {
            debug!("save disabled, experiment kept in memory");
            None
        };
        advance(&mut self.state, PipelineState::Saved);
        Ok((models_trained, total, saved))
    }

    fn validate(&self) -> Result<()> {
        let missing: Vec<&str> = [
            ("load", self.callbacks.load.is_none()),
            ("model_iterator", self.callbacks.model_iterator.is_none()),
            ("train", self.callbacks.train.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Configuration(format!(
                "missing required callbacks: {}",
                missing.join(", ")
            )))
        }
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> PipelineState {
        self.state
    }

    /// Stage that aborted the run, if it failed.
    #[must_use]
    pub const fn failed_stage(&self) -> Option<Stage> {
        self.failed_stage
    }

    /// Effective worker count after validation and clamping.
    #[must_use]
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Orchestrator settings.
    #[must_use]
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Dataset fingerprints computed during load.
    #[must_use]
    pub const fn data_hashes(&self) -> &BTreeMap<String, String> {
        &self.data_hashes
    }

    /// The experiment being built.
    #[must_use]
    pub const fn experiment(&self) -> &Experiment {
        &self.experiment
    }

    /// Mutable access to the experiment, e.g. to save again after edits.
    pub fn experiment_mut(&mut self) -> &mut Experiment {
        &mut self.experiment
    }

    /// Consume the pipeline, keeping the experiment.
    #[must_use]
    pub fn into_experiment(self) -> Experiment {
        self.experiment
    }
}

fn advance(state: &mut PipelineState, next: PipelineState) {
    debug_assert!(state.can_transition_to(next), "invalid transition {state} -> {next}");
    debug!(from = %state, to = %next, "pipeline state");
    *state = next;
}

/// Borrowed view of everything a single `train` call needs.
struct Trainer<'a, M> {
    train: &'a TrainFn<M>,
    config: Option<&'a Value>,
    datasets: &'a Datasets,
    experiment: &'a Experiment,
    introspect: bool,
    total: Option<usize>,
}

impl<M: ModelConfig> Trainer<'_, M> {
    fn run_serial(&self, models: ModelIter<M>) -> Result<Vec<Record>> {
        models
            .enumerate()
            .map(|(i, model)| self.train_one(i + 1, &model))
            .collect()
    }

    fn run_concurrent(&self, models: ModelIter<M>, workers: usize) -> Result<Vec<Record>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("pipeline-worker-{i}"))
            .build()
            .map_err(|e| Error::Configuration(format!("Failed to create worker pool: {e}")))?;
        info!(workers, "Training on worker pool");

        let finished = Mutex::new(Vec::new());
        pool.install(|| {
            models
                .enumerate()
                .par_bridge()
                .try_for_each(|(i, model)| {
                    let record = self.train_one(i + 1, &model)?;
                    finished
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((i, record));
                    Ok::<(), Error>(())
                })
        })?;

        let mut finished = finished
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        finished.sort_by_key(|(i, _)| *i);
        Ok(finished.into_iter().map(|(_, record)| record).collect())
    }

    fn train_one(&self, index: usize, model: &M) -> Result<Record> {
        match self.total {
            Some(total) => info!("{index}/{total} - Running with: {model:?}"),
            None => info!("{index} - Running with: {model:?}"),
        }

        let class_name = model.class_name();
        let mut record = self.experiment.new_record();
        record.set(MODEL_CLASS_FIELD, class_name.as_str());

        let clock = Instant::now();
        let trained = (self.train)(self.config, model, self.datasets, &mut record).map_err(
            |source| Error::TrainingFailure {
                index,
                total: self.total,
                model: format!("{model:?}"),
                source: source.into(),
            },
        )?;
        record.set(TRAINING_TIME_FIELD, clock.elapsed().as_secs_f64());

        if self.introspect {
            model::introspect(trained.as_ref(), &class_name, &mut record);
        }
        Ok(record)
    }
}

impl<M> std::fmt::Debug for Pipeline<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("state", &self.state)
            .field("workers", &self.workers)
            .field("experiment", &self.experiment)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fingerprint::Array;
    use crate::storage::{Filter, MemoryBackend};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn datasets() -> Vec<(&'static str, Array)> {
        vec![
            (
                "X_train",
                Array::from_rows(vec![vec![0.0, 1.0], vec![1.0, 1.0], vec![1.0, 0.0]]).unwrap(),
            ),
            ("y_train", Array::vector(vec![1_i64, 1, 0])),
        ]
    }

    fn grid(n: usize) -> Vec<Value> {
        (0..n).map(|i| json!({"class": "Stump", "depth": i})).collect()
    }

    #[test]
    fn test_serial_run_stamps_records_and_metadata() {
        let backend = Arc::new(MemoryBackend::new());
        let mut pipeline = Pipeline::builder()
            .backend(backend.clone())
            .run_config(json!({"train": {"threshold": 0.5}}))
            .load(|_| Ok(datasets()))
            .model_iterator(|_| Ok(grid(2)))
            .train(|config, model, _, record| {
                record.set("threshold", config.cloned().unwrap_or_default()["threshold"].clone());
                record.set("depth", model["depth"].clone());
                Ok(())
            })
            .build()
            .unwrap();

        let summary = pipeline.run().unwrap();
        assert_eq!(summary.models_trained, 2);
        assert_eq!(summary.total, Some(2));
        assert_eq!(summary.saved.unwrap().inserted, 3);
        assert_eq!(pipeline.state(), PipelineState::Saved);

        let records = pipeline.experiment().records();
        assert_eq!(records[0]["depth"], 0);
        assert_eq!(records[1]["depth"], 1);
        assert_eq!(records[1]["threshold"], 0.5);
        for record in records {
            assert_eq!(record[MODEL_CLASS_FIELD], "Stump");
            assert!(record[TRAINING_TIME_FIELD].as_f64().unwrap() >= 0.0);
            assert!(record.id().is_some());
        }

        let meta = pipeline.experiment().run_metadata().unwrap();
        assert_eq!(meta.data_hashes().unwrap().len(), 2);
        assert!(meta.started_at() <= meta.ended_at());
        assert_eq!(backend.len(), 3);
    }

    #[test]
    fn test_concurrent_matches_serial_order() {
        let run = |workers| {
            let mut pipeline = Pipeline::builder()
                .workers(workers)
                .save(false)
                .load(|_| Ok(datasets()))
                .model_iterator(|_| Ok(grid(12)))
                .train(|_, model, _, record| {
                    record.set("depth", model["depth"].clone());
                    Ok(())
                })
                .build()
                .unwrap();
            pipeline.run().unwrap();
            pipeline
                .into_experiment()
                .records()
                .iter()
                .map(|r| r["depth"].clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(1), run(4));
    }

    #[test]
    fn test_missing_train_fails_before_load() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let mut pipeline = Pipeline::<Value>::builder()
            .load(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(datasets())
            })
            .model_iterator(|_| Ok(grid(1)))
            .build()
            .unwrap();

        let err = pipeline.run().unwrap_err();
        assert!(matches!(err, Error::Configuration(ref m) if m.contains("train")));
        assert_eq!(loads.load(Ordering::SeqCst), 0);
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(pipeline.failed_stage(), Some(Stage::Validate));
    }

    #[test]
    fn test_training_failure_aborts_without_saving() {
        let backend = Arc::new(MemoryBackend::new());
        let mut pipeline = Pipeline::builder()
            .backend(backend.clone())
            .load(|_| Ok(datasets()))
            .model_iterator(|_| Ok(grid(3)))
            .train(|_, model, _, _| {
                if model["depth"] == 1 {
                    anyhow::bail!("diverged");
                }
                Ok(())
            })
            .build()
            .unwrap();

        let err = pipeline.run().unwrap_err();
        match err {
            Error::TrainingFailure { index, total, .. } => {
                assert_eq!(index, 2);
                assert_eq!(total, Some(3));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(pipeline.failed_stage(), Some(Stage::Train));
        assert!(backend.is_empty());
    }

    #[test]
    fn test_run_twice_rejected() {
        let mut pipeline = Pipeline::builder()
            .save(false)
            .load(|_| Ok(datasets()))
            .model_iterator(|_| Ok(grid(1)))
            .train(|_, _, _, _| Ok(()))
            .build()
            .unwrap();
        pipeline.run().unwrap();
        assert!(matches!(pipeline.run(), Err(Error::Configuration(_))));
        assert_eq!(pipeline.state(), PipelineState::Saved);
    }

    #[test]
    fn test_finalize_sees_all_records() {
        let mut pipeline = Pipeline::builder()
            .load(|_| Ok(datasets()))
            .model_iterator(|_| Ok(grid(3)))
            .train(|_, model, _, record| {
                record.set("score", model["depth"].clone());
                Ok(())
            })
            .finalize(|_, experiment| {
                let best = experiment
                    .records()
                    .iter()
                    .filter_map(|r| r["score"].as_i64())
                    .max()
                    .unwrap_or_default();
                experiment.set_metadata("best_score", best);
                Ok(())
            })
            .build()
            .unwrap();
        pipeline.run().unwrap();
        let experiment = pipeline.experiment();
        assert_eq!(experiment.get_metadata("best_score").unwrap(), &json!(2));
        let stored = experiment.backend().get(&Filter::new().eq("best_score", 2)).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn test_unknown_length_iterator() {
        let mut pipeline = Pipeline::builder()
            .save(false)
            .hash_data(false)
            .load(|_| Ok(datasets()))
            .model_iterator(|_| Ok(grid(5).into_iter().filter(|m| m["depth"] != 2)))
            .train(|_, _, _, _| Ok(()))
            .build()
            .unwrap();
        let summary = pipeline.run().unwrap();
        assert_eq!(summary.total, None);
        assert_eq!(summary.models_trained, 4);
        assert!(pipeline.data_hashes().is_empty());
        assert!(pipeline
            .experiment()
            .run_metadata()
            .unwrap()
            .data_hashes()
            .is_none());
    }
}
