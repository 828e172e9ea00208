//! Pipeline builder

use std::sync::Arc;

use serde_json::Value;

use super::{
    Callbacks, FinalizeFn, IterFn, LoadFn, ModelConfig, ModelIter, Pipeline, PipelineConfig,
    TrainFn, TrainedModel,
};
use crate::experiment::Experiment;
use crate::fingerprint::{Datasets, IntoDatasets};
use crate::record::Record;
use crate::storage::{BackendConfig, BackendRegistry, StorageBackend};
use crate::{Error, Result, Stage};

/// Builder for [`Pipeline`].
///
/// Callbacks receive the sub-value of the run configuration keyed by their
/// stage name (`"load"`, `"model_iterator"`, `"train"`, `"finalize"`).
pub struct PipelineBuilder<M> {
    config: PipelineConfig,
    run_config: Value,
    backend: Option<Arc<dyn StorageBackend>>,
    registry: Option<BackendRegistry>,
    callbacks: Callbacks<M>,
}

impl<M: ModelConfig + 'static> PipelineBuilder<M> {
    /// Create a builder with default settings and no callbacks.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
            run_config: Value::Object(serde_json::Map::new()),
            backend: None,
            registry: None,
            callbacks: Callbacks::default(),
        }
    }

    /// Replace all orchestrator settings.
    #[must_use]
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the run configuration recorded as `_config` and handed to callbacks.
    #[must_use]
    pub fn run_config(mut self, run_config: Value) -> Self {
        self.run_config = run_config;
        self
    }

    /// Set the requested worker count.
    #[must_use]
    pub const fn workers(mut self, workers: usize) -> Self {
        self.config.workers = workers;
        self
    }

    /// Persist the experiment after finalize (default `true`).
    #[must_use]
    pub const fn save(mut self, save: bool) -> Self {
        self.config.save = save;
        self
    }

    /// Fingerprint loaded datasets (default `true`).
    #[must_use]
    pub const fn hash_data(mut self, hash_data: bool) -> Self {
        self.config.hash_data = hash_data;
        self
    }

    /// Probe trained models for params, importances and coefficients.
    #[must_use]
    pub const fn introspect(mut self, introspect: bool) -> Self {
        self.config.introspect = introspect;
        self
    }

    /// Use an already constructed backend, ignoring the backend config.
    #[must_use]
    pub fn backend(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Resolve the backend from configuration at build time.
    #[must_use]
    pub fn backend_config(mut self, backend: BackendConfig) -> Self {
        self.config.backend = backend;
        self.backend = None;
        self
    }

    /// Registry used to resolve the backend config. Defaults to the built-ins.
    #[must_use]
    pub fn registry(mut self, registry: BackendRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Register the `load` callback.
    ///
    /// The result must convert into a mapping of dataset name to dataset.
    #[must_use]
    pub fn load<F, D>(mut self, load: F) -> Self
    where
        F: Fn(Option<&Value>) -> anyhow::Result<D> + Send + Sync + 'static,
        D: IntoDatasets,
    {
        let load: LoadFn = Box::new(move |config| {
            load(config)
                .map_err(|e| Error::Callback {
                    stage: Stage::Load,
                    source: e.into(),
                })?
                .into_datasets()
        });
        self.callbacks.load = Some(load);
        self
    }

    /// Register the `model_iterator` callback.
    #[must_use]
    pub fn model_iterator<F, I>(mut self, model_iterator: F) -> Self
    where
        F: Fn(Option<&Value>) -> anyhow::Result<I> + Send + Sync + 'static,
        I: IntoIterator<Item = M>,
        I::IntoIter: Send + 'static,
    {
        let model_iterator: IterFn<M> = Box::new(move |config| {
            let models = model_iterator(config).map_err(|e| Error::Callback {
                stage: Stage::Iterate,
                source: e.into(),
            })?;
            Ok(Box::new(models.into_iter()) as ModelIter<M>)
        });
        self.callbacks.model_iterator = Some(model_iterator);
        self
    }

    /// Register the `train` callback.
    ///
    /// It writes metrics into the record and returns the trained model, or
    /// `()` when there is nothing to introspect.
    #[must_use]
    pub fn train<F, T>(mut self, train: F) -> Self
    where
        F: Fn(Option<&Value>, &M, &Datasets, &mut Record) -> anyhow::Result<T>
            + Send
            + Sync
            + 'static,
        T: TrainedModel + 'static,
    {
        let train: TrainFn<M> = Box::new(move |config, model, datasets, record| {
            train(config, model, datasets, record)
                .map(|trained| Box::new(trained) as Box<dyn TrainedModel>)
        });
        self.callbacks.train = Some(train);
        self
    }

    /// Register the optional `finalize` callback.
    #[must_use]
    pub fn finalize<F>(mut self, finalize: F) -> Self
    where
        F: Fn(Option<&Value>, &mut Experiment) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let finalize: FinalizeFn = Box::new(move |config, experiment| {
            finalize(config, experiment).map_err(|e| Error::Callback {
                stage: Stage::Finalize,
                source: e.into(),
            })
        });
        self.callbacks.finalize = Some(finalize);
        self
    }

    /// Validate settings and construct the pipeline.
    ///
    /// Callback presence is checked by [`Pipeline::run`], not here.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for a zero worker count, an unknown
    /// backend, or more than one worker on a backend without concurrent
    /// connection support.
    pub fn build(self) -> Result<Pipeline<M>> {
        let workers = self.config.effective_workers()?;
        let backend = match self.backend {
            Some(backend) => backend,
            None => self
                .registry
                .unwrap_or_default()
                .build(&self.config.backend)?,
        };
        if workers > 1 && !backend.capabilities().concurrent {
            return Err(Error::Configuration(format!(
                "the {} backend does not support concurrent connections; \
                 use workers = 1 or a concurrent backend (requested {workers} workers)",
                backend.name()
            )));
        }
        Ok(Pipeline::from_parts(
            self.config,
            workers,
            self.run_config,
            Experiment::new(backend),
            self.callbacks,
        ))
    }
}

impl<M: ModelConfig + 'static> Default for PipelineBuilder<M> {
    fn default() -> Self {
        Self::new()
    }
}
