//! The prediction node.

use crate::config::{InputSource, Isolation, PredictConfig};
use crate::error::{Error, Result};
use ndarray::Axis;
use std::sync::Arc;
use voxpipe_core::{
    Array, ArrayKey, ArraySpec, Batch, BatchFilter, DataType, ProviderSpec, Request,
};
use voxpipe_worker::{
    GraphRuntime, InProcessBridge, ModelInfo, ModelRuntime, NamedTensors, StartStage,
    WorkerBridge, WorkerClient, WorkerError, WorkerState,
};

/// Runs batches through a model hosted by an inference worker.
///
/// The worker is started lazily on the first prediction. If startup fails
/// the node is dead: every later call returns the same startup error
/// without contacting the worker again.
pub struct Predict {
    config: PredictConfig,
    worker: Arc<dyn WorkerBridge>,
    provided: Option<ProviderSpec>,
    started: bool,
    startup_failure: Option<(StartStage, String)>,
}

impl Predict {
    /// Creates the node and its worker according to the configured isolation.
    /// Nothing is spawned until the first prediction.
    pub fn new(config: PredictConfig) -> Result<Self> {
        let worker: Arc<dyn WorkerBridge> = match config.isolation() {
            Isolation::Process => Arc::new(WorkerClient::new(config.worker().clone())?),
            Isolation::InProcess => Arc::new(InProcessBridge::new(Arc::new(|| {
                Box::new(GraphRuntime::new()) as Box<dyn ModelRuntime>
            }))),
        };
        Ok(Self::with_worker(config, worker))
    }

    /// Uses an existing worker, which may be shared with other nodes.
    pub fn with_worker(config: PredictConfig, worker: Arc<dyn WorkerBridge>) -> Self {
        Self {
            config,
            worker,
            provided: None,
            started: false,
            startup_failure: None,
        }
    }

    /// The validated configuration this node was built from.
    pub fn config(&self) -> &PredictConfig {
        &self.config
    }

    /// Lifecycle state of the underlying worker.
    pub fn worker_state(&self) -> WorkerState {
        self.worker.state()
    }

    /// Computes the requested outputs and writes them into `batch`.
    ///
    /// Inputs reach the model with the shape they have in the batch; upstream
    /// data must already carry the leading batch axis the model expects.
    /// Outputs whose key is not in `request` are computed by the model but
    /// not written. Each written array carries exactly the requested ROI.
    pub fn predict(&mut self, mut batch: Batch, request: &Request) -> Result<Batch> {
        self.check_startup_failure()?;
        let inputs = self.gather_inputs(&batch)?;
        self.ensure_started()?;

        tracing::debug!(
            "Predicting batch {} with inputs {:?}",
            batch.id(),
            inputs.keys().collect::<Vec<_>>()
        );
        let mut outputs = self.worker.forward(inputs).map_err(|e| {
            tracing::warn!("Prediction for batch {} failed: {}", batch.id(), e);
            Error::from(e)
        })?;

        for (layer, key) in self.config.outputs() {
            let Some(roi) = request.roi(key) else {
                continue;
            };
            let tensor = outputs
                .remove(layer)
                .ok_or_else(|| Error::Inference(format!("model produced no output {:?}", layer)))?;
            if tensor.ndim() == 0 || tensor.shape()[0] != 1 {
                return Err(Error::Inference(format!(
                    "output {:?} has shape {:?}, expected a leading batch axis of 1",
                    layer,
                    tensor.shape()
                )));
            }

            let spec = self.output_spec(key).with_roi(Some(roi.clone()));
            let array = Array::new(tensor.index_axis_move(Axis(0), 0), spec)?;
            batch.insert(key.clone(), array);
        }

        Ok(batch)
    }

    /// Advertised spec for output `key`.
    fn output_spec(&self, key: &ArrayKey) -> ArraySpec {
        if let Some(spec) = self.provided.as_ref().and_then(|p| p.get(key)) {
            return spec.clone();
        }
        let base = ArraySpec::default().with_dtype(DataType::Float32);
        match self.config.array_spec(key) {
            Some(overrides) => base.merge(overrides),
            None => base,
        }
    }

    fn gather_inputs(&self, batch: &Batch) -> Result<NamedTensors> {
        let mut inputs = NamedTensors::new();
        for (layer, source) in self.config.inputs() {
            let tensor = match source {
                InputSource::Array(key) => batch
                    .get(key)
                    .ok_or_else(|| Error::MissingInput(key.to_string()))?
                    .data()
                    .to_f32(),
                InputSource::Attribute(name) => batch
                    .attribute(name)
                    .ok_or_else(|| Error::MissingAttribute(name.clone()))?
                    .clone(),
            };
            inputs.insert(layer.clone(), tensor);
        }
        Ok(inputs)
    }

    fn check_startup_failure(&self) -> Result<()> {
        match &self.startup_failure {
            Some((stage, reason)) => Err(Error::Startup {
                stage: *stage,
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }

    fn ensure_started(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        let info = match self.worker.start(self.config.settings()) {
            Ok(info) => info,
            Err(WorkerError::AlreadyStarted) if self.worker.state() == WorkerState::Running => {
                self.shared_model_info()?
            }
            Err(WorkerError::StartFailed { stage, reason }) => {
                return Err(self.fail(stage, reason));
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(reason) = self.check_layers(&info) {
            if let Err(e) = self.worker.stop() {
                tracing::warn!("Failed to stop worker: {}", e);
            }
            return Err(self.fail(StartStage::ModelLoad, reason));
        }

        tracing::info!(
            "Model {} ready on {} for outputs {:?}",
            info.name,
            info.device,
            self.config.outputs().values().collect::<Vec<_>>()
        );
        self.started = true;
        Ok(())
    }

    /// Model of a worker another node already started. It must run the same
    /// files on the same device as this node's configuration.
    fn shared_model_info(&self) -> Result<ModelInfo> {
        let wanted = self.config.settings();
        let (Some(settings), Some(info)) = (self.worker.settings(), self.worker.model_info()) else {
            return Err(Error::WorkerUnavailable("worker reports no model".to_string()));
        };
        if &settings != wanted {
            return Err(Error::Config(format!(
                "shared worker runs {} on {}, this node needs {} on {}",
                settings.model_definition.display(),
                settings.device,
                wanted.model_definition.display(),
                wanted.device
            )));
        }
        Ok(info)
    }

    /// Every configured layer must exist in the loaded model.
    fn check_layers(&self, info: &ModelInfo) -> std::result::Result<(), String> {
        let missing_inputs: Vec<_> = self
            .config
            .inputs()
            .keys()
            .filter(|layer| !info.inputs.contains(*layer))
            .collect();
        let missing_outputs: Vec<_> = self
            .config
            .outputs()
            .keys()
            .filter(|layer| !info.outputs.contains(*layer))
            .collect();

        if missing_inputs.is_empty() && missing_outputs.is_empty() {
            Ok(())
        } else {
            Err(format!(
                "model {:?} lacks input layers {:?} and output layers {:?}",
                info.name, missing_inputs, missing_outputs
            ))
        }
    }

    fn fail(&mut self, stage: StartStage, reason: String) -> Error {
        tracing::error!("Prediction node disabled, worker failed while {}: {}", stage, reason);
        self.startup_failure = Some((stage, reason.clone()));
        Error::Startup { stage, reason }
    }
}

impl BatchFilter for Predict {
    type Error = Error;

    fn setup(&mut self, upstream: &ProviderSpec) -> Result<()> {
        for key in self.config.array_inputs() {
            if !upstream.contains(key) {
                return Err(Error::MissingUpstream(key.to_string()));
            }
        }

        let base = self
            .config
            .array_inputs()
            .next()
            .and_then(|key| upstream.get(key))
            .map(|spec| spec.with_roi(None))
            .unwrap_or_default()
            .with_dtype(DataType::Float32);

        let mut provided = ProviderSpec::new();
        for key in self.config.output_keys() {
            let spec = match self.config.array_spec(key) {
                Some(overrides) => base.merge(overrides),
                None => base.clone(),
            };
            tracing::debug!("Providing {} as {:?}", key, spec);
            provided.insert(key.clone(), spec);
        }
        self.provided = Some(provided);
        Ok(())
    }

    fn consumes(&self) -> Vec<ArrayKey> {
        self.config.array_inputs().cloned().collect()
    }

    fn provides(&self) -> ProviderSpec {
        match &self.provided {
            Some(provided) => provided.clone(),
            None => self
                .config
                .output_keys()
                .map(|key| (key.clone(), self.output_spec(key)))
                .fold(ProviderSpec::new(), |spec, (key, s)| spec.with(key, s)),
        }
    }

    /// `request` without this node's outputs. Every array input must be
    /// requested, with the ROI the model needs.
    fn prepare(&self, request: &Request) -> Result<Request> {
        for key in self.config.array_inputs() {
            if !request.contains(key) {
                return Err(Error::MissingRequest(key.to_string()));
            }
        }
        let mut upstream = request.clone();
        for key in self.config.output_keys() {
            upstream.remove(key);
        }
        Ok(upstream)
    }

    fn process(&mut self, batch: Batch, request: &Request) -> Result<Batch> {
        self.predict(batch, request)
    }

    fn teardown(&mut self) -> Result<()> {
        self.started = false;
        self.worker.stop()?;
        Ok(())
    }
}
