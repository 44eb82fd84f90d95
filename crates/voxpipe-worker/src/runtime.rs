//! Model runtime trait.
//!
//! This is the seam where a numeric framework plugs in. The worker (process
//! or in-process thread) owns exactly one runtime and drives it through
//! device selection, model loading, forward passes and release.

use crate::error::{StartStage, WorkerError};
use crate::protocol::{DeviceSelector, ModelInfo, NamedTensors, WorkerSettings};
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("Device error: {0}")]
    Device(String),

    #[error("Load error: {0}")]
    Load(String),

    #[error("{0}")]
    Forward(String),
}

/// A framework that can run a named-tensor forward pass.
///
/// Device claims and loaded graphs are usually process-global in the
/// underlying framework, which is why runtimes are hosted by a worker rather
/// than called from pipeline nodes directly.
pub trait ModelRuntime: Send {
    /// e.g. "reference-graph", "onnxruntime"
    fn name(&self) -> &str;

    /// Claims `device` and switches compute to it. Called before [`load`](Self::load).
    fn select_device(&mut self, device: DeviceSelector) -> Result<(), RuntimeError>;

    fn load(&mut self, model_definition: &Path, weights: &Path) -> Result<ModelInfo, RuntimeError>;

    /// Runs the loaded model once. Each call sees only its own inputs.
    fn forward(&mut self, inputs: NamedTensors) -> Result<NamedTensors, RuntimeError>;

    /// Drops the model and gives up the device. Safe to call repeatedly.
    fn release(&mut self);
}

/// Creates a runtime on the thread (or in the process) that will own it.
pub type RuntimeFactory = Arc<dyn Fn() -> Box<dyn ModelRuntime> + Send + Sync>;

/// Device claim first, then model load. Failures map to the stage they hit.
pub fn start_runtime(
    runtime: &mut dyn ModelRuntime,
    settings: &WorkerSettings,
) -> Result<ModelInfo, WorkerError> {
    tracing::info!(
        "Starting {} runtime on {} with {}",
        runtime.name(),
        settings.device,
        settings.model_definition.display()
    );

    runtime
        .select_device(settings.device)
        .map_err(|e| WorkerError::StartFailed {
            stage: StartStage::DeviceClaim,
            reason: e.to_string(),
        })?;

    match runtime.load(&settings.model_definition, &settings.weights) {
        Ok(mut info) => {
            info.device = settings.device;
            tracing::info!(
                "Model {} loaded: inputs {:?}, outputs {:?}",
                info.name,
                info.inputs,
                info.outputs
            );
            Ok(info)
        }
        Err(e) => {
            runtime.release();
            Err(WorkerError::StartFailed {
                stage: StartStage::ModelLoad,
                reason: e.to_string(),
            })
        }
    }
}
