//! Worker bridge trait: abstracts over in-process and out-of-process workers.

use crate::error::{Result, StartStage, WorkerError};
use crate::protocol::{ModelInfo, NamedTensors, WorkerSettings};
use std::fmt;

/// Lifecycle of one worker.
///
/// `Idle -> Running -> Stopped`, or `Idle -> Failed` when startup fails.
/// A worker that crashes or times out while running ends up `Stopped`.
/// Neither `Failed` nor `Stopped` can be left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    Idle,
    Running,
    Failed,
    Stopped,
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Failed => "failed",
            WorkerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// The channel between a pipeline node and the worker that owns the model.
///
/// Two implementations exist:
/// - `WorkerClient`: out-of-process (IPC via socket to a `voxpipe-worker` child)
/// - `InProcessBridge`: in-process (runtime on a dedicated thread)
///
/// Every call is a blocking round trip. Implementations serialize calls, so a
/// second concurrent `forward` waits for the first.
pub trait WorkerBridge: Send + Sync {
    /// Claims the device and loads the model. Only valid from `Idle`.
    ///
    /// A failure here is final: later calls to `start` return the same
    /// startup error and `forward` is refused.
    fn start(&self, settings: &WorkerSettings) -> Result<ModelInfo>;

    /// Runs one forward pass. Only valid while `Running`.
    fn forward(&self, inputs: NamedTensors) -> Result<NamedTensors>;

    /// Releases model and device, then shuts the worker down. Idempotent.
    fn stop(&self) -> Result<()>;

    /// Current lifecycle state.
    fn state(&self) -> WorkerState;

    /// Present while running.
    fn model_info(&self) -> Option<ModelInfo>;

    /// Settings the worker was started with. Present while running.
    fn settings(&self) -> Option<WorkerSettings>;
}

/// State machine shared by the bridge implementations. Lives behind the
/// bridge's round-trip lock.
#[derive(Debug)]
pub(crate) struct Lifecycle {
    state: WorkerState,
    failure: Option<(StartStage, String)>,
    info: Option<ModelInfo>,
    settings: Option<WorkerSettings>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: WorkerState::Idle,
            failure: None,
            info: None,
            settings: None,
        }
    }

    pub(crate) fn state(&self) -> WorkerState {
        self.state
    }

    pub(crate) fn info(&self) -> Option<&ModelInfo> {
        self.info.as_ref()
    }

    pub(crate) fn settings(&self) -> Option<&WorkerSettings> {
        self.settings.as_ref()
    }

    /// Ok only when a start may be attempted.
    pub(crate) fn begin_start(&self) -> Result<()> {
        match self.state {
            WorkerState::Idle => Ok(()),
            WorkerState::Failed => Err(self.failure_error()),
            WorkerState::Running | WorkerState::Stopped => Err(WorkerError::AlreadyStarted),
        }
    }

    pub(crate) fn finish_start(
        &mut self,
        settings: &WorkerSettings,
        result: Result<ModelInfo>,
    ) -> Result<ModelInfo> {
        match result {
            Ok(info) => {
                self.state = WorkerState::Running;
                self.info = Some(info.clone());
                self.settings = Some(settings.clone());
                Ok(info)
            }
            Err(e) => {
                let failure = match &e {
                    WorkerError::StartFailed { stage, reason } => (*stage, reason.clone()),
                    other => (StartStage::Connect, other.to_string()),
                };
                tracing::error!("Worker startup failed at {} stage: {}", failure.0, failure.1);
                self.state = WorkerState::Failed;
                self.failure = Some(failure);
                Err(e)
            }
        }
    }

    pub(crate) fn require_running(&self) -> Result<()> {
        match self.state {
            WorkerState::Running => Ok(()),
            WorkerState::Failed => Err(self.failure_error()),
            other => Err(WorkerError::NotRunning(other)),
        }
    }

    /// Moves to `Stopped` unless startup failed. Returns whether there was
    /// anything running to stop.
    pub(crate) fn mark_stopped(&mut self) -> bool {
        let was_running = self.state == WorkerState::Running;
        self.info = None;
        self.settings = None;
        if self.state != WorkerState::Failed {
            self.state = WorkerState::Stopped;
        }
        was_running
    }

    /// The worker died under a running model. Nothing is left to stop.
    pub(crate) fn mark_crashed(&mut self) {
        if self.mark_stopped() {
            tracing::error!("Worker lost while running; marked stopped");
        }
    }

    fn failure_error(&self) -> WorkerError {
        let (stage, reason) = self
            .failure
            .clone()
            .unwrap_or((StartStage::Connect, "unknown failure".to_string()));
        WorkerError::StartFailed { stage, reason }
    }
}
