//! In-process worker bridge: hosts the model runtime on a dedicated thread.
//!
//! Unlike `WorkerClient` (which talks to a child process over IPC), the
//! runtime lives in this process. Requests reach its thread through a
//! channel and each carries its own reply channel. A panic inside the
//! runtime ends the thread and surfaces as [`WorkerError::ProcessCrashed`].

use crate::bridge::{Lifecycle, WorkerBridge, WorkerState};
use crate::error::{Result, StartStage, WorkerError};
use crate::protocol::{ModelInfo, NamedTensors, WorkerSettings};
use crate::runtime::{start_runtime, RuntimeError, RuntimeFactory};
use crossbeam_channel::{bounded, unbounded, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;

enum Command {
    Start {
        settings: WorkerSettings,
        reply: Sender<Result<ModelInfo>>,
    },
    Forward {
        inputs: NamedTensors,
        reply: Sender<std::result::Result<NamedTensors, RuntimeError>>,
    },
    Shutdown,
}

struct Inner {
    lifecycle: Lifecycle,
    commands: Option<Sender<Command>>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Worker bridge that runs the model on a thread of the current process.
pub struct InProcessBridge {
    factory: RuntimeFactory,
    inner: Mutex<Inner>,
}

impl InProcessBridge {
    /// The runtime is created by `factory` on the worker thread at start.
    pub fn new(factory: RuntimeFactory) -> Self {
        Self {
            factory,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::new(),
                commands: None,
                thread: None,
            }),
        }
    }

    fn run_loop(factory: RuntimeFactory, commands: crossbeam_channel::Receiver<Command>) {
        let mut runtime = factory();
        for command in commands.iter() {
            match command {
                Command::Start { settings, reply } => {
                    let _ = reply.send(start_runtime(runtime.as_mut(), &settings));
                }
                Command::Forward { inputs, reply } => {
                    let _ = reply.send(runtime.forward(inputs));
                }
                Command::Shutdown => break,
            }
        }
        runtime.release();
        tracing::debug!("In-process worker thread exiting");
    }
}

impl Inner {
    fn launch(&mut self, factory: &RuntimeFactory, settings: &WorkerSettings) -> Result<ModelInfo> {
        let (commands, receiver) = unbounded();
        let factory = Arc::clone(factory);
        let handle = thread::Builder::new()
            .name("voxpipe-worker".to_string())
            .spawn(move || InProcessBridge::run_loop(factory, receiver))
            .map_err(|e| WorkerError::StartFailed {
                stage: StartStage::Spawn,
                reason: e.to_string(),
            })?;
        self.commands = Some(commands);
        self.thread = Some(handle);

        let (reply, response) = bounded(1);
        let sent = self.commands.as_ref().is_some_and(|tx| {
            tx.send(Command::Start {
                settings: settings.clone(),
                reply,
            })
            .is_ok()
        });
        let result = match sent.then(|| response.recv()) {
            Some(Ok(result)) => result,
            _ => Err(WorkerError::StartFailed {
                stage: StartStage::ModelLoad,
                reason: "worker thread exited during startup".to_string(),
            }),
        };

        if result.is_err() {
            self.shutdown();
        }
        result
    }

    fn shutdown(&mut self) {
        if let Some(commands) = self.commands.take() {
            let _ = commands.send(Command::Shutdown);
        }
        if let Some(handle) = self.thread.take() {
            if handle.join().is_err() {
                tracing::warn!("In-process worker thread panicked");
            }
        }
    }
}

impl WorkerBridge for InProcessBridge {
    fn start(&self, settings: &WorkerSettings) -> Result<ModelInfo> {
        let mut inner = self.inner.lock();
        inner.lifecycle.begin_start()?;
        let result = inner.launch(&self.factory, settings);
        inner.lifecycle.finish_start(settings, result)
    }

    fn forward(&self, inputs: NamedTensors) -> Result<NamedTensors> {
        // Held for the whole round trip.
        let mut inner = self.inner.lock();
        inner.lifecycle.require_running()?;

        let (reply, response) = bounded(1);
        let sent = inner
            .commands
            .as_ref()
            .is_some_and(|tx| tx.send(Command::Forward { inputs, reply }).is_ok());

        match sent.then(|| response.recv()) {
            Some(Ok(Ok(outputs))) => Ok(outputs),
            Some(Ok(Err(e))) => {
                tracing::warn!("Forward pass failed: {}", e);
                Err(WorkerError::Forward(e.to_string()))
            }
            _ => {
                tracing::error!("In-process worker thread died during forward");
                inner.shutdown();
                inner.lifecycle.mark_crashed();
                Err(WorkerError::ProcessCrashed)
            }
        }
    }

    fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        inner.shutdown();
        if inner.lifecycle.mark_stopped() {
            tracing::info!("In-process worker stopped");
        }
        Ok(())
    }

    fn state(&self) -> WorkerState {
        self.inner.lock().lifecycle.state()
    }

    fn model_info(&self) -> Option<ModelInfo> {
        self.inner.lock().lifecycle.info().cloned()
    }

    fn settings(&self) -> Option<WorkerSettings> {
        self.inner.lock().lifecycle.settings().cloned()
    }
}

impl Drop for InProcessBridge {
    fn drop(&mut self) {
        self.inner.get_mut().shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph_runtime::GraphRuntime;
    use crate::protocol::DeviceSelector;
    use crate::runtime::ModelRuntime;
    use approx::assert_relative_eq;
    use ndarray::{ArrayD, IxDyn};
    use std::path::Path;

    const DEFINITION: &str = r#"
name = "doubler"
inputs = ["data"]

[[layers]]
name = "doubled"
op = "scale"
input = "data"
param = "double"
"#;

    const WEIGHTS: &str = "[params.double]\ngain = 2.0\n";

    fn settings(dir: &Path, device: Option<DeviceSelector>) -> WorkerSettings {
        let definition = dir.join("model.toml");
        let weights = dir.join("weights.toml");
        std::fs::write(&definition, DEFINITION).unwrap();
        std::fs::write(&weights, WEIGHTS).unwrap();
        WorkerSettings::configure(definition, weights, device).unwrap()
    }

    fn graph_bridge() -> InProcessBridge {
        InProcessBridge::new(Arc::new(|| Box::new(GraphRuntime::new()) as Box<dyn ModelRuntime>))
    }

    fn inputs(value: f32) -> NamedTensors {
        let mut inputs = NamedTensors::new();
        inputs.insert("data".into(), ArrayD::from_elem(IxDyn(&[1, 4, 4]), value));
        inputs
    }

    /// Panics on every forward pass.
    struct Exploding;

    impl ModelRuntime for Exploding {
        fn name(&self) -> &str {
            "exploding"
        }

        fn select_device(&mut self, _device: DeviceSelector) -> std::result::Result<(), RuntimeError> {
            Ok(())
        }

        fn load(&mut self, _: &Path, _: &Path) -> std::result::Result<ModelInfo, RuntimeError> {
            Ok(ModelInfo::default())
        }

        fn forward(&mut self, _: NamedTensors) -> std::result::Result<NamedTensors, RuntimeError> {
            panic!("boom");
        }

        fn release(&mut self) {}
    }

    #[test]
    fn test_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = graph_bridge();
        assert_eq!(bridge.state(), WorkerState::Idle);
        assert!(matches!(
            bridge.forward(inputs(1.0)),
            Err(WorkerError::NotRunning(WorkerState::Idle))
        ));

        let info = bridge.start(&settings(dir.path(), None)).unwrap();
        assert_eq!(info.outputs, vec!["doubled"]);
        assert_eq!(bridge.state(), WorkerState::Running);
        assert!(matches!(
            bridge.start(&settings(dir.path(), None)),
            Err(WorkerError::AlreadyStarted)
        ));

        let outputs = bridge.forward(inputs(1.5)).unwrap();
        assert_relative_eq!(outputs["doubled"][[0, 2, 2]], 3.0);

        bridge.stop().unwrap();
        bridge.stop().unwrap();
        assert_eq!(bridge.state(), WorkerState::Stopped);
        assert!(bridge.model_info().is_none());
        assert!(matches!(
            bridge.forward(inputs(1.0)),
            Err(WorkerError::NotRunning(WorkerState::Stopped))
        ));
    }

    #[test]
    fn test_accelerator_failure_is_sticky() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = graph_bridge();
        let settings = settings(dir.path(), Some(DeviceSelector::Accelerator(0)));

        let err = bridge.start(&settings).unwrap_err();
        assert!(matches!(
            err,
            WorkerError::StartFailed {
                stage: StartStage::DeviceClaim,
                ..
            }
        ));
        assert_eq!(bridge.state(), WorkerState::Failed);
        assert!(bridge.start(&settings).unwrap_err().is_startup());
        assert!(bridge.forward(inputs(1.0)).unwrap_err().is_startup());
    }

    #[test]
    fn test_forward_error_surfaces() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = graph_bridge();
        bridge.start(&settings(dir.path(), None)).unwrap();

        let err = bridge.forward(NamedTensors::new()).unwrap_err();
        assert!(matches!(err, WorkerError::Forward(_)));
        // The worker survives a failed forward.
        assert!(bridge.forward(inputs(1.0)).is_ok());
    }

    #[test]
    fn test_panic_is_reported_as_crash() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = InProcessBridge::new(Arc::new(|| Box::new(Exploding) as Box<dyn ModelRuntime>));
        bridge.start(&settings(dir.path(), None)).unwrap();

        assert!(matches!(
            bridge.forward(inputs(1.0)),
            Err(WorkerError::ProcessCrashed)
        ));
        assert_eq!(bridge.state(), WorkerState::Stopped);
        assert!(bridge.model_info().is_none());
        assert!(bridge.settings().is_none());
        assert!(matches!(
            bridge.forward(inputs(1.0)),
            Err(WorkerError::NotRunning(WorkerState::Stopped))
        ));
        bridge.stop().unwrap();
    }

    #[test]
    fn test_concurrent_forwards() {
        let dir = tempfile::tempdir().unwrap();
        let bridge = Arc::new(graph_bridge());
        bridge.start(&settings(dir.path(), None)).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|i| {
                let bridge = Arc::clone(&bridge);
                thread::spawn(move || {
                    let outputs = bridge.forward(inputs(i as f32)).unwrap();
                    outputs["doubled"][[0, 0, 0]]
                })
            })
            .collect();

        for (i, handle) in handles.into_iter().enumerate() {
            assert_relative_eq!(handle.join().unwrap(), 2.0 * i as f32);
        }
    }
}
