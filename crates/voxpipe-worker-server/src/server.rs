//! Worker server - runs in an isolated process
//!
//! Hosts exactly one model runtime for one host connection.

use std::path::PathBuf;
use std::time::Instant;
use voxpipe_worker::protocol::{HostMessage, WorkerMessage};
use voxpipe_worker::transport::TransportListener;
use voxpipe_worker::{start_runtime, ModelRuntime, Result, RuntimeFactory, StartStage, WorkerError};

/// Serves one host over one socket, with one runtime at a time.
pub struct WorkerServer {
    socket_path: PathBuf,
    factory: RuntimeFactory,
    runtime: Option<Box<dyn ModelRuntime>>,
}

impl WorkerServer {
    /// The runtime is created by `factory` when the host sends `Start`.
    pub fn new(socket_path: impl Into<PathBuf>, factory: RuntimeFactory) -> Self {
        Self {
            socket_path: socket_path.into(),
            factory,
            runtime: None,
        }
    }

    /// Serves one host until it sends `Shutdown` or disconnects.
    pub async fn run(&mut self) -> Result<()> {
        let listener = TransportListener::bind(&self.socket_path).await?;
        let mut transport = listener.accept().await?;
        transport.send_worker_message(&WorkerMessage::Ready).await?;
        tracing::info!("Worker ready on {}", self.socket_path.display());

        loop {
            let msg = match transport.recv_host_message().await {
                Ok(msg) => msg,
                Err(WorkerError::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    tracing::info!("Host disconnected");
                    break;
                }
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            };

            match self.handle_message(msg) {
                Some(response) => transport.send_worker_message(&response).await?,
                None => break,
            }
        }

        self.release();
        Ok(())
    }

    /// Returns `None` on `Shutdown`.
    fn handle_message(&mut self, msg: HostMessage) -> Option<WorkerMessage> {
        let response = match msg {
            HostMessage::Start { settings } => {
                if self.runtime.is_some() {
                    return Some(WorkerMessage::Error {
                        message: "model already loaded".to_string(),
                    });
                }
                let mut runtime = (self.factory)();
                match start_runtime(runtime.as_mut(), &settings) {
                    Ok(info) => {
                        self.runtime = Some(runtime);
                        WorkerMessage::Started { info }
                    }
                    Err(WorkerError::StartFailed { stage, reason }) => {
                        tracing::error!("Startup failed at {} stage: {}", stage, reason);
                        WorkerMessage::StartFailed {
                            stage,
                            message: reason,
                        }
                    }
                    Err(e) => WorkerMessage::StartFailed {
                        stage: StartStage::ModelLoad,
                        message: e.to_string(),
                    },
                }
            }

            HostMessage::Forward { inputs } => match self.runtime.as_mut() {
                Some(runtime) => {
                    let started = Instant::now();
                    match runtime.forward(inputs) {
                        Ok(outputs) => WorkerMessage::ForwardComplete {
                            outputs,
                            latency_us: started.elapsed().as_micros() as u64,
                        },
                        Err(e) => {
                            tracing::warn!("Forward pass failed: {}", e);
                            WorkerMessage::Error {
                                message: e.to_string(),
                            }
                        }
                    }
                }
                None => WorkerMessage::Error {
                    message: "no model loaded".to_string(),
                },
            },

            HostMessage::Stop => {
                self.release();
                WorkerMessage::Stopped
            }

            HostMessage::Shutdown => return None,
        };
        Some(response)
    }

    fn release(&mut self) {
        if let Some(mut runtime) = self.runtime.take() {
            runtime.release();
            tracing::info!("Released {} runtime", runtime.name());
        }
    }
}
