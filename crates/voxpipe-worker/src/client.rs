//! Worker client for out-of-process inference.
//!
//! Spawns a `voxpipe-worker` child, connects to it over a Unix socket (named
//! pipe on Windows) and drives it with blocking round trips. The socket is
//! served by a private single-threaded tokio runtime owned by the client.

use crate::bridge::{Lifecycle, WorkerBridge, WorkerState};
use crate::error::{Result, StartStage, WorkerError};
use crate::protocol::{HostMessage, ModelInfo, NamedTensors, WorkerConfig, WorkerMessage, WorkerSettings};
use crate::transport::MessageTransport;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::process::{Child, Command};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

const CONNECT_RETRY_INTERVAL: Duration = Duration::from_millis(20);

/// An open connection to a live worker process.
struct Connection {
    runtime: Runtime,
    transport: MessageTransport,
    process: Child,
    socket_path: PathBuf,
}

struct ClientInner {
    lifecycle: Lifecycle,
    connection: Option<Connection>,
}

/// Worker bridge backed by a child process.
///
/// The process is spawned by [`start`](WorkerBridge::start) and terminated by
/// [`stop`](WorkerBridge::stop) or on drop.
pub struct WorkerClient {
    config: WorkerConfig,
    inner: Mutex<ClientInner>,
}

impl WorkerClient {
    /// Validates `config`. The worker process is spawned by `start`.
    pub fn new(config: WorkerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            inner: Mutex::new(ClientInner {
                lifecycle: Lifecycle::new(),
                connection: None,
            }),
        })
    }

    /// Spawn and timeout settings.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Process id of the worker while it is running.
    pub fn process_id(&self) -> Option<u32> {
        self.inner.lock().connection.as_ref().map(|c| c.process.id())
    }

    fn endpoint(config: &WorkerConfig) -> PathBuf {
        let name = format!("voxpipe-worker-{}", uuid::Uuid::new_v4().simple());
        #[cfg(windows)]
        {
            let _ = config;
            PathBuf::from(format!(r"\\.\pipe\{}", name))
        }
        #[cfg(not(windows))]
        {
            config.socket_dir.join(format!("{}.sock", name))
        }
    }

    fn spawn_worker_process(config: &WorkerConfig, socket_path: &Path) -> Result<Child> {
        let server = config.server_binary().map_err(|e| WorkerError::StartFailed {
            stage: StartStage::Spawn,
            reason: e.to_string(),
        })?;
        tracing::info!("Spawning worker {} on {}", server.display(), socket_path.display());

        Command::new(&server)
            .arg(socket_path)
            .spawn()
            .map_err(|e| WorkerError::StartFailed {
                stage: StartStage::Spawn,
                reason: format!("{}: {}", server.display(), e),
            })
    }

    /// Retries until the worker listens, then waits for its `Ready`.
    async fn connect(
        socket_path: &Path,
        process: &mut Child,
        timeout: Duration,
    ) -> Result<MessageTransport> {
        let deadline = Instant::now() + timeout;
        let connect_failed = |reason: String| WorkerError::StartFailed {
            stage: StartStage::Connect,
            reason,
        };

        let mut transport = loop {
            match MessageTransport::connect(socket_path).await {
                Ok(transport) => break transport,
                Err(e) => {
                    if let Ok(Some(status)) = process.try_wait() {
                        return Err(WorkerError::StartFailed {
                            stage: StartStage::Spawn,
                            reason: format!("worker exited with {} before listening", status),
                        });
                    }
                    if Instant::now() >= deadline {
                        return Err(connect_failed(format!(
                            "no connection after {}ms: {}",
                            timeout.as_millis(),
                            e
                        )));
                    }
                    tokio::time::sleep(CONNECT_RETRY_INTERVAL).await;
                }
            }
        };

        let remaining = deadline.saturating_duration_since(Instant::now());
        match tokio::time::timeout(remaining, transport.recv_worker_message()).await {
            Ok(Ok(WorkerMessage::Ready)) => Ok(transport),
            Ok(Ok(other)) => Err(connect_failed(format!("expected Ready, got {:?}", other))),
            Ok(Err(e)) => Err(connect_failed(e.to_string())),
            Err(_) => Err(connect_failed(format!(
                "worker not ready after {}ms",
                timeout.as_millis()
            ))),
        }
    }

    fn launch(config: &WorkerConfig, settings: &WorkerSettings) -> Result<(Connection, ModelInfo)> {
        let socket_path = Self::endpoint(config);
        let mut process = Self::spawn_worker_process(config, &socket_path)?;

        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                kill(&mut process);
                return Err(WorkerError::StartFailed {
                    stage: StartStage::Spawn,
                    reason: e.to_string(),
                });
            }
        };

        let timeout = Duration::from_millis(config.connect_timeout_ms);
        let transport = match runtime.block_on(Self::connect(&socket_path, &mut process, timeout)) {
            Ok(transport) => transport,
            Err(e) => {
                kill(&mut process);
                remove_socket(&socket_path);
                return Err(e);
            }
        };

        let mut connection = Connection {
            runtime,
            transport,
            process,
            socket_path,
        };

        let reply = connection.round_trip(
            &HostMessage::Start {
                settings: settings.clone(),
            },
            None,
        );
        let result = match reply {
            Ok(WorkerMessage::Started { info }) => Ok(info),
            Ok(WorkerMessage::StartFailed { stage, message }) => Err(WorkerError::StartFailed {
                stage,
                reason: message,
            }),
            Ok(other) => Err(WorkerError::ProtocolError(format!(
                "Unexpected response to Start: {:?}",
                other
            ))),
            Err(e) => Err(WorkerError::StartFailed {
                stage: StartStage::Connect,
                reason: e.to_string(),
            }),
        };

        match result {
            Ok(info) => Ok((connection, info)),
            Err(e) => {
                connection.shutdown(Duration::from_millis(config.shutdown_timeout_ms));
                Err(e)
            }
        }
    }
}

impl Connection {
    fn round_trip(&mut self, msg: &HostMessage, timeout_ms: Option<u64>) -> Result<WorkerMessage> {
        let Connection {
            runtime, transport, ..
        } = self;
        let exchange = async {
            transport.send_host_message(msg).await?;
            transport.recv_worker_message().await
        };

        match timeout_ms {
            None => runtime.block_on(exchange),
            Some(ms) => runtime
                .block_on(async { tokio::time::timeout(Duration::from_millis(ms), exchange).await })
                .unwrap_or_else(|_| {
                    Err(WorkerError::Timeout {
                        operation: "forward".to_string(),
                        duration_ms: ms,
                    })
                }),
        }
    }

    fn has_exited(&mut self) -> bool {
        matches!(self.process.try_wait(), Ok(Some(_)))
    }

    /// Stop, then Shutdown, then reap. Kills the worker if it does not exit in time.
    fn shutdown(mut self, timeout: Duration) {
        let Connection {
            runtime, transport, ..
        } = &mut self;
        let graceful = runtime.block_on(async {
            tokio::time::timeout(timeout, async {
                transport.send_host_message(&HostMessage::Stop).await?;
                let reply = transport.recv_worker_message().await?;
                transport.send_host_message(&HostMessage::Shutdown).await?;
                Ok::<_, WorkerError>(reply)
            })
            .await
        });
        match graceful {
            Ok(Ok(WorkerMessage::Stopped)) => {}
            Ok(Ok(other)) => tracing::warn!("Unexpected response to Stop: {:?}", other),
            Ok(Err(e)) => tracing::warn!("Worker did not stop cleanly: {}", e),
            Err(_) => tracing::warn!("Worker did not stop within {}ms", timeout.as_millis()),
        }

        let Connection {
            transport,
            mut process,
            socket_path,
            ..
        } = self;
        drop(transport);

        let deadline = Instant::now() + timeout;
        loop {
            match process.try_wait() {
                Ok(Some(status)) => {
                    tracing::debug!("Worker exited with {}", status);
                    break;
                }
                Ok(None) if Instant::now() < deadline => std::thread::sleep(Duration::from_millis(10)),
                _ => {
                    tracing::warn!("Killing unresponsive worker {}", process.id());
                    kill(&mut process);
                    break;
                }
            }
        }
        remove_socket(&socket_path);
    }
}

fn kill(process: &mut Child) {
    let _ = process.kill();
    let _ = process.wait();
}

fn remove_socket(path: &Path) {
    #[cfg(unix)]
    {
        let _ = std::fs::remove_file(path);
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
}

fn is_disconnect(err: &WorkerError) -> bool {
    match err {
        WorkerError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::UnexpectedEof
                | std::io::ErrorKind::BrokenPipe
                | std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionAborted
        ),
        _ => false,
    }
}

impl WorkerBridge for WorkerClient {
    fn start(&self, settings: &WorkerSettings) -> Result<ModelInfo> {
        let mut inner = self.inner.lock();
        inner.lifecycle.begin_start()?;

        let result = match Self::launch(&self.config, settings) {
            Ok((connection, info)) => {
                tracing::info!("Worker {} running {}", connection.process.id(), info.name);
                inner.connection = Some(connection);
                Ok(info)
            }
            Err(e) => Err(e),
        };
        inner.lifecycle.finish_start(settings, result)
    }

    fn forward(&self, inputs: NamedTensors) -> Result<NamedTensors> {
        let mut inner = self.inner.lock();
        inner.lifecycle.require_running()?;
        let connection = inner.connection.as_mut().ok_or(WorkerError::ProcessCrashed)?;

        match connection.round_trip(&HostMessage::Forward { inputs }, self.config.forward_timeout_ms) {
            Ok(WorkerMessage::ForwardComplete {
                outputs,
                latency_us,
            }) => {
                tracing::debug!("Forward pass took {}us", latency_us);
                Ok(outputs)
            }
            Ok(WorkerMessage::Error { message }) => {
                tracing::warn!("Forward pass failed: {}", message);
                Err(WorkerError::Forward(message))
            }
            Ok(other) => Err(WorkerError::ProtocolError(format!(
                "Unexpected response to Forward: {:?}",
                other
            ))),
            Err(e @ WorkerError::Timeout { .. }) => {
                // The pending reply would desynchronize the stream.
                tracing::error!("{}; abandoning worker", e);
                if let Some(mut connection) = inner.connection.take() {
                    kill(&mut connection.process);
                    remove_socket(&connection.socket_path);
                }
                inner.lifecycle.mark_stopped();
                Err(e)
            }
            Err(e) if is_disconnect(&e) || connection.has_exited() => {
                tracing::error!("Worker process crashed: {}", e);
                if let Some(mut connection) = inner.connection.take() {
                    kill(&mut connection.process);
                    remove_socket(&connection.socket_path);
                }
                inner.lifecycle.mark_crashed();
                Err(WorkerError::ProcessCrashed)
            }
            Err(e) => Err(e),
        }
    }

    fn stop(&self) -> Result<()> {
        let mut inner = self.inner.lock();
        if let Some(connection) = inner.connection.take() {
            connection.shutdown(Duration::from_millis(self.config.shutdown_timeout_ms));
        }
        if inner.lifecycle.mark_stopped() {
            tracing::info!("Worker stopped");
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

impl Drop for WorkerClient {
    fn drop(&mut self) {
        if let Some(connection) = self.inner.get_mut().connection.take() {
            connection.shutdown(Duration::from_millis(self.config.shutdown_timeout_ms));
        }
    }
}
