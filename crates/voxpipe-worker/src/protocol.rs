//! IPC protocol for the inference worker process.

use crate::error::{Result, StartStage, WorkerError};
use ndarray::ArrayD;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Layer name -> tensor. The only payload that crosses the process boundary.
pub type NamedTensors = BTreeMap<String, ArrayD<f32>>;

/// Where the model runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceSelector {
    #[default]
    Cpu,
    /// Exclusive claim on the accelerator with this index.
    Accelerator(u32),
}

impl fmt::Display for DeviceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceSelector::Cpu => write!(f, "cpu"),
            DeviceSelector::Accelerator(index) => write!(f, "accelerator:{}", index),
        }
    }
}

impl std::str::FromStr for DeviceSelector {
    type Err = WorkerError;

    /// Parses the `Display` form: `cpu` or `accelerator:<index>`.
    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("cpu") {
            return Ok(DeviceSelector::Cpu);
        }
        s.strip_prefix("accelerator:")
            .and_then(|index| index.parse().ok())
            .map(DeviceSelector::Accelerator)
            .ok_or_else(|| WorkerError::InvalidConfig(format!("unknown device {:?}", s)))
    }
}

/// What a loaded model exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
    pub device: DeviceSelector,
}

/// Validated model files and device choice for one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub model_definition: PathBuf,
    pub weights: PathBuf,
    pub device: DeviceSelector,
}

impl WorkerSettings {
    /// Checks that both files exist. `device` defaults to the CPU.
    pub fn configure(
        model_definition: impl AsRef<Path>,
        weights: impl AsRef<Path>,
        device: Option<DeviceSelector>,
    ) -> Result<Self> {
        for path in [model_definition.as_ref(), weights.as_ref()] {
            if !path.is_file() {
                return Err(WorkerError::PathNotFound(path.to_path_buf()));
            }
        }
        Ok(Self {
            model_definition: model_definition.as_ref().to_path_buf(),
            weights: weights.as_ref().to_path_buf(),
            device: device.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum HostMessage {
    /// Claim the device, then load the model.
    Start { settings: WorkerSettings },
    Forward { inputs: NamedTensors },
    /// Release model and device; the process keeps running.
    Stop,
    Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WorkerMessage {
    Ready,
    Started { info: ModelInfo },
    StartFailed { stage: StartStage, message: String },
    ForwardComplete { outputs: NamedTensors, latency_us: u64 },
    Stopped,
    Error { message: String },
}

/// Settings for spawning and talking to a worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Directory for the per-worker socket.
    pub socket_dir: PathBuf,
    /// Worker binary. Defaults to `voxpipe-worker` next to the current executable.
    pub server_path: Option<PathBuf>,
    pub connect_timeout_ms: u64,
    /// `None` waits for the forward pass however long it takes.
    pub forward_timeout_ms: Option<u64>,
    pub shutdown_timeout_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            socket_dir: std::env::temp_dir(),
            server_path: None,
            connect_timeout_ms: 10_000,
            forward_timeout_ms: None,
            shutdown_timeout_ms: 2_000,
        }
    }
}

impl WorkerConfig {
    pub const SERVER_BINARY: &'static str = "voxpipe-worker";

    /// Checks timeouts, the socket directory, and the server path when set.
    pub fn validate(&self) -> Result<()> {
        if self.connect_timeout_ms == 0 {
            return Err(WorkerError::InvalidConfig(
                "connect_timeout_ms must be positive".to_string(),
            ));
        }
        if self.forward_timeout_ms == Some(0) {
            return Err(WorkerError::InvalidConfig(
                "forward_timeout_ms must be positive when set".to_string(),
            ));
        }
        if !self.socket_dir.is_dir() {
            return Err(WorkerError::PathNotFound(self.socket_dir.clone()));
        }
        if let Some(path) = &self.server_path {
            if !path.is_file() {
                return Err(WorkerError::PathNotFound(path.clone()));
            }
        }
        Ok(())
    }

    /// Resolved worker binary path.
    pub fn server_binary(&self) -> Result<PathBuf> {
        if let Some(path) = &self.server_path {
            return Ok(path.clone());
        }
        let mut path = std::env::current_exe()?;
        path.pop();
        path.push(format!("{}{}", Self::SERVER_BINARY, std::env::consts::EXE_SUFFIX));
        Ok(path)
    }
}
