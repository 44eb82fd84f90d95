//! Error types for the inference worker

use std::path::PathBuf;
use thiserror::Error;

/// Step of worker startup that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum StartStage {
    Spawn,
    Connect,
    DeviceClaim,
    ModelLoad,
}

impl std::fmt::Display for StartStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StartStage::Spawn => write!(f, "spawning worker"),
            StartStage::Connect => write!(f, "connecting to worker"),
            StartStage::DeviceClaim => write!(f, "claiming device"),
            StartStage::ModelLoad => write!(f, "loading model"),
        }
    }
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("{} does not exist", .0.display())]
    PathNotFound(PathBuf),

    #[error("Invalid worker config: {0}")]
    InvalidConfig(String),

    #[error("Worker start failed at {stage} stage\n  Reason: {reason}")]
    StartFailed { stage: StartStage, reason: String },

    #[error("Worker is not running (state: {0})")]
    NotRunning(crate::WorkerState),

    #[error("Worker was already started")]
    AlreadyStarted,

    #[error("Forward pass failed: {0}")]
    Forward(String),

    #[error("Worker connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Timeout after {duration_ms}ms: {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Worker process crashed")]
    ProcessCrashed,

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),
}

impl WorkerError {
    /// Startup failures leave the worker unusable for the rest of its life.
    pub fn is_startup(&self) -> bool {
        matches!(self, WorkerError::StartFailed { .. })
    }
}

pub type Result<T> = std::result::Result<T, WorkerError>;
