//! Error types for the prediction node.

use std::path::PathBuf;
use thiserror::Error;
use voxpipe_worker::{StartStage, WorkerError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{} does not exist", .0.display())]
    PathNotFound(PathBuf),

    #[error("Input {0} is not provided upstream")]
    MissingUpstream(String),

    #[error("Input {0} is missing from the request")]
    MissingRequest(String),

    #[error("Input {0} is missing from the batch")]
    MissingInput(String),

    #[error("Batch attribute {0:?} is not set")]
    MissingAttribute(String),

    /// Sticky: the node refuses every later prediction.
    #[error("Inference worker failed while {stage}: {reason}")]
    Startup { stage: StartStage, reason: String },

    #[error("Inference worker unavailable: {0}")]
    WorkerUnavailable(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Array error: {0}")]
    Data(#[from] voxpipe_core::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

impl Error {
    /// Configuration errors, raised at construction.
    pub fn is_config(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::PathNotFound(_) | Error::Parse(_)
        )
    }

    /// Input-availability errors.
    pub fn is_input(&self) -> bool {
        matches!(
            self,
            Error::MissingUpstream(_)
                | Error::MissingRequest(_)
                | Error::MissingInput(_)
                | Error::MissingAttribute(_)
        )
    }

    /// Worker startup failures. These are sticky.
    pub fn is_startup(&self) -> bool {
        matches!(self, Error::Startup { .. })
    }
}

impl From<WorkerError> for Error {
    fn from(err: WorkerError) -> Self {
        match err {
            WorkerError::PathNotFound(path) => Error::PathNotFound(path),
            WorkerError::InvalidConfig(message) => Error::Config(message),
            WorkerError::StartFailed { stage, reason } => Error::Startup { stage, reason },
            WorkerError::Forward(message) => Error::Inference(message),
            other => Error::WorkerUnavailable(other.to_string()),
        }
    }
}
