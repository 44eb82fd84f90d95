//! Centralized error type for the voxpipe umbrella crate.
//!
//! Wraps all subsystem errors so `?` propagates naturally across crate boundaries.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Core(#[from] voxpipe_core::Error),

    #[cfg(feature = "predict")]
    #[error("Worker: {0}")]
    Worker(#[from] voxpipe_worker::WorkerError),

    #[cfg(feature = "predict")]
    #[error("Predict: {0}")]
    Predict(#[from] voxpipe_predict::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
