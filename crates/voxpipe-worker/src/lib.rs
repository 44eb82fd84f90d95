//! Isolated inference workers for voxpipe
//!
//! A worker owns one loaded model graph, its weights and its device claim.
//! Pipeline nodes never touch those directly; they talk to a worker through
//! a [`WorkerBridge`] that ships named tensors in and out.
//!
//! ## Bridges
//!
//! - [`WorkerClient`]: spawns the `voxpipe-worker` binary and talks to it over
//!   a Unix socket (named pipe on Windows). A crashing model takes down the
//!   worker, not the pipeline.
//! - [`InProcessBridge`]: runs the model on a dedicated thread of the calling
//!   process.
//!
//! ## Usage
//!
//! ```ignore
//! use voxpipe_worker::{WorkerBridge, WorkerClient, WorkerConfig, WorkerSettings};
//!
//! let settings = WorkerSettings::configure("net.toml", "weights.toml", None)?;
//! let worker = WorkerClient::new(WorkerConfig::default())?;
//! let info = worker.start(&settings)?;
//! let outputs = worker.forward(inputs)?;
//! worker.stop()?;
//! ```

pub mod error;
pub use error::{Result, StartStage, WorkerError};

mod bridge;
pub use bridge::{WorkerBridge, WorkerState};

mod client;
pub use client::WorkerClient;

mod inprocess_bridge;
pub use inprocess_bridge::InProcessBridge;

mod runtime;
pub use runtime::{start_runtime, ModelRuntime, RuntimeError, RuntimeFactory};

mod graph_runtime;
pub use graph_runtime::GraphRuntime;

#[doc(hidden)]
pub mod protocol;

pub use protocol::{DeviceSelector, ModelInfo, NamedTensors, WorkerConfig, WorkerSettings};

#[doc(hidden)]
pub mod transport;
