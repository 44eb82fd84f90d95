//! Worker server for voxpipe-worker
//!
//! Server side of out-of-process inference: accepts one host connection,
//! owns the model runtime and answers start, forward and stop requests.
//!
//! This crate backs the `voxpipe-worker` binary. Pipelines use
//! `voxpipe_worker::WorkerClient` instead.

pub mod server;

pub use server::WorkerServer;

pub use voxpipe_worker::{
    GraphRuntime, ModelRuntime, Result, RuntimeFactory, WorkerError,
};
