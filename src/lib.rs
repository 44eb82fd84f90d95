//! # voxpipe - Pull-based volumetric pipelines
//!
//! Building blocks for pipelines that process large N-dimensional volumes
//! (microscopy, connectomics) in ROI-sized pieces.
//!
//! ## Architecture
//!
//! voxpipe is an umbrella crate that coordinates:
//! - **voxpipe-core** - Data model (ROI, ArrayKey, ArraySpec, Array, Request, Batch, points)
//! - **voxpipe-worker** - Isolated inference workers (process or thread hosted)
//! - **voxpipe-predict** - The `Predict` pipeline node
//!
//! ## Quick Start
//!
//! ```ignore
//! use voxpipe::prelude::*;
//!
//! let keys = ArrayKeyRegistry::new();
//! let raw = keys.register("RAW")?;
//! let pred = keys.register("PRED")?;
//!
//! let config = PredictConfig::builder("net.toml", "weights.toml")
//!     .input("data", raw.clone())
//!     .output("softmax", pred.clone())
//!     .build()?;
//! let mut node = Predict::new(config)?;
//!
//! node.setup(&upstream)?;
//! let request = Request::new().with_roi(pred, Roi::new([2, 2, 2], [6, 6, 6])?);
//! let batch = node.process(batch, &request)?;
//! ```
//!
//! ## Feature Flags
//!
//! - `default` - Data model and prediction
//! - `predict` - Predict node and inference workers

/// Re-export of voxpipe-core for direct access
pub use voxpipe_core as core;

pub use voxpipe_core::{
    ndarray, points, Array, ArrayData, ArrayKey, ArrayKeyRegistry, ArraySpec, ArraySpecBuilder,
    Batch, BatchFilter, Coordinate, DataType, PointKind, PointSet, ProviderSpec, Request, Roi,
    SynPoint, SynPointBuilder,
};

#[cfg(feature = "predict")]
pub use voxpipe_worker as worker;

#[cfg(feature = "predict")]
pub use voxpipe_worker::{
    DeviceSelector, GraphRuntime, InProcessBridge, ModelInfo, ModelRuntime, NamedTensors,
    WorkerBridge, WorkerClient, WorkerConfig, WorkerSettings, WorkerState,
};

/// Re-export of voxpipe-predict for its error type and node internals
#[cfg(feature = "predict")]
pub use voxpipe_predict as predict;

#[cfg(feature = "predict")]
pub use voxpipe_predict::{InputSource, Isolation, Predict, PredictConfig, PredictConfigBuilder};

mod error;
pub use error::{Error, Result};

/// Convenience re-exports for common types
pub mod prelude {
    pub use crate::{Error, Result};

    pub use crate::{
        Array, ArrayKey, ArrayKeyRegistry, ArraySpec, Batch, BatchFilter, DataType, ProviderSpec,
        Request, Roi,
    };

    pub use crate::{PointKind, PointSet, SynPoint};

    #[cfg(feature = "predict")]
    pub use crate::{
        DeviceSelector, InputSource, Isolation, Predict, PredictConfig, WorkerBridge,
        WorkerConfig, WorkerState,
    };
}
