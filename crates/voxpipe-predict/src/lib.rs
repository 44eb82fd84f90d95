//! Model prediction for voxpipe pipelines
//!
//! [`Predict`] is a pipeline node that feeds batch arrays (or batch
//! attributes) to a trained model and writes the model's outputs back into
//! the batch, each cropped to exactly the ROI that was requested for it.
//!
//! The model never runs in the pipeline's own context. It is owned by an
//! inference worker (`voxpipe-worker`) that is started on the first
//! prediction and stopped on teardown.
//!
//! ## Usage
//!
//! ```ignore
//! use voxpipe_predict::{Predict, PredictConfig};
//!
//! let config = PredictConfig::builder("net.toml", "weights.toml")
//!     .input("data", raw)
//!     .output("softmax", pred)
//!     .build()?;
//! let mut node = Predict::new(config)?;
//! node.setup(&upstream)?;
//! let batch = node.process(batch, &request)?;
//! ```

pub mod error;
pub use error::{Error, Result};

mod config;
pub use config::{InputSource, Isolation, PredictConfig, PredictConfigBuilder};

mod node;
pub use node::Predict;
