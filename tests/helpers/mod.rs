//! Test helpers and fixtures for voxpipe integration tests
//!
//! Model files are written to a temporary directory per fixture so tests
//! can run in parallel.
//!
//! ## Tolerance Levels
//!
//! Use the appropriate tolerance from [`tolerances`] module:
//! - `FLOAT_EPSILON` (1e-6): Exact operations (copies, affine scaling)
//! - `SOFTMAX_EPSILON` (1e-5): Normalized outputs

#![allow(dead_code)]

pub mod tolerances;

use std::path::{Path, PathBuf};
use voxpipe::ndarray::{ArrayD, IxDyn};
use voxpipe::prelude::*;

/// Center-crops by 2 voxels per side, scales by 2, then normalizes over z.
pub const MODEL_DEFINITION: &str = r#"
name = "unet-lite"
inputs = ["data"]

[[layers]]
name = "cropped"
op = "crop"
input = "data"
context = [2, 2, 2]

[[layers]]
name = "logits"
op = "scale"
input = "cropped"
param = "logits"

[[layers]]
name = "softmax"
op = "softmax"
input = "logits"
axis = 1
"#;

pub const MODEL_WEIGHTS: &str = r#"
[params.logits]
gain = 2.0
bias = 0.0
"#;

/// Model definition and weights on disk.
pub struct ModelFiles {
    pub dir: tempfile::TempDir,
    pub definition: PathBuf,
    pub weights: PathBuf,
}

impl ModelFiles {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("Failed to create temp dir");
        let definition = dir.path().join("unet-lite.toml");
        let weights = dir.path().join("unet-lite.weights.toml");
        std::fs::write(&definition, MODEL_DEFINITION).expect("Failed to write model");
        std::fs::write(&weights, MODEL_WEIGHTS).expect("Failed to write weights");
        Self {
            dir,
            definition,
            weights,
        }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Builder with in-process isolation; the worker binary is not
    /// available to this crate's tests.
    pub fn config(&self) -> voxpipe::PredictConfigBuilder {
        PredictConfig::builder(&self.definition, &self.weights).isolation(Isolation::InProcess)
    }
}

/// Array keys used across tests.
pub struct Keys {
    pub registry: ArrayKeyRegistry,
    pub raw: ArrayKey,
    pub pred: ArrayKey,
    pub logits: ArrayKey,
}

impl Keys {
    pub fn new() -> Self {
        let registry = ArrayKeyRegistry::new();
        let raw = registry.register("RAW").expect("Failed to register RAW");
        let pred = registry.register("PRED").expect("Failed to register PRED");
        let logits = registry.register("LOGITS").expect("Failed to register LOGITS");
        Self {
            registry,
            raw,
            pred,
            logits,
        }
    }
}

pub fn roi(offset: [i64; 3], shape: [i64; 3]) -> Roi {
    Roi::new(offset, shape).expect("Invalid test ROI")
}

/// Spec of the 10^3 raw volume at the origin.
pub fn raw_spec() -> ArraySpec {
    ArraySpec::builder()
        .roi(roi([0, 0, 0], [10, 10, 10]))
        .voxel_size([1, 1, 1])
        .dtype(DataType::Float32)
        .interpolatable(true)
        .build()
}

/// 10^3 float volume whose value at (z, y, x) is `f(z, y, x)`.
///
/// The data is `(1, 10, 10, 10)`: the model takes a leading batch axis and
/// the node passes inputs through unchanged.
pub fn raw_volume(f: impl Fn(usize, usize, usize) -> f32) -> Array {
    let data = ArrayD::from_shape_fn(IxDyn(&[1, 10, 10, 10]), |ix| f(ix[1], ix[2], ix[3]));
    Array::new(data, raw_spec()).expect("Invalid test volume")
}

pub fn batch_with(key: &ArrayKey, array: Array) -> Batch {
    let mut batch = Batch::new();
    batch.insert(key.clone(), array);
    batch
}
