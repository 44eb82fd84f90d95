//! ROI-indexed data model for pull-based volumetric pipelines.
//!
//! # Primary API
//!
//! - [`Roi`] / [`Coordinate`]: regions in a D-dimensional index space
//! - [`ArrayKeyRegistry`] / [`ArrayKey`]: interned array stream names
//! - [`ArraySpec`]: partially specified array metadata with present-field merge
//! - [`Array`]: data bound to a spec
//! - [`Request`] / [`Batch`]: what is wanted and what has been produced
//! - [`BatchFilter`] / [`ProviderSpec`]: the node contract
//! - [`PointSet`] / [`SynPoint`]: synaptic point annotations
//!
//! # Example
//!
//! ```
//! use voxpipe_core::{ArrayKeyRegistry, Request, Roi};
//!
//! let keys = ArrayKeyRegistry::new();
//! let pred = keys.register("PRED").unwrap();
//!
//! let request = Request::new().with_roi(pred.clone(), Roi::new([2, 2, 2], [6, 6, 6]).unwrap());
//! assert_eq!(request.roi(&pred).unwrap().end().as_slice(), &[8, 8, 8]);
//! ```

pub mod error;
pub use error::{Error, Result};

mod coordinate;
pub use coordinate::Coordinate;

mod roi;
pub use roi::Roi;

mod array_key;
pub use array_key::{ArrayKey, ArrayKeyRegistry};

mod array_spec;
pub use array_spec::{ArraySpec, ArraySpecBuilder, DataType};

mod array;
pub use array::{Array, ArrayData};

mod request;
pub use request::Request;

mod batch;
pub use batch::Batch;

mod provider;
pub use provider::{BatchFilter, ProviderSpec};

pub mod points;
pub use points::{PointKind, PointSet, SynPoint, SynPointBuilder};

/// Re-export so downstream crates name the same tensor type.
pub use ndarray;
