//! Partially specified array metadata.

use crate::coordinate::Coordinate;
use crate::roi::Roi;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Element type of array data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataType {
    Float32,
    Uint8,
    Uint32,
    Uint64,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataType::Float32 => write!(f, "float32"),
            DataType::Uint8 => write!(f, "uint8"),
            DataType::Uint32 => write!(f, "uint32"),
            DataType::Uint64 => write!(f, "uint64"),
        }
    }
}

/// Metadata for one array: where it lives, at which resolution, and how
/// it may be resampled.
///
/// Every field is optional. Absent fields are filled in later with
/// [`merge`](Self::merge), which only ever overrides fields that are present.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArraySpec {
    pub roi: Option<Roi>,
    pub voxel_size: Option<Coordinate>,
    pub dtype: Option<DataType>,
    pub interpolatable: Option<bool>,
}

impl ArraySpec {
    /// Builder with every field absent.
    pub fn builder() -> ArraySpecBuilder {
        ArraySpecBuilder::default()
    }

    /// Spec with only the ROI set. Typical for requests.
    pub fn from_roi(roi: Roi) -> Self {
        Self {
            roi: Some(roi),
            ..Default::default()
        }
    }

    /// `self` with every field present in `overrides` replaced.
    ///
    /// `merge(base, o).f == o.f` if `o.f` is set, else `base.f`.
    pub fn merge(&self, overrides: &ArraySpec) -> ArraySpec {
        ArraySpec {
            roi: overrides.roi.clone().or_else(|| self.roi.clone()),
            voxel_size: overrides
                .voxel_size
                .clone()
                .or_else(|| self.voxel_size.clone()),
            dtype: overrides.dtype.or(self.dtype),
            interpolatable: overrides.interpolatable.or(self.interpolatable),
        }
    }

    /// Copy with the ROI replaced (or cleared when `None`).
    pub fn with_roi(&self, roi: Option<Roi>) -> ArraySpec {
        ArraySpec {
            roi,
            ..self.clone()
        }
    }

    /// Copy with the dtype replaced.
    pub fn with_dtype(&self, dtype: DataType) -> ArraySpec {
        ArraySpec {
            dtype: Some(dtype),
            ..self.clone()
        }
    }

    /// Whether no field is set.
    pub fn is_empty(&self) -> bool {
        self == &ArraySpec::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ArraySpecBuilder {
    spec: ArraySpec,
}

impl ArraySpecBuilder {
    pub fn roi(mut self, roi: Roi) -> Self {
        self.spec.roi = Some(roi);
        self
    }

    pub fn voxel_size(mut self, voxel_size: impl Into<Coordinate>) -> Self {
        self.spec.voxel_size = Some(voxel_size.into());
        self
    }

    pub fn dtype(mut self, dtype: DataType) -> Self {
        self.spec.dtype = Some(dtype);
        self
    }

    pub fn interpolatable(mut self, interpolatable: bool) -> Self {
        self.spec.interpolatable = Some(interpolatable);
        self
    }

    /// Finishes the spec.
    pub fn build(self) -> ArraySpec {
        self.spec
    }
}
