//! Array data bound to an [`ArraySpec`].

use crate::array_spec::{ArraySpec, DataType};
use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::roi::Roi;
use ndarray::{ArrayD, Slice};
use serde::{Deserialize, Serialize};

/// Dtype-tagged N-dimensional data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArrayData {
    Float32(ArrayD<f32>),
    Uint8(ArrayD<u8>),
    Uint32(ArrayD<u32>),
    Uint64(ArrayD<u64>),
}

macro_rules! with_data {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ArrayData::Float32($arr) => $body,
            ArrayData::Uint8($arr) => $body,
            ArrayData::Uint32($arr) => $body,
            ArrayData::Uint64($arr) => $body,
        }
    };
}

macro_rules! map_data {
    ($data:expr, $arr:ident => $body:expr) => {
        match $data {
            ArrayData::Float32($arr) => ArrayData::Float32($body),
            ArrayData::Uint8($arr) => ArrayData::Uint8($body),
            ArrayData::Uint32($arr) => ArrayData::Uint32($body),
            ArrayData::Uint64($arr) => ArrayData::Uint64($body),
        }
    };
}

impl ArrayData {
    /// Element type of the stored data.
    pub fn dtype(&self) -> DataType {
        match self {
            ArrayData::Float32(_) => DataType::Float32,
            ArrayData::Uint8(_) => DataType::Uint8,
            ArrayData::Uint32(_) => DataType::Uint32,
            ArrayData::Uint64(_) => DataType::Uint64,
        }
    }

    /// Shape including leading channel axes.
    pub fn shape(&self) -> &[usize] {
        with_data!(self, a => a.shape())
    }

    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Lossy conversion to `f32`, the element type models consume.
    pub fn to_f32(&self) -> ArrayD<f32> {
        match self {
            ArrayData::Float32(a) => a.clone(),
            ArrayData::Uint8(a) => a.mapv(f32::from),
            ArrayData::Uint32(a) => a.mapv(|v| v as f32),
            ArrayData::Uint64(a) => a.mapv(|v| v as f32),
        }
    }

    /// Borrows the data when it is already `f32`.
    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            ArrayData::Float32(a) => Some(a),
            _ => None,
        }
    }

    /// Slices the trailing `ranges.len()` axes.
    fn slice_trailing(&self, ranges: &[(usize, usize)]) -> ArrayData {
        let first = self.ndim() - ranges.len();
        map_data!(self, a => a
            .slice_each_axis(|ax| {
                let index = ax.axis.index();
                if index < first {
                    Slice::from(..)
                } else {
                    let (start, end) = ranges[index - first];
                    Slice::new(start as isize, Some(end as isize), 1)
                }
            })
            .to_owned())
    }
}

impl From<ArrayD<f32>> for ArrayData {
    fn from(a: ArrayD<f32>) -> Self {
        ArrayData::Float32(a)
    }
}

impl From<ArrayD<u8>> for ArrayData {
    fn from(a: ArrayD<u8>) -> Self {
        ArrayData::Uint8(a)
    }
}

impl From<ArrayD<u32>> for ArrayData {
    fn from(a: ArrayD<u32>) -> Self {
        ArrayData::Uint32(a)
    }
}

impl From<ArrayD<u64>> for ArrayData {
    fn from(a: ArrayD<u64>) -> Self {
        ArrayData::Uint64(a)
    }
}

/// Immutable pairing of data and the spec that describes it.
///
/// When the spec carries both a ROI and a voxel size, the trailing
/// `roi.dims()` axes of the data must have shape `roi.shape / voxel_size`.
/// Leading axes (channels, classes) are unconstrained.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    data: ArrayData,
    spec: ArraySpec,
}

impl Array {
    /// Pairs `data` with `spec`, checking dtype and spatial shape.
    pub fn new(data: impl Into<ArrayData>, spec: ArraySpec) -> Result<Self> {
        let data = data.into();
        Self::validate(&data, &spec)?;
        Ok(Self { data, spec })
    }

    /// The stored data.
    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    /// The spec describing the data.
    pub fn spec(&self) -> &ArraySpec {
        &self.spec
    }

    /// Splits into data and spec.
    pub fn into_parts(self) -> (ArrayData, ArraySpec) {
        (self.data, self.spec)
    }

    /// Restricts the array to `roi`, which must be contained in this
    /// array's ROI and aligned to its voxel size.
    pub fn crop(&self, roi: &Roi) -> Result<Array> {
        let own_roi = self.require_roi()?;
        let voxel_size = self.require_voxel_size()?;

        if !own_roi.contains_roi(roi)? {
            return Err(Error::NotContained {
                inner: roi.to_string(),
                outer: own_roi.to_string(),
            });
        }

        let begin = roi
            .offset()
            .checked_sub(own_roi.offset())?
            .checked_div(voxel_size)?
            .to_shape()?;
        let extent = roi.shape().checked_div(voxel_size)?.to_shape()?;
        let ranges: Vec<(usize, usize)> = begin
            .iter()
            .zip(&extent)
            .map(|(&b, &e)| (b, b + e))
            .collect();

        Array::new(
            self.data.slice_trailing(&ranges),
            self.spec.with_roi(Some(roi.clone())),
        )
    }

    fn require_roi(&self) -> Result<&Roi> {
        self.spec.roi.as_ref().ok_or(Error::MissingSpecField {
            key: "array".to_string(),
            field: "roi",
        })
    }

    fn require_voxel_size(&self) -> Result<&Coordinate> {
        self.spec.voxel_size.as_ref().ok_or(Error::MissingSpecField {
            key: "array".to_string(),
            field: "voxel_size",
        })
    }

    fn validate(data: &ArrayData, spec: &ArraySpec) -> Result<()> {
        if let Some(expected) = spec.dtype {
            if expected != data.dtype() {
                return Err(Error::DtypeMismatch {
                    expected,
                    actual: data.dtype(),
                });
            }
        }

        let (Some(roi), Some(voxel_size)) = (&spec.roi, &spec.voxel_size) else {
            return Ok(());
        };

        let dims = roi.dims();
        if voxel_size.dims() != dims {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: voxel_size.dims(),
            });
        }
        if data.ndim() < dims {
            return Err(Error::DimensionMismatch {
                expected: dims,
                actual: data.ndim(),
            });
        }

        let expected = roi.shape().checked_div(voxel_size)?.to_shape()?;
        let actual = &data.shape()[data.ndim() - dims..];
        if actual != expected.as_slice() {
            return Err(Error::ShapeMismatch {
                what: format!("data in {}", roi),
                expected,
                actual: actual.to_vec(),
            });
        }
        Ok(())
    }
}
