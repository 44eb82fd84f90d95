//! Axis-aligned regions of interest.

use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// An axis-aligned box `offset .. offset + shape` in world units.
///
/// Shape components are never negative. A ROI with any zero shape component
/// is empty. All operations are pure and return new values.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawRoi", into = "RawRoi")]
pub struct Roi {
    offset: Coordinate,
    shape: Coordinate,
}

#[derive(Serialize, Deserialize)]
struct RawRoi {
    offset: Coordinate,
    shape: Coordinate,
}

impl TryFrom<RawRoi> for Roi {
    type Error = Error;

    fn try_from(raw: RawRoi) -> Result<Self> {
        Roi::new(raw.offset, raw.shape)
    }
}

impl From<Roi> for RawRoi {
    fn from(roi: Roi) -> Self {
        RawRoi {
            offset: roi.offset,
            shape: roi.shape,
        }
    }
}

impl Roi {
    /// ROI at `offset` with extent `shape`. Fails on a negative shape or an
    /// end that does not fit in `i64`.
    pub fn new(offset: impl Into<Coordinate>, shape: impl Into<Coordinate>) -> Result<Self> {
        let offset = offset.into();
        let shape = shape.into();
        offset.check_dims(&shape)?;
        if shape.iter().any(|&s| s < 0) {
            return Err(Error::InvalidRoi(format!(
                "negative shape {} at offset {}",
                shape, offset
            )));
        }
        offset.checked_add(&shape)?;
        Ok(Self { offset, shape })
    }

    /// ROI spanning `begin .. end`.
    pub fn from_bounds(begin: impl Into<Coordinate>, end: impl Into<Coordinate>) -> Result<Self> {
        let begin = begin.into();
        let shape = end.into().checked_sub(&begin)?;
        Self::new(begin, shape)
    }

    /// Number of axes.
    pub fn dims(&self) -> usize {
        self.offset.dims()
    }

    /// Lower corner.
    pub fn offset(&self) -> &Coordinate {
        &self.offset
    }

    /// Extent along each axis.
    pub fn shape(&self) -> &Coordinate {
        &self.shape
    }

    /// Inclusive lower bound, same as [`offset`](Self::offset).
    pub fn begin(&self) -> &Coordinate {
        &self.offset
    }

    /// Exclusive upper bound.
    pub fn end(&self) -> Coordinate {
        // Dimensions agree and the sum fits, both checked in `new`.
        Coordinate::new(
            self.offset
                .iter()
                .zip(self.shape.iter())
                .map(|(o, s)| o + s)
                .collect::<Vec<_>>(),
        )
    }

    /// Number of index positions covered.
    pub fn size(&self) -> i64 {
        self.shape.product()
    }

    /// Whether any axis has zero extent.
    pub fn is_empty(&self) -> bool {
        self.shape.iter().any(|&s| s == 0)
    }

    /// Overlap of two ROIs. Disjoint ROIs yield an empty ROI.
    pub fn intersect(&self, other: &Roi) -> Result<Roi> {
        let begin = self.begin().component_max(other.begin())?;
        let end = self.end().component_min(&other.end())?;
        let end = end.component_max(&begin)?;
        Roi::from_bounds(begin, end)
    }

    /// Whether the overlap is non-empty.
    pub fn intersects(&self, other: &Roi) -> Result<bool> {
        Ok(!self.intersect(other)?.is_empty())
    }

    /// Smallest ROI containing both.
    pub fn union(&self, other: &Roi) -> Result<Roi> {
        let begin = self.begin().component_min(other.begin())?;
        let end = self.end().component_max(&other.end())?;
        Roi::from_bounds(begin, end)
    }

    /// Whether `other` lies entirely inside this ROI. An empty ROI is
    /// contained when its offset is.
    pub fn contains_roi(&self, other: &Roi) -> Result<bool> {
        self.offset.check_dims(&other.offset)?;
        let end = self.end();
        let other_end = other.end();
        Ok((0..self.dims()).all(|d| {
            other.offset[d] >= self.offset[d] && other_end[d] <= end[d]
        }))
    }

    /// Whether `point` lies in `offset .. end`.
    pub fn contains_point(&self, point: &Coordinate) -> Result<bool> {
        self.offset.check_dims(point)?;
        let end = self.end();
        Ok((0..self.dims()).all(|d| point[d] >= self.offset[d] && point[d] < end[d]))
    }

    /// Translation by `delta`.
    pub fn shift(&self, delta: &Coordinate) -> Result<Roi> {
        Roi::new(self.offset.checked_add(delta)?, self.shape.clone())
    }

    /// Moves the lower bound down by `neg` and the upper bound up by `pos`.
    /// Negative amounts shrink; shrinking below zero extent fails.
    pub fn grow(&self, neg: &Coordinate, pos: &Coordinate) -> Result<Roi> {
        let offset = self.offset.checked_sub(neg)?;
        let shape = self.shape.checked_add(neg)?.checked_add(pos)?;
        Roi::new(offset, shape)
    }

    /// Expands outwards so both bounds are multiples of `voxel_size`.
    pub fn snap_to_grid(&self, voxel_size: &Coordinate) -> Result<Roi> {
        self.offset.check_dims(voxel_size)?;
        if voxel_size.iter().any(|&v| v <= 0) {
            return Err(Error::InvalidRoi(format!(
                "voxel size {} must be positive",
                voxel_size
            )));
        }
        let end = self.end();
        let overflow =
            || Error::InvalidRoi(format!("{} cannot be snapped to {}", self, voxel_size));
        let begin = (0..self.dims())
            .map(|d| {
                self.offset[d]
                    .div_euclid(voxel_size[d])
                    .checked_mul(voxel_size[d])
                    .ok_or_else(overflow)
            })
            .collect::<Result<Vec<i64>>>()?;
        let end = (0..self.dims())
            .map(|d| {
                let v = voxel_size[d];
                end[d]
                    .checked_add(v - 1)
                    .map(|e| e.div_euclid(v) * v)
                    .ok_or_else(overflow)
            })
            .collect::<Result<Vec<i64>>>()?;
        Roi::from_bounds(begin, end)
    }
}

impl fmt::Display for Roi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}] ({})", self.begin(), self.end(), self.shape)
    }
}
