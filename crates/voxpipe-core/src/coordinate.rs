//! Integer coordinates in a D-dimensional index space.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Index;

/// An integer vector. Used for ROI offsets, ROI shapes and voxel sizes.
///
/// All binary operations require both operands to have the same number of
/// dimensions and return [`Error::DimensionMismatch`] otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coordinate(Vec<i64>);

impl Coordinate {
    /// Coordinate from its components.
    pub fn new(values: impl Into<Vec<i64>>) -> Self {
        Self(values.into())
    }

    /// `value` repeated `dims` times.
    pub fn splat(value: i64, dims: usize) -> Self {
        Self(vec![value; dims])
    }

    /// The origin in `dims` dimensions.
    pub fn zeros(dims: usize) -> Self {
        Self::splat(0, dims)
    }

    /// Number of components.
    pub fn dims(&self) -> usize {
        self.0.len()
    }

    pub fn as_slice(&self) -> &[i64] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &i64> {
        self.0.iter()
    }

    /// Product of all components, saturating at the `i64` bounds.
    pub fn product(&self) -> i64 {
        self.0.iter().fold(1i64, |acc, &v| acc.saturating_mul(v))
    }

    /// Component-wise sum. Fails on dimension mismatch or overflow.
    pub fn checked_add(&self, other: &Coordinate) -> Result<Coordinate> {
        self.try_zip_with(other, "+", i64::checked_add)
    }

    /// Component-wise difference. Fails on dimension mismatch or overflow.
    pub fn checked_sub(&self, other: &Coordinate) -> Result<Coordinate> {
        self.try_zip_with(other, "-", i64::checked_sub)
    }

    /// Component-wise product. Fails on dimension mismatch or overflow.
    pub fn checked_mul(&self, other: &Coordinate) -> Result<Coordinate> {
        self.try_zip_with(other, "*", i64::checked_mul)
    }

    /// Component-wise exact division. Fails unless every component divides evenly.
    pub fn checked_div(&self, divisor: &Coordinate) -> Result<Coordinate> {
        if !self.is_multiple_of(divisor)? {
            return Err(Error::NotDivisible {
                value: self.0.clone(),
                divisor: divisor.0.clone(),
            });
        }
        self.try_zip_with(divisor, "/", i64::checked_div)
    }

    /// Whether every component is an exact multiple of the divisor's.
    /// Zero divisors never divide.
    pub fn is_multiple_of(&self, divisor: &Coordinate) -> Result<bool> {
        self.check_dims(divisor)?;
        Ok(self
            .0
            .iter()
            .zip(&divisor.0)
            .all(|(a, b)| a.checked_rem_euclid(*b) == Some(0)))
    }

    /// Component-wise minimum.
    pub fn component_min(&self, other: &Coordinate) -> Result<Coordinate> {
        self.zip_with(other, i64::min)
    }

    /// Component-wise maximum.
    pub fn component_max(&self, other: &Coordinate) -> Result<Coordinate> {
        self.zip_with(other, i64::max)
    }

    /// Converts a non-negative coordinate to an ndarray shape.
    pub fn to_shape(&self) -> Result<Vec<usize>> {
        self.0
            .iter()
            .map(|&v| {
                usize::try_from(v)
                    .map_err(|_| Error::InvalidRoi(format!("negative extent in {}", self)))
            })
            .collect()
    }

    pub(crate) fn check_dims(&self, other: &Coordinate) -> Result<()> {
        if self.dims() != other.dims() {
            return Err(Error::DimensionMismatch {
                expected: self.dims(),
                actual: other.dims(),
            });
        }
        Ok(())
    }

    fn try_zip_with(
        &self,
        other: &Coordinate,
        op: &str,
        f: impl Fn(i64, i64) -> Option<i64>,
    ) -> Result<Coordinate> {
        self.check_dims(other)?;
        self.0
            .iter()
            .zip(&other.0)
            .map(|(&a, &b)| {
                f(a, b).ok_or_else(|| {
                    Error::InvalidRoi(format!("{} {} {} overflows", self, op, other))
                })
            })
            .collect::<Result<Vec<_>>>()
            .map(Coordinate)
    }

    fn zip_with(&self, other: &Coordinate, f: impl Fn(i64, i64) -> i64) -> Result<Coordinate> {
        self.check_dims(other)?;
        Ok(Coordinate(
            self.0.iter().zip(&other.0).map(|(&a, &b)| f(a, b)).collect(),
        ))
    }
}

impl Index<usize> for Coordinate {
    type Output = i64;

    fn index(&self, index: usize) -> &i64 {
        &self.0[index]
    }
}

impl From<Vec<i64>> for Coordinate {
    fn from(values: Vec<i64>) -> Self {
        Self(values)
    }
}

impl<const N: usize> From<[i64; N]> for Coordinate {
    fn from(values: [i64; N]) -> Self {
        Self(values.to_vec())
    }
}

impl From<&[i64]> for Coordinate {
    fn from(values: &[i64]) -> Self {
        Self(values.to_vec())
    }
}

impl fmt::Display for Coordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, v) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", v)?;
        }
        write!(f, ")")
    }
}
