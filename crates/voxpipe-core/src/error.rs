//! Error types for voxpipe-core.

use crate::array_spec::DataType;
use thiserror::Error;

/// Error type for data-model operations.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Invalid ROI: {0}")]
    InvalidRoi(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Shape mismatch for {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        what: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    #[error("{value:?} is not divisible by {divisor:?}")]
    NotDivisible { value: Vec<i64>, divisor: Vec<i64> },

    #[error("Data type mismatch: spec says {expected}, data is {actual}")]
    DtypeMismatch { expected: DataType, actual: DataType },

    #[error("{inner} is not contained in {outer}")]
    NotContained { inner: String, outer: String },

    #[error("Spec for {key} has no {field}")]
    MissingSpecField { key: String, field: &'static str },

    #[error("Invalid array key name: {0:?}")]
    InvalidKeyName(String),

    #[error("Unknown array key: {0}")]
    UnknownKey(String),

    #[error("Duplicate point location id: {0}")]
    DuplicateLocationId(u64),

    #[error("Point {location_id} lists partner {partner_id}: {reason}")]
    PartnerMismatch {
        location_id: u64,
        partner_id: u64,
        reason: String,
    },

    #[error("Point {location_id} lists partner {partner_id}, which is not in the set")]
    MissingPartner { location_id: u64, partner_id: u64 },
}

/// Result type alias.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::DimensionMismatch {
            expected: 3,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Dimension mismatch: expected 3, got 2");

        let err = Error::NotDivisible {
            value: vec![10, 10],
            divisor: vec![4, 4],
        };
        assert!(err.to_string().contains("[10, 10]"));
        assert!(err.to_string().contains("[4, 4]"));

        let err = Error::MissingPartner {
            location_id: 7,
            partner_id: 9,
        };
        assert!(err.to_string().contains("partner 9"));
    }
}
