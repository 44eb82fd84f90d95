//! Tolerance constants for numeric comparisons.

/// Operations that should be exact up to float rounding (affine scaling, copies).
pub const FLOAT_EPSILON: f32 = 1e-6;

/// Normalizations that sum many exponentials (softmax).
pub const SOFTMAX_EPSILON: f32 = 1e-5;
