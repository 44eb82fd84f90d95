//! Integration test modules for voxpipe

pub mod data_model;
pub mod points;
pub mod predict;
