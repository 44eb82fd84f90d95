//! What has been produced so far: array key -> array, plus named attributes.

use crate::array::Array;
use crate::array_key::ArrayKey;
use crate::error::Result;
use crate::request::Request;
use ndarray::ArrayD;
use std::collections::BTreeMap;

/// Arrays computed or loaded while a request travels through the pipeline.
///
/// Nodes read the keys they consume and write the keys they produce.
/// Attributes hold per-batch tensors that are not tied to a ROI, such as a
/// scalar iteration counter fed to a model input.
#[derive(Debug, Clone, Default)]
pub struct Batch {
    id: u64,
    arrays: BTreeMap<ArrayKey, Array>,
    attributes: BTreeMap<String, ArrayD<f32>>,
}

impl Batch {
    /// Empty batch with id 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty batch with the id the pipeline assigned to it.
    pub fn with_id(id: u64) -> Self {
        Self {
            id,
            ..Self::default()
        }
    }

    /// Id assigned by the pipeline.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Stores `array`, returning what was previously stored under `key`.
    pub fn insert(&mut self, key: ArrayKey, array: Array) -> Option<Array> {
        self.arrays.insert(key, array)
    }

    /// Array stored under `key`.
    pub fn get(&self, key: &ArrayKey) -> Option<&Array> {
        self.arrays.get(key)
    }

    /// Whether an array is stored under `key`.
    pub fn contains(&self, key: &ArrayKey) -> bool {
        self.arrays.contains_key(key)
    }

    /// Takes the array stored under `key` out of the batch.
    pub fn remove(&mut self, key: &ArrayKey) -> Option<Array> {
        self.arrays.remove(key)
    }

    /// Keys in id order.
    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.arrays.keys()
    }

    /// All arrays in key order.
    pub fn arrays(&self) -> impl Iterator<Item = (&ArrayKey, &Array)> {
        self.arrays.iter()
    }

    pub fn len(&self) -> usize {
        self.arrays.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arrays.is_empty()
    }

    /// Sets a per-batch tensor, replacing any previous value.
    pub fn set_attribute(&mut self, name: impl Into<String>, value: ArrayD<f32>) {
        self.attributes.insert(name.into(), value);
    }

    /// Per-batch tensor named `name`.
    pub fn attribute(&self, name: &str) -> Option<&ArrayD<f32>> {
        self.attributes.get(name)
    }

    /// Crops every array named in `request` (with a ROI) down to that ROI.
    /// Arrays the request does not mention are left alone. On error the
    /// batch is unchanged.
    pub fn crop_to(&mut self, request: &Request) -> Result<()> {
        let mut cropped = Vec::new();
        for (key, array) in &self.arrays {
            let Some(roi) = request.roi(key) else {
                continue;
            };
            if array.spec().roi.as_ref() != Some(roi) {
                cropped.push((key.clone(), array.crop(roi)?));
            }
        }
        self.arrays.extend(cropped);
        Ok(())
    }
}
