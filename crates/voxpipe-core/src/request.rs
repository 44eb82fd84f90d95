//! What a caller wants produced: array key -> desired spec.

use crate::array_key::ArrayKey;
use crate::array_spec::ArraySpec;
use crate::error::Result;
use crate::roi::Roi;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Request {
    specs: BTreeMap<ArrayKey, ArraySpec>,
}

impl Request {
    /// Requests nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: ArrayKey, spec: ArraySpec) -> Self {
        self.insert(key, spec);
        self
    }

    /// Builder-style insert of a spec that only carries a ROI.
    pub fn with_roi(self, key: ArrayKey, roi: Roi) -> Self {
        self.with(key, ArraySpec::from_roi(roi))
    }

    /// Sets the spec for `key`, returning the previous one.
    pub fn insert(&mut self, key: ArrayKey, spec: ArraySpec) -> Option<ArraySpec> {
        self.specs.insert(key, spec)
    }

    /// Requested spec for `key`.
    pub fn get(&self, key: &ArrayKey) -> Option<&ArraySpec> {
        self.specs.get(key)
    }

    /// Requested ROI of `key`, if the key is requested with one.
    pub fn roi(&self, key: &ArrayKey) -> Option<&Roi> {
        self.specs.get(key).and_then(|spec| spec.roi.as_ref())
    }

    /// Whether `key` is requested.
    pub fn contains(&self, key: &ArrayKey) -> bool {
        self.specs.contains_key(key)
    }

    /// Drops `key` from the request.
    pub fn remove(&mut self, key: &ArrayKey) -> Option<ArraySpec> {
        self.specs.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &ArrayKey> {
        self.specs.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ArrayKey, &ArraySpec)> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// Union of two requests. A key requested by both gets the union of
    /// the two ROIs; other fields of `other` override.
    pub fn merge(&self, other: &Request) -> Result<Request> {
        let mut merged = self.clone();
        for (key, spec) in &other.specs {
            let combined = match merged.specs.get(key) {
                Some(existing) => {
                    let roi = match (&existing.roi, &spec.roi) {
                        (Some(a), Some(b)) => Some(a.union(b)?),
                        (a, b) => b.clone().or_else(|| a.clone()),
                    };
                    existing.merge(spec).with_roi(roi)
                }
                None => spec.clone(),
            };
            merged.specs.insert(key.clone(), combined);
        }
        Ok(merged)
    }
}

impl FromIterator<(ArrayKey, ArraySpec)> for Request {
    fn from_iter<T: IntoIterator<Item = (ArrayKey, ArraySpec)>>(iter: T) -> Self {
        Self {
            specs: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_key::ArrayKeyRegistry;

    #[test]
    fn test_insert_and_lookup() {
        let registry = ArrayKeyRegistry::new();
        let raw = registry.register("RAW").unwrap();
        let pred = registry.register("PRED").unwrap();
        let roi = Roi::new([2, 2, 2], [6, 6, 6]).unwrap();

        let request = Request::new().with_roi(pred.clone(), roi.clone());
        assert!(request.contains(&pred));
        assert!(!request.contains(&raw));
        assert_eq!(request.roi(&pred), Some(&roi));
        assert_eq!(request.len(), 1);
    }

    #[test]
    fn test_merge_unions_rois() {
        let registry = ArrayKeyRegistry::new();
        let raw = registry.register("RAW").unwrap();
        let gt = registry.register("GT").unwrap();

        let a = Request::new().with_roi(raw.clone(), Roi::new([0, 0], [4, 4]).unwrap());
        let b = Request::new()
            .with_roi(raw.clone(), Roi::new([2, 2], [4, 4]).unwrap())
            .with_roi(gt.clone(), Roi::new([0, 0], [1, 1]).unwrap());

        let merged = a.merge(&b).unwrap();
        assert_eq!(merged.roi(&raw), Some(&Roi::new([0, 0], [6, 6]).unwrap()));
        assert_eq!(merged.roi(&gt), Some(&Roi::new([0, 0], [1, 1]).unwrap()));
    }
}
