//! Data model tests across ROIs, specs, requests, and batches

use crate::helpers::*;
use voxpipe::core::Error;
use voxpipe::ndarray::{ArrayD, IxDyn};
use voxpipe::prelude::*;
use voxpipe::Coordinate;

#[test]
fn test_roi_algebra() {
    let a = roi([0, 0, 0], [10, 10, 10]);
    let b = roi([5, 5, 5], [10, 10, 10]);

    assert_eq!(a.intersect(&b).unwrap(), roi([5, 5, 5], [5, 5, 5]));
    assert_eq!(a.union(&b).unwrap(), roi([0, 0, 0], [15, 15, 15]));
    assert!(a.contains_roi(&roi([2, 2, 2], [6, 6, 6])).unwrap());
    assert!(!a.contains_roi(&b).unwrap());

    let disjoint = roi([20, 20, 20], [1, 1, 1]);
    assert!(a.intersect(&disjoint).unwrap().is_empty());

    let snapped = roi([3, 5, 7], [4, 4, 4]).snap_to_grid(&Coordinate::from([4, 4, 4])).unwrap();
    assert_eq!(snapped, roi([0, 4, 4], [8, 8, 8]));
}

#[test]
fn test_roi_dimension_mismatch() {
    let planar = Roi::new([0, 0], [4, 4]).unwrap();
    assert!(matches!(
        roi([0, 0, 0], [4, 4, 4]).intersect(&planar),
        Err(Error::DimensionMismatch { .. })
    ));
}

#[test]
fn test_spec_merge_overrides_present_fields() {
    let overrides = ArraySpec::builder().interpolatable(false).build();
    let merged = raw_spec().merge(&overrides);

    assert_eq!(merged.interpolatable, Some(false));
    assert_eq!(merged.roi, raw_spec().roi);
    assert_eq!(merged.dtype, Some(DataType::Float32));
    assert_eq!(raw_spec().merge(&ArraySpec::default()), raw_spec());
}

#[test]
fn test_request_merge_unions_rois() {
    let keys = Keys::new();
    let a = Request::new()
        .with_roi(keys.raw.clone(), roi([0, 0, 0], [4, 4, 4]))
        .with_roi(keys.pred.clone(), roi([1, 1, 1], [2, 2, 2]));
    let b = Request::new().with_roi(keys.raw.clone(), roi([6, 6, 6], [4, 4, 4]));

    let merged = a.merge(&b).unwrap();
    assert_eq!(merged.len(), 2);
    assert_eq!(merged.roi(&keys.raw), Some(&roi([0, 0, 0], [10, 10, 10])));
    assert_eq!(merged.roi(&keys.pred), Some(&roi([1, 1, 1], [2, 2, 2])));
}

#[test]
fn test_array_validates_shape_against_spec() {
    let err = Array::new(ArrayD::<f32>::zeros(IxDyn(&[9, 10, 10])), raw_spec()).unwrap_err();
    assert!(matches!(err, Error::ShapeMismatch { .. }));

    let err = Array::new(ArrayD::<u8>::zeros(IxDyn(&[10, 10, 10])), raw_spec()).unwrap_err();
    assert!(matches!(err, Error::DtypeMismatch { .. }));

    // Leading axes are channels and are not checked.
    assert!(Array::new(ArrayD::<f32>::zeros(IxDyn(&[3, 10, 10, 10])), raw_spec()).is_ok());
}

#[test]
fn test_array_crop() {
    let volume = raw_volume(|z, y, x| (100 * z + 10 * y + x) as f32);
    let cropped = volume.crop(&roi([2, 3, 4], [2, 2, 2])).unwrap();

    assert_eq!(cropped.spec().roi, Some(roi([2, 3, 4], [2, 2, 2])));
    assert_eq!(cropped.data().shape(), &[1, 2, 2, 2]);
    assert_eq!(cropped.data().as_f32().unwrap()[[0, 1, 1, 1]], 345.0);

    assert!(matches!(
        volume.crop(&roi([8, 8, 8], [4, 4, 4])),
        Err(Error::NotContained { .. })
    ));
}

#[test]
fn test_batch_crop_to_request() {
    let keys = Keys::new();
    let mut batch = batch_with(&keys.raw, raw_volume(|_, _, _| 1.0));
    batch.insert(keys.logits.clone(), raw_volume(|_, _, _| 2.0));

    let request = Request::new().with_roi(keys.raw.clone(), roi([4, 4, 4], [2, 2, 2]));
    batch.crop_to(&request).unwrap();

    assert_eq!(batch.get(&keys.raw).unwrap().data().shape(), &[1, 2, 2, 2]);
    assert_eq!(
        batch.get(&keys.logits).unwrap().spec().roi,
        Some(roi([0, 0, 0], [10, 10, 10]))
    );
}

#[test]
fn test_key_registry_is_shared_by_name() {
    let keys = Keys::new();
    assert_eq!(keys.registry.resolve("RAW").unwrap(), keys.raw);
    assert_eq!(keys.registry.register("RAW").unwrap(), keys.raw);
    assert!(matches!(
        keys.registry.resolve("GT_LABELS"),
        Err(Error::UnknownKey(_))
    ));
    assert_eq!(keys.registry.len(), 3);
}
