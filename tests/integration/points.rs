//! Point annotation tests

use crate::helpers::*;
use voxpipe::core::Error;
use voxpipe::prelude::*;

fn synapse(pre: u64, post: u64, synapse_id: u64, pre_at: [f64; 3], post_at: [f64; 3]) -> [SynPoint; 2] {
    [
        SynPoint::builder(PointKind::Presynaptic, pre, synapse_id)
            .location(pre_at)
            .partner(post)
            .property("confidence", "0.9")
            .build(),
        SynPoint::builder(PointKind::Postsynaptic, post, synapse_id)
            .location(post_at)
            .partner(pre)
            .build(),
    ]
}

fn volume_points() -> Vec<SynPoint> {
    let mut points = Vec::new();
    points.extend(synapse(1, 2, 100, [4.0, 4.0, 4.0], [6.0, 4.0, 4.0]));
    points.extend(synapse(3, 4, 101, [30.0, 30.0, 30.0], [34.0, 30.0, 30.0]));
    points
}

#[test]
fn test_point_set_lookup() {
    let set = PointSet::new(volume_points(), roi([0, 0, 0], [40, 40, 40]), vec![4.0; 3]).unwrap();
    assert_eq!(set.len(), 4);

    let pre = set.get(1).unwrap();
    assert_eq!(pre.property("confidence"), Some("0.9"));
    let partners: Vec<u64> = set.partners_of(pre).map(|p| p.location_id()).collect();
    assert_eq!(partners, vec![2]);
    assert_eq!(set.get(2).unwrap().kind(), PointKind::Postsynaptic);
}

#[test]
fn test_duplicate_location_ids_rejected() {
    let mut points = volume_points();
    points.push(SynPoint::builder(PointKind::Presynaptic, 3, 200).location([1.0, 1.0, 1.0]).build());

    let err = PointSet::new(points, roi([0, 0, 0], [40, 40, 40]), vec![1.0; 3]).unwrap_err();
    assert_eq!(err, Error::DuplicateLocationId(3));
}

#[test]
fn test_one_sided_partner_link_rejected() {
    let points = vec![
        SynPoint::builder(PointKind::Presynaptic, 1, 100)
            .location([0.0, 0.0, 0.0])
            .partner(2)
            .build(),
        SynPoint::builder(PointKind::Postsynaptic, 2, 100)
            .location([1.0, 0.0, 0.0])
            .build(),
    ];
    let err = PointSet::new(points, roi([0, 0, 0], [4, 4, 4]), vec![1.0; 3]).unwrap_err();
    assert!(matches!(err, Error::PartnerMismatch { location_id: 1, partner_id: 2, .. }));
}

#[test]
fn test_crop_keeps_partial_synapses() {
    let set = PointSet::new(volume_points(), roi([0, 0, 0], [40, 40, 40]), vec![1.0; 3]).unwrap();

    // Keeps both points of the first synapse and only the presynaptic side
    // of the second.
    let cropped = set.crop(&roi([0, 0, 0], [32, 32, 32])).unwrap();
    let ids: Vec<u64> = cropped.points().iter().map(|p| p.location_id()).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(cropped.roi(), &roi([0, 0, 0], [32, 32, 32]));

    assert!(set.validate_complete().is_ok());
    assert_eq!(
        cropped.validate_complete().unwrap_err(),
        Error::MissingPartner {
            location_id: 3,
            partner_id: 4
        }
    );
}

#[test]
fn test_crop_uses_resolution() {
    let set = PointSet::new(volume_points(), roi([0, 0, 0], [10, 10, 10]), vec![4.0; 3]).unwrap();

    // At 4 units per voxel the second synapse sits at voxel 7 and 8.
    let cropped = set.crop(&roi([7, 7, 7], [1, 1, 1])).unwrap();
    let ids: Vec<u64> = cropped.points().iter().map(|p| p.location_id()).collect();
    assert_eq!(ids, vec![3]);
}
