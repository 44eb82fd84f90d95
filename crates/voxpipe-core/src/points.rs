//! Synaptic point annotations.
//!
//! Points are frozen once built. A [`PointSet`] groups the points that fall
//! into one ROI and checks that ids are unique and partner links agree.

use crate::coordinate::Coordinate;
use crate::error::{Error, Result};
use crate::roi::Roi;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PointKind {
    Presynaptic,
    Postsynaptic,
}

impl PointKind {
    /// The kind a partner of this point must have.
    pub fn partner_kind(self) -> PointKind {
        match self {
            PointKind::Presynaptic => PointKind::Postsynaptic,
            PointKind::Postsynaptic => PointKind::Presynaptic,
        }
    }
}

/// A pre- or postsynaptic location.
///
/// `location_id` is unique across all points; partners of one synapse share
/// a `synapse_id` and list each other in `partner_ids`.
#[derive(Debug, Clone, PartialEq)]
pub struct SynPoint {
    location: Vec<f64>,
    kind: PointKind,
    location_id: u64,
    synapse_id: u64,
    partner_ids: Vec<u64>,
    properties: BTreeMap<String, String>,
}

impl SynPoint {
    /// Starts a point with no location, partners or properties.
    pub fn builder(kind: PointKind, location_id: u64, synapse_id: u64) -> SynPointBuilder {
        SynPointBuilder {
            point: SynPoint {
                location: Vec::new(),
                kind,
                location_id,
                synapse_id,
                partner_ids: Vec::new(),
                properties: BTreeMap::new(),
            },
        }
    }

    /// World-space location, `[z, y, x]` for 3D data.
    pub fn location(&self) -> &[f64] {
        &self.location
    }

    pub fn kind(&self) -> PointKind {
        self.kind
    }

    pub fn location_id(&self) -> u64 {
        self.location_id
    }

    pub fn synapse_id(&self) -> u64 {
        self.synapse_id
    }

    /// Location ids of this point's partners.
    pub fn partner_ids(&self) -> &[u64] {
        &self.partner_ids
    }

    pub fn properties(&self) -> &BTreeMap<String, String> {
        &self.properties
    }

    /// Free-form property such as a confidence score.
    pub fn property(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }

    /// Voxel index of this point at `resolution` (floor of location / resolution).
    pub fn voxel(&self, resolution: &[f64]) -> Result<Coordinate> {
        if resolution.len() != self.location.len() {
            return Err(Error::DimensionMismatch {
                expected: self.location.len(),
                actual: resolution.len(),
            });
        }
        Ok(Coordinate::new(
            self.location
                .iter()
                .zip(resolution)
                .map(|(l, r)| (l / r).floor() as i64)
                .collect::<Vec<_>>(),
        ))
    }
}

#[derive(Debug, Clone)]
pub struct SynPointBuilder {
    point: SynPoint,
}

impl SynPointBuilder {
    pub fn location(mut self, location: impl Into<Vec<f64>>) -> Self {
        self.point.location = location.into();
        self
    }

    /// Links one partner by location id.
    pub fn partner(mut self, location_id: u64) -> Self {
        self.point.partner_ids.push(location_id);
        self
    }

    /// Links several partners.
    pub fn partners(mut self, location_ids: impl IntoIterator<Item = u64>) -> Self {
        self.point.partner_ids.extend(location_ids);
        self
    }

    pub fn property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.point.properties.insert(name.into(), value.into());
        self
    }

    /// Finishes the point.
    pub fn build(self) -> SynPoint {
        self.point
    }
}

/// Ordered points inside one ROI at a given resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct PointSet {
    points: Vec<SynPoint>,
    index: HashMap<u64, usize>,
    roi: Roi,
    resolution: Vec<f64>,
}

impl PointSet {
    /// Validates and freezes a point set.
    ///
    /// Location ids must be unique. For every partner link whose target is
    /// in the set, the target must be of the opposite kind, share the
    /// synapse id, and link back. Targets outside the set are allowed.
    pub fn new(points: Vec<SynPoint>, roi: Roi, resolution: Vec<f64>) -> Result<Self> {
        if resolution.len() != roi.dims() {
            return Err(Error::DimensionMismatch {
                expected: roi.dims(),
                actual: resolution.len(),
            });
        }

        let mut index = HashMap::with_capacity(points.len());
        for (i, point) in points.iter().enumerate() {
            if point.location.len() != roi.dims() {
                return Err(Error::DimensionMismatch {
                    expected: roi.dims(),
                    actual: point.location.len(),
                });
            }
            if index.insert(point.location_id, i).is_some() {
                return Err(Error::DuplicateLocationId(point.location_id));
            }
        }

        let set = Self {
            points,
            index,
            roi,
            resolution,
        };
        set.check_partners(false)?;
        Ok(set)
    }

    /// Like the checks in [`new`](Self::new), but every partner must also
    /// be present in the set.
    pub fn validate_complete(&self) -> Result<()> {
        self.check_partners(true)
    }

    /// Points in insertion order.
    pub fn points(&self) -> &[SynPoint] {
        &self.points
    }

    /// ROI the set covers.
    pub fn roi(&self) -> &Roi {
        &self.roi
    }

    /// World units per voxel along each axis.
    pub fn resolution(&self) -> &[f64] {
        &self.resolution
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Point with `location_id`.
    pub fn get(&self, location_id: u64) -> Option<&SynPoint> {
        self.index.get(&location_id).map(|&i| &self.points[i])
    }

    /// Partners of `point` that are in this set.
    pub fn partners_of<'a>(&'a self, point: &'a SynPoint) -> impl Iterator<Item = &'a SynPoint> {
        point.partner_ids.iter().filter_map(|id| self.get(*id))
    }

    /// Points whose voxel position lies in `roi`, as a new set over `roi`.
    pub fn crop(&self, roi: &Roi) -> Result<PointSet> {
        let mut kept = Vec::new();
        for point in &self.points {
            if roi.contains_point(&point.voxel(&self.resolution)?)? {
                kept.push(point.clone());
            }
        }
        PointSet::new(kept, roi.clone(), self.resolution.clone())
    }

    fn check_partners(&self, require_present: bool) -> Result<()> {
        for point in &self.points {
            for &partner_id in &point.partner_ids {
                let Some(partner) = self.get(partner_id) else {
                    if require_present {
                        return Err(Error::MissingPartner {
                            location_id: point.location_id,
                            partner_id,
                        });
                    }
                    continue;
                };

                let mismatch = |reason: String| Error::PartnerMismatch {
                    location_id: point.location_id,
                    partner_id,
                    reason,
                };
                if partner.synapse_id != point.synapse_id {
                    return Err(mismatch(format!(
                        "synapse id {} differs from {}",
                        partner.synapse_id, point.synapse_id
                    )));
                }
                if partner.kind != point.kind.partner_kind() {
                    return Err(mismatch(format!("partner is also {:?}", partner.kind)));
                }
                if !partner.partner_ids.contains(&point.location_id) {
                    return Err(mismatch("partner does not link back".to_string()));
                }
            }
        }
        Ok(())
    }
}
