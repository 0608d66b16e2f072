//! Shared fixtures for unit tests.

use crate::crs::{CrsId, EPSG_WGS84};
use crate::store::{CorrespondencePoint, CorrespondenceStore};

pub(crate) fn wgs84() -> CrsId {
    CrsId::new(EPSG_WGS84)
}

/// Correspondence in WGS84.
pub(crate) fn gcp(origin: [f64; 2], destination: [f64; 2]) -> CorrespondencePoint {
    CorrespondencePoint::new(origin, destination, wgs84())
}

pub(crate) fn gcps(pairs: &[([f64; 2], [f64; 2])]) -> Vec<CorrespondencePoint> {
    pairs.iter().map(|&(o, d)| gcp(o, d)).collect()
}

/// Store holding `pairs` in WGS84, in order.
pub(crate) fn store_with(pairs: &[([f64; 2], [f64; 2])]) -> CorrespondenceStore {
    let mut store = CorrespondenceStore::new();
    for &(o, d) in pairs {
        store.add(o, d, wgs84());
    }
    store
}

/// Three non-collinear pairs related by a pure `(+10, +10)` shift.
pub(crate) const SHIFT_10: [([f64; 2], [f64; 2]); 3] = [
    ([0.0, 0.0], [10.0, 10.0]),
    ([100.0, 0.0], [110.0, 10.0]),
    ([0.0, 100.0], [10.0, 110.0]),
];
