//! Coordinate reference system identifiers and the reprojection seam.
//!
//! The engine never implements geodesy itself beyond a spherical Web Mercator
//! helper. Hosts plug their own datum/projection library in through
//! [`Reprojector`].

use std::f64::consts::{FRAC_PI_2, FRAC_PI_4};

use crate::geometry::BBox;

/// Identifier of a coordinate reference system, e.g. `EPSG:4326`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct CrsId(String);

impl CrsId {
    /// Wrap an authority identifier. Surrounding whitespace is dropped.
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.len() == id.len() {
            Self(id)
        } else {
            Self(trimmed.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Case-insensitive comparison against an authority string.
    pub fn is(&self, authority_id: &str) -> bool {
        self.0.eq_ignore_ascii_case(authority_id)
    }
}

impl std::fmt::Display for CrsId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CrsId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for CrsId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// A point could not be moved between two coordinate systems.
#[derive(Debug, Clone, PartialEq)]
pub struct ReprojectionError {
    pub from: CrsId,
    pub to: CrsId,
    pub point: [f64; 2],
    pub reason: String,
}

impl std::fmt::Display for ReprojectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "cannot reproject ({}, {}) from {} to {}: {}",
            self.point[0], self.point[1], self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for ReprojectionError {}

/// Pure coordinate conversion between two reference systems.
///
/// Implementations must return the input unchanged when `from == to` and
/// must not keep state between calls.
///
/// # Example
///
/// ```
/// use gcpwarp::{CrsId, Reprojector, ReprojectionError};
///
/// struct Shift;
///
/// impl Reprojector for Shift {
///     fn reproject(
///         &self,
///         from: &CrsId,
///         to: &CrsId,
///         xy: [f64; 2],
///     ) -> Result<[f64; 2], ReprojectionError> {
///         if from == to {
///             return Ok(xy);
///         }
///         Ok([xy[0] + 1000.0, xy[1]])
///     }
/// }
/// ```
pub trait Reprojector {
    fn reproject(
        &self,
        from: &CrsId,
        to: &CrsId,
        xy: [f64; 2],
    ) -> Result<[f64; 2], ReprojectionError>;
}

/// Treats every coordinate system as the same one.
///
/// Suitable when all inputs are known to share one CRS.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityReprojector;

impl Reprojector for IdentityReprojector {
    fn reproject(
        &self,
        _from: &CrsId,
        _to: &CrsId,
        xy: [f64; 2],
    ) -> Result<[f64; 2], ReprojectionError> {
        Ok(xy)
    }
}

pub const EPSG_WGS84: &str = "EPSG:4326";
pub const EPSG_WEB_MERCATOR: &str = "EPSG:3857";

const EARTH_RADIUS_M: f64 = 6_378_137.0;
/// Latitude where the square Web Mercator world ends.
const MAX_MERCATOR_LAT_DEG: f64 = 85.051_128_779_806_59;

/// Spherical Web Mercator between geographic WGS84 degrees (x = lon,
/// y = lat) and EPSG:3857 metres. Any other pair of distinct systems is
/// rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebMercatorReprojector;

impl WebMercatorReprojector {
    fn forward(&self, from: &CrsId, to: &CrsId, lon_lat: [f64; 2]) -> Result<[f64; 2], ReprojectionError> {
        let [lon, lat] = lon_lat;
        if !lon.is_finite() || !lat.is_finite() || lat.abs() > MAX_MERCATOR_LAT_DEG {
            return Err(reprojection_error(from, to, lon_lat, "latitude outside mercator domain"));
        }
        let x = EARTH_RADIUS_M * lon.to_radians();
        let y = EARTH_RADIUS_M * (FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln();
        Ok([x, y])
    }

    fn inverse(&self, from: &CrsId, to: &CrsId, xy: [f64; 2]) -> Result<[f64; 2], ReprojectionError> {
        if !xy[0].is_finite() || !xy[1].is_finite() {
            return Err(reprojection_error(from, to, xy, "non-finite coordinate"));
        }
        let lon = (xy[0] / EARTH_RADIUS_M).to_degrees();
        let lat = (2.0 * (xy[1] / EARTH_RADIUS_M).exp().atan() - FRAC_PI_2).to_degrees();
        Ok([lon, lat])
    }
}

impl Reprojector for WebMercatorReprojector {
    fn reproject(
        &self,
        from: &CrsId,
        to: &CrsId,
        xy: [f64; 2],
    ) -> Result<[f64; 2], ReprojectionError> {
        if from == to {
            return Ok(xy);
        }
        match (from.is(EPSG_WGS84), to.is(EPSG_WEB_MERCATOR)) {
            (true, true) => self.forward(from, to, xy),
            _ if from.is(EPSG_WEB_MERCATOR) && to.is(EPSG_WGS84) => self.inverse(from, to, xy),
            _ if from.as_str().eq_ignore_ascii_case(to.as_str()) => Ok(xy),
            _ => Err(reprojection_error(from, to, xy, "no transform between these systems")),
        }
    }
}

fn reprojection_error(from: &CrsId, to: &CrsId, xy: [f64; 2], reason: &str) -> ReprojectionError {
    ReprojectionError {
        from: from.clone(),
        to: to.clone(),
        point: xy,
        reason: reason.to_string(),
    }
}

/// Number of segments each rectangle edge is split into by [`reproject_bbox`].
pub const BBOX_DENSIFY_SEGMENTS: usize = 20;

/// Reproject a rectangle by sampling points along its edges.
///
/// Curved edges under non-affine projections are approximated by
/// `segments` pieces per side. Fails on the first sample that cannot be
/// reprojected, since a partial outline would understate the rectangle.
pub fn reproject_bbox(
    reprojector: &dyn Reprojector,
    rect: &BBox,
    from: &CrsId,
    to: &CrsId,
    segments: usize,
) -> Result<BBox, ReprojectionError> {
    if from == to {
        return Ok(*rect);
    }
    let segments = segments.max(1);
    let corners = [
        [rect.min[0], rect.min[1]],
        [rect.max[0], rect.min[1]],
        [rect.max[0], rect.max[1]],
        [rect.min[0], rect.max[1]],
    ];

    let mut projected = Vec::with_capacity(4 * segments);
    for (i, a) in corners.iter().enumerate() {
        let b = corners[(i + 1) % 4];
        for k in 0..segments {
            let t = k as f64 / segments as f64;
            let p = [a[0] + (b[0] - a[0]) * t, a[1] + (b[1] - a[1]) * t];
            projected.push(reprojector.reproject(from, to, p)?);
        }
    }

    BBox::from_points(projected)
        .ok_or_else(|| reprojection_error(from, to, rect.min, "no finite corner"))
}
