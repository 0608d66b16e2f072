//! Area-of-interest limited geometry correction.
//!
//! Only vertices whose position (reprojected into the AOI's CRS) falls inside
//! the AOI rectangle are moved. Everything else keeps its exact coordinates,
//! and vertex count, order and part/ring structure never change.

use std::collections::BTreeMap;

use crate::crs::{CrsId, ReprojectionError, Reprojector};
use crate::geometry::{BBox, Geometry};
use crate::store::CorrespondencePoint;
use crate::transform::{fit, FitError, PointTransform, TransformFailure, TransformMethod};

/// Rectangle that limits which vertices are corrected.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AreaOfInterest {
    pub rect: BBox,
    pub crs: CrsId,
}

impl AreaOfInterest {
    pub fn new(rect: BBox, crs: CrsId) -> Self {
        Self { rect, crs }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GeometryFailureCause {
    /// The vertex could not be located in the AOI's CRS.
    Reprojection(ReprojectionError),
    Transform(TransformFailure),
}

impl std::fmt::Display for GeometryFailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reprojection(e) => write!(f, "{e}"),
            Self::Transform(e) => write!(f, "{e}"),
        }
    }
}

/// A geometry was discarded because one of its vertices failed.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryTransformFailure {
    /// Storage-order vertex number of the first failing vertex.
    pub vertex: usize,
    pub cause: GeometryFailureCause,
}

impl std::fmt::Display for GeometryTransformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "vertex {}: {}", self.vertex, self.cause)
    }
}

impl std::error::Error for GeometryTransformFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.cause {
            GeometryFailureCause::Reprojection(e) => Some(e),
            GeometryFailureCause::Transform(e) => Some(e),
        }
    }
}

/// Per-feature outcome of one correction run.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrectionBatch<Id: Ord> {
    results: BTreeMap<Id, Result<Geometry, GeometryTransformFailure>>,
}

impl<Id: Ord> Default for CorrectionBatch<Id> {
    fn default() -> Self {
        Self {
            results: BTreeMap::new(),
        }
    }
}

impl<Id: Ord> CorrectionBatch<Id> {
    pub fn results(&self) -> &BTreeMap<Id, Result<Geometry, GeometryTransformFailure>> {
        &self.results
    }

    pub fn into_results(self) -> BTreeMap<Id, Result<Geometry, GeometryTransformFailure>> {
        self.results
    }

    pub fn get(&self, id: &Id) -> Option<&Result<Geometry, GeometryTransformFailure>> {
        self.results.get(id)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> impl Iterator<Item = (&Id, &Geometry)> + '_ {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().ok().map(|g| (id, g)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Id, &GeometryTransformFailure)> + '_ {
        self.results
            .iter()
            .filter_map(|(id, r)| r.as_ref().err().map(|e| (id, e)))
    }

    pub fn failed_count(&self) -> usize {
        self.failures().count()
    }

    /// `"N of M features failed"`.
    pub fn summary(&self) -> String {
        format!("{} of {} features failed", self.failed_count(), self.len())
    }
}

/// Correct one geometry with an already fitted transform.
///
/// `transform` operates in `feature_crs`. Vertices are tested against the AOI
/// after reprojection into `aoi.crs`; a vertex that cannot be reprojected or
/// transformed fails the whole geometry.
pub fn correct_geometry(
    geometry: &Geometry,
    transform: &impl PointTransform,
    feature_crs: &CrsId,
    aoi: &AreaOfInterest,
    reprojector: &dyn Reprojector,
) -> Result<Geometry, GeometryTransformFailure> {
    let mut marked = Vec::new();
    for (n, &xy) in geometry.vertices().enumerate() {
        let in_aoi_crs = reprojector
            .reproject(feature_crs, &aoi.crs, xy)
            .map_err(|e| GeometryTransformFailure {
                vertex: n,
                cause: GeometryFailureCause::Reprojection(e),
            })?;
        if aoi.rect.contains(in_aoi_crs) {
            marked.push(n);
        }
    }

    let mut out = geometry.clone();
    if marked.is_empty() {
        return Ok(out);
    }
    let mut marked = marked.into_iter().peekable();
    for (n, v) in out.vertices_mut().enumerate() {
        if marked.peek() != Some(&n) {
            continue;
        }
        marked.next();
        let (x, y) = transform
            .forward(v[0], v[1])
            .map_err(|e| GeometryTransformFailure {
                vertex: n,
                cause: GeometryFailureCause::Transform(e),
            })?;
        *v = [x, y];
    }
    Ok(out)
}

/// Correct every feature with an already fitted transform.
pub fn correct_features<Id, T>(
    features: &BTreeMap<Id, Geometry>,
    transform: &T,
    feature_crs: &CrsId,
    aoi: &AreaOfInterest,
    reprojector: &dyn Reprojector,
) -> CorrectionBatch<Id>
where
    Id: Ord + Clone + std::fmt::Debug,
    T: PointTransform,
{
    let results: BTreeMap<Id, Result<Geometry, GeometryTransformFailure>> = features
        .iter()
        .map(|(id, g)| {
            let r = correct_geometry(g, transform, feature_crs, aoi, reprojector);
            if let Err(e) = &r {
                tracing::warn!(feature = ?id, "geometry not corrected: {e}");
            }
            (id.clone(), r)
        })
        .collect();
    let batch = CorrectionBatch { results };
    tracing::info!("{}", batch.summary());
    batch
}

/// Fits the current correspondences and applies the result to features.
pub struct GeometryCorrector<'a> {
    points: &'a [CorrespondencePoint],
    method: TransformMethod,
    reprojector: &'a dyn Reprojector,
}

impl<'a> GeometryCorrector<'a> {
    pub fn new(
        points: &'a [CorrespondencePoint],
        method: TransformMethod,
        reprojector: &'a dyn Reprojector,
    ) -> Self {
        Self {
            points,
            method,
            reprojector,
        }
    }

    /// Fit in `feature_crs` and correct each feature inside `aoi`.
    ///
    /// A fit failure aborts before any geometry is examined.
    pub fn transform_features<Id>(
        &self,
        features: &BTreeMap<Id, Geometry>,
        feature_crs: &CrsId,
        aoi: &AreaOfInterest,
    ) -> Result<CorrectionBatch<Id>, FitError>
    where
        Id: Ord + Clone + std::fmt::Debug,
    {
        let transform = fit(self.method, self.points, feature_crs, self.reprojector)?;
        Ok(correct_features(
            features,
            &transform,
            feature_crs,
            aoi,
            self.reprojector,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{IdentityReprojector, WebMercatorReprojector, EPSG_WEB_MERCATOR};
    use crate::test_utils::{gcps, wgs84, SHIFT_10};

    fn aoi(min: [f64; 2], max: [f64; 2]) -> AreaOfInterest {
        AreaOfInterest::new(BBox::new(min, max), wgs84())
    }

    /// Shift by (+10, +10), but fail for any point with `x > 1000`.
    struct ShiftUnlessFar;

    impl PointTransform for ShiftUnlessFar {
        fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), TransformFailure> {
            if x > 1000.0 {
                Err(TransformFailure::PointAtInfinity)
            } else {
                Ok((x + 10.0, y + 10.0))
            }
        }
    }

    #[test]
    fn only_vertices_inside_the_aoi_move() {
        let line = Geometry::LineString(vec![[0.0, 0.0], [50.0, 50.0], [101.0, 50.0], [100.0, 100.0]]);
        let out = correct_geometry(
            &line,
            &ShiftUnlessFar,
            &wgs84(),
            &aoi([0.0, 0.0], [100.0, 100.0]),
            &IdentityReprojector,
        )
        .unwrap();
        // Boundary vertices are inside; one unit outside is untouched.
        assert_eq!(
            out,
            Geometry::LineString(vec![[10.0, 10.0], [60.0, 60.0], [101.0, 50.0], [110.0, 110.0]])
        );
    }

    #[test]
    fn geometry_outside_aoi_is_returned_unchanged() {
        let poly = Geometry::Polygon(vec![vec![
            [500.0, 500.0],
            [600.0, 500.0],
            [600.0, 600.0],
            [500.0, 500.0],
        ]]);
        let out = correct_geometry(
            &poly,
            &ShiftUnlessFar,
            &wgs84(),
            &aoi([0.0, 0.0], [100.0, 100.0]),
            &IdentityReprojector,
        )
        .unwrap();
        assert_eq!(out, poly);
    }

    #[test]
    fn one_failing_vertex_fails_only_its_feature() {
        let mut features = BTreeMap::new();
        features.insert(1u64, Geometry::Point([5.0, 5.0]));
        features.insert(2u64, Geometry::LineString(vec![[5.0, 5.0], [2000.0, 5.0]]));
        features.insert(3u64, Geometry::MultiPoint(vec![[3000.0, 9.0]]));

        let batch = correct_features(
            &features,
            &ShiftUnlessFar,
            &wgs84(),
            &aoi([0.0, 0.0], [5000.0, 100.0]),
            &IdentityReprojector,
        );

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.get(&1), Some(&Ok(Geometry::Point([15.0, 15.0]))));
        let failure = batch.get(&2).unwrap().as_ref().unwrap_err();
        assert_eq!(failure.vertex, 1);
        assert_eq!(
            failure.cause,
            GeometryFailureCause::Transform(TransformFailure::PointAtInfinity)
        );
        assert!(batch.get(&3).unwrap().is_err());
        assert_eq!(batch.succeeded().count(), 1);
        assert_eq!(batch.summary(), "2 of 3 features failed");
    }

    #[test]
    fn unreprojectable_vertex_fails_the_geometry() {
        let merc_aoi = AreaOfInterest::new(
            BBox::new([-1e7, -1e7], [1e7, 1e7]),
            CrsId::new(EPSG_WEB_MERCATOR),
        );
        let line = Geometry::LineString(vec![[10.0, 10.0], [10.0, 89.5]]);
        let err = correct_geometry(
            &line,
            &ShiftUnlessFar,
            &wgs84(),
            &merc_aoi,
            &WebMercatorReprojector,
        )
        .unwrap_err();
        assert_eq!(err.vertex, 1);
        assert!(matches!(err.cause, GeometryFailureCause::Reprojection(_)));
    }

    #[test]
    fn corrector_fits_then_applies() {
        let pts = gcps(&SHIFT_10);
        let corrector =
            GeometryCorrector::new(&pts, TransformMethod::PolynomialOrder1, &IdentityReprojector);
        let mut features = BTreeMap::new();
        features.insert("a", Geometry::Point([50.0, 20.0]));

        let batch = corrector
            .transform_features(&features, &wgs84(), &aoi([0.0, 0.0], [100.0, 100.0]))
            .unwrap();
        let Some(Ok(Geometry::Point(p))) = batch.get(&"a") else {
            panic!("expected corrected point");
        };
        approx::assert_relative_eq!(p[0], 60.0, epsilon = 1e-9);
        approx::assert_relative_eq!(p[1], 30.0, epsilon = 1e-9);
    }

    #[test]
    fn fit_failure_aborts_the_batch() {
        let pts = gcps(&SHIFT_10);
        let corrector =
            GeometryCorrector::new(&pts, TransformMethod::PolynomialOrder2, &IdentityReprojector);
        let mut features = BTreeMap::new();
        features.insert(7u32, Geometry::Point([1.0, 1.0]));
        let err = corrector
            .transform_features(&features, &wgs84(), &aoi([0.0, 0.0], [10.0, 10.0]))
            .unwrap_err();
        assert!(matches!(
            err,
            FitError::InsufficientCorrespondences { required: 6, supplied: 3, .. }
        ));
    }
}
