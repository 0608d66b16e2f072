//! Per-correspondence residuals against the current fit.

use crate::crs::{CrsId, ReprojectionError, Reprojector};
use crate::store::{CorrespondencePoint, CorrespondenceStore, StoreEvent};
use crate::transform::{FitError, PointTransform, TransformFailure};

/// Why one residual could not be computed.
#[derive(Debug, Clone, PartialEq)]
pub enum PerPointTransformFailure {
    Reprojection(ReprojectionError),
    Transform(TransformFailure),
}

impl std::fmt::Display for PerPointTransformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Reprojection(e) => write!(f, "{e}"),
            Self::Transform(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for PerPointTransformFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Reprojection(e) => Some(e),
            Self::Transform(e) => Some(e),
        }
    }
}

/// Outcome of a successful residual update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResidualReport {
    /// Points that received a residual.
    pub evaluated: usize,
    /// Rows left without a residual, by store index.
    pub failed: Vec<(usize, PerPointTransformFailure)>,
}

/// Recompute every residual in `store`.
///
/// `fitter` is called once with the current points and the working CRS
/// (`reference_crs`, or the first point's CRS when `None`). If it fails every
/// residual is cleared and the error is returned. Otherwise each origin is
/// reprojected, forwarded and compared to its reprojected destination;
/// points that cannot be evaluated keep `None` and are listed in the report.
///
/// Emits [`StoreEvent::ResidualsUpdated`] whenever the store is non-empty.
pub fn update_residuals<F, T>(
    store: &mut CorrespondenceStore,
    reference_crs: Option<&CrsId>,
    reprojector: &dyn Reprojector,
    fitter: F,
) -> Result<ResidualReport, FitError>
where
    F: FnOnce(&[CorrespondencePoint], &CrsId) -> Result<T, FitError>,
    T: PointTransform,
{
    let Some(first) = store.points().first() else {
        return Ok(ResidualReport::default());
    };
    let crs = reference_crs.cloned().unwrap_or_else(|| first.crs.clone());

    let transform = match fitter(store.points(), &crs) {
        Ok(t) => t,
        Err(e) => {
            tracing::warn!("residuals cleared: {e}");
            store.clear_residuals();
            store.notify(&StoreEvent::ResidualsUpdated);
            return Err(e);
        }
    };

    let outcomes: Vec<Result<f64, PerPointTransformFailure>> = store
        .points()
        .iter()
        .map(|p| point_residual(p, &crs, reprojector, &transform))
        .collect();

    let mut report = ResidualReport::default();
    for (i, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(r) => {
                store.set_residual(i, Some(r));
                report.evaluated += 1;
            }
            Err(e) => {
                tracing::debug!(row = i + 1, "no residual: {e}");
                store.set_residual(i, None);
                report.failed.push((i, e));
            }
        }
    }
    store.notify(&StoreEvent::ResidualsUpdated);
    Ok(report)
}

fn point_residual(
    p: &CorrespondencePoint,
    crs: &CrsId,
    reprojector: &dyn Reprojector,
    transform: &impl PointTransform,
) -> Result<f64, PerPointTransformFailure> {
    let origin = reprojector
        .reproject(&p.crs, crs, p.origin)
        .map_err(PerPointTransformFailure::Reprojection)?;
    let destination = reprojector
        .reproject(&p.crs, crs, p.destination)
        .map_err(PerPointTransformFailure::Reprojection)?;
    let (x, y) = transform
        .forward(origin[0], origin[1])
        .map_err(PerPointTransformFailure::Transform)?;
    Ok((x - destination[0]).hypot(y - destination[1]))
}
