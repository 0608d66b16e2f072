//! gcpwarp — ground-control-point correction of vector geometries.
//!
//! A set of digitized correspondences (origin → destination, each tagged with
//! its CRS) is fitted with one of several transform families and applied to
//! the vertices of vector geometries that fall inside an area of interest.
//!
//! The main pieces are:
//!
//! 1. **Store** – ordered correspondences with change notifications.
//! 2. **Transform** – Linear, Helmert, polynomial (order 1–3), thin plate
//!    spline and projective fits with degeneracy detection.
//! 3. **Residuals** – per-correspondence error against the current fit.
//! 4. **Corrector** – AOI-limited vertex correction with per-feature failure
//!    isolation.
//! 5. **Session** – ties the above together with a fit cache and applies
//!    corrections to editable layers transactionally.
//!
//! Coordinate reprojection is supplied by the host through [`Reprojector`].
//!
//! # Example
//!
//! ```
//! use std::collections::BTreeMap;
//! use gcpwarp::{AreaOfInterest, BBox, CorrectionSession, CrsId, Geometry, IdentityReprojector};
//!
//! let crs = CrsId::new("EPSG:4326");
//! let mut session = CorrectionSession::new(IdentityReprojector);
//! session.add_gcp([0.0, 0.0], [1.0, 1.0], crs.clone());
//! session.add_gcp([10.0, 0.0], [11.0, 1.0], crs.clone());
//!
//! let mut features = BTreeMap::new();
//! features.insert(1u64, Geometry::Point([5.0, 5.0]));
//! let aoi = AreaOfInterest::new(BBox::new([0.0, 0.0], [10.0, 10.0]), crs.clone());
//! let batch = session.transform_features(&features, &crs, &aoi).unwrap();
//! assert_eq!(batch.failed_count(), 0);
//! ```

mod corrector;
mod crs;
mod geometry;
pub mod io;
mod layer;
mod residuals;
mod session;
pub mod settings;
mod store;
mod transform;

#[cfg(test)]
mod test_utils;

pub use corrector::{
    correct_features, correct_geometry, AreaOfInterest, CorrectionBatch, GeometryCorrector,
    GeometryFailureCause, GeometryTransformFailure,
};
pub use crs::{
    reproject_bbox, CrsId, IdentityReprojector, ReprojectionError, Reprojector,
    WebMercatorReprojector, BBOX_DENSIFY_SEGMENTS, EPSG_WEB_MERCATOR, EPSG_WGS84,
};
pub use geometry::{BBox, Geometry};
pub use layer::{EditableLayer, FeatureId, LayerError, MemoryLayer};
pub use residuals::{update_residuals, PerPointTransformFailure, ResidualReport};
pub use session::{ApplyError, ApplyReport, CorrectionSession, LayerReport};
pub use settings::{PreviewStyle, Settings, SettingsStore};
pub use store::{
    snapshot_hash, CorrespondencePoint, CorrespondenceStore, StoreEvent, SubscriptionId,
};
pub use transform::{
    fit, fit_pairs, FitError, FittedTransform, ParseMethodError, PointTransform, TransformCache,
    TransformFailure, TransformMethod,
};
