//! Transform fitting from ground control points.
//!
//! [`fit`] reprojects every correspondence into one working CRS, checks the
//! method's minimum point count and solves for a [`FittedTransform`]:
//!
//! | method              | min | model                                      |
//! |---------------------|-----|--------------------------------------------|
//! | `Linear`            | 2   | per-axis scale + offset                    |
//! | `Helmert`           | 2   | similarity (rotation, uniform scale, shift)|
//! | `PolynomialOrder1`  | 3   | affine                                     |
//! | `PolynomialOrder2`  | 6   | full quadratic                             |
//! | `PolynomialOrder3`  | 10  | full cubic                                 |
//! | `ThinPlateSpline`   | 3   | radial basis interpolation                 |
//! | `Projective`        | 4   | homography (normalized DLT)                |
//!
//! Least-squares methods return the best fit for over-determined input and
//! interpolate at exactly the minimum count. Singular configurations are
//! reported as [`FitError::DegenerateConfiguration`].

mod cache;
mod linalg;
mod linear;
mod polynomial;
mod projective;
mod tps;

pub use cache::TransformCache;

use crate::crs::{CrsId, ReprojectionError, Reprojector};
use crate::store::CorrespondencePoint;

use linear::{HelmertModel, LinearModel};
use polynomial::PolynomialModel;
use projective::ProjectiveModel;
use tps::ThinPlateSplineModel;

/// Supported GCP transform families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMethod {
    Linear,
    #[default]
    Helmert,
    PolynomialOrder1,
    PolynomialOrder2,
    PolynomialOrder3,
    ThinPlateSpline,
    Projective,
}

impl TransformMethod {
    pub const ALL: [TransformMethod; 7] = [
        Self::Linear,
        Self::Helmert,
        Self::PolynomialOrder1,
        Self::PolynomialOrder2,
        Self::PolynomialOrder3,
        Self::ThinPlateSpline,
        Self::Projective,
    ];

    /// Fewest correspondences the method can be fitted from.
    pub const fn minimum_count(self) -> usize {
        match self {
            Self::Linear | Self::Helmert => 2,
            Self::PolynomialOrder1 => polynomial::term_count(1),
            Self::PolynomialOrder2 => polynomial::term_count(2),
            Self::PolynomialOrder3 => polynomial::term_count(3),
            Self::ThinPlateSpline => 3,
            Self::Projective => 4,
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Helmert => "Helmert",
            Self::PolynomialOrder1 => "Polynomial 1",
            Self::PolynomialOrder2 => "Polynomial 2",
            Self::PolynomialOrder3 => "Polynomial 3",
            Self::ThinPlateSpline => "Thin Plate Spline (TPS)",
            Self::Projective => "Projective",
        }
    }

    /// Identifier used in settings files and on the command line.
    pub const fn key(self) -> &'static str {
        match self {
            Self::Linear => "linear",
            Self::Helmert => "helmert",
            Self::PolynomialOrder1 => "polynomial_order1",
            Self::PolynomialOrder2 => "polynomial_order2",
            Self::PolynomialOrder3 => "polynomial_order3",
            Self::ThinPlateSpline => "thin_plate_spline",
            Self::Projective => "projective",
        }
    }
}

impl std::fmt::Display for TransformMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Unknown transform method name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMethodError(pub String);

impl std::fmt::Display for ParseMethodError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown transform method '{}'", self.0)
    }
}

impl std::error::Error for ParseMethodError {}

impl std::str::FromStr for TransformMethod {
    type Err = ParseMethodError;

    /// Accepts either the key (`polynomial_order2`) or the display name
    /// (`Polynomial 2`), case-insensitively.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Self::ALL
            .into_iter()
            .find(|m| m.key().eq_ignore_ascii_case(s) || m.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseMethodError(s.to_string()))
    }
}

/// Fit-level failures. Each aborts the operation that requested the fit.
#[derive(Debug, Clone, PartialEq)]
pub enum FitError {
    /// Fewer correspondences than the method needs; no fit was attempted.
    InsufficientCorrespondences {
        method: TransformMethod,
        required: usize,
        supplied: usize,
    },
    /// Coincident or collinear correspondences leave the system singular.
    DegenerateConfiguration { method: TransformMethod },
    /// A correspondence could not be moved into the working CRS.
    Reprojection(ReprojectionError),
    /// Source and destination slices differ in length.
    MismatchedPairs { sources: usize, destinations: usize },
}

impl std::fmt::Display for FitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InsufficientCorrespondences {
                method,
                required,
                supplied,
            } => write!(
                f,
                "{method} transformation requires at least {required} points (got {supplied})"
            ),
            Self::DegenerateConfiguration { method } => write!(
                f,
                "could not create {method} transform from the defined GCPs (degenerate configuration)"
            ),
            Self::Reprojection(e) => write!(f, "could not reproject GCPs: {e}"),
            Self::MismatchedPairs {
                sources,
                destinations,
            } => write!(
                f,
                "{sources} source points but {destinations} destination points"
            ),
        }
    }
}

impl std::error::Error for FitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Reprojection(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReprojectionError> for FitError {
    fn from(e: ReprojectionError) -> Self {
        Self::Reprojection(e)
    }
}

/// A single coordinate could not be pushed through a fitted transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformFailure {
    NonFiniteInput,
    /// The point lies on the projective line at infinity.
    PointAtInfinity,
    NonFiniteOutput,
}

impl std::fmt::Display for TransformFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NonFiniteInput => write!(f, "non-finite input coordinate"),
            Self::PointAtInfinity => write!(f, "point maps to infinity"),
            Self::NonFiniteOutput => write!(f, "transform produced a non-finite coordinate"),
        }
    }
}

impl std::error::Error for TransformFailure {}

/// Forward point mapping used by residual evaluation and geometry correction.
pub trait PointTransform {
    fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), TransformFailure>;
}

impl<T: PointTransform + ?Sized> PointTransform for &T {
    fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), TransformFailure> {
        (**self).forward(x, y)
    }
}

impl<T: PointTransform + ?Sized> PointTransform for std::sync::Arc<T> {
    fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), TransformFailure> {
        (**self).forward(x, y)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Model {
    Linear(LinearModel),
    Helmert(HelmertModel),
    Polynomial(PolynomialModel),
    ThinPlateSpline(ThinPlateSplineModel),
    Projective(ProjectiveModel),
}

/// Immutable transform solved from one snapshot of correspondences.
#[derive(Debug, Clone, PartialEq)]
pub struct FittedTransform {
    method: TransformMethod,
    n_points: usize,
    model: Model,
}

impl FittedTransform {
    pub fn method(&self) -> TransformMethod {
        self.method
    }

    /// Number of correspondences the transform was solved from.
    pub fn point_count(&self) -> usize {
        self.n_points
    }

    pub fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), TransformFailure> {
        if !x.is_finite() || !y.is_finite() {
            return Err(TransformFailure::NonFiniteInput);
        }
        let [u, v] = match &self.model {
            Model::Linear(m) => m.apply(x, y),
            Model::Helmert(m) => m.apply(x, y),
            Model::Polynomial(m) => m.apply(x, y),
            Model::ThinPlateSpline(m) => m.apply(x, y),
            Model::Projective(m) => m.apply(x, y).ok_or(TransformFailure::PointAtInfinity)?,
        };
        if u.is_finite() && v.is_finite() {
            Ok((u, v))
        } else {
            Err(TransformFailure::NonFiniteOutput)
        }
    }
}

impl PointTransform for FittedTransform {
    fn forward(&self, x: f64, y: f64) -> Result<(f64, f64), TransformFailure> {
        FittedTransform::forward(self, x, y)
    }
}

impl std::fmt::Display for FittedTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} from {} GCPs", self.method, self.n_points)?;
        match &self.model {
            Model::Linear(m) => write!(
                f,
                " (scale {:.6}/{:.6}, origin {:.3}/{:.3})",
                m.scale[0], m.scale[1], m.origin[0], m.origin[1]
            ),
            Model::Helmert(m) => write!(
                f,
                " (scale {:.6}, rotation {:.6} rad, shift {:.3}/{:.3})",
                m.scale(),
                m.rotation(),
                m.t[0],
                m.t[1]
            ),
            Model::Polynomial(m) => write!(f, " (order {})", m.order),
            Model::ThinPlateSpline(_) => Ok(()),
            Model::Projective(m) => write!(f, " (h20 {:.3e}, h21 {:.3e})", m.h[(2, 0)], m.h[(2, 1)]),
        }
    }
}

/// Solve `method` from pairs already expressed in one coordinate system.
pub fn fit_pairs(
    method: TransformMethod,
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
) -> Result<FittedTransform, FitError> {
    if src.len() != dst.len() {
        return Err(FitError::MismatchedPairs {
            sources: src.len(),
            destinations: dst.len(),
        });
    }
    let supplied = src.len();
    let required = method.minimum_count();
    if supplied < required {
        return Err(FitError::InsufficientCorrespondences {
            method,
            required,
            supplied,
        });
    }

    let model = match method {
        TransformMethod::Linear => LinearModel::fit(src, dst).map(Model::Linear),
        TransformMethod::Helmert => HelmertModel::fit(src, dst).map(Model::Helmert),
        TransformMethod::PolynomialOrder1 => PolynomialModel::fit(1, src, dst).map(Model::Polynomial),
        TransformMethod::PolynomialOrder2 => PolynomialModel::fit(2, src, dst).map(Model::Polynomial),
        TransformMethod::PolynomialOrder3 => PolynomialModel::fit(3, src, dst).map(Model::Polynomial),
        TransformMethod::ThinPlateSpline => {
            ThinPlateSplineModel::fit(src, dst).map(Model::ThinPlateSpline)
        }
        TransformMethod::Projective => ProjectiveModel::fit(src, dst).map(Model::Projective),
    };

    let model = model.ok_or(FitError::DegenerateConfiguration { method })?;
    let fitted = FittedTransform {
        method,
        n_points: supplied,
        model,
    };
    tracing::debug!("fitted {fitted}");
    Ok(fitted)
}

/// Fit `method` over `points` after reprojecting each pair from its own CRS
/// into `target_crs`.
pub fn fit(
    method: TransformMethod,
    points: &[CorrespondencePoint],
    target_crs: &CrsId,
    reprojector: &dyn Reprojector,
) -> Result<FittedTransform, FitError> {
    let required = method.minimum_count();
    if points.len() < required {
        return Err(FitError::InsufficientCorrespondences {
            method,
            required,
            supplied: points.len(),
        });
    }

    let mut src = Vec::with_capacity(points.len());
    let mut dst = Vec::with_capacity(points.len());
    for p in points {
        src.push(reprojector.reproject(&p.crs, target_crs, p.origin)?);
        dst.push(reprojector.reproject(&p.crs, target_crs, p.destination)?);
    }
    fit_pairs(method, &src, &dst)
}
