//! Shared numerics: Hartley normalization and rank-checked least squares.

use nalgebra::{DMatrix, Matrix3};

/// Relative singular-value threshold below which a design matrix is treated
/// as rank deficient.
pub(crate) const RANK_TOLERANCE: f64 = 1e-10;

/// Similarity that moves a point set's centroid to the origin and scales it
/// so the mean distance from the origin is √2.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Normalization {
    pub cx: f64,
    pub cy: f64,
    pub scale: f64,
}

impl Normalization {
    pub(crate) fn from_points(pts: &[[f64; 2]]) -> Self {
        let n = pts.len().max(1) as f64;
        let cx: f64 = pts.iter().map(|p| p[0]).sum::<f64>() / n;
        let cy: f64 = pts.iter().map(|p| p[1]).sum::<f64>() / n;

        let mean_dist: f64 = pts
            .iter()
            .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
            .sum::<f64>()
            / n;

        let scale = if mean_dist > 1e-15 {
            std::f64::consts::SQRT_2 / mean_dist
        } else {
            1.0
        };

        Self { cx, cy, scale }
    }

    #[inline]
    pub(crate) fn apply(&self, p: [f64; 2]) -> [f64; 2] {
        [self.scale * (p[0] - self.cx), self.scale * (p[1] - self.cy)]
    }

    pub(crate) fn matrix(&self) -> Matrix3<f64> {
        let s = self.scale;
        Matrix3::new(s, 0.0, -s * self.cx, 0.0, s, -s * self.cy, 0.0, 0.0, 1.0)
    }
}

/// Solve `a · x ≈ b` in the least-squares sense.
///
/// Returns `None` when `a` has fewer rows than columns, contains non-finite
/// values, or its smallest singular value is below
/// [`RANK_TOLERANCE`] relative to the largest.
pub(crate) fn solve_least_squares(a: DMatrix<f64>, b: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if a.nrows() < a.ncols() || a.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let svd = a.svd(true, true);
    let s_max = svd.singular_values.max();
    let s_min = svd.singular_values.min();
    if !(s_max > 0.0) || s_min / s_max < RANK_TOLERANCE {
        return None;
    }
    let x = svd.solve(b, 0.0).ok()?;
    x.iter().all(|v| v.is_finite()).then_some(x)
}
