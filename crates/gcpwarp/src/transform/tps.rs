//! Thin plate spline interpolation (radial basis `r² ln r²` plus affine part).

use nalgebra::DMatrix;

use super::linalg::{Normalization, RANK_TOLERANCE};

/// Squared normalized distance below which two control points coincide.
const MIN_CONTROL_SEPARATION_SQ: f64 = 1e-20;

#[inline]
fn kernel(r2: f64) -> f64 {
    if r2 <= 0.0 {
        0.0
    } else {
        r2 * r2.ln()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ThinPlateSplineModel {
    norm: Normalization,
    /// Control points in normalized coordinates.
    controls: Vec<[f64; 2]>,
    /// Radial weights `[wx, wy]` per control point.
    weights: Vec<[f64; 2]>,
    /// Affine terms `[1, x, y]` for each output axis.
    affine: [[f64; 2]; 3],
}

impl ThinPlateSplineModel {
    /// Solve the interpolation system
    ///
    /// ```text
    /// [ K  P ] [w]   [v]
    /// [ Pᵀ 0 ] [a] = [0]
    /// ```
    ///
    /// Coincident control points or a collinear set leave the system singular.
    pub(crate) fn fit(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Self> {
        let n = src.len();
        if n < 3 || dst.len() != n {
            return None;
        }
        let norm = Normalization::from_points(src);
        let controls: Vec<[f64; 2]> = src.iter().map(|&p| norm.apply(p)).collect();

        let mut p = DMatrix::<f64>::zeros(n, 3);
        for (i, c) in controls.iter().enumerate() {
            p[(i, 0)] = 1.0;
            p[(i, 1)] = c[0];
            p[(i, 2)] = c[1];
        }
        let sv = p.clone().svd(false, false).singular_values;
        if !(sv.max() > 0.0) || sv.min() / sv.max() < RANK_TOLERANCE {
            return None;
        }

        let size = n + 3;
        let mut l = DMatrix::<f64>::zeros(size, size);
        for i in 0..n {
            for j in (i + 1)..n {
                let dx = controls[i][0] - controls[j][0];
                let dy = controls[i][1] - controls[j][1];
                let r2 = dx * dx + dy * dy;
                if r2 < MIN_CONTROL_SEPARATION_SQ {
                    return None;
                }
                let u = kernel(r2);
                l[(i, j)] = u;
                l[(j, i)] = u;
            }
            for k in 0..3 {
                l[(i, n + k)] = p[(i, k)];
                l[(n + k, i)] = p[(i, k)];
            }
        }

        let mut rhs = DMatrix::<f64>::zeros(size, 2);
        for (i, d) in dst.iter().enumerate() {
            rhs[(i, 0)] = d[0];
            rhs[(i, 1)] = d[1];
        }

        let sol = l.lu().solve(&rhs)?;
        if sol.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let weights = (0..n).map(|i| [sol[(i, 0)], sol[(i, 1)]]).collect();
        let affine = [
            [sol[(n, 0)], sol[(n, 1)]],
            [sol[(n + 1, 0)], sol[(n + 1, 1)]],
            [sol[(n + 2, 0)], sol[(n + 2, 1)]],
        ];
        Some(Self {
            norm,
            controls,
            weights,
            affine,
        })
    }

    pub(crate) fn apply(&self, x: f64, y: f64) -> [f64; 2] {
        let [u, v] = self.norm.apply([x, y]);
        let mut out = [
            self.affine[0][0] + self.affine[1][0] * u + self.affine[2][0] * v,
            self.affine[0][1] + self.affine[1][1] * u + self.affine[2][1] * v,
        ];
        for (c, w) in self.controls.iter().zip(&self.weights) {
            let dx = u - c[0];
            let dy = v - c[1];
            let k = kernel(dx * dx + dy * dy);
            out[0] += w[0] * k;
            out[1] += w[1] * k;
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    #[test]
    fn interpolates_control_points() {
        let mut rng = StdRng::seed_from_u64(3);
        let src: Vec<[f64; 2]> = (0..30)
            .map(|_| [rng.gen_range(0.0..1000.0), rng.gen_range(0.0..1000.0)])
            .collect();
        let dst: Vec<[f64; 2]> = src
            .iter()
            .map(|p| [p[0] + rng.gen_range(-5.0..5.0), p[1] + rng.gen_range(-5.0..5.0)])
            .collect();

        let m = ThinPlateSplineModel::fit(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = m.apply(s[0], s[1]);
            assert_relative_eq!(p[0], d[0], epsilon = 1e-6);
            assert_relative_eq!(p[1], d[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn three_points_reduce_to_affine() {
        let src = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0]];
        let dst = [[5.0, 5.0], [25.0, 5.0], [5.0, 15.0]];
        let m = ThinPlateSplineModel::fit(&src, &dst).unwrap();
        // x' = 5 + 2x, y' = 5 + y everywhere.
        let p = m.apply(7.0, 3.0);
        assert_relative_eq!(p[0], 19.0, epsilon = 1e-9);
        assert_relative_eq!(p[1], 8.0, epsilon = 1e-9);
    }

    #[test]
    fn duplicate_or_collinear_controls_are_rejected() {
        let dup = [[0.0, 0.0], [10.0, 0.0], [0.0, 10.0], [10.0, 0.0]];
        let dst = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [2.0, 0.0]];
        assert!(ThinPlateSplineModel::fit(&dup, &dst).is_none());

        let line = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0]];
        assert!(ThinPlateSplineModel::fit(&line, &dst[..3]).is_none());
    }
}
