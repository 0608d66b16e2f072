//! Plane-to-plane projective transform via normalized DLT.

use nalgebra::{DMatrix, Matrix3, Vector3};

use super::linalg::{Normalization, RANK_TOLERANCE};

/// Homogeneous weights below this magnitude map to infinity.
const MIN_HOMOGENEOUS_W: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct ProjectiveModel {
    pub h: Matrix3<f64>,
}

impl ProjectiveModel {
    /// Estimate `H` such that `dst ≈ project(H, src)` from ≥4 pairs.
    ///
    /// Returns `None` when the null space of the DLT system is not unique
    /// (duplicate or collinear configurations) or `H` is singular.
    pub(crate) fn fit(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Self> {
        let n = src.len();
        if n < 4 || dst.len() != n {
            return None;
        }

        let n_src = Normalization::from_points(src);
        let n_dst = Normalization::from_points(dst);

        // Pad to at least 9 rows so the SVD exposes the full right basis.
        let rows = (2 * n).max(9);
        let mut a = DMatrix::<f64>::zeros(rows, 9);
        for i in 0..n {
            let [sx, sy] = n_src.apply(src[i]);
            let [dx, dy] = n_dst.apply(dst[i]);

            // Row 2i:   [  0  0  0 | -sx -sy -1 | dy*sx  dy*sy  dy ]
            a[(2 * i, 3)] = -sx;
            a[(2 * i, 4)] = -sy;
            a[(2 * i, 5)] = -1.0;
            a[(2 * i, 6)] = dy * sx;
            a[(2 * i, 7)] = dy * sy;
            a[(2 * i, 8)] = dy;

            // Row 2i+1: [ sx  sy  1 |  0  0  0 | -dx*sx -dx*sy -dx ]
            a[(2 * i + 1, 0)] = sx;
            a[(2 * i + 1, 1)] = sy;
            a[(2 * i + 1, 2)] = 1.0;
            a[(2 * i + 1, 6)] = -dx * sx;
            a[(2 * i + 1, 7)] = -dx * sy;
            a[(2 * i + 1, 8)] = -dx;
        }
        if a.iter().any(|v| !v.is_finite()) {
            return None;
        }

        let svd = a.svd(false, true);
        let v_t = svd.v_t?;
        let s = &svd.singular_values;

        let mut order: Vec<usize> = (0..s.len()).collect();
        order.sort_by(|&i, &j| s[i].total_cmp(&s[j]));
        let (min_i, next_i) = (order[0], order[1]);
        let s_max = s[order[s.len() - 1]];
        if !(s_max > 0.0) || s[next_i] / s_max < RANK_TOLERANCE {
            tracing::debug!(
                s_next = s[next_i],
                s_max,
                "projective DLT null space is not unique"
            );
            return None;
        }

        let row = v_t.row(min_i);
        let h_norm = Matrix3::new(
            row[0], row[1], row[2], row[3], row[4], row[5], row[6], row[7], row[8],
        );
        if h_norm.determinant().abs() < RANK_TOLERANCE {
            return None;
        }

        // Denormalize: H = T_dst^-1 * H_norm * T_src
        let t_dst_inv = n_dst.matrix().try_inverse()?;
        let h = t_dst_inv * h_norm * n_src.matrix();

        let scale = h[(2, 2)];
        let h = if scale.abs() < 1e-15 { h } else { h / scale };
        h.iter().all(|v| v.is_finite()).then_some(Self { h })
    }

    /// Project a point; `None` on the line at infinity.
    pub(crate) fn apply(&self, x: f64, y: f64) -> Option<[f64; 2]> {
        let p = self.h * Vector3::new(x, y, 1.0);
        if p[2].abs() < MIN_HOMOGENEOUS_W {
            return None;
        }
        Some([p[0] / p[2], p[1] / p[2]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn make_test_homography() -> Matrix3<f64> {
        // Scale + translate + mild perspective
        Matrix3::new(
            3.5, 0.1, 640.0, //
            -0.05, 3.3, 480.0, //
            0.0001, -0.00005, 1.0,
        )
    }

    fn project(h: &Matrix3<f64>, p: [f64; 2]) -> [f64; 2] {
        ProjectiveModel { h: *h }.apply(p[0], p[1]).unwrap()
    }

    #[test]
    fn exact_four_points_interpolate() {
        let h_true = make_test_homography();
        let src = [[0.0, 0.0], [100.0, 0.0], [100.0, 100.0], [0.0, 100.0]];
        let dst: Vec<[f64; 2]> = src.iter().map(|&s| project(&h_true, s)).collect();

        let m = ProjectiveModel::fit(&src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = m.apply(s[0], s[1]).unwrap();
            assert_relative_eq!(p[0], d[0], epsilon = 1e-6);
            assert_relative_eq!(p[1], d[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn overdetermined_grid_recovers_h() {
        let h_true = make_test_homography();
        let mut src = Vec::new();
        for i in 0..5 {
            for j in 0..5 {
                src.push([i as f64 * 20.0, j as f64 * 20.0]);
            }
        }
        let dst: Vec<[f64; 2]> = src.iter().map(|&s| project(&h_true, s)).collect();

        let m = ProjectiveModel::fit(&src, &dst).unwrap();
        for r in 0..3 {
            for c in 0..3 {
                assert_relative_eq!(m.h[(r, c)], h_true[(r, c)], epsilon = 1e-8, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn three_collinear_of_four_is_degenerate() {
        let src = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [0.0, 5.0]];
        let dst = [[0.0, 0.0], [2.0, 2.0], [4.0, 4.0], [1.0, 9.0]];
        assert!(ProjectiveModel::fit(&src, &dst).is_none());
    }

    #[test]
    fn line_at_infinity_has_no_image() {
        let h = Matrix3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.01, 0.0, 1.0);
        let m = ProjectiveModel { h };
        assert!(m.apply(-100.0, 3.0).is_none());
        assert!(m.apply(-99.0, 3.0).is_some());
    }
}
