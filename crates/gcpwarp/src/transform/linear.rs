//! Linear (axis scale + offset) and Helmert (similarity) models.

use nalgebra::DMatrix;

use super::linalg::{solve_least_squares, Normalization};

/// `x' = ox + sx·x`, `y' = oy + sy·y`, each axis fitted independently.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct LinearModel {
    pub origin: [f64; 2],
    pub scale: [f64; 2],
}

impl LinearModel {
    pub(crate) fn fit(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Self> {
        let norm = Normalization::from_points(src);
        let mut origin = [0.0; 2];
        let mut scale = [0.0; 2];

        for axis in 0..2 {
            let centre = if axis == 0 { norm.cx } else { norm.cy };
            let mut a = DMatrix::<f64>::zeros(src.len(), 2);
            let mut b = DMatrix::<f64>::zeros(src.len(), 1);
            for (i, (s, d)) in src.iter().zip(dst).enumerate() {
                a[(i, 0)] = norm.scale * (s[axis] - centre);
                a[(i, 1)] = 1.0;
                b[(i, 0)] = d[axis];
            }
            let x = solve_least_squares(a, &b)?;
            // d = k·s'·(x − c) + o'  ⇒  d = (k·s')·x + (o' − k·s'·c)
            let k = x[(0, 0)] * norm.scale;
            scale[axis] = k;
            origin[axis] = x[(1, 0)] - k * centre;
        }

        Some(Self { origin, scale })
    }

    #[inline]
    pub(crate) fn apply(&self, x: f64, y: f64) -> [f64; 2] {
        [
            self.origin[0] + self.scale[0] * x,
            self.origin[1] + self.scale[1] * y,
        ]
    }
}

/// Four-parameter similarity: rotation, uniform scale and translation.
///
/// `x' = a·x − b·y + tx`, `y' = b·x + a·y + ty`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct HelmertModel {
    pub a: f64,
    pub b: f64,
    pub t: [f64; 2],
}

impl HelmertModel {
    pub(crate) fn fit(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Self> {
        let norm = Normalization::from_points(src);
        let n = src.len();
        let mut a = DMatrix::<f64>::zeros(2 * n, 4);
        let mut rhs = DMatrix::<f64>::zeros(2 * n, 1);
        for (i, (s, d)) in src.iter().zip(dst).enumerate() {
            let [x, y] = norm.apply(*s);
            a[(2 * i, 0)] = x;
            a[(2 * i, 1)] = -y;
            a[(2 * i, 2)] = 1.0;
            rhs[(2 * i, 0)] = d[0];

            a[(2 * i + 1, 0)] = y;
            a[(2 * i + 1, 1)] = x;
            a[(2 * i + 1, 3)] = 1.0;
            rhs[(2 * i + 1, 0)] = d[1];
        }
        let p = solve_least_squares(a, &rhs)?;

        // Fold the normalization back into the parameters.
        let s = norm.scale;
        let (an, bn) = (p[(0, 0)], p[(1, 0)]);
        let a = an * s;
        let b = bn * s;
        let tx = p[(2, 0)] - (a * norm.cx - b * norm.cy);
        let ty = p[(3, 0)] - (b * norm.cx + a * norm.cy);

        Some(Self { a, b, t: [tx, ty] })
    }

    #[inline]
    pub(crate) fn apply(&self, x: f64, y: f64) -> [f64; 2] {
        [
            self.a * x - self.b * y + self.t[0],
            self.b * x + self.a * y + self.t[1],
        ]
    }

    /// Uniform scale factor.
    pub(crate) fn scale(&self) -> f64 {
        self.a.hypot(self.b)
    }

    /// Rotation angle in radians.
    pub(crate) fn rotation(&self) -> f64 {
        self.b.atan2(self.a)
    }
}
