//! Full bivariate polynomial models of order 1..=3.
//!
//! Each output axis is `Σ c_ij · x^i · y^j` over `i + j ≤ order`, evaluated on
//! normalized source coordinates so high-order monomials stay well scaled.

use nalgebra::DMatrix;

use super::linalg::{solve_least_squares, Normalization};

/// Number of monomials of total degree `≤ order`.
pub(crate) const fn term_count(order: u32) -> usize {
    let k = order as usize;
    (k + 1) * (k + 2) / 2
}

/// Fill `out` with monomials ordered by total degree, then by descending x power:
/// `1, x, y, x², xy, y², x³, …`.
fn monomials(order: u32, x: f64, y: f64, out: &mut [f64]) {
    let mut i = 0;
    for degree in 0..=order {
        for j in 0..=degree {
            out[i] = x.powi((degree - j) as i32) * y.powi(j as i32);
            i += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct PolynomialModel {
    pub order: u32,
    norm: Normalization,
    /// `[cx, cy]` per monomial.
    coeffs: Vec<[f64; 2]>,
}

impl PolynomialModel {
    pub(crate) fn fit(order: u32, src: &[[f64; 2]], dst: &[[f64; 2]]) -> Option<Self> {
        let m = term_count(order);
        let norm = Normalization::from_points(src);

        let mut a = DMatrix::<f64>::zeros(src.len(), m);
        let mut b = DMatrix::<f64>::zeros(src.len(), 2);
        let mut row = vec![0.0; m];
        for (i, (s, d)) in src.iter().zip(dst).enumerate() {
            let [x, y] = norm.apply(*s);
            monomials(order, x, y, &mut row);
            for (j, v) in row.iter().enumerate() {
                a[(i, j)] = *v;
            }
            b[(i, 0)] = d[0];
            b[(i, 1)] = d[1];
        }

        let x = solve_least_squares(a, &b)?;
        let coeffs = (0..m).map(|j| [x[(j, 0)], x[(j, 1)]]).collect();
        Some(Self {
            order,
            norm,
            coeffs,
        })
    }

    pub(crate) fn apply(&self, x: f64, y: f64) -> [f64; 2] {
        let [u, v] = self.norm.apply([x, y]);
        let mut terms = [0.0; term_count(3)];
        let terms = &mut terms[..self.coeffs.len()];
        monomials(self.order, u, v, terms);
        terms
            .iter()
            .zip(&self.coeffs)
            .fold([0.0, 0.0], |acc, (t, c)| [acc[0] + t * c[0], acc[1] + t * c[1]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::prelude::*;

    fn warp(p: [f64; 2]) -> [f64; 2] {
        let [x, y] = p;
        [
            3.0 + 1.1 * x - 0.2 * y + 0.001 * x * x + 0.0005 * x * y,
            -7.0 + 0.3 * x + 0.9 * y - 0.002 * y * y + 0.0001 * x * x,
        ]
    }

    #[test]
    fn term_counts_match_minimum_gcps() {
        assert_eq!(term_count(1), 3);
        assert_eq!(term_count(2), 6);
        assert_eq!(term_count(3), 10);
    }

    #[test]
    fn order2_reproduces_quadratic_warp_from_scattered_points() {
        let mut rng = StdRng::seed_from_u64(7);
        let src: Vec<[f64; 2]> = (0..25)
            .map(|_| [rng.gen_range(-100.0..100.0), rng.gen_range(-100.0..100.0)])
            .collect();
        let dst: Vec<[f64; 2]> = src.iter().map(|&p| warp(p)).collect();

        let m = PolynomialModel::fit(2, &src, &dst).unwrap();
        let probe = [12.5, -40.0];
        let got = m.apply(probe[0], probe[1]);
        let want = warp(probe);
        assert_relative_eq!(got[0], want[0], epsilon = 1e-8);
        assert_relative_eq!(got[1], want[1], epsilon = 1e-8);
    }

    #[test]
    fn order3_interpolates_exactly_at_minimum_count() {
        let mut rng = StdRng::seed_from_u64(11);
        let src: Vec<[f64; 2]> = (0..10)
            .map(|_| [rng.gen_range(0.0..50.0), rng.gen_range(0.0..50.0)])
            .collect();
        let dst: Vec<[f64; 2]> = src
            .iter()
            .map(|_| [rng.gen_range(0.0..50.0), rng.gen_range(0.0..50.0)])
            .collect();

        let m = PolynomialModel::fit(3, &src, &dst).unwrap();
        for (s, d) in src.iter().zip(&dst) {
            let p = m.apply(s[0], s[1]);
            assert_relative_eq!(p[0], d[0], epsilon = 1e-6);
            assert_relative_eq!(p[1], d[1], epsilon = 1e-6);
        }
    }

    #[test]
    fn collinear_points_are_rejected_for_order1() {
        let src = [[0.0, 0.0], [1.0, 1.0], [2.0, 2.0], [3.0, 3.0]];
        let dst = [[0.0, 1.0], [1.0, 2.0], [2.0, 3.0], [3.0, 4.0]];
        assert!(PolynomialModel::fit(1, &src, &dst).is_none());
    }

    #[test]
    fn order2_on_a_line_of_six_points_is_rejected() {
        let src: Vec<[f64; 2]> = (0..6).map(|i| [i as f64, 2.0 * i as f64]).collect();
        let dst = src.clone();
        assert!(PolynomialModel::fit(2, &src, &dst).is_none());
    }
}
