//! 2D quadrature rules formed by tensor products of 1D rules.

use crate::univariate::{gauss, try_gauss};
use crate::{Error, Rule};

/// A Gauss quadrature rule for the reference quadrilateral `[-1, 1]^2`.
///
/// The rule is the tensor product of two [`gauss`] rules with the provided number of points
/// per dimension, ordered with the x-coordinate varying slowest.
///
/// # Panics
///
/// Panics if zero points are requested.
pub fn quadrilateral_gauss(num_points_per_dim: usize) -> Rule<2> {
    let n = num_points_per_dim;
    let (weights1d, points1d) = gauss(n);
    tensor_product(&weights1d, &points1d)
}

/// Same as [`quadrilateral_gauss`], but returns an error instead of panicking.
pub fn try_quadrilateral_gauss(num_points_per_dim: usize) -> Result<Rule<2>, Error> {
    let (weights1d, points1d) = try_gauss(num_points_per_dim)?;
    Ok(tensor_product(&weights1d, &points1d))
}

/// Forms the tensor product of a 1D rule with itself.
pub fn tensor_product(weights1d: &[f64], points1d: &[[f64; 1]]) -> Rule<2> {
    let n = weights1d.len();
    let mut weights2d = Vec::with_capacity(n * n);
    let mut points2d = Vec::with_capacity(n * n);

    let rule1d_iter = || weights1d.iter().zip(points1d);

    for (&wx, &[x]) in rule1d_iter() {
        for (&wy, &[y]) in rule1d_iter() {
            weights2d.push(wx * wy);
            points2d.push([x, y]);
        }
    }

    (weights2d, points2d)
}
