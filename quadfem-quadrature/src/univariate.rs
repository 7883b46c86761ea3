//! Quadrature rules for the one-dimensional domain `[-1, 1]`.

use crate::{Error, Rule};
use std::f64::consts::PI;

/// Upper bound on Newton iterations per root. Convergence from the initial guess takes a
/// handful of iterations for all practical `n`.
const MAX_NEWTON_ITERATIONS: usize = 100;

/// Recurrence relation for Legendre polynomials.
///
/// The derivative formula is *not* defined at |x| == 1, so it is only suitable for evaluation
/// in the open interval (-1, 1).
#[derive(Debug, Default)]
struct LegendreRecurrence {
    n: usize,
    x: f64,
    // p_n(x)
    p1: f64,
    // p_{n - 1}(x)
    p2: f64,
}

impl LegendreRecurrence {
    fn evaluate(n: usize, x: f64) -> Self {
        //  m P_m(x) = (2m - 1) * x P_{m - 1}(x) - (m - 1) P_{m - 2}(x)
        let mut p1 = 1.0;
        let mut p2 = 0.0;
        let mut p3;
        for m in 1..=n {
            let m = m as f64;
            p3 = p2;
            p2 = p1;
            p1 = ((2.0 * m - 1.0) * x * p2 - (m - 1.0) * p3) / m;
        }

        Self { n, x, p1, p2 }
    }

    fn value(&self) -> f64 {
        self.p1
    }

    fn derivative(&self) -> f64 {
        let Self { n, x, p1, p2 } = &self;
        let n = *n as f64;
        // dp_n/dx (x) = n * (x * p_n(x) - p_{n - 1}(x)) / (x^2 - 1)
        n * (x * p1 - p2) / (x * x - 1.0)
    }

    fn value_and_derivative(&self) -> (f64, f64) {
        (self.value(), self.derivative())
    }
}

/// Gauss quadrature for the reference interval [-1, 1].
///
/// Returns the [Gauss quadrature rule] with the given number of points. Given `n` points,
/// the rule integrates polynomials of order up to `2 n - 1` exactly. Points are sorted in
/// ascending order.
///
/// # Panics
///
/// Panics if zero points are requested.
///
/// [Gauss quadrature rule]: https://en.wikipedia.org/wiki/Gaussian_quadrature
pub fn gauss(num_points: usize) -> Rule<1> {
    match try_gauss(num_points) {
        Ok(rule) => rule,
        Err(err) => panic!("{}", err),
    }
}

/// Same as [`gauss`], but returns an error if zero points are requested.
pub fn try_gauss(num_points: usize) -> Result<Rule<1>, Error> {
    let n = num_points;
    if n == 0 {
        return Err(Error::InvalidNumberOfPoints { requested: n });
    }

    // Loosely based on the procedure used in
    // Numerical Recipes, The art of Scientific Computing, Third Edition (2007)
    let m = (n + 1) / 2;

    // Roots in descending order, only the first m (non-negative) ones
    let mut roots = Vec::with_capacity(m);
    let mut root_weights = Vec::with_capacity(m);
    for i in 0..m {
        let mut x = (PI * (i as f64 + 0.75) / (n as f64 + 0.5)).cos();
        let (mut p, mut dp) = LegendreRecurrence::evaluate(n, x).value_and_derivative();

        for _ in 0..MAX_NEWTON_ITERATIONS {
            let dx = -p / dp;
            x += dx;
            let (p_new, dp_new) = LegendreRecurrence::evaluate(n, x).value_and_derivative();
            p = p_new;
            dp = dp_new;
            if dx.abs() <= 1e-15 {
                break;
            }
        }

        roots.push(x);
        root_weights.push(2.0 / ((1.0 - x * x) * dp * dp));
    }

    // Negative roots first (mirrored), then the non-negative ones in ascending order
    let mut points = Vec::with_capacity(n);
    let mut weights = Vec::with_capacity(n);
    for i in 0..(n / 2) {
        points.push([-roots[i]]);
        weights.push(root_weights[i]);
    }
    for i in (0..m).rev() {
        points.push([roots[i]]);
        weights.push(root_weights[i]);
    }

    // For odd n the middle root is exactly zero by symmetry
    if n % 2 == 1 {
        points[n / 2] = [0.0];
    }

    debug_assert_eq!(points.len(), n, "Internal error: incorrect number of points produced");
    Ok((weights, points))
}

/// The two-point trapezoidal rule, i.e. the Gauss-Lobatto rule with the end points of the
/// interval as nodes. Exact for linear polynomials.
pub fn trapezoidal() -> Rule<1> {
    (vec![1.0, 1.0], vec![[-1.0], [1.0]])
}
