//! Quadrature rules for the reference interval `[-1, 1]` and the reference quadrilateral
//! `[-1, 1]^2`.
//!
//! Rules are returned as plain `(weights, points)` pairs so that the crate can be used
//! independently of `quadfem`. Points are ordered deterministically (x-major for tensor rules),
//! which makes sums over quadrature points reproducible from run to run.

use std::fmt;
use std::fmt::{Display, Formatter};

pub mod tensor;
pub mod univariate;

/// Library-wide error type.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Error {
    /// The requested number of points does not define a rule (e.g. zero points).
    InvalidNumberOfPoints { requested: usize },
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidNumberOfPoints { requested } => {
                write!(f, "No quadrature rule with {} points per dimension is available", requested)
            }
        }
    }
}

impl std::error::Error for Error {}

/// A D-dimensional point.
pub type Point<const D: usize> = [f64; D];

/// A one-dimensional point.
pub type Point1 = Point<1>;

/// A two-dimensional point.
pub type Point2 = Point<2>;

/// A D-dimensional rule, stored as `(weights, points)`.
pub type Rule<const D: usize> = (Vec<f64>, Vec<Point<D>>);

/// A one-dimensional quadrature rule.
pub type Rule1d = Rule<1>;

/// A two-dimensional quadrature rule.
pub type Rule2d = Rule<2>;

/// Approximates the integral of `f` over the reference domain of `rule`.
///
/// Terms are summed in the order of the points in the rule.
pub fn integrate<const D: usize, F>(rule: &Rule<D>, f: F) -> f64
where
    F: Fn(&Point<D>) -> f64,
{
    let (weights, points) = rule;
    assert_eq!(weights.len(), points.len(), "Weights and points must have the same length");
    weights
        .iter()
        .zip(points)
        .map(|(w, x)| w * f(x))
        .fold(0.0, |acc, term| acc + term)
}
