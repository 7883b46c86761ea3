//! Quadrature rules in the form used by element computations.
//!
//! Thin wrappers around [`quadfem_quadrature`] that store points as nalgebra points.
use nalgebra::{Point1, Point2};

/// Errors returned by quadrature methods.
pub use quadfem_quadrature::Error as QuadratureError;

/// A quadrature rule on a reference domain: weights and points in matching order.
#[derive(Debug, Clone, PartialEq)]
pub struct QuadratureRule<Point> {
    weights: Vec<f64>,
    points: Vec<Point>,
}

pub type QuadratureRule1d = QuadratureRule<Point1<f64>>;
pub type QuadratureRule2d = QuadratureRule<Point2<f64>>;

impl<Point> QuadratureRule<Point> {
    /// # Panics
    ///
    /// Panics if the number of weights and points differ.
    pub fn from_parts(weights: Vec<f64>, points: Vec<Point>) -> Self {
        assert_eq!(weights.len(), points.len(), "Weights and points must have the same length");
        Self { weights, points }
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, &Point)> {
        self.weights.iter().copied().zip(&self.points)
    }

    /// Approximates the integral of `f` over the reference domain.
    pub fn integrate(&self, f: impl Fn(&Point) -> f64) -> f64 {
        self.iter().map(|(w, p)| w * f(p)).sum()
    }
}

impl QuadratureRule2d {
    /// Tensor-product Gauss rule with `n` points per direction on `[-1, 1]^2`.
    pub fn gauss(n: usize) -> Result<Self, QuadratureError> {
        let (weights, points) = quadfem_quadrature::tensor::try_quadrilateral_gauss(n)?;
        Ok(Self::from_parts(weights, points.into_iter().map(Point2::from).collect()))
    }

    /// Tensor-product trapezoidal rule on `[-1, 1]^2`, i.e. the four vertices with unit weight.
    pub fn trapezoidal() -> Self {
        let (w, p) = quadfem_quadrature::univariate::trapezoidal();
        let (weights, points) = quadfem_quadrature::tensor::tensor_product(&w, &p);
        Self::from_parts(weights, points.into_iter().map(Point2::from).collect())
    }
}

impl QuadratureRule1d {
    /// Gauss rule with `n` points on `[-1, 1]`, used for integration over cell faces.
    pub fn face_gauss(n: usize) -> Result<Self, QuadratureError> {
        let (weights, points) = quadfem_quadrature::univariate::try_gauss(n)?;
        Ok(Self::from_parts(weights, points.into_iter().map(Point1::from).collect()))
    }
}
