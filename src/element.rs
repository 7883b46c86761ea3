//! The bilinear quadrilateral element.
use itertools::Itertools;
use log::warn;
use nalgebra::{distance, Matrix1x4, Matrix2, Matrix2x4, Point2, Vector2};
use std::fmt;

/// The element map has a non-positive Jacobian determinant at some point.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct DegenerateElement {
    pub jacobian_det: f64,
}

impl fmt::Display for DegenerateElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "degenerate element: Jacobian determinant {:e} is not strictly positive",
            self.jacobian_det
        )
    }
}

impl std::error::Error for DegenerateElement {}

const MAX_INVERSE_MAP_ITERATIONS: usize = 20;

/// Bilinear (Q1) element on a quadrilateral.
///
/// Vertices are ordered counter-clockwise, starting with the vertex mapped from the reference
/// vertex `(-1, -1)`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Quad4Element {
    vertices: [Point2<f64>; 4],
}

impl Quad4Element {
    pub fn from_vertices(vertices: [Point2<f64>; 4]) -> Self {
        Self { vertices }
    }

    pub fn reference() -> Self {
        Self::from_vertices([
            Point2::new(-1.0, -1.0),
            Point2::new(1.0, -1.0),
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 1.0),
        ])
    }

    pub fn vertices(&self) -> &[Point2<f64>; 4] {
        &self.vertices
    }

    #[rustfmt::skip]
    pub fn evaluate_basis(&self, xi: &Point2<f64>) -> Matrix1x4<f64> {
        // N_{alpha, beta}([alpha, beta]) = 1 with alpha, beta = 1 or -1
        let phi = |alpha: f64, beta: f64| (1.0 + alpha * xi[0]) * (1.0 + beta * xi[1]) / 4.0;
        Matrix1x4::new(
            phi(-1.0, -1.0),
            phi( 1.0, -1.0),
            phi( 1.0,  1.0),
            phi(-1.0,  1.0),
        )
    }

    /// Gradients of the basis functions with respect to reference coordinates, one per column.
    #[rustfmt::skip]
    pub fn gradients(&self, xi: &Point2<f64>) -> Matrix2x4<f64> {
        let phi_grad = |alpha: f64, beta: f64| {
            Vector2::new(
                alpha * (1.0 + beta * xi[1]) / 4.0,
                beta * (1.0 + alpha * xi[0]) / 4.0,
            )
        };
        Matrix2x4::from_columns(&[
            phi_grad(-1.0, -1.0),
            phi_grad( 1.0, -1.0),
            phi_grad( 1.0,  1.0),
            phi_grad(-1.0,  1.0),
        ])
    }

    #[allow(non_snake_case)]
    fn coordinate_matrix(&self) -> Matrix2x4<f64> {
        Matrix2x4::from_fn(|i, j| self.vertices[j][i])
    }

    #[allow(non_snake_case)]
    pub fn map_reference_coords(&self, xi: &Point2<f64>) -> Point2<f64> {
        let X = self.coordinate_matrix();
        let N = self.evaluate_basis(xi);
        Point2::from(X * N.transpose())
    }

    #[allow(non_snake_case)]
    pub fn reference_jacobian(&self, xi: &Point2<f64>) -> Matrix2<f64> {
        let X = self.coordinate_matrix();
        let G = self.gradients(xi);
        X * G.transpose()
    }

    pub fn try_jacobian_det(&self, xi: &Point2<f64>) -> Result<f64, DegenerateElement> {
        let jacobian_det = self.reference_jacobian(xi).determinant();
        if jacobian_det > 0.0 {
            Ok(jacobian_det)
        } else {
            Err(DegenerateElement { jacobian_det })
        }
    }

    /// Basis gradients with respect to physical coordinates at `xi`, together with the
    /// Jacobian determinant.
    #[allow(non_snake_case)]
    pub fn physical_gradients(&self, xi: &Point2<f64>) -> Result<(Matrix2x4<f64>, f64), DegenerateElement> {
        let J = self.reference_jacobian(xi);
        let jacobian_det = J.determinant();
        let J_inv_t = J
            .try_inverse()
            .filter(|_| jacobian_det > 0.0)
            .ok_or(DegenerateElement { jacobian_det })?
            .transpose();
        Ok((J_inv_t * self.gradients(xi), jacobian_det))
    }

    /// Maps a physical point back to reference coordinates with Newton's method.
    ///
    /// For parallelograms (in particular axis-aligned rectangles) the map is affine and a
    /// single iteration is exact. If the iteration does not converge, the last iterate is returned
    /// and a warning is logged.
    pub fn map_physical_coordinates(&self, x: &Point2<f64>) -> Result<Point2<f64>, DegenerateElement> {
        let mut xi = Point2::origin();
        let tol = 1e-14 * self.diameter().max(1.0);
        for _ in 0..MAX_INVERSE_MAP_ITERATIONS {
            let residual = x - self.map_reference_coords(&xi);
            if residual.norm() <= tol {
                return Ok(xi);
            }
            let jacobian = self.reference_jacobian(&xi);
            let jacobian_det = jacobian.determinant();
            let step = jacobian
                .lu()
                .solve(&residual)
                .filter(|_| jacobian_det > 0.0)
                .ok_or(DegenerateElement { jacobian_det })?;
            xi += step;
        }
        let residual = (x - self.map_reference_coords(&xi)).norm();
        if residual > tol {
            warn!(
                "Inverse element map did not converge in {} iterations (residual {:e})",
                MAX_INVERSE_MAP_ITERATIONS, residual
            );
        }
        Ok(xi)
    }

    /// The largest distance between two vertices.
    pub fn diameter(&self) -> f64 {
        self.vertices
            .iter()
            .tuple_combinations()
            .map(|(x, y)| distance(x, y))
            .fold(0.0, f64::max)
    }
}
