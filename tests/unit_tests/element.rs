use matrixcompare::{assert_matrix_eq, assert_scalar_eq};
use nalgebra::{Matrix2, Point2};
use proptest::prelude::*;
use quadfem::element::Quad4Element;

fn rectangle(min: [f64; 2], max: [f64; 2]) -> Quad4Element {
    Quad4Element::from_vertices([
        Point2::new(min[0], min[1]),
        Point2::new(max[0], min[1]),
        Point2::new(max[0], max[1]),
        Point2::new(min[0], max[1]),
    ])
}

#[test]
fn basis_functions_are_nodal() {
    let element = Quad4Element::reference();
    for (i, vertex) in element.vertices().iter().enumerate() {
        let phi = element.evaluate_basis(vertex);
        for j in 0..4 {
            assert_eq!(phi[j], if i == j { 1.0 } else { 0.0 });
        }
    }
}

#[test]
fn rectangle_jacobian_is_diagonal() {
    let element = rectangle([1.0, 2.0], [3.0, 2.5]);
    let xi = Point2::new(0.3, -0.7);
    let jacobian = element.reference_jacobian(&xi);
    assert_matrix_eq!(jacobian, Matrix2::new(1.0, 0.0, 0.0, 0.25), comp = abs, tol = 1e-14);
    assert_scalar_eq!(element.try_jacobian_det(&xi).unwrap(), 0.25, comp = abs, tol = 1e-14);
    assert_scalar_eq!(element.diameter(), (4.0f64 + 0.25).sqrt(), comp = abs, tol = 1e-14);
}

#[test]
fn physical_gradients_of_bilinear_function() {
    // u(x, y) = 2 + 3x - y + xy interpolated at the vertices is reproduced exactly
    let element = rectangle([0.0, 0.0], [2.0, 1.0]);
    let u = |p: &Point2<f64>| 2.0 + 3.0 * p.x - p.y + p.x * p.y;
    let coefficients = nalgebra::Vector4::from_fn(|i, _| u(&element.vertices()[i]));

    let xi = Point2::new(0.5, 0.25);
    let x = element.map_reference_coords(&xi);
    let (gradients, jacobian_det) = element.physical_gradients(&xi).unwrap();
    assert_scalar_eq!(jacobian_det, 0.5, comp = abs, tol = 1e-14);

    let gradient = gradients * coefficients;
    assert_scalar_eq!(gradient[0], 3.0 + x.y, comp = abs, tol = 1e-13);
    assert_scalar_eq!(gradient[1], -1.0 + x.x, comp = abs, tol = 1e-13);
}

#[test]
fn inverted_element_is_degenerate() {
    let element = Quad4Element::from_vertices([
        Point2::new(0.0, 0.0),
        Point2::new(0.0, 1.0),
        Point2::new(1.0, 1.0),
        Point2::new(1.0, 0.0),
    ]);
    let err = element.physical_gradients(&Point2::origin()).unwrap_err();
    assert_scalar_eq!(err.jacobian_det, -0.25, comp = abs, tol = 1e-14);
    assert!(element.try_jacobian_det(&Point2::origin()).is_err());
}

#[test]
fn inverse_map_of_distorted_quad() {
    // Not a parallelogram, so the Newton iteration needs several steps
    let element = Quad4Element::from_vertices([
        Point2::new(0.0, 0.0),
        Point2::new(2.0, 0.0),
        Point2::new(1.5, 1.8),
        Point2::new(0.2, 1.0),
    ]);
    for xi in [[0.6, -0.3], [-0.9, 0.9], [0.99, 0.99], [0.0, 0.0]] {
        let xi = Point2::from(xi);
        let x = element.map_reference_coords(&xi);
        let recovered = element.map_physical_coordinates(&x).unwrap();
        assert!((recovered - xi).norm() < 1e-12, "{} recovered as {}", xi, recovered);
    }
}

proptest! {
    #[test]
    fn basis_is_partition_of_unity(xi in [-1.0..=1.0, -1.0..=1.0]) {
        let element = Quad4Element::reference();
        let xi = Point2::from(xi);
        prop_assert!((element.evaluate_basis(&xi).sum() - 1.0).abs() < 1e-14);
        let gradient_sum = element.gradients(&xi).column_sum();
        prop_assert!(gradient_sum.norm() < 1e-14);
    }

    #[test]
    fn inverse_map_recovers_reference_coords(
        xi in [-1.0..=1.0, -1.0..=1.0],
        min in [-5.0..5.0, -5.0..5.0],
        extents in [0.1..3.0, 0.1..3.0],
    ) {
        let element = rectangle(min, [min[0] + extents[0], min[1] + extents[1]]);
        let xi = Point2::from(xi);
        let x = element.map_reference_coords(&xi);
        let recovered = element.map_physical_coordinates(&x).unwrap();
        prop_assert!((recovered - xi).norm() < 1e-12);
    }
}
