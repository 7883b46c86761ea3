use crate::unit_square_with_hanging_nodes;
use matrixcompare::assert_scalar_eq;
use nalgebra::{DVector, Point2, Vector2};
use quadfem::dofs::DofHandler;
use quadfem::error::{compute_mean_value, compute_mean_value_nodal, global_norm, integrate_difference, NormType};
use quadfem::mesh::QuadTreeMesh;
use quadfem::problem::{ExactSolution, ExpProduct, ScalarFunction, Zero};
use quadfem::quadrature::QuadratureRule2d;
use util::vector_from_point_fn;

/// `u = 1 + x y - 2 y`, contained in the Q1 space.
struct Bilinear;

impl ScalarFunction for Bilinear {
    fn value(&self, x: &Point2<f64>) -> f64 {
        1.0 + x.x * x.y - 2.0 * x.y
    }
}

impl ExactSolution for Bilinear {
    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64> {
        Vector2::new(x.y, x.x - 2.0)
    }

    fn source(&self, _x: &Point2<f64>) -> f64 {
        0.0
    }
}

fn gauss(points: usize) -> QuadratureRule2d {
    QuadratureRule2d::gauss(points).unwrap()
}

#[test]
fn global_norm_is_euclidean() {
    assert_eq!(global_norm(&[]), 0.0);
    assert_eq!(global_norm(&[3.0, 4.0]), 5.0);
}

#[test]
fn constant_error() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    mesh.refine_global(2);
    let dofs = DofHandler::distribute(&mesh);
    let u_h = DVector::repeat(dofs.num_dofs(), 2.0);

    let l2 = integrate_difference(&mesh, &dofs, &u_h, &Zero, &gauss(3), NormType::L2).unwrap();
    assert_eq!(l2.len(), 16);
    for &e in &l2 {
        assert_scalar_eq!(e, 0.5, comp = abs, tol = 1e-14);
    }
    assert_scalar_eq!(global_norm(&l2), 2.0, comp = abs, tol = 1e-14);

    let semi = integrate_difference(&mesh, &dofs, &u_h, &Zero, &gauss(3), NormType::H1Seminorm).unwrap();
    assert!(semi.iter().all(|&e| e == 0.0));
    let h1 = integrate_difference(&mesh, &dofs, &u_h, &Zero, &gauss(3), NormType::H1).unwrap();
    assert_scalar_eq!(global_norm(&h1), 2.0, comp = abs, tol = 1e-14);
}

#[test]
fn norms_of_exact_solution() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    mesh.refine_global(3);
    let dofs = DofHandler::distribute(&mesh);
    let u_h = DVector::zeros(dofs.num_dofs());
    let norm = |norm_type| {
        global_norm(&integrate_difference(&mesh, &dofs, &u_h, &ExpProduct, &gauss(3), norm_type).unwrap())
    };

    // int_0^1 int_0^1 exp(2x) exp(2y) = ((e^2 - 1) / 2)^2
    let l2 = (1.0f64.exp().powi(2) - 1.0) / 2.0;
    assert_scalar_eq!(norm(NormType::L2), l2, comp = abs, tol = 1e-8);
    assert_scalar_eq!(norm(NormType::H1Seminorm), 2.0f64.sqrt() * l2, comp = abs, tol = 1e-8);
    assert_scalar_eq!(norm(NormType::H1), 3.0f64.sqrt() * l2, comp = abs, tol = 1e-8);
}

#[test]
fn interpolated_bilinear_function_has_no_error() {
    let mesh = unit_square_with_hanging_nodes();
    let dofs = DofHandler::distribute(&mesh);
    let u_h = vector_from_point_fn(dofs.support_points(), |p| Bilinear.value(p));

    for norm in [NormType::L2, NormType::H1Seminorm, NormType::H1] {
        let errors = integrate_difference(&mesh, &dofs, &u_h, &Bilinear, &gauss(3), norm).unwrap();
        assert_eq!(errors.len(), mesh.num_active_cells());
        assert!(global_norm(&errors) < 1e-13, "{:?}", norm);
    }
}

#[test]
fn mean_value_schemes_agree() {
    let mesh = unit_square_with_hanging_nodes();
    let dofs = DofHandler::distribute(&mesh);
    let u_h = vector_from_point_fn(dofs.support_points(), |p| ExpProduct.value(p));

    let quadrature = compute_mean_value(&mesh, &dofs, &u_h, &gauss(2)).unwrap();
    let nodal = compute_mean_value_nodal(&mesh, &dofs, &u_h).unwrap();
    assert_scalar_eq!(quadrature, nodal, comp = abs, tol = 1e-14);

    let constant = DVector::repeat(dofs.num_dofs(), 3.0);
    assert_scalar_eq!(
        compute_mean_value(&mesh, &dofs, &constant, &gauss(2)).unwrap(),
        3.0,
        comp = abs,
        tol = 1e-14
    );
    assert_scalar_eq!(compute_mean_value_nodal(&mesh, &dofs, &constant).unwrap(), 3.0, comp = abs, tol = 1e-14);
}

#[test]
fn invalid_inputs_are_rejected() {
    let mut mesh = unit_square_with_hanging_nodes();
    let dofs = DofHandler::distribute(&mesh);
    let short = DVector::zeros(dofs.num_dofs() - 1);
    assert!(integrate_difference(&mesh, &dofs, &short, &Zero, &gauss(3), NormType::L2).is_err());
    assert!(compute_mean_value(&mesh, &dofs, &short, &gauss(2)).is_err());
    assert!(compute_mean_value_nodal(&mesh, &dofs, &short).is_err());

    let u_h = DVector::zeros(dofs.num_dofs());
    mesh.refine_global(1);
    assert!(integrate_difference(&mesh, &dofs, &u_h, &Zero, &gauss(3), NormType::H1).is_err());
    assert!(compute_mean_value_nodal(&mesh, &dofs, &u_h).is_err());
}
