use crate::unit_square_with_hanging_nodes;
use matrixcompare::assert_scalar_eq;
use nalgebra::DVector;
use quadfem::dofs::DofHandler;
use quadfem::estimate::{BoundaryFaces, KellyErrorEstimator};
use quadfem::mesh::QuadTreeMesh;
use quadfem::quadrature::QuadratureRule1d;
use util::vector_from_point_fn;

fn estimator() -> KellyErrorEstimator {
    KellyErrorEstimator::new(QuadratureRule1d::face_gauss(2).unwrap())
}

#[test]
fn default_skips_boundary_faces() {
    let estimator = estimator();
    assert_eq!(estimator.boundary_faces(), BoundaryFaces::Skip);
    assert_eq!(estimator.face_quadrature().len(), 2);
    let one_sided = estimator.with_boundary_faces(BoundaryFaces::OneSided);
    assert_eq!(one_sided.boundary_faces(), BoundaryFaces::OneSided);
}

#[test]
fn linear_field_has_no_jumps() {
    let mut mesh = QuadTreeMesh::hyper_cube(-1.0, 1.0).unwrap();
    mesh.refine_global(2);
    let dofs = DofHandler::distribute(&mesh);
    let u_h = vector_from_point_fn(dofs.support_points(), |p| 2.0 * p.x - p.y + 0.5);

    let eta = estimator().estimate(&mesh, &dofs, &u_h).unwrap();
    assert_eq!(eta.len(), mesh.num_active_cells());
    for value in eta {
        assert!(value.abs() < 1e-12);
    }
}

#[test]
fn linear_field_on_mesh_with_hanging_nodes_has_no_jumps() {
    let mesh = unit_square_with_hanging_nodes();
    let dofs = DofHandler::distribute(&mesh);
    let u_h = vector_from_point_fn(dofs.support_points(), |p| p.x + 3.0 * p.y);
    let eta = estimator().estimate(&mesh, &dofs, &u_h).unwrap();
    for value in eta {
        assert!(value.abs() < 1e-12);
    }
}

#[test]
fn kink_along_mesh_line() {
    let mut mesh = QuadTreeMesh::hyper_cube(-1.0, 1.0).unwrap();
    mesh.refine_global(2);
    let dofs = DofHandler::distribute(&mesh);
    let u_h = vector_from_point_fn(dofs.support_points(), |p| p.x.abs());

    let eta = estimator().estimate(&mesh, &dofs, &u_h).unwrap();
    // The normal derivative jumps by 2 across x = 0; each adjacent cell has one such face of
    // length 1/2 and diameter sqrt(2) / 2
    let expected = (2.0f64.sqrt() / 2.0 / 24.0 * 4.0 * 0.5).sqrt();
    for (k, &cell) in mesh.active_cells().iter().enumerate() {
        let (min, max) = mesh.cell_bounds(cell);
        if min.x == 0.0 || max.x == 0.0 {
            assert_scalar_eq!(eta[k], expected, comp = abs, tol = 1e-13);
        } else {
            assert!(eta[k].abs() < 1e-13);
        }
    }
}

#[test]
fn kink_across_refinement_levels() {
    // The kink at x = 0.5 runs along the hanging face of the refined cell
    let mesh = unit_square_with_hanging_nodes();
    let dofs = DofHandler::distribute(&mesh);
    let u_h = vector_from_point_fn(dofs.support_points(), |p| (p.x - 0.5).abs());
    let eta = estimator().estimate(&mesh, &dofs, &u_h).unwrap();

    let (coarse, fine) = (mesh.active_cells()[0], mesh.active_cells()[1]);
    let coarse_face = 4.0 * 0.5;
    let fine_face = 4.0 * 0.25;
    // The coarse cell collects both fine-side contributions of its east face
    let coarse_expected = (mesh.cell_diameter(coarse) / 24.0 * coarse_face).sqrt();
    let fine_expected = (mesh.cell_diameter(fine) / 24.0 * fine_face).sqrt();
    assert_scalar_eq!(eta[0], coarse_expected, comp = abs, tol = 1e-13);
    assert_scalar_eq!(eta[1], fine_expected, comp = abs, tol = 1e-13);
    assert_scalar_eq!(eta[3], fine_expected, comp = abs, tol = 1e-13);
    assert!(eta[2].abs() < 1e-13);
    assert!(eta[4].abs() < 1e-13);
}

#[test]
fn one_sided_boundary_faces() {
    let mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    let dofs = DofHandler::distribute(&mesh);
    let u_h = vector_from_point_fn(dofs.support_points(), |p| p.x);

    let skipped = estimator().estimate(&mesh, &dofs, &u_h).unwrap();
    assert_eq!(skipped, vec![0.0]);

    // Normal derivative +-1 on the two faces x = 0 and x = 1
    let one_sided = estimator()
        .with_boundary_faces(BoundaryFaces::OneSided)
        .estimate(&mesh, &dofs, &u_h)
        .unwrap();
    let expected = (2.0f64.sqrt() / 24.0 * 2.0).sqrt();
    assert_scalar_eq!(one_sided[0], expected, comp = abs, tol = 1e-14);
}

#[test]
fn invalid_inputs_are_rejected() {
    let mut mesh = unit_square_with_hanging_nodes();
    let dofs = DofHandler::distribute(&mesh);
    let short = DVector::zeros(dofs.num_dofs() - 1);
    assert!(estimator().estimate(&mesh, &dofs, &short).is_err());

    let u_h = DVector::zeros(dofs.num_dofs());
    mesh.refine_global(1);
    assert!(estimator().estimate(&mesh, &dofs, &u_h).is_err());
}
