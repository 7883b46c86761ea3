use crate::unit_square_with_hanging_nodes;
use nalgebra::Point2;
use quadfem::mesh::{MeshError, QuadTreeMesh, RefinementSummary, NUM_FACES};

fn assert_balanced(mesh: &QuadTreeMesh) {
    for &cell in mesh.active_cells() {
        for face in 0..NUM_FACES {
            for neighbor in mesh.face_neighbors(cell, face) {
                let difference = mesh.cell_level(cell) as i32 - mesh.cell_level(neighbor) as i32;
                assert!(difference.abs() <= 1, "cells {} and {} are not balanced", cell, neighbor);
            }
        }
    }
}

#[test]
fn flags_on_inactive_cells_are_rejected() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    let root = mesh.active_cells()[0];
    mesh.refine_global(1);
    assert_eq!(mesh.set_refine_flag(root), Err(MeshError::InactiveCell { cell: root }));
    assert_eq!(mesh.set_coarsen_flag(root), Err(MeshError::InactiveCell { cell: root }));
}

#[test]
fn local_refinement_of_single_cell() {
    let mesh = unit_square_with_hanging_nodes();
    assert_eq!(mesh.generation(), 2);
    assert_eq!(mesh.num_active_cells(), 7);
    // 9 vertices of the 2 x 2 grid, plus the centre and four edge midpoints of the refined cell
    assert_eq!(mesh.vertices().len(), 14);
    let levels: Vec<_> = mesh.active_cells().iter().map(|&c| mesh.cell_level(c)).collect();
    assert_eq!(levels, vec![1, 2, 2, 2, 2, 1, 1]);
    assert_balanced(&mesh);
}

#[test]
fn refinement_enforces_face_balance() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    mesh.refine_global(1);

    let mut summaries = Vec::new();
    for _ in 0..2 {
        let cell = mesh.locate(&Point2::new(0.3, 0.3)).unwrap();
        mesh.set_refine_flag(cell).unwrap();
        summaries.push(mesh.execute_coarsening_and_refinement());
    }
    assert_balanced(&mesh);
    let cell = mesh.locate(&Point2::new(0.3, 0.3)).unwrap();
    assert_eq!(mesh.cell_level(cell), 3);

    // The second refinement first splits the coarser east and north neighbours
    assert_eq!(summaries[0].refined, 1);
    assert_eq!(summaries[1].refined, 3);
    assert_eq!(mesh.num_active_cells(), 16);
    let total: f64 = mesh.active_cells().iter().map(|&c| mesh.cell_measure(c)).sum();
    assert!((total - 1.0).abs() < 1e-14);
}

#[test]
fn refinement_is_clamped_at_max_level() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0)
        .unwrap()
        .with_max_level(1)
        .unwrap();
    mesh.refine_global(1);
    let summary = mesh.refine_global(2);
    assert_eq!(summary.refined, 0);
    assert_eq!(summary.clamped, 8);
    assert_eq!(mesh.num_active_cells(), 4);
    for &cell in mesh.active_cells() {
        assert_eq!(mesh.cell_level(cell), 1);
        assert!(!mesh.cell(cell).refine_flag());
    }
}

#[test]
fn complete_family_is_coarsened() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    let root = mesh.active_cells()[0];
    mesh.refine_global(1);
    for cell in mesh.active_cells().to_vec() {
        mesh.set_coarsen_flag(cell).unwrap();
    }
    let summary = mesh.execute_coarsening_and_refinement();
    assert_eq!(
        summary,
        RefinementSummary {
            coarsened: 1,
            ..RefinementSummary::default()
        }
    );
    assert_eq!(mesh.active_cells(), &[root]);
    assert!(mesh.cell(root).is_active());
}

#[test]
fn incomplete_family_is_not_coarsened() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    mesh.refine_global(1);
    for cell in mesh.active_cells()[..3].to_vec() {
        mesh.set_coarsen_flag(cell).unwrap();
    }
    let summary = mesh.execute_coarsening_and_refinement();
    assert_eq!(summary.coarsened, 0);
    assert_eq!(summary.coarsening_skipped, 1);
    assert_eq!(mesh.num_active_cells(), 4);
    // Flags are cleared after execution
    for &cell in mesh.active_cells() {
        assert!(!mesh.cell(cell).coarsen_flag());
    }
}

#[test]
fn coarsening_that_breaks_balance_is_skipped() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    mesh.refine_global(1);
    for _ in 0..2 {
        let cell = mesh.locate(&Point2::new(0.3, 0.3)).unwrap();
        mesh.set_refine_flag(cell).unwrap();
        mesh.execute_coarsening_and_refinement();
    }
    let num_cells = mesh.num_active_cells();

    // Merging the children of the south-east or north-west quadrant would put a level 1 cell
    // next to level 3 cells
    let in_quadrant = |c, x: f64, y: f64| {
        let (min, max) = mesh.cell_bounds(c);
        min.x >= x && max.x <= x + 0.5 && min.y >= y && max.y <= y + 0.5
    };
    let flagged: Vec<_> = mesh
        .active_cells()
        .iter()
        .copied()
        .filter(|&c| in_quadrant(c, 0.5, 0.0) || in_quadrant(c, 0.0, 0.5))
        .collect();
    assert_eq!(flagged.len(), 8);
    for cell in flagged {
        mesh.set_coarsen_flag(cell).unwrap();
    }

    let summary = mesh.execute_coarsening_and_refinement();
    assert_eq!(summary.coarsened, 0);
    assert_eq!(summary.coarsening_skipped, 2);
    assert_eq!(mesh.num_active_cells(), num_cells);
    assert_balanced(&mesh);
}

#[test]
fn generation_increments_on_every_execution() {
    let mut mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    assert_eq!(mesh.generation(), 0);
    mesh.execute_coarsening_and_refinement();
    assert_eq!(mesh.generation(), 1);
    mesh.refine_global(2);
    assert_eq!(mesh.generation(), 3);
}
