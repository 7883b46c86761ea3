use crate::unit_square_with_hanging_nodes;
use matrixcompare::assert_scalar_eq;
use nalgebra::Point2;
use proptest::prelude::*;
use quadfem::mesh::{MeshError, QuadTreeMesh, MAX_LEVEL, NUM_FACES};
use quadfem::proptest::{adaptively_refined_mesh, point2, RefinedMeshParams};
use util::assert_panics;

#[test]
fn hyper_cube_is_single_coarse_cell() {
    let mesh = QuadTreeMesh::hyper_cube(-1.0, 1.0).unwrap();
    assert_eq!(mesh.num_active_cells(), 1);
    assert_eq!(mesh.vertices().len(), 4);
    assert_eq!(mesh.domain_measure(), 4.0);

    let cell = mesh.active_cells()[0];
    assert_eq!(mesh.cell_level(cell), 0);
    assert_eq!(
        mesh.cell_vertex_points(cell),
        [
            Point2::new(-1.0, -1.0),
            Point2::new(1.0, -1.0),
            Point2::new(1.0, 1.0),
            Point2::new(-1.0, 1.0)
        ]
    );
    for face in 0..NUM_FACES {
        assert!(mesh.is_boundary_face(cell, face));
        assert!(mesh.face_neighbors(cell, face).is_empty());
    }
}

#[test]
fn invalid_domains_are_rejected() {
    assert_eq!(QuadTreeMesh::hyper_cube(1.0, 1.0).unwrap_err(), MeshError::InvalidDomain);
    assert_eq!(QuadTreeMesh::hyper_cube(1.0, -1.0).unwrap_err(), MeshError::InvalidDomain);
    assert_eq!(QuadTreeMesh::hyper_cube(0.0, f64::NAN).unwrap_err(), MeshError::InvalidDomain);
    assert_eq!(
        QuadTreeMesh::hyper_rectangle(Point2::origin(), Point2::new(1.0, 1.0), [0, 2]).unwrap_err(),
        MeshError::InvalidSubdivisions { nx: 0, ny: 2 }
    );
    assert_eq!(
        QuadTreeMesh::hyper_cube(0.0, 1.0)
            .unwrap()
            .with_max_level(MAX_LEVEL + 1)
            .unwrap_err(),
        MeshError::InvalidMaxLevel {
            requested: MAX_LEVEL + 1
        }
    );
}

#[test]
fn global_refinement_counts() {
    let mut mesh = QuadTreeMesh::hyper_cube(-1.0, 1.0).unwrap();
    let summary = mesh.refine_global(3);
    assert_eq!(summary.refined, 1 + 4 + 16);
    assert_eq!(mesh.num_active_cells(), 64);
    assert_eq!(mesh.vertices().len(), 81);
    assert_eq!(mesh.generation(), 3);
    for &cell in mesh.active_cells() {
        assert_eq!(mesh.cell_level(cell), 3);
        assert_scalar_eq!(mesh.cell_measure(cell), 4.0 / 64.0, comp = abs, tol = 1e-14);
        assert_scalar_eq!(mesh.cell_diameter(cell), 0.25 * 2.0f64.sqrt(), comp = abs, tol = 1e-14);
    }
}

#[test]
fn active_cells_are_in_z_order() {
    let mut mesh = QuadTreeMesh::hyper_rectangle(Point2::origin(), Point2::new(1.0, 1.0), [1, 1]).unwrap();
    mesh.refine_global(1);
    let lower_left_corners: Vec<_> = mesh
        .active_cells()
        .iter()
        .map(|&cell| mesh.cell_bounds(cell).0)
        .collect();
    assert_eq!(
        lower_left_corners,
        vec![
            Point2::new(0.0, 0.0),
            Point2::new(0.5, 0.0),
            Point2::new(0.0, 0.5),
            Point2::new(0.5, 0.5)
        ]
    );
    for (index, &cell) in mesh.active_cells().iter().enumerate() {
        assert_eq!(mesh.active_index(cell), Some(index));
    }
}

#[test]
fn coarse_grid_of_several_roots() {
    let mut mesh = QuadTreeMesh::hyper_rectangle(Point2::origin(), Point2::new(3.0, 2.0), [3, 2]).unwrap();
    assert_eq!(mesh.num_active_cells(), 6);
    assert_eq!(mesh.vertices().len(), 12);
    mesh.refine_global(1);
    assert_eq!(mesh.num_active_cells(), 24);
    let total: f64 = mesh.active_cells().iter().map(|&c| mesh.cell_measure(c)).sum();
    assert_scalar_eq!(total, 6.0, comp = abs, tol = 1e-12);

    // The east face of the first root's NE child lies inside the domain
    let cell = mesh.locate(&Point2::new(0.75, 0.75)).unwrap();
    let neighbors = mesh.face_neighbors(cell, 1);
    assert_eq!(neighbors.len(), 1);
    assert_eq!(mesh.cell_bounds(neighbors[0]).0, Point2::new(1.0, 0.5));
}

#[test]
fn face_neighbors_across_levels() {
    let mesh = unit_square_with_hanging_nodes();
    assert_eq!(mesh.num_active_cells(), 7);

    let south_west = mesh.active_cells()[0];
    assert!(mesh.is_boundary_face(south_west, 0));
    assert!(mesh.is_boundary_face(south_west, 2));
    assert!(!mesh.is_boundary_face(south_west, 1));

    // Two finer neighbours across the east face, ordered by increasing y
    let east = mesh.face_neighbors(south_west, 1);
    assert_eq!(east.len(), 2);
    assert_eq!(mesh.cell_bounds(east[0]).0, Point2::new(0.5, 0.0));
    assert_eq!(mesh.cell_bounds(east[1]).0, Point2::new(0.5, 0.25));
    for &fine in &east {
        assert_eq!(mesh.cell_level(fine), 2);
        // Seen from the fine side, the coarse cell is the only neighbour
        assert_eq!(mesh.face_neighbors(fine, 0), vec![south_west]);
    }

    // Same-level neighbour across the north face
    let north = mesh.face_neighbors(south_west, 3);
    assert_eq!(north.len(), 1);
    assert_eq!(mesh.cell_bounds(north[0]).0, Point2::new(0.0, 0.5));
}

#[test]
fn locate_points() {
    let mesh = unit_square_with_hanging_nodes();
    let located = |x: f64, y: f64| mesh.locate(&Point2::new(x, y)).map(|cell| mesh.cell_bounds(cell));

    assert_eq!(located(0.1, 0.1), Some((Point2::new(0.0, 0.0), Point2::new(0.5, 0.5))));
    assert_eq!(located(0.6, 0.1), Some((Point2::new(0.5, 0.0), Point2::new(0.75, 0.25))));
    assert_eq!(located(0.9, 0.4), Some((Point2::new(0.75, 0.25), Point2::new(1.0, 0.5))));
    // The upper boundary belongs to the adjacent cells
    assert_eq!(located(1.0, 1.0), Some((Point2::new(0.5, 0.5), Point2::new(1.0, 1.0))));
    assert_eq!(located(1.5, 0.5), None);
    assert_eq!(located(-0.1, 0.5), None);
}

#[test]
fn boundary_vertices() {
    let mesh = unit_square_with_hanging_nodes();
    let on_boundary = |p: &Point2<f64>| p.x == 0.0 || p.y == 0.0 || p.x == 1.0 || p.y == 1.0;
    for (index, vertex) in mesh.vertices().iter().enumerate() {
        assert_eq!(mesh.vertex_on_boundary(index), on_boundary(vertex), "vertex {}", vertex);
    }
}

#[test]
fn invalid_face_index_panics() {
    let mesh = QuadTreeMesh::hyper_cube(0.0, 1.0).unwrap();
    let cell = mesh.active_cells()[0];
    assert_panics!(mesh.is_boundary_face(cell, NUM_FACES));
    assert_panics!(mesh.face_neighbors(cell, NUM_FACES));
}

proptest! {
    #[test]
    fn located_cells_contain_the_point(
        mesh in adaptively_refined_mesh(RefinedMeshParams::default()),
        point in point2(),
    ) {
        let inside = point.x.abs() <= 1.0 && point.y.abs() <= 1.0;
        match mesh.locate(&point) {
            Some(cell) => {
                prop_assert!(inside);
                prop_assert!(mesh.cell(cell).is_active());
                let (min, max) = mesh.cell_bounds(cell);
                prop_assert!(min.x <= point.x && point.x <= max.x);
                prop_assert!(min.y <= point.y && point.y <= max.y);
            }
            None => prop_assert!(!inside),
        }
    }

    #[test]
    fn active_cells_partition_the_domain(mesh in adaptively_refined_mesh(RefinedMeshParams::default())) {
        let total: f64 = mesh.active_cells().iter().map(|&cell| mesh.cell_measure(cell)).sum();
        prop_assert!((total - mesh.domain_measure()).abs() <= 1e-12);

        // Each cell's centre locates to the cell itself
        for &cell in mesh.active_cells() {
            let (min, max) = mesh.cell_bounds(cell);
            let centre = Point2::from((min.coords + max.coords) / 2.0);
            prop_assert_eq!(mesh.locate(&centre), Some(cell));
        }
    }

    #[test]
    fn refined_meshes_are_face_balanced(mesh in adaptively_refined_mesh(RefinedMeshParams::default())) {
        for &cell in mesh.active_cells() {
            let level = mesh.cell_level(cell) as i32;
            for face in 0..NUM_FACES {
                let neighbors = mesh.face_neighbors(cell, face);
                prop_assert!(neighbors.len() <= 2);
                prop_assert_eq!(neighbors.is_empty(), mesh.is_boundary_face(cell, face));
                for neighbor in neighbors {
                    prop_assert!((mesh.cell_level(neighbor) as i32 - level).abs() <= 1);
                }
            }
        }
    }
}
