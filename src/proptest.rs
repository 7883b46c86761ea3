//! Strategies for property-based testing with [`proptest`](::proptest).
use crate::mesh::QuadTreeMesh;
use ::proptest::collection::vec;
use ::proptest::prelude::*;
use nalgebra::Point2;

pub fn point2() -> impl Strategy<Value = Point2<f64>> {
    // Keep coordinates moderate so that lattice rounding is never the limiting factor
    let range = -10.0..10.0;
    [range.clone(), range.clone()].prop_map(|[x, y]| Point2::new(x, y))
}

/// Parameters for [`adaptively_refined_mesh`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefinedMeshParams {
    pub max_initial_refinements: usize,
    pub max_rounds: usize,
    pub max_cells_per_round: usize,
    pub max_level: u8,
}

impl Default for RefinedMeshParams {
    fn default() -> Self {
        Self {
            max_initial_refinements: 2,
            max_rounds: 3,
            max_cells_per_round: 4,
            max_level: 6,
        }
    }
}

/// Refines a mesh following a recorded sequence of cell selections.
///
/// Each round flags `active[s % n]` for every selector `s`, where `n` is the current number of
/// active cells. Flags on cells at the maximum level are ignored by the mesh.
pub fn refine_by_selectors(mesh: &mut QuadTreeMesh, rounds: &[Vec<usize>]) {
    for selectors in rounds {
        let active = mesh.active_cells().to_vec();
        for &s in selectors {
            let cell = active[s % active.len()];
            // Active cells can always be flagged
            let _ = mesh.set_refine_flag(cell);
        }
        mesh.execute_coarsening_and_refinement();
    }
}

/// Locally refined meshes of `[-1, 1]^2`, generally with hanging nodes.
pub fn adaptively_refined_mesh(params: RefinedMeshParams) -> impl Strategy<Value = QuadTreeMesh> {
    let selectors = vec(vec(0..usize::MAX, 1..=params.max_cells_per_round.max(1)), 0..=params.max_rounds);
    (0..=params.max_initial_refinements, selectors).prop_filter_map(
        "mesh construction failed",
        move |(initial, rounds)| {
            let mut mesh = QuadTreeMesh::hyper_cube(-1.0, 1.0)
                .and_then(|mesh| mesh.with_max_level(params.max_level))
                .ok()?;
            mesh.refine_global(initial);
            refine_by_selectors(&mut mesh, &rounds);
            Some(mesh)
        },
    )
}
