//! Degree-of-freedom numbering for bilinear elements on a [`QuadTreeMesh`].
use crate::mesh::QuadTreeMesh;
use nalgebra::Point2;
use std::fmt;

/// An object derived from the mesh was used after the mesh changed.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StaleMeshState {
    pub built_for: u64,
    pub current: u64,
}

impl fmt::Display for StaleMeshState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "object built for mesh generation {} used with mesh generation {}",
            self.built_for, self.current
        )
    }
}

impl std::error::Error for StaleMeshState {}

/// One DoF per mesh vertex touched by an active cell.
///
/// DoFs are numbered in the order in which their vertices are first visited when traversing
/// active cells in order, and each cell's vertices counter-clockwise. Hanging vertices receive
/// a DoF like any other vertex and are later constrained.
#[derive(Debug, Clone)]
pub struct DofHandler {
    cell_dofs: Vec<[usize; 4]>,
    support_points: Vec<Point2<f64>>,
    vertex_dofs: Vec<Option<usize>>,
    boundary_dofs: Vec<usize>,
    generation: u64,
}

impl DofHandler {
    pub fn distribute(mesh: &QuadTreeMesh) -> Self {
        let mut vertex_dofs = vec![None; mesh.vertices().len()];
        let mut support_points = Vec::new();
        let mut boundary_dofs = Vec::new();
        let mut cell_dofs = Vec::with_capacity(mesh.num_active_cells());

        for &cell in mesh.active_cells() {
            let dofs = mesh.cell_vertices(cell).map(|v| {
                *vertex_dofs[v].get_or_insert_with(|| {
                    let dof = support_points.len();
                    support_points.push(mesh.vertices()[v]);
                    if mesh.vertex_on_boundary(v) {
                        boundary_dofs.push(dof);
                    }
                    dof
                })
            });
            cell_dofs.push(dofs);
        }

        Self {
            cell_dofs,
            support_points,
            vertex_dofs,
            boundary_dofs,
            generation: mesh.generation(),
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.support_points.len()
    }

    pub fn num_cells(&self) -> usize {
        self.cell_dofs.len()
    }

    /// DoFs of the active cell with the given active index, counter-clockwise from SW.
    pub fn cell_dofs(&self, active_index: usize) -> &[usize; 4] {
        &self.cell_dofs[active_index]
    }

    pub fn support_point(&self, dof: usize) -> &Point2<f64> {
        &self.support_points[dof]
    }

    pub fn support_points(&self) -> &[Point2<f64>] {
        &self.support_points
    }

    pub fn vertex_dof(&self, vertex: usize) -> Option<usize> {
        self.vertex_dofs.get(vertex).copied().flatten()
    }

    /// DoFs on the domain boundary, in increasing order.
    pub fn boundary_dofs(&self) -> &[usize] {
        &self.boundary_dofs
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn check_generation(&self, mesh: &QuadTreeMesh) -> Result<(), StaleMeshState> {
        if self.generation == mesh.generation() {
            Ok(())
        } else {
            Err(StaleMeshState {
                built_for: self.generation,
                current: mesh.generation(),
            })
        }
    }
}
