//! A posteriori error estimation from jumps of the normal derivative across faces.
use crate::dofs::DofHandler;
use crate::element::Quad4Element;
use crate::mesh::{CellId, QuadTreeMesh, FACE_VERTICES, NUM_FACES};
use crate::quadrature::QuadratureRule1d;
use eyre::{eyre, WrapErr};
use nalgebra::{DVector, Point2, Vector2, Vector4};
use serde::{Deserialize, Serialize};

/// Treatment of faces on the domain boundary.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BoundaryFaces {
    /// Boundary faces contribute nothing. Appropriate for Dirichlet boundaries.
    #[default]
    Skip,
    /// Boundary faces contribute the square of the one-sided normal derivative.
    OneSided,
}

/// Kelly-type estimator: for each active cell `K`,
/// `eta_K^2 = sum over faces F of K of (h_K / 24) * int_F [du_h/dn]^2 ds`,
/// where `h_K` is the cell diameter and `[.]` the jump across the face.
///
/// A face shared by a coarse cell and two finer cells is integrated on the two fine sub-faces,
/// and each sub-face contributes to the cells on both of its sides.
///
/// Faces on the domain boundary are skipped by default: with Dirichlet data on the whole
/// boundary there is no Neumann flux to compare against. Use [`BoundaryFaces::OneSided`] for the
/// reduced one-sided contribution.
#[derive(Debug, Clone)]
pub struct KellyErrorEstimator {
    face_quadrature: QuadratureRule1d,
    boundary_faces: BoundaryFaces,
}

/// The outward unit normal of each local face.
const FACE_NORMALS: [[f64; 2]; NUM_FACES] = [[-1.0, 0.0], [1.0, 0.0], [0.0, -1.0], [0.0, 1.0]];

impl KellyErrorEstimator {
    pub fn new(face_quadrature: QuadratureRule1d) -> Self {
        Self {
            face_quadrature,
            boundary_faces: BoundaryFaces::default(),
        }
    }

    pub fn with_boundary_faces(self, boundary_faces: BoundaryFaces) -> Self {
        Self { boundary_faces, ..self }
    }

    pub fn boundary_faces(&self) -> BoundaryFaces {
        self.boundary_faces
    }

    pub fn face_quadrature(&self) -> &QuadratureRule1d {
        &self.face_quadrature
    }

    /// Computes `eta_K` for every active cell, in active-cell order.
    ///
    /// `solution` must hold values for all DoFs, including constrained ones.
    pub fn estimate(&self, mesh: &QuadTreeMesh, dofs: &DofHandler, solution: &DVector<f64>) -> eyre::Result<Vec<f64>> {
        dofs.check_generation(mesh)?;
        if solution.len() != dofs.num_dofs() {
            return Err(eyre!(
                "Solution vector has length {}, expected {}",
                solution.len(),
                dofs.num_dofs()
            ));
        }

        let mut eta_squared = vec![0.0; mesh.num_active_cells()];
        for (k, &cell) in mesh.active_cells().iter().enumerate() {
            let h_k = mesh.cell_diameter(cell);
            for face in 0..NUM_FACES {
                if mesh.is_boundary_face(cell, face) {
                    if self.boundary_faces == BoundaryFaces::OneSided {
                        let integral = self
                            .integrate_jump(mesh, dofs, solution, (cell, k), None, face)
                            .wrap_err_with(|| format!("Failed to integrate boundary face {} of cell {}", face, cell))?;
                        eta_squared[k] += h_k / 24.0 * integral;
                    }
                    continue;
                }

                let neighbors = mesh.face_neighbors(cell, face);
                let &[neighbor] = neighbors.as_slice() else {
                    // Finer neighbours: the face is handled from the fine side
                    continue;
                };
                let n = mesh
                    .active_index(neighbor)
                    .ok_or_else(|| eyre!("Face neighbor {} of cell {} is not active", neighbor, cell))?;
                let same_level = mesh.cell_level(neighbor) == mesh.cell_level(cell);
                // Faces between cells of equal level are visited twice, handle them once
                if same_level && n < k {
                    continue;
                }

                let integral = self
                    .integrate_jump(mesh, dofs, solution, (cell, k), Some((neighbor, n)), face)
                    .wrap_err_with(|| format!("Failed to integrate face {} of cell {}", face, cell))?;
                eta_squared[k] += h_k / 24.0 * integral;
                eta_squared[n] += mesh.cell_diameter(neighbor) / 24.0 * integral;
            }
        }

        Ok(eta_squared.into_iter().map(f64::sqrt).collect())
    }

    /// Integrates the squared jump of the normal derivative over the given face of `cell`.
    ///
    /// Without a neighbour, the one-sided normal derivative is integrated instead.
    fn integrate_jump(
        &self,
        mesh: &QuadTreeMesh,
        dofs: &DofHandler,
        solution: &DVector<f64>,
        (cell, k): (CellId, usize),
        neighbor: Option<(CellId, usize)>,
        face: usize,
    ) -> eyre::Result<f64> {
        let vertices = mesh.cell_vertex_points(cell);
        let [a, b] = FACE_VERTICES[face].map(|local| vertices[local]);
        let half_length = 0.5 * (b - a).norm();
        let normal = Vector2::from(FACE_NORMALS[face]);

        let inside = LocalField::new(vertices, dofs, solution, k);
        let outside = neighbor.map(|(neighbor, n)| LocalField::new(mesh.cell_vertex_points(neighbor), dofs, solution, n));

        let mut integral = 0.0;
        for (w, t) in self.face_quadrature.iter() {
            let x = Point2::from(a.coords.lerp(&b.coords, 0.5 * (t[0] + 1.0)));
            let mut jump = inside.gradient(&x)?.dot(&normal);
            if let Some(outside) = &outside {
                jump -= outside.gradient(&x)?.dot(&normal);
            }
            integral += w * half_length * jump * jump;
        }
        Ok(integral)
    }
}

/// The finite element solution restricted to one cell.
struct LocalField {
    element: Quad4Element,
    coefficients: Vector4<f64>,
}

impl LocalField {
    fn new(vertices: [Point2<f64>; 4], dofs: &DofHandler, solution: &DVector<f64>, active_index: usize) -> Self {
        let cell_dofs = dofs.cell_dofs(active_index);
        Self {
            element: Quad4Element::from_vertices(vertices),
            coefficients: Vector4::from_fn(|i, _| solution[cell_dofs[i]]),
        }
    }

    fn gradient(&self, x: &Point2<f64>) -> eyre::Result<Vector2<f64>> {
        let xi = self.element.map_physical_coordinates(x)?;
        let (gradients, _) = self.element.physical_gradients(&xi)?;
        Ok(gradients * self.coefficients)
    }
}
