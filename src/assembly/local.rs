use crate::dofs::DofHandler;
use crate::element::{DegenerateElement, Quad4Element};
use crate::mesh::QuadTreeMesh;
use crate::problem::ScalarFunction;
use crate::quadrature::QuadratureRule2d;
use eyre::WrapErr;
use nalgebra::{DMatrix, DVector, Matrix1x4, Matrix2x4, Point2, Vector2, Vector4};

pub trait ElementConnectivityAssembler {
    fn num_elements(&self) -> usize;

    fn num_nodes(&self) -> usize;

    fn element_node_count(&self, element_index: usize) -> usize;

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize);
}

impl ElementConnectivityAssembler for DofHandler {
    fn num_elements(&self) -> usize {
        self.num_cells()
    }

    fn num_nodes(&self) -> usize {
        self.num_dofs()
    }

    fn element_node_count(&self, _element_index: usize) -> usize {
        4
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        output.copy_from_slice(self.cell_dofs(element_index));
    }
}

/// Computes the element-local matrix and vector of one element.
///
/// Implementations must be deterministic: the same element always produces bit-identical
/// output regardless of which scratch object is used.
pub trait ElementSystemAssembler: ElementConnectivityAssembler + Sync {
    fn as_connectivity_assembler(&self) -> &dyn ElementConnectivityAssembler;

    fn assemble_element_system_into(
        &self,
        element_index: usize,
        scratch: &mut CellScratch,
        copy_data: &mut CellCopyData,
    ) -> eyre::Result<()>;
}

/// Basis values, physical gradients and integration weights of one element at the points of a
/// quadrature rule.
///
/// Buffers are kept between calls to [`reinit`](Self::reinit), so that one instance can be
/// reused for all elements.
#[derive(Debug, Clone, Default)]
pub struct CellValues {
    points: Vec<Point2<f64>>,
    jxw: Vec<f64>,
    shape_values: Vec<Matrix1x4<f64>>,
    shape_gradients: Vec<Matrix2x4<f64>>,
}

impl CellValues {
    pub fn reinit(&mut self, element: &Quad4Element, rule: &QuadratureRule2d) -> Result<(), DegenerateElement> {
        self.points.clear();
        self.jxw.clear();
        self.shape_values.clear();
        self.shape_gradients.clear();
        for (w, xi) in rule.iter() {
            let (gradients, jacobian_det) = element.physical_gradients(xi)?;
            self.points.push(element.map_reference_coords(xi));
            self.jxw.push(w * jacobian_det);
            self.shape_values.push(element.evaluate_basis(xi));
            self.shape_gradients.push(gradients);
        }
        Ok(())
    }

    pub fn num_quadrature_points(&self) -> usize {
        self.jxw.len()
    }

    /// Quadrature points mapped to the physical element.
    pub fn quadrature_points(&self) -> &[Point2<f64>] {
        &self.points
    }

    pub fn jxw(&self, q: usize) -> f64 {
        self.jxw[q]
    }

    pub fn shape_value(&self, i: usize, q: usize) -> f64 {
        self.shape_values[q][i]
    }

    pub fn shape_grad(&self, i: usize, q: usize) -> Vector2<f64> {
        self.shape_gradients[q].column(i).into_owned()
    }

    /// Value at quadrature point `q` of the finite element function with the given local
    /// coefficients.
    pub fn value(&self, local: &Vector4<f64>, q: usize) -> f64 {
        (self.shape_values[q] * local)[0]
    }

    pub fn gradient(&self, local: &Vector4<f64>, q: usize) -> Vector2<f64> {
        self.shape_gradients[q] * local
    }
}

/// Per-worker transient state for local assembly.
#[derive(Debug, Clone, Default)]
pub struct CellScratch {
    pub values: CellValues,
}

/// The local contribution of one element: matrix, vector and the global DoF of each local
/// index.
#[derive(Debug, Clone)]
pub struct CellCopyData {
    pub matrix: DMatrix<f64>,
    pub vector: DVector<f64>,
    pub dof_indices: Vec<usize>,
}

impl Default for CellCopyData {
    fn default() -> Self {
        Self {
            matrix: DMatrix::zeros(0, 0),
            vector: DVector::zeros(0),
            dof_indices: Vec::new(),
        }
    }
}

impl CellCopyData {
    /// Resizes to `n` local DoFs and zeros all entries.
    pub fn reset(&mut self, n: usize) {
        self.matrix.resize_mut(n, n, 0.0);
        self.matrix.fill(0.0);
        self.vector.resize_vertically_mut(n, 0.0);
        self.vector.fill(0.0);
        self.dof_indices.resize(n, usize::MAX);
    }
}

/// Local assembly of the weak Laplace problem `(grad u, grad v) = (f, v)`.
pub struct LaplaceElementAssembler<'a, F> {
    mesh: &'a QuadTreeMesh,
    dofs: &'a DofHandler,
    source: &'a F,
    quadrature: QuadratureRule2d,
}

impl<'a, F: ScalarFunction> LaplaceElementAssembler<'a, F> {
    pub fn new(mesh: &'a QuadTreeMesh, dofs: &'a DofHandler, source: &'a F, quadrature: QuadratureRule2d) -> Self {
        Self {
            mesh,
            dofs,
            source,
            quadrature,
        }
    }

    pub fn element(&self, element_index: usize) -> Quad4Element {
        let cell = self.mesh.active_cells()[element_index];
        Quad4Element::from_vertices(self.mesh.cell_vertex_points(cell))
    }
}

impl<'a, F> ElementConnectivityAssembler for LaplaceElementAssembler<'a, F> {
    fn num_elements(&self) -> usize {
        self.dofs.num_elements()
    }

    fn num_nodes(&self) -> usize {
        self.dofs.num_nodes()
    }

    fn element_node_count(&self, element_index: usize) -> usize {
        self.dofs.element_node_count(element_index)
    }

    fn populate_element_nodes(&self, output: &mut [usize], element_index: usize) {
        self.dofs.populate_element_nodes(output, element_index)
    }
}

impl<'a, F: ScalarFunction> ElementSystemAssembler for LaplaceElementAssembler<'a, F> {
    fn as_connectivity_assembler(&self) -> &dyn ElementConnectivityAssembler {
        self
    }

    #[allow(non_snake_case)]
    fn assemble_element_system_into(
        &self,
        element_index: usize,
        scratch: &mut CellScratch,
        copy_data: &mut CellCopyData,
    ) -> eyre::Result<()> {
        let n = self.element_node_count(element_index);
        copy_data.reset(n);
        self.populate_element_nodes(&mut copy_data.dof_indices, element_index);

        let values = &mut scratch.values;
        values
            .reinit(&self.element(element_index), &self.quadrature)
            .wrap_err_with(|| format!("Singular element Jacobian encountered in element {}", element_index))?;

        for q in 0..values.num_quadrature_points() {
            let JxW = values.jxw(q);
            let f_q = self.source.value(&values.quadrature_points()[q]);
            for i in 0..n {
                let grad_i = values.shape_grad(i, q);
                for j in 0..n {
                    copy_data.matrix[(i, j)] += grad_i.dot(&values.shape_grad(j, q)) * JxW;
                }
                copy_data.vector[i] += values.shape_value(i, q) * f_q * JxW;
            }
        }
        Ok(())
    }
}
