use crate::assembly::local::{CellCopyData, CellScratch, ElementConnectivityAssembler, ElementSystemAssembler};
use crate::constraints::AffineConstraints;
use crate::dofs::DofHandler;
use crate::mesh::QuadTreeMesh;
use eyre::{eyre, WrapErr};
use nalgebra::DVector;
use nalgebra_sparse::pattern::SparsityPattern;
use nalgebra_sparse::CsrMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::collections::BTreeSet;
use thread_local::ThreadLocal;

/// A global linear system `A u = b` for a fixed DoF numbering.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearSystem {
    pub matrix: CsrMatrix<f64>,
    pub rhs: DVector<f64>,
    generation: u64,
}

impl LinearSystem {
    /// The mesh generation the system was assembled for.
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Builds a CSR sparsity pattern from a set of `(row, col)` entries.
fn pattern_from_entries(num_rows: usize, matrix_entries: BTreeSet<(usize, usize)>) -> eyre::Result<SparsityPattern> {
    let mut offsets = Vec::with_capacity(num_rows + 1);
    let mut column_indices = Vec::with_capacity(matrix_entries.len());

    offsets.push(0);
    for (i, j) in matrix_entries {
        while i + 1 > offsets.len() {
            // Reached a new row. Loop to correctly handle consecutive empty rows
            offsets.push(column_indices.len());
        }
        column_indices.push(j);
    }

    // Fill out the remaining offsets if the last rows are empty
    while offsets.len() < (num_rows + 1) {
        offsets.push(column_indices.len());
    }

    SparsityPattern::try_from_offsets_and_indices(num_rows, num_rows, offsets, column_indices)
        .map_err(|err| eyre!("Invalid sparsity pattern: {}", err))
}

/// Sparsity pattern of the system assembled without any constraints.
pub fn assemble_pattern(element_assembler: &dyn ElementConnectivityAssembler) -> eyre::Result<SparsityPattern> {
    // Collecting into a BTreeSet stores each matrix entry exactly once
    let mut matrix_entries = BTreeSet::new();
    let mut element_global_nodes = Vec::new();
    for i in 0..element_assembler.num_elements() {
        element_global_nodes.resize(element_assembler.element_node_count(i), usize::MAX);
        element_assembler.populate_element_nodes(&mut element_global_nodes, i);

        for &node_i in &element_global_nodes {
            for &node_j in &element_global_nodes {
                matrix_entries.insert((node_i, node_j));
            }
        }
    }
    pattern_from_entries(element_assembler.num_nodes(), matrix_entries)
}

/// Sparsity pattern of the condensed system: couplings of constrained DoFs are redirected to
/// their masters, and every constrained DoF keeps its diagonal entry.
pub fn assemble_condensed_pattern(
    element_assembler: &dyn ElementConnectivityAssembler,
    constraints: &AffineConstraints,
) -> eyre::Result<SparsityPattern> {
    let mut matrix_entries = BTreeSet::new();
    let mut element_global_nodes = Vec::new();
    let mut expanded = Vec::new();
    for i in 0..element_assembler.num_elements() {
        element_global_nodes.resize(element_assembler.element_node_count(i), usize::MAX);
        element_assembler.populate_element_nodes(&mut element_global_nodes, i);

        expanded.clear();
        for &node in &element_global_nodes {
            match constraints.constraint(node) {
                Some(line) => expanded.extend(line.entries().iter().map(|&(master, _)| master)),
                None => expanded.push(node),
            }
        }
        for &node_i in &expanded {
            for &node_j in &expanded {
                matrix_entries.insert((node_i, node_j));
            }
        }
    }
    for line in constraints.lines() {
        matrix_entries.insert((line.dof(), line.dof()));
    }
    pattern_from_entries(element_assembler.num_nodes(), matrix_entries)
}

fn add_to_csr(matrix: &mut CsrMatrix<f64>, row: usize, col: usize, value: f64) -> eyre::Result<()> {
    let mut csr_row = matrix.row_mut(row);
    let (cols, values) = csr_row.cols_and_values_mut();
    let idx = cols
        .binary_search(&col)
        .map_err(|_| eyre!("Entry ({}, {}) is not part of the sparsity pattern", row, col))?;
    values[idx] += value;
    Ok(())
}

/// Add a row of a local element matrix to the provided row of a CSR matrix.
///
/// `node_connectivity`: The global indices of nodes.
/// `sorted_permutation`: The local indices of nodes in the element, ordered such that the
///    corresponding global indices are sorted.
/// `local_row`: The local row of the element matrix that should be added to the CSR matrix.
fn add_element_row_to_csr_row(
    matrix: &mut CsrMatrix<f64>,
    row: usize,
    node_connectivity: &[usize],
    sorted_permutation: &[usize],
    local_row: impl Fn(usize) -> f64,
) -> eyre::Result<()> {
    debug_assert_eq!(node_connectivity.len(), sorted_permutation.len());
    let mut csr_row = matrix.row_mut(row);
    let (column_indices, values) = csr_row.cols_and_values_mut();
    let mut csr_col_idx_iter = column_indices.iter().copied().enumerate();

    for &node_local_idx in sorted_permutation {
        let global_col_index = node_connectivity[node_local_idx];
        let (local_csr_col_idx, _) = csr_col_idx_iter
            .find(|(_, csr_col_idx)| *csr_col_idx == global_col_index)
            .ok_or_else(|| eyre!("Could not find column {} in CSR row {}", global_col_index, row))?;
        values[local_csr_col_idx] += local_row(node_local_idx);
    }
    Ok(())
}

/// Policy for incorporating constraints into the global system.
///
/// All implementations produce the same condensed system (up to round-off): see
/// [`AffineConstraints::condense`].
pub trait ConstraintElimination: Sync {
    fn pattern(
        &self,
        element_assembler: &dyn ElementConnectivityAssembler,
        constraints: &AffineConstraints,
    ) -> eyre::Result<SparsityPattern>;

    /// Adds one element's contribution to the system.
    fn scatter(
        &self,
        copy_data: &CellCopyData,
        constraints: &AffineConstraints,
        system: &mut LinearSystem,
        workspace: &mut Vec<usize>,
    ) -> eyre::Result<()>;

    /// Called once after all elements have been scattered.
    fn finalize(&self, constraints: &AffineConstraints, system: &mut LinearSystem) -> eyre::Result<()>;
}

/// Redistributes contributions of constrained DoFs to their masters while scattering.
#[derive(Debug, Copy, Clone, Default)]
pub struct EliminateDuringScatter;

/// Assembles the unconstrained system and condenses it afterwards.
#[derive(Debug, Copy, Clone, Default)]
pub struct EliminateAsPostProcess;

impl ConstraintElimination for EliminateDuringScatter {
    fn pattern(
        &self,
        element_assembler: &dyn ElementConnectivityAssembler,
        constraints: &AffineConstraints,
    ) -> eyre::Result<SparsityPattern> {
        assemble_condensed_pattern(element_assembler, constraints)
    }

    #[allow(non_snake_case)]
    fn scatter(
        &self,
        copy_data: &CellCopyData,
        constraints: &AffineConstraints,
        system: &mut LinearSystem,
        _workspace: &mut Vec<usize>,
    ) -> eyre::Result<()> {
        let dofs = &copy_data.dof_indices;
        let LinearSystem { matrix, rhs, .. } = system;

        for (a, &i) in dofs.iter().enumerate() {
            let (i_entries, _) = constraints.expansion(i);
            let i_constrained = constraints.is_constrained(i);

            let f_a = copy_data.vector[a];
            if i_constrained {
                for &(I, c_iI) in i_entries {
                    rhs[I] += c_iI * f_a;
                }
            } else {
                rhs[i] += f_a;
            }

            for (b, &j) in dofs.iter().enumerate() {
                let K_ab = copy_data.matrix[(a, b)];
                let (j_entries, g_j) = constraints.expansion(j);
                let j_constrained = constraints.is_constrained(j);
                if i == j && i_constrained {
                    add_to_csr(matrix, i, i, K_ab)?;
                }

                match (i_constrained, j_constrained) {
                    (false, false) => add_to_csr(matrix, i, j, K_ab)?,
                    (false, true) => {
                        for &(J, c_jJ) in j_entries {
                            add_to_csr(matrix, i, J, K_ab * c_jJ)?;
                        }
                        rhs[i] -= K_ab * g_j;
                    }
                    (true, false) => {
                        for &(I, c_iI) in i_entries {
                            add_to_csr(matrix, I, j, c_iI * K_ab)?;
                        }
                    }
                    (true, true) => {
                        for &(I, c_iI) in i_entries {
                            for &(J, c_jJ) in j_entries {
                                add_to_csr(matrix, I, J, c_iI * K_ab * c_jJ)?;
                            }
                            rhs[I] -= c_iI * K_ab * g_j;
                        }
                    }
                }
            }
        }
        Ok(())
    }

    #[allow(non_snake_case)]
    fn finalize(&self, constraints: &AffineConstraints, system: &mut LinearSystem) -> eyre::Result<()> {
        for line in constraints.lines() {
            let i = line.dof();
            let mut row = system.matrix.row_mut(i);
            let (cols, values) = row.cols_and_values_mut();
            let idx = cols
                .binary_search(&i)
                .map_err(|_| eyre!("Missing diagonal entry for constrained DoF {}", i))?;
            if values[idx] == 0.0 {
                values[idx] = 1.0;
            }
            let K_ii = values[idx];
            system.rhs[i] = K_ii * line.inhomogeneity();
        }
        Ok(())
    }
}

impl ConstraintElimination for EliminateAsPostProcess {
    fn pattern(
        &self,
        element_assembler: &dyn ElementConnectivityAssembler,
        _constraints: &AffineConstraints,
    ) -> eyre::Result<SparsityPattern> {
        assemble_pattern(element_assembler)
    }

    fn scatter(
        &self,
        copy_data: &CellCopyData,
        _constraints: &AffineConstraints,
        system: &mut LinearSystem,
        connectivity_permutation: &mut Vec<usize>,
    ) -> eyre::Result<()> {
        let dofs = &copy_data.dof_indices;
        connectivity_permutation.clear();
        connectivity_permutation.extend(0..dofs.len());
        connectivity_permutation.sort_unstable_by_key(|&i| dofs[i]);

        for (a, &i) in dofs.iter().enumerate() {
            add_element_row_to_csr_row(&mut system.matrix, i, dofs, connectivity_permutation, |b| {
                copy_data.matrix[(a, b)]
            })?;
            system.rhs[i] += copy_data.vector[a];
        }
        Ok(())
    }

    fn finalize(&self, constraints: &AffineConstraints, system: &mut LinearSystem) -> eyre::Result<()> {
        let (matrix, rhs) = constraints
            .condense(&system.matrix, &system.rhs)
            .wrap_err("Failed to condense linear system")?;
        system.matrix = matrix;
        system.rhs = rhs;
        Ok(())
    }
}

/// Choice of constraint elimination, see [`ConstraintElimination`].
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Elimination {
    DuringScatter,
    PostProcess,
}

impl Elimination {
    pub fn strategy(&self) -> &'static dyn ConstraintElimination {
        match self {
            Self::DuringScatter => &EliminateDuringScatter,
            Self::PostProcess => &EliminateAsPostProcess,
        }
    }
}

/// How the element loop is executed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AssemblyStrategy {
    /// One scratch object and one copy-data object reused for all elements.
    Serial,
    /// Local contributions of a chunk of elements are computed concurrently, each worker thread
    /// using its own scratch and each element its own copy data. Chunks are scattered serially
    /// in element order, so the result is bit-identical to [`Serial`](Self::Serial).
    Parallel { chunk_size: usize },
}

/// Assembles global linear systems from element contributions.
#[derive(Debug)]
pub struct SystemAssembler {
    strategy: AssemblyStrategy,
    serial_scratch: RefCell<CellScratch>,
    scratch: ThreadLocal<RefCell<CellScratch>>,
}

impl Default for SystemAssembler {
    fn default() -> Self {
        Self::new(AssemblyStrategy::Serial)
    }
}

impl SystemAssembler {
    pub fn new(strategy: AssemblyStrategy) -> Self {
        Self {
            strategy,
            serial_scratch: RefCell::new(CellScratch::default()),
            scratch: ThreadLocal::new(),
        }
    }

    pub fn strategy(&self) -> AssemblyStrategy {
        self.strategy
    }

    pub fn assemble(
        &self,
        mesh: &QuadTreeMesh,
        dofs: &DofHandler,
        constraints: &AffineConstraints,
        element_assembler: &dyn ElementSystemAssembler,
        elimination: &dyn ConstraintElimination,
    ) -> eyre::Result<LinearSystem> {
        dofs.check_generation(mesh)?;
        if !constraints.is_closed() {
            return Err(eyre!("Constraints must be closed before assembly"));
        }
        if constraints.num_dofs() != dofs.num_dofs() || element_assembler.num_nodes() != dofs.num_dofs() {
            return Err(eyre!(
                "Constraints ({} DoFs) and element assembler ({} DoFs) do not match the DoF handler ({} DoFs)",
                constraints.num_dofs(),
                element_assembler.num_nodes(),
                dofs.num_dofs()
            ));
        }

        let n = dofs.num_dofs();
        let pattern = elimination.pattern(element_assembler.as_connectivity_assembler(), constraints)?;
        let nnz = pattern.nnz();
        let matrix = CsrMatrix::try_from_pattern_and_values(pattern, vec![0.0; nnz])
            .map_err(|err| eyre!("Failed to create CSR matrix: {}", err))?;
        let mut system = LinearSystem {
            matrix,
            rhs: DVector::zeros(n),
            generation: mesh.generation(),
        };

        match self.strategy {
            AssemblyStrategy::Serial => self.assemble_serial(element_assembler, constraints, elimination, &mut system)?,
            AssemblyStrategy::Parallel { chunk_size } => {
                self.assemble_parallel(element_assembler, constraints, elimination, &mut system, chunk_size)?
            }
        }

        elimination.finalize(constraints, &mut system)?;
        Ok(system)
    }

    fn assemble_serial(
        &self,
        element_assembler: &dyn ElementSystemAssembler,
        constraints: &AffineConstraints,
        elimination: &dyn ConstraintElimination,
        system: &mut LinearSystem,
    ) -> eyre::Result<()> {
        let scratch = &mut *self.serial_scratch.borrow_mut();
        let mut copy_data = CellCopyData::default();
        let mut workspace = Vec::new();
        for element_index in 0..element_assembler.num_elements() {
            element_assembler.assemble_element_system_into(element_index, scratch, &mut copy_data)?;
            elimination.scatter(&copy_data, constraints, system, &mut workspace)?;
        }
        Ok(())
    }

    fn assemble_parallel(
        &self,
        element_assembler: &dyn ElementSystemAssembler,
        constraints: &AffineConstraints,
        elimination: &dyn ConstraintElimination,
        system: &mut LinearSystem,
        chunk_size: usize,
    ) -> eyre::Result<()> {
        let num_elements = element_assembler.num_elements();
        let chunk_size = chunk_size.max(1);
        let mut copy_data: Vec<CellCopyData> = Vec::new();
        copy_data.resize_with(chunk_size.min(num_elements), CellCopyData::default);
        let mut workspace = Vec::new();
        let scratch = &self.scratch;

        for chunk_start in (0..num_elements).step_by(chunk_size) {
            let chunk_len = chunk_size.min(num_elements - chunk_start);
            let chunk = &mut copy_data[..chunk_len];

            chunk
                .par_iter_mut()
                .enumerate()
                .map(|(offset, data)| {
                    let scratch = &mut *scratch.get_or_default().borrow_mut();
                    element_assembler.assemble_element_system_into(chunk_start + offset, scratch, data)
                })
                .collect::<eyre::Result<()>>()?;

            // Scatter is the serialization point: elements share global DoFs
            for data in chunk.iter() {
                elimination.scatter(data, constraints, system, &mut workspace)?;
            }
        }
        Ok(())
    }
}
