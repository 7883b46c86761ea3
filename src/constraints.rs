//! Affine constraints `u_c = sum_m w_m u_m + g_c` on degrees of freedom.
//!
//! Constraints arise from hanging nodes (continuity across non-conforming faces) and from
//! Dirichlet boundary data. A constraint set is filled, then [closed](AffineConstraints::close),
//! after which it is used to condense linear systems and to
//! [distribute](AffineConstraints::distribute) solution values to constrained DoFs.
use crate::dofs::DofHandler;
use crate::mesh::{QuadTreeMesh, FACE_VERTICES, NUM_FACES};
use eyre::{eyre, WrapErr};
use log::debug;
use nalgebra::{DVector, Point2};
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use rustc_hash::FxHashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConstraintError {
    AlreadyConstrained { dof: usize },
    SelfReference { dof: usize },
    /// The master of a new constraint is already constrained itself.
    ConstrainedMaster { dof: usize, master: usize },
    NotConstrained { dof: usize },
    DofOutOfBounds { dof: usize, num_dofs: usize },
    Closed,
    NotClosed,
    DimensionMismatch { expected: usize, actual: usize },
}

impl fmt::Display for ConstraintError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyConstrained { dof } => write!(f, "DoF {} is already constrained", dof),
            Self::SelfReference { dof } => write!(f, "constraint for DoF {} references itself", dof),
            Self::ConstrainedMaster { dof, master } => write!(
                f,
                "constraint for DoF {} references DoF {}, which is already constrained",
                dof, master
            ),
            Self::NotConstrained { dof } => write!(f, "DoF {} has no constraint line", dof),
            Self::DofOutOfBounds { dof, num_dofs } => {
                write!(f, "DoF {} out of bounds for {} DoFs", dof, num_dofs)
            }
            Self::Closed => write!(f, "constraints are closed and can not be modified"),
            Self::NotClosed => write!(f, "constraints must be closed before use"),
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "expected a vector of length {}, got {}", expected, actual)
            }
        }
    }
}

impl std::error::Error for ConstraintError {}

#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintLine {
    dof: usize,
    entries: Vec<(usize, f64)>,
    inhomogeneity: f64,
}

impl ConstraintLine {
    pub fn dof(&self) -> usize {
        self.dof
    }

    /// Pairs `(master, weight)`. Sorted by master and free of duplicates once closed.
    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    pub fn inhomogeneity(&self) -> f64 {
        self.inhomogeneity
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AffineConstraints {
    num_dofs: usize,
    lines: Vec<ConstraintLine>,
    line_index: FxHashMap<usize, usize>,
    closed: bool,
}

impl AffineConstraints {
    pub fn new(num_dofs: usize) -> Self {
        Self {
            num_dofs,
            lines: Vec::new(),
            line_index: FxHashMap::default(),
            closed: false,
        }
    }

    pub fn num_dofs(&self) -> usize {
        self.num_dofs
    }

    pub fn num_constraints(&self) -> usize {
        self.lines.len()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn is_constrained(&self, dof: usize) -> bool {
        self.line_index.contains_key(&dof)
    }

    pub fn constraint(&self, dof: usize) -> Option<&ConstraintLine> {
        self.line_index.get(&dof).map(|&idx| &self.lines[idx])
    }

    /// Constraint lines, sorted by DoF once closed.
    pub fn lines(&self) -> &[ConstraintLine] {
        &self.lines
    }

    /// Removes all constraints and reopens the set.
    pub fn clear(&mut self) {
        self.lines.clear();
        self.line_index.clear();
        self.closed = false;
    }

    fn check_open(&self) -> Result<(), ConstraintError> {
        if self.closed {
            Err(ConstraintError::Closed)
        } else {
            Ok(())
        }
    }

    fn check_bounds(&self, dof: usize) -> Result<(), ConstraintError> {
        if dof < self.num_dofs {
            Ok(())
        } else {
            Err(ConstraintError::DofOutOfBounds {
                dof,
                num_dofs: self.num_dofs,
            })
        }
    }

    fn check_master(&self, dof: usize, master: usize) -> Result<(), ConstraintError> {
        if master == dof {
            Err(ConstraintError::SelfReference { dof })
        } else if self.is_constrained(master) {
            Err(ConstraintError::ConstrainedMaster { dof, master })
        } else {
            Ok(())
        }
    }

    fn line_mut(&mut self, dof: usize) -> Result<&mut ConstraintLine, ConstraintError> {
        match self.line_index.get(&dof) {
            Some(&idx) => Ok(&mut self.lines[idx]),
            None => Err(ConstraintError::NotConstrained { dof }),
        }
    }

    /// Starts a new constraint for `dof`, initially `u_dof = 0`.
    pub fn add_line(&mut self, dof: usize) -> Result<(), ConstraintError> {
        self.check_open()?;
        self.check_bounds(dof)?;
        if self.is_constrained(dof) {
            return Err(ConstraintError::AlreadyConstrained { dof });
        }
        self.line_index.insert(dof, self.lines.len());
        self.lines.push(ConstraintLine {
            dof,
            entries: Vec::new(),
            inhomogeneity: 0.0,
        });
        Ok(())
    }

    pub fn add_entry(&mut self, dof: usize, master: usize, weight: f64) -> Result<(), ConstraintError> {
        self.check_open()?;
        self.check_bounds(master)?;
        self.check_master(dof, master)?;
        self.line_mut(dof)?.entries.push((master, weight));
        Ok(())
    }

    pub fn set_inhomogeneity(&mut self, dof: usize, value: f64) -> Result<(), ConstraintError> {
        self.check_open()?;
        self.line_mut(dof)?.inhomogeneity = value;
        Ok(())
    }

    /// Adds the complete constraint `u_dof = sum_m w_m u_m + inhomogeneity`.
    ///
    /// Masters must not be constrained at the time of insertion. A DoF may however be
    /// constrained after it has been used as a master, in which case [`close`](Self::close)
    /// resolves the chain.
    pub fn add_constraint(
        &mut self,
        dof: usize,
        entries: &[(usize, f64)],
        inhomogeneity: f64,
    ) -> Result<(), ConstraintError> {
        // Validate everything up front so that a failed insertion leaves no partial line
        self.check_open()?;
        self.check_bounds(dof)?;
        if self.is_constrained(dof) {
            return Err(ConstraintError::AlreadyConstrained { dof });
        }
        for &(master, _) in entries {
            self.check_bounds(master)?;
            self.check_master(dof, master)?;
        }

        self.add_line(dof)?;
        let line = self.line_mut(dof)?;
        line.entries.extend_from_slice(entries);
        line.inhomogeneity = inhomogeneity;
        Ok(())
    }

    /// Finalizes the constraint set.
    ///
    /// Masters that were constrained after their first use are replaced by their own masters
    /// (recursively), duplicate masters are merged and entries sorted by master. Afterwards no
    /// master is constrained. Since masters are never constrained at insertion, the chains are
    /// acyclic.
    pub fn close(&mut self) -> Result<(), ConstraintError> {
        if self.closed {
            return Ok(());
        }

        let mut resolved = vec![false; self.lines.len()];
        for idx in 0..self.lines.len() {
            self.resolve_line(idx, &mut resolved);
        }

        self.lines.sort_by_key(|line| line.dof);
        self.line_index = self
            .lines
            .iter()
            .enumerate()
            .map(|(idx, line)| (line.dof, idx))
            .collect();
        self.closed = true;

        let num_entries: usize = self.lines.iter().map(|line| line.entries.len()).sum();
        debug!(
            "Closed {} constraints with {} master entries for {} DoFs",
            self.lines.len(),
            num_entries,
            self.num_dofs
        );
        Ok(())
    }

    fn resolve_line(&mut self, idx: usize, resolved: &mut [bool]) {
        if resolved[idx] {
            return;
        }

        let original = std::mem::take(&mut self.lines[idx].entries);
        let mut entries = Vec::with_capacity(original.len());
        let mut inhomogeneity = self.lines[idx].inhomogeneity;
        for (master, weight) in original {
            match self.line_index.get(&master).copied() {
                Some(master_idx) => {
                    self.resolve_line(master_idx, resolved);
                    let master_line = &self.lines[master_idx];
                    entries.extend(master_line.entries.iter().map(|&(m, w)| (m, weight * w)));
                    inhomogeneity += weight * master_line.inhomogeneity;
                }
                None => entries.push((master, weight)),
            }
        }

        entries.sort_by_key(|&(master, _)| master);
        let mut merged: Vec<(usize, f64)> = Vec::with_capacity(entries.len());
        for (master, weight) in entries {
            match merged.last_mut() {
                Some((last, w)) if *last == master => *w += weight,
                _ => merged.push((master, weight)),
            }
        }

        let line = &mut self.lines[idx];
        line.entries = merged;
        line.inhomogeneity = inhomogeneity;
        resolved[idx] = true;
    }

    fn check_closed(&self) -> Result<(), ConstraintError> {
        if self.closed {
            Ok(())
        } else {
            Err(ConstraintError::NotClosed)
        }
    }

    fn check_len(&self, len: usize) -> Result<(), ConstraintError> {
        if len == self.num_dofs {
            Ok(())
        } else {
            Err(ConstraintError::DimensionMismatch {
                expected: self.num_dofs,
                actual: len,
            })
        }
    }

    /// Sets every constrained entry of `u` to the value prescribed by its constraint.
    pub fn distribute(&self, u: &mut DVector<f64>) -> Result<(), ConstraintError> {
        self.check_closed()?;
        self.check_len(u.len())?;
        for line in &self.lines {
            let value: f64 = line.entries.iter().map(|&(m, w)| w * u[m]).sum();
            u[line.dof] = value + line.inhomogeneity;
        }
        Ok(())
    }

    /// Coefficients expressing a constrained `u_dof` in terms of unconstrained DoFs:
    /// `(master, weight)` pairs and the offset. Empty for unconstrained DoFs.
    pub(crate) fn expansion(&self, dof: usize) -> (&[(usize, f64)], f64) {
        match self.constraint(dof) {
            Some(line) => (&line.entries, line.inhomogeneity),
            None => (&[], 0.0),
        }
    }

    /// Condenses an unconstrained system `K u = f`.
    ///
    /// With `u = C v + g`, the result has entries `C^T K C` and `C^T (f - K g)` in rows and
    /// columns of unconstrained DoFs. A constrained row `i` holds only the diagonal entry `K_ii`
    /// (one if `K_ii` vanishes) and the right-hand side `K_ii g_i`, so that its solution is
    /// `u_i = g_i` until [`distribute`](Self::distribute) overwrites it.
    #[allow(non_snake_case)]
    pub fn condense(
        &self,
        matrix: &CsrMatrix<f64>,
        rhs: &DVector<f64>,
    ) -> Result<(CsrMatrix<f64>, DVector<f64>), ConstraintError> {
        self.check_closed()?;
        self.check_len(matrix.nrows())?;
        self.check_len(matrix.ncols())?;
        self.check_len(rhs.len())?;

        let n = self.num_dofs;
        let mut coo = CooMatrix::new(n, n);
        let mut f = DVector::zeros(n);
        let mut diagonal = vec![0.0; n];

        for i in 0..n {
            let f_i = rhs[i];
            match self.constraint(i) {
                Some(line) => {
                    for &(m, w) in &line.entries {
                        f[m] += w * f_i;
                    }
                }
                None => f[i] += f_i,
            }
        }

        for (i, j, &K_ij) in matrix.triplet_iter() {
            let i_constrained = self.is_constrained(i);
            let j_constrained = self.is_constrained(j);
            if i == j && i_constrained {
                diagonal[i] += K_ij;
            }

            let (j_entries, g_j) = self.expansion(j);
            let (i_entries, _) = self.expansion(i);

            match (i_constrained, j_constrained) {
                (false, false) => coo.push(i, j, K_ij),
                (false, true) => {
                    for &(J, c_jJ) in j_entries {
                        coo.push(i, J, K_ij * c_jJ);
                    }
                    f[i] -= K_ij * g_j;
                }
                (true, false) => {
                    for &(I, c_iI) in i_entries {
                        coo.push(I, j, c_iI * K_ij);
                    }
                }
                (true, true) => {
                    for &(I, c_iI) in i_entries {
                        for &(J, c_jJ) in j_entries {
                            coo.push(I, J, c_iI * K_ij * c_jJ);
                        }
                        f[I] -= c_iI * K_ij * g_j;
                    }
                }
            }
        }

        for line in &self.lines {
            let i = line.dof;
            let K_ii = if diagonal[i] != 0.0 { diagonal[i] } else { 1.0 };
            coo.push(i, i, K_ii);
            f[i] = K_ii * line.inhomogeneity;
        }

        Ok((CsrMatrix::from(&coo), f))
    }
}

/// Adds hanging-node constraints: wherever an active cell shares a face with two finer active
/// cells, the vertex at the midpoint of that face is constrained to the average of the face's end
/// vertices.
///
/// An end vertex may itself hang on a face of a cell one level coarser. Constraints on faces of
/// finer cells are therefore inserted first, so that no master is constrained at insertion.
pub fn make_hanging_node_constraints(
    mesh: &QuadTreeMesh,
    dofs: &DofHandler,
    constraints: &mut AffineConstraints,
) -> eyre::Result<()> {
    dofs.check_generation(mesh)?;
    let vertex_dof = |vertex: usize| {
        dofs.vertex_dof(vertex)
            .ok_or_else(|| eyre!("Vertex {} of an active cell has no DoF", vertex))
    };

    let mut hanging_faces = Vec::new();
    for &cell in mesh.active_cells() {
        for face in 0..NUM_FACES {
            let neighbors = mesh.face_neighbors(cell, face);
            if neighbors.len() < 2 {
                continue;
            }
            if neighbors.len() > 2 {
                return Err(eyre!(
                    "Face {} of cell {} has {} neighbors, mesh is not 2:1 balanced",
                    face,
                    cell,
                    neighbors.len()
                ));
            }

            // The upper end of the first fine neighbour's opposite face is the face midpoint
            let opposite = FACE_VERTICES[face ^ 1];
            let midpoint = mesh.cell_vertices(neighbors[0])[opposite[1]];
            hanging_faces.push((cell, face, midpoint));
        }
    }
    hanging_faces.sort_by_key(|&(cell, _, _)| std::cmp::Reverse(mesh.cell_level(cell)));

    for (cell, face, midpoint) in hanging_faces {
        let [a, b] = FACE_VERTICES[face].map(|local| mesh.cell_vertices(cell)[local]);
        let hanging = vertex_dof(midpoint)?;
        let entries = [(vertex_dof(a)?, 0.5), (vertex_dof(b)?, 0.5)];
        constraints
            .add_constraint(hanging, &entries, 0.0)
            .wrap_err_with(|| format!("Failed to constrain hanging DoF {} on face {} of cell {}", hanging, face, cell))?;
    }
    Ok(())
}

/// Constrains every boundary DoF that is not yet constrained to `g(support point)`.
pub fn interpolate_boundary_values(
    dofs: &DofHandler,
    g: impl Fn(&Point2<f64>) -> f64,
    constraints: &mut AffineConstraints,
) -> Result<(), ConstraintError> {
    for &dof in dofs.boundary_dofs() {
        if !constraints.is_constrained(dof) {
            constraints.add_constraint(dof, &[], g(dofs.support_point(dof)))?;
        }
    }
    Ok(())
}

/// Hanging-node constraints followed by Dirichlet boundary values on the whole boundary, closed.
pub fn build_constraints(
    mesh: &QuadTreeMesh,
    dofs: &DofHandler,
    boundary_values: impl Fn(&Point2<f64>) -> f64,
) -> eyre::Result<AffineConstraints> {
    let mut constraints = AffineConstraints::new(dofs.num_dofs());
    make_hanging_node_constraints(mesh, dofs, &mut constraints)?;
    interpolate_boundary_values(dofs, boundary_values, &mut constraints)
        .wrap_err("Failed to interpolate boundary values")?;
    constraints.close()?;
    Ok(constraints)
}
