//! Solution of assembled systems with the preconditioned conjugate gradient method.
use crate::assembly::LinearSystem;
use crate::constraints::{AffineConstraints, ConstraintError};
use log::debug;
use nalgebra::DVector;
use quadfem_sparse::cg::{
    AbsoluteResidualCriterion, CgOutput, ConjugateGradient, DiagonalOperator, SolveError, SolveErrorKind,
    SsorError, SsorOperator,
};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preconditioner {
    Identity,
    Jacobi,
    Ssor { omega: f64 },
}

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    pub max_iterations: usize,
    /// Absolute tolerance on the Euclidean norm of the residual.
    pub tolerance: f64,
    pub preconditioner: Preconditioner,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-12,
            preconditioner: Preconditioner::Ssor { omega: 1.2 },
        }
    }
}

/// The solution of a linear system, with constraints already distributed.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    pub values: DVector<f64>,
    pub iterations: usize,
    pub residual_norm: f64,
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum LinearSolveError {
    /// The iteration cap was reached before the tolerance.
    NotConverged { iterations: usize, residual: f64 },
    /// The iteration broke down, typically because the operator is not positive definite.
    Breakdown { iterations: usize, reason: String },
    DimensionMismatch { rows: usize, rhs: usize, constraints: usize },
    /// The SSOR relaxation parameter is not in `(0, 2)`.
    InvalidPreconditioner { omega: f64 },
    NonSquareMatrix { rows: usize, cols: usize },
    Constraints(ConstraintError),
}

impl fmt::Display for LinearSolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotConverged { iterations, residual } => write!(
                f,
                "CG did not converge within {} iterations (residual norm {:e})",
                iterations, residual
            ),
            Self::Breakdown { iterations, reason } => {
                write!(f, "CG broke down after {} iterations: {}", iterations, reason)
            }
            Self::DimensionMismatch { rows, rhs, constraints } => write!(
                f,
                "matrix with {} rows, right-hand side of length {} and constraints for {} DoFs are incompatible",
                rows, rhs, constraints
            ),
            Self::InvalidPreconditioner { omega } => write!(
                f,
                "SSOR relaxation parameter must be in (0, 2) (got {})",
                omega
            ),
            Self::NonSquareMatrix { rows, cols } => {
                write!(f, "system matrix must be square, got {}x{}", rows, cols)
            }
            Self::Constraints(err) => write!(f, "failed to distribute constraints: {}", err),
        }
    }
}

impl std::error::Error for LinearSolveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Constraints(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SolveError<f64>> for LinearSolveError {
    fn from(err: SolveError<f64>) -> Self {
        let iterations = err.output.num_iterations;
        match err.kind {
            SolveErrorKind::MaxIterationsReached { .. } => Self::NotConverged {
                iterations,
                residual: err.output.residual_norm,
            },
            kind => Self::Breakdown {
                iterations,
                reason: kind.to_string(),
            },
        }
    }
}

/// Solves the (condensed) system with CG and sets constrained entries from their masters.
///
/// The returned values always satisfy the constraints. A solve that hits the iteration cap is
/// reported as [`LinearSolveError::NotConverged`] and no partial solution is returned.
pub fn solve_linear_system(
    system: &LinearSystem,
    constraints: &AffineConstraints,
    config: &SolverConfig,
) -> Result<Solution, LinearSolveError> {
    let n = system.matrix.nrows();
    if system.matrix.ncols() != n {
        return Err(LinearSolveError::NonSquareMatrix {
            rows: n,
            cols: system.matrix.ncols(),
        });
    }
    if system.rhs.len() != n || constraints.num_dofs() != n {
        return Err(LinearSolveError::DimensionMismatch {
            rows: n,
            rhs: system.rhs.len(),
            constraints: constraints.num_dofs(),
        });
    }

    let mut x = DVector::zeros(n);
    let mut cg = ConjugateGradient::new()
        .with_operator(&system.matrix)
        .with_stopping_criterion(AbsoluteResidualCriterion::new(config.tolerance))
        .with_max_iter(config.max_iterations);
    let output: CgOutput<f64> = match config.preconditioner {
        Preconditioner::Identity => cg.solve_with_guess(&system.rhs, &mut x)?,
        Preconditioner::Jacobi => cg
            .with_preconditioner(DiagonalOperator::jacobi(&system.matrix))
            .solve_with_guess(&system.rhs, &mut x)?,
        Preconditioner::Ssor { omega } => {
            let ssor = SsorOperator::try_new(&system.matrix, omega).map_err(|err| match err {
                SsorError::NotSquare { nrows, ncols } => LinearSolveError::NonSquareMatrix {
                    rows: nrows,
                    cols: ncols,
                },
                SsorError::InvalidRelaxation => LinearSolveError::InvalidPreconditioner { omega },
            })?;
            cg.with_preconditioner(ssor)
                .solve_with_guess(&system.rhs, &mut x)?
        }
    };
    debug!(
        "CG converged in {} iterations, residual norm {:e}",
        output.num_iterations, output.residual_norm
    );

    constraints
        .distribute(&mut x)
        .map_err(LinearSolveError::Constraints)?;

    Ok(Solution {
        values: x,
        iterations: output.num_iterations,
        residual_norm: output.residual_norm,
    })
}
