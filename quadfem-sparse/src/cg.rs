//! Preconditioned Conjugate Gradient for symmetric positive definite operators.
use core::fmt;
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut, RealField, Scalar};
use nalgebra_sparse::ops::serial::spmm_csr_dense;
use nalgebra_sparse::ops::Op;
use nalgebra_sparse::CsrMatrix;
use num::Zero;
use std::error::Error;
use std::ops::{Deref, DerefMut};

pub trait LinearOperator<T: Scalar> {
    /// Computes `y = A x`.
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>>;
}

impl<'a, T, A> LinearOperator<T> for &'a A
where
    T: Scalar,
    A: ?Sized + LinearOperator<T>,
{
    fn apply(&self, y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        <A as LinearOperator<T>>::apply(self, y, x)
    }
}

fn check_operator_dimensions(nrows: usize, ncols: usize, y_len: usize, x_len: usize) -> Result<(), Box<dyn Error>> {
    if nrows != y_len || ncols != x_len {
        Err(format!(
            "operator of dimensions {}x{} incompatible with input of length {} and output of length {}",
            nrows, ncols, x_len, y_len
        )
        .into())
    } else {
        Ok(())
    }
}

impl<T> LinearOperator<T> for DMatrix<T>
where
    T: RealField + Copy,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        check_operator_dimensions(self.nrows(), self.ncols(), y.len(), x.len())?;
        y.gemv(T::one(), self, &x, T::zero());
        Ok(())
    }
}

impl<T> LinearOperator<T> for CsrMatrix<T>
where
    T: RealField + Copy,
{
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        check_operator_dimensions(self.nrows(), self.ncols(), y.len(), x.len())?;
        spmm_csr_dense(T::zero(), &mut y, T::one(), Op::NoOp(self), Op::NoOp(&x));
        Ok(())
    }
}

pub struct IdentityOperator;

impl<T: Scalar> LinearOperator<T> for IdentityOperator {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        y.copy_from(&x);
        Ok(())
    }
}

/// A diagonal operator `y_i = d_i x_i`.
///
/// Mostly useful as a Jacobi preconditioner, see [`DiagonalOperator::jacobi`].
#[derive(Debug, Clone, PartialEq)]
pub struct DiagonalOperator<T: Scalar> {
    diagonal: DVector<T>,
}

impl<T: RealField + Copy> DiagonalOperator<T> {
    pub fn from_diagonal(diagonal: DVector<T>) -> Self {
        Self { diagonal }
    }

    /// Jacobi preconditioner for the given matrix, i.e. the inverse of its diagonal.
    ///
    /// Rows with a zero (or missing) diagonal entry are left unscaled.
    pub fn jacobi(matrix: &CsrMatrix<T>) -> Self {
        let diagonal = DVector::from_iterator(
            matrix.nrows(),
            matrix.row_iter().enumerate().map(|(i, row)| {
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .find(|(j, _)| **j == i)
                    .map(|(_, &a_ii)| a_ii)
                    .filter(|a_ii| !a_ii.is_zero())
                    .map(|a_ii| T::one() / a_ii)
                    .unwrap_or_else(T::one)
            }),
        );
        Self { diagonal }
    }

    pub fn diagonal(&self) -> &DVector<T> {
        &self.diagonal
    }
}

impl<T: RealField + Copy> LinearOperator<T> for DiagonalOperator<T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let n = self.diagonal.len();
        check_operator_dimensions(n, n, y.len(), x.len())?;
        y.copy_from(&x);
        y.component_mul_assign(&self.diagonal);
        Ok(())
    }
}

/// Symmetric successive over-relaxation (SSOR) preconditioner for a CSR matrix.
///
/// Applies `M^{-1}` with `M = (D + wL) D^{-1} (D + wU) / (w (2 - w))`, i.e. a forward
/// Gauss-Seidel sweep followed by a backward sweep. Symmetric positive definite whenever the
/// matrix is, for `0 < w < 2`. Column indices in each row must be sorted, which is the case for
/// any [`CsrMatrix`].
#[derive(Debug, Clone)]
pub struct SsorOperator<'a, T: Scalar> {
    matrix: &'a CsrMatrix<T>,
    diagonal: Vec<T>,
    omega: T,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum SsorError {
    NotSquare { nrows: usize, ncols: usize },
    /// The relaxation parameter is not in the open interval `(0, 2)`.
    InvalidRelaxation,
}

impl fmt::Display for SsorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotSquare { nrows, ncols } => {
                write!(f, "SSOR requires a square matrix, got {}x{}", nrows, ncols)
            }
            Self::InvalidRelaxation => write!(f, "SSOR relaxation parameter must be in (0, 2)"),
        }
    }
}

impl Error for SsorError {}

impl<'a, T: RealField + Copy> SsorOperator<'a, T> {
    /// # Panics
    ///
    /// Panics if the matrix is not square or `omega` is not in the open interval `(0, 2)`.
    /// See [`try_new`](Self::try_new) for a non-panicking alternative.
    pub fn new(matrix: &'a CsrMatrix<T>, omega: T) -> Self {
        Self::try_new(matrix, omega).unwrap_or_else(|err| panic!("{}", err))
    }

    pub fn try_new(matrix: &'a CsrMatrix<T>, omega: T) -> Result<Self, SsorError> {
        if matrix.nrows() != matrix.ncols() {
            return Err(SsorError::NotSquare {
                nrows: matrix.nrows(),
                ncols: matrix.ncols(),
            });
        }
        let two = T::one() + T::one();
        if !(omega > T::zero() && omega < two) {
            return Err(SsorError::InvalidRelaxation);
        }
        let diagonal = matrix
            .row_iter()
            .enumerate()
            .map(|(i, row)| {
                row.col_indices()
                    .iter()
                    .zip(row.values())
                    .find(|(j, _)| **j == i)
                    .map(|(_, &a_ii)| a_ii)
                    .filter(|a_ii| !a_ii.is_zero())
                    .unwrap_or_else(T::one)
            })
            .collect();
        Ok(Self {
            matrix,
            diagonal,
            omega,
        })
    }
}

impl<'a, T: RealField + Copy> LinearOperator<T> for SsorOperator<'a, T> {
    fn apply(&self, mut y: DVectorViewMut<T>, x: DVectorView<T>) -> Result<(), Box<dyn Error>> {
        let n = self.diagonal.len();
        check_operator_dimensions(n, n, y.len(), x.len())?;
        let omega = self.omega;

        // Forward sweep: (D + wL) y = x
        for (i, row) in self.matrix.row_iter().enumerate() {
            let mut sum = x[i];
            for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
                if j >= i {
                    break;
                }
                sum -= omega * a_ij * y[j];
            }
            y[i] = sum / self.diagonal[i];
        }

        // y <- D y
        for i in 0..n {
            y[i] *= self.diagonal[i];
        }

        // Backward sweep: (D + wU) y = D y, in place since row i only reads entries j > i
        for i in (0..n).rev() {
            let row = self.matrix.row(i);
            let mut sum = y[i];
            for (&j, &a_ij) in row.col_indices().iter().zip(row.values()) {
                if j > i {
                    sum -= omega * a_ij * y[j];
                }
            }
            y[i] = sum / self.diagonal[i];
        }

        let two = T::one() + T::one();
        y.scale_mut(omega * (two - omega));
        Ok(())
    }
}

pub trait CgStoppingCriterion<T: Scalar> {
    /// Called by CG at the start of a new solve.
    fn reset(&self, _a: &dyn LinearOperator<T>, _x: DVectorView<T>, _b: DVectorView<T>) {}

    fn has_converged(
        &self,
        a: &dyn LinearOperator<T>,
        x: DVectorView<T>,
        b: DVectorView<T>,
        b_norm: T,
        iteration: usize,
        approx_residual: DVectorView<T>,
    ) -> Result<bool, SolveErrorKind>;
}

/// Relative residual tolerance ||r|| <= tol * ||b||.
///
/// Note that we use the *approximate* residual given by Conjugate-Gradient. For ill-conditioned
/// problems the recurrence may drift from the true residual `b - Ax`.
#[derive(Debug)]
pub struct RelativeResidualCriterion<T: Scalar> {
    tol: T,
}

impl<T: Scalar + Zero> RelativeResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }
}

impl Default for RelativeResidualCriterion<f64> {
    fn default() -> Self {
        Self::new(1e-8)
    }
}

impl<T> CgStoppingCriterion<T> for RelativeResidualCriterion<T>
where
    T: RealField + Copy,
{
    fn has_converged(
        &self,
        _a: &dyn LinearOperator<T>,
        _x: DVectorView<T>,
        _b: DVectorView<T>,
        b_norm: T,
        _iteration: usize,
        approx_residual: DVectorView<T>,
    ) -> Result<bool, SolveErrorKind> {
        Ok(approx_residual.norm() <= self.tol * b_norm)
    }
}

/// Absolute residual tolerance ||r|| <= tol.
#[derive(Debug)]
pub struct AbsoluteResidualCriterion<T: Scalar> {
    tol: T,
}

impl<T: Scalar + Zero> AbsoluteResidualCriterion<T> {
    pub fn new(tol: T) -> Self {
        Self { tol }
    }
}

impl Default for AbsoluteResidualCriterion<f64> {
    fn default() -> Self {
        Self::new(1e-12)
    }
}

impl<T> CgStoppingCriterion<T> for AbsoluteResidualCriterion<T>
where
    T: RealField + Copy,
{
    fn has_converged(
        &self,
        _a: &dyn LinearOperator<T>,
        _x: DVectorView<T>,
        _b: DVectorView<T>,
        _b_norm: T,
        _iteration: usize,
        approx_residual: DVectorView<T>,
    ) -> Result<bool, SolveErrorKind> {
        Ok(approx_residual.norm() <= self.tol)
    }
}

#[derive(Debug, Clone)]
#[allow(non_snake_case)]
pub struct CgWorkspace<T: Scalar> {
    r: DVector<T>,
    z: DVector<T>,
    p: DVector<T>,
    Ap: DVector<T>,
}

#[allow(non_snake_case)]
struct Buffers<'a, T: Scalar> {
    r: &'a mut DVector<T>,
    z: &'a mut DVector<T>,
    p: &'a mut DVector<T>,
    Ap: &'a mut DVector<T>,
}

impl<T: Scalar + Zero> Default for CgWorkspace<T> {
    fn default() -> Self {
        Self {
            r: DVector::zeros(0),
            z: DVector::zeros(0),
            p: DVector::zeros(0),
            Ap: DVector::zeros(0),
        }
    }
}

impl<T: Scalar + Zero> CgWorkspace<T> {
    fn prepare_buffers(&mut self, dim: usize) -> Buffers<T> {
        self.r.resize_vertically_mut(dim, T::zero());
        self.z.resize_vertically_mut(dim, T::zero());
        self.p.resize_vertically_mut(dim, T::zero());
        self.Ap.resize_vertically_mut(dim, T::zero());
        Buffers {
            r: &mut self.r,
            z: &mut self.z,
            p: &mut self.p,
            Ap: &mut self.Ap,
        }
    }
}

#[derive(Debug)]
enum OwnedOrMutRef<'a, T> {
    Owned(T),
    MutRef(&'a mut T),
}

impl<'a, T> Deref for OwnedOrMutRef<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

impl<'a, T> DerefMut for OwnedOrMutRef<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        match self {
            Self::Owned(owned) => owned,
            Self::MutRef(mutref) => mutref,
        }
    }
}

#[derive(Debug)]
pub struct ConjugateGradient<'a, T, A, P, Criterion>
where
    T: Scalar,
{
    workspace: OwnedOrMutRef<'a, CgWorkspace<T>>,
    operator: A,
    preconditioner: P,
    stopping_criterion: Criterion,
    max_iter: Option<usize>,
}

impl<'a, T: Scalar + Zero> ConjugateGradient<'a, T, (), IdentityOperator, ()> {
    pub fn new() -> Self {
        Self {
            workspace: OwnedOrMutRef::Owned(CgWorkspace::default()),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: (),
            max_iter: None,
        }
    }
}

impl<'a, T: Scalar + Zero> Default for ConjugateGradient<'a, T, (), IdentityOperator, ()> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'a, T: Scalar> ConjugateGradient<'a, T, (), IdentityOperator, ()> {
    pub fn with_workspace(workspace: &'a mut CgWorkspace<T>) -> Self {
        Self {
            workspace: OwnedOrMutRef::MutRef(workspace),
            operator: (),
            preconditioner: IdentityOperator,
            stopping_criterion: (),
            max_iter: None,
        }
    }
}

impl<'a, T: Scalar, P, Criterion> ConjugateGradient<'a, T, (), P, Criterion> {
    pub fn with_operator<A>(self, operator: A) -> ConjugateGradient<'a, T, A, P, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator,
            preconditioner: self.preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

impl<'a, T: Scalar, A, P, Criterion> ConjugateGradient<'a, T, A, P, Criterion> {
    pub fn with_preconditioner<P2>(self, preconditioner: P2) -> ConjugateGradient<'a, T, A, P2, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner,
            stopping_criterion: self.stopping_criterion,
            max_iter: self.max_iter,
        }
    }

    pub fn with_max_iter(self, max_iter: usize) -> Self {
        Self {
            max_iter: Some(max_iter),
            ..self
        }
    }
}

impl<'a, T: Scalar, A, P> ConjugateGradient<'a, T, A, P, ()> {
    pub fn with_stopping_criterion<Criterion>(
        self,
        stopping_criterion: Criterion,
    ) -> ConjugateGradient<'a, T, A, P, Criterion> {
        ConjugateGradient {
            workspace: self.workspace,
            operator: self.operator,
            preconditioner: self.preconditioner,
            stopping_criterion,
            max_iter: self.max_iter,
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum SolveErrorKind {
    OperatorError(Box<dyn Error>),
    PreconditionerError(Box<dyn Error>),
    StoppingCriterionError(Box<dyn Error>),
    IndefiniteOperator,
    IndefinitePreconditioner,
    MaxIterationsReached { max_iter: usize },
}

impl fmt::Display for SolveErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OperatorError(err) => write!(f, "error applying operator: {}", err),
            Self::PreconditionerError(err) => write!(f, "error applying preconditioner: {}", err),
            Self::StoppingCriterionError(err) => write!(f, "error evaluating stopping criterion: {}", err),
            Self::IndefiniteOperator => write!(f, "operator appears to be indefinite"),
            Self::IndefinitePreconditioner => write!(f, "preconditioner appears to be indefinite"),
            Self::MaxIterationsReached { max_iter } => {
                write!(f, "max iterations ({}) reached", max_iter)
            }
        }
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct SolveError<T> {
    pub output: CgOutput<T>,
    pub kind: SolveErrorKind,
}

impl<T> SolveError<T> {
    fn new(output: CgOutput<T>, kind: SolveErrorKind) -> Self {
        Self { output, kind }
    }
}

impl<T> fmt::Display for SolveError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CG solve failed after {} iterations: {}",
            self.output.num_iterations, self.kind
        )
    }
}

impl<T: fmt::Debug> std::error::Error for SolveError<T> {}

#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct CgOutput<T> {
    /// Number of iterations of the solver.
    ///
    /// Corresponds to the number of updates made to the (initial) solution vector.
    pub num_iterations: usize,
    /// Norm of the approximate residual maintained by the CG recurrence at termination.
    pub residual_norm: T,
}

impl<'a, T, A, P, Criterion> ConjugateGradient<'a, T, A, P, Criterion>
where
    T: RealField + Copy,
    A: LinearOperator<T>,
    P: LinearOperator<T>,
    Criterion: CgStoppingCriterion<T>,
{
    pub fn solve_with_guess<'b>(
        &mut self,
        b: impl Into<DVectorView<'b, T>>,
        x: impl Into<DVectorViewMut<'b, T>>,
    ) -> Result<CgOutput<T>, SolveError<T>> {
        self.solve_with_guess_(b.into(), x.into())
    }

    #[allow(non_snake_case)]
    fn solve_with_guess_(&mut self, b: DVectorView<T>, mut x: DVectorViewMut<T>) -> Result<CgOutput<T>, SolveError<T>> {
        use SolveErrorKind::*;
        assert_eq!(b.len(), x.len());
        let n = x.len();

        let mut output = CgOutput {
            num_iterations: 0,
            residual_norm: T::zero(),
        };

        let b_norm = b.norm();
        if b_norm == T::zero() {
            x.fill(T::zero());
            return Ok(output);
        }

        let Buffers { r, z, p, Ap } = self.workspace.prepare_buffers(n);

        // r = b - Ax
        if let Err(err) = self.operator.apply(r.rows_mut(0, n), x.rows(0, n)) {
            return Err(SolveError::new(output, OperatorError(err)));
        }
        r.axpy(T::one(), &b, -T::one());

        // z = Pr
        if let Err(err) = self.preconditioner.apply(z.rows_mut(0, n), r.rows(0, n)) {
            return Err(SolveError::new(output, PreconditionerError(err)));
        }

        // p = z
        p.copy_from(&*z);

        let mut zTr = z.dot(&*r);

        self.stopping_criterion
            .reset(&self.operator, x.rows(0, n), b.rows(0, n));

        loop {
            output.residual_norm = r.norm();
            let convergence = self.stopping_criterion.has_converged(
                &self.operator,
                x.rows(0, n),
                b.rows(0, n),
                b_norm,
                output.num_iterations,
                r.rows(0, n),
            );

            let has_converged = match convergence {
                Ok(converged) => converged,
                Err(error_kind) => return Err(SolveError::new(output, error_kind)),
            };

            if has_converged {
                break;
            } else if let Some(max_iter) = self.max_iter {
                if output.num_iterations >= max_iter {
                    return Err(SolveError::new(output, MaxIterationsReached { max_iter }));
                }
            }

            // Ap = A * p
            if let Err(err) = self.operator.apply(Ap.rows_mut(0, n), p.rows(0, n)) {
                return Err(SolveError::new(output, OperatorError(err)));
            }
            let pAp = p.dot(&*Ap);

            if pAp <= T::zero() {
                return Err(SolveError::new(output, IndefiniteOperator));
            }
            if zTr <= T::zero() {
                return Err(SolveError::new(output, IndefinitePreconditioner));
            }

            let alpha = zTr / pAp;
            // x <- x + alpha * p
            x.axpy(alpha, &*p, T::one());
            // r <- r - alpha * Ap
            r.axpy(-alpha, &*Ap, T::one());

            // Number of iterations corresponds to number of updates to the x vector
            output.num_iterations += 1;

            // z <- P r
            if let Err(err) = self.preconditioner.apply(z.rows_mut(0, n), r.rows(0, n)) {
                return Err(SolveError::new(output, PreconditionerError(err)));
            }
            let zTr_next = z.dot(&*r);
            let beta = zTr_next / zTr;

            // p <- z + beta * p
            p.axpy(T::one(), &*z, beta);

            zTr = zTr_next;
        }

        Ok(output)
    }
}
