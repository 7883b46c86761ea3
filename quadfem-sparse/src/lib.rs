//! Sparse linear algebra for quadfem: iterative solvers and small helpers on top of
//! [`nalgebra_sparse`].
pub use nalgebra_sparse;

use nalgebra::RealField;
use nalgebra_sparse::CsrMatrix;

pub mod cg;

/// Returns `true` if `|a_ij - a_ji| <= tol` for all entries of the matrix.
///
/// Explicitly stored entries and implicit zeros are treated alike, so the pattern need not be
/// symmetric.
pub fn is_symmetric<T: RealField + Copy>(matrix: &CsrMatrix<T>, tol: T) -> bool {
    if matrix.nrows() != matrix.ncols() {
        return false;
    }
    let value_at = |i: usize, j: usize| {
        matrix
            .get_entry(i, j)
            .map(|entry| entry.into_value())
            .unwrap_or_else(T::zero)
    };
    matrix
        .triplet_iter()
        .all(|(i, j, &a_ij)| (a_ij - value_at(j, i)).abs() <= tol)
}

/// The diagonal of a square CSR matrix, with zeros for missing diagonal entries.
pub fn diagonal<T: RealField + Copy>(matrix: &CsrMatrix<T>) -> Vec<T> {
    (0..matrix.nrows().min(matrix.ncols()))
        .map(|i| {
            matrix
                .get_entry(i, i)
                .map(|entry| entry.into_value())
                .unwrap_or_else(T::zero)
        })
        .collect()
}
