use crate::builder::FitError;
use crate::linalg::faer_ndarray::{FaerLinalgError, FaerLstsq, FaerSymmetricPinv};
use crate::linalg::sparse::{solve_sparse_lu, sparse_to_dense};
use crate::types::{DENSE_SOLVE_THRESHOLD, SolvePath};
use faer::sparse::SparseColMat;
use log::{debug, warn};
use ndarray::Array2;

/// Sparse-first solver for `A X = B` with a dense QR fallback.
///
/// Systems with fewer than `dense_threshold` equations go straight to dense QR. Larger
/// square systems try a sparse LU factorization first; any failure there falls back to
/// QR. Rectangular systems are always solved by QR in the least-squares sense. A
/// rank-deficient symmetric system (the normal equations with `alpha = 0` on too few
/// samples) gets its minimum-norm least-squares solution instead of an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinearSolver {
    dense_threshold: usize,
}

impl Default for LinearSolver {
    fn default() -> Self {
        Self::new(DENSE_SOLVE_THRESHOLD)
    }
}

impl LinearSolver {
    pub fn new(dense_threshold: usize) -> Self {
        Self { dense_threshold }
    }

    pub fn solve(
        &self,
        lhs: &SparseColMat<usize, f64>,
        rhs: &Array2<f64>,
    ) -> Result<(Array2<f64>, SolvePath), FitError> {
        if rhs.nrows() != lhs.nrows() {
            return Err(FitError::DimensionMismatch {
                what: "right-hand side rows",
                expected: lhs.nrows(),
                found: rhs.nrows(),
            });
        }

        let num_equations = lhs.nrows();
        let square = lhs.nrows() == lhs.ncols();
        if num_equations >= self.dense_threshold && square {
            match solve_sparse_lu(lhs, rhs) {
                Ok(solution) => {
                    debug!("Solved {num_equations}x{num_equations} system with sparse LU");
                    return Ok((solution, SolvePath::Sparse));
                }
                Err(err) => {
                    warn!("Sparse LU failed on {num_equations} equations ({err}); retrying with dense QR");
                }
            }
        } else {
            debug!(
                "Solving {}x{} system with dense QR (threshold {}, square: {square})",
                lhs.nrows(),
                lhs.ncols(),
                self.dense_threshold
            );
        }

        let dense = sparse_to_dense(lhs);
        let solution = match dense.qr_lstsq(rhs) {
            Ok(solution) => solution,
            Err(FaerLinalgError::RankDeficient { index, .. }) if is_symmetric(&dense) => {
                debug!(
                    "Dense QR found a rank-deficient symmetric system (pivot {index}); using the minimum-norm solution"
                );
                dense
                    .symmetric_pinv_solve(rhs)
                    .map_err(|err| FitError::SolveFailure(err.to_string()))?
            }
            Err(err) => return Err(FitError::SolveFailure(err.to_string())),
        };
        Ok((solution, SolvePath::Dense))
    }
}

fn is_symmetric(matrix: &Array2<f64>) -> bool {
    if matrix.nrows() != matrix.ncols() {
        return false;
    }
    let scale = matrix.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
    let tol = 1e-12 * scale.max(1.0);
    let n = matrix.nrows();
    (0..n).all(|i| (i + 1..n).all(|j| (matrix[[i, j]] - matrix[[j, i]]).abs() <= tol))
}
