use crate::basis::{BasisError, compute_tensor_strides};
use crate::linalg::faer_ndarray::FaerLinalgError;
use crate::linalg::sparse::{sparse_from_entries, sparse_weighted_gram};
use faer::sparse::SparseColMat;
use thiserror::Error;

/// Second differences need three consecutive coefficients.
pub const MIN_BASIS_FOR_SECOND_DIFFERENCE: usize = 3;

#[derive(Error, Debug)]
pub enum PenaltyError {
    #[error(
        "Dimension {dim} has {num_basis} basis functions; a second-order difference penalty needs at least 3."
    )]
    TooFewBasisFunctions { dim: usize, num_basis: usize },

    #[error("Cannot build a difference penalty without any input dimensions.")]
    NoDimensions,

    #[error(transparent)]
    Basis(#[from] BasisError),

    #[error(transparent)]
    Linalg(#[from] FaerLinalgError),
}

/// Fails on the first dimension that cannot carry a second-difference penalty.
pub fn check_second_difference_sizes(num_basis_per_dim: &[usize]) -> Result<(), PenaltyError> {
    if num_basis_per_dim.is_empty() {
        return Err(PenaltyError::NoDimensions);
    }
    match num_basis_per_dim
        .iter()
        .position(|&n| n < MIN_BASIS_FOR_SECOND_DIFFERENCE)
    {
        Some(dim) => Err(PenaltyError::TooFewBasisFunctions {
            dim,
            num_basis: num_basis_per_dim[dim],
        }),
        None => Ok(()),
    }
}

/// Sparse second-order difference operator `D` on the flattened coefficient grid.
///
/// Coefficients are flattened with the last dimension fastest, matching the basis
/// columns. Dimensions are processed last to first; within a dimension the rows run
/// over the slower block, then the difference position, then the faster block. Each
/// row is `c[base] - 2 c[base + stride] + c[base + 2 stride]`.
pub fn second_order_difference_matrix(
    num_basis_per_dim: &[usize],
) -> Result<SparseColMat<usize, f64>, PenaltyError> {
    check_second_difference_sizes(num_basis_per_dim)?;
    let strides = compute_tensor_strides(num_basis_per_dim)?;
    let total = strides[0] * num_basis_per_dim[0];

    let num_rows: usize = num_basis_per_dim
        .iter()
        .map(|&n| (n - 2) * (total / n))
        .sum();
    let mut entries = Vec::with_capacity(3 * num_rows);

    let mut row = 0;
    for dim in (0..num_basis_per_dim.len()).rev() {
        let n = num_basis_per_dim[dim];
        let inner = strides[dim];
        let outer = total / (n * inner);
        for block in 0..outer {
            for l in 0..n - 2 {
                for m in 0..inner {
                    let base = block * n * inner + l * inner + m;
                    entries.push((row, base, 1.0));
                    entries.push((row, base + inner, -2.0));
                    entries.push((row, base + 2 * inner, 1.0));
                    row += 1;
                }
            }
        }
    }
    debug_assert_eq!(row, num_rows);

    Ok(sparse_from_entries(num_rows, total, entries)?)
}

/// `D'D` for the tensor grid described by `num_basis_per_dim`.
pub fn second_order_difference_penalty(
    num_basis_per_dim: &[usize],
) -> Result<SparseColMat<usize, f64>, PenaltyError> {
    let d = second_order_difference_matrix(num_basis_per_dim)?;
    Ok(sparse_weighted_gram(&d, None)?)
}
