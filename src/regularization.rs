use crate::linalg::faer_ndarray::FaerLinalgError;
use crate::linalg::sparse::{
    sparse_add_scaled, sparse_identity, sparse_weighted_gram, sparse_weighted_transpose_mul_dense,
};
use crate::penalty::{PenaltyError, second_order_difference_penalty};
use crate::types::Smoothing;
use faer::sparse::SparseColMat;
use ndarray::Array2;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegularizationError {
    #[error("Design matrix has {basis_rows} rows but {target_rows} target rows were given.")]
    TargetMismatch {
        basis_rows: usize,
        target_rows: usize,
    },

    #[error(transparent)]
    Penalty(#[from] PenaltyError),

    #[error(transparent)]
    Linalg(#[from] FaerLinalgError),
}

/// The linear system `lhs * C = rhs` whose solution are the control points.
#[derive(Debug, Clone)]
pub struct RegularizedSystem {
    pub lhs: SparseColMat<usize, f64>,
    pub rhs: Array2<f64>,
}

impl RegularizedSystem {
    pub fn num_equations(&self) -> usize {
        self.lhs.nrows()
    }
}

/// Forms the system for the requested smoothing mode.
///
/// * `None`: `B C = Y`, possibly rectangular.
/// * `Identity`: `(B'B + alpha I) C = B'Y`.
/// * `PSpline`: `(B'WB + alpha D'D) C = B'WY`, `W = diag(weights)` or the identity.
///
/// Sample weights only enter the P-spline normal equations.
pub fn build_regularized_system(
    basis: &SparseColMat<usize, f64>,
    targets: &Array2<f64>,
    smoothing: Smoothing,
    alpha: f64,
    weights: Option<&[f64]>,
    num_basis_per_dim: &[usize],
) -> Result<RegularizedSystem, RegularizationError> {
    if basis.nrows() != targets.nrows() {
        return Err(RegularizationError::TargetMismatch {
            basis_rows: basis.nrows(),
            target_rows: targets.nrows(),
        });
    }

    let system = match smoothing {
        Smoothing::None => RegularizedSystem {
            lhs: basis.clone(),
            rhs: targets.clone(),
        },
        Smoothing::Identity => {
            let gram = sparse_weighted_gram(basis, None)?;
            let ridge = sparse_identity(basis.ncols())?;
            RegularizedSystem {
                lhs: sparse_add_scaled(&gram, &ridge, alpha)?,
                rhs: sparse_weighted_transpose_mul_dense(basis, None, targets)?,
            }
        }
        Smoothing::PSpline => {
            let penalty = second_order_difference_penalty(num_basis_per_dim)?;
            let gram = sparse_weighted_gram(basis, weights)?;
            RegularizedSystem {
                lhs: sparse_add_scaled(&gram, &penalty, alpha)?,
                rhs: sparse_weighted_transpose_mul_dense(basis, weights, targets)?,
            }
        }
    };
    Ok(system)
}
