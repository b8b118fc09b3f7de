use faer::linalg::triangular_solve::{
    solve_lower_triangular_in_place, solve_upper_triangular_in_place,
};
use faer::diag::DiagRef;
use faer::{MatRef, Par, Side};
use ndarray::{Array1, Array2, ArrayBase, Data, Ix2};
use std::marker::PhantomData;
use thiserror::Error;

/// Relative pivot size below which a triangular factor is treated as singular.
const RANK_REL_TOL: f64 = 1e-12;

#[derive(Debug, Error)]
pub enum FaerLinalgError {
    #[error("Factorization failed")]
    FactorizationFailed,
    #[error("Matrix is rank deficient: pivot {index} is {pivot:.3e} (largest {largest:.3e})")]
    RankDeficient {
        index: usize,
        pivot: f64,
        largest: f64,
    },
    #[error("Solve produced non-finite values")]
    NonFiniteSolution,
    #[error("Failed to build sparse matrix: {0}")]
    SparseCreation(String),
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),
}

/// Zero-copy `MatRef` over an ndarray matrix, copying only for layouts faer cannot address.
pub struct FaerArrayView<'a> {
    ptr: *const f64,
    rows: usize,
    cols: usize,
    row_stride: isize,
    col_stride: isize,
    owned: Option<Array2<f64>>,
    _marker: PhantomData<&'a f64>,
}

impl<'a> FaerArrayView<'a> {
    pub fn new<S: Data<Elem = f64>>(array: &'a ArrayBase<S, Ix2>) -> Self {
        let (rows, cols) = array.dim();
        let strides = array.strides();
        // Negative or zero strides alias/reverse memory; materialize a compact copy instead.
        if strides[0] <= 0 || strides[1] <= 0 {
            let owned = array.to_owned();
            let owned_strides = owned.strides();
            return Self {
                ptr: owned.as_ptr(),
                rows,
                cols,
                row_stride: owned_strides[0],
                col_stride: owned_strides[1],
                owned: Some(owned),
                _marker: PhantomData,
            };
        }

        Self {
            ptr: array.as_ptr(),
            rows,
            cols,
            row_stride: strides[0],
            col_stride: strides[1],
            owned: None,
            _marker: PhantomData,
        }
    }

    #[inline]
    pub fn as_ref(&self) -> MatRef<'_, f64> {
        let (ptr, rows, cols, row_stride, col_stride) = if let Some(owned) = &self.owned {
            let strides = owned.strides();
            (
                owned.as_ptr(),
                owned.nrows(),
                owned.ncols(),
                strides[0],
                strides[1],
            )
        } else {
            (
                self.ptr,
                self.rows,
                self.cols,
                self.row_stride,
                self.col_stride,
            )
        };
        // SAFETY: pointer/shape/strides come either from a live ndarray view with positive
        // strides or from the owned copy held by `self`, both valid for the returned lifetime.
        unsafe { MatRef::from_raw_parts(ptr, rows, cols, row_stride, col_stride) }
    }
}

pub fn mat_to_array(mat: MatRef<'_, f64>) -> Array2<f64> {
    let mut out = Array2::<f64>::zeros((mat.nrows(), mat.ncols()));
    for j in 0..mat.ncols() {
        for i in 0..mat.nrows() {
            out[[i, j]] = mat[(i, j)];
        }
    }
    out
}

/// Householder-QR least squares for `A X = B` with any number of right-hand sides.
///
/// Tall or square `A` gives the least-squares solution `R^-1 Q' B`; wide `A` gives the
/// minimum-norm solution through the QR factorization of `A'`. Only the thin `Q` is formed.
pub trait FaerLstsq {
    fn qr_lstsq(&self, rhs: &Array2<f64>) -> Result<Array2<f64>, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerLstsq for ArrayBase<S, Ix2> {
    fn qr_lstsq(&self, rhs: &Array2<f64>) -> Result<Array2<f64>, FaerLinalgError> {
        let (m, n) = self.dim();
        if rhs.nrows() != m {
            return Err(FaerLinalgError::DimensionMismatch(format!(
                "matrix has {m} rows but right-hand side has {}",
                rhs.nrows()
            )));
        }
        if m == 0 || n == 0 {
            return Err(FaerLinalgError::DimensionMismatch(format!(
                "cannot solve an empty {m}x{n} system"
            )));
        }

        let rhs_view = FaerArrayView::new(rhs);
        let solution = if m >= n {
            let faer_view = FaerArrayView::new(self);
            let qr = faer_view.as_ref().qr();
            let r = qr.R().get(..n, ..n);
            check_triangular_rank(r)?;
            let q = qr.compute_thin_Q();
            let mut x = q.as_ref().transpose() * rhs_view.as_ref();
            solve_upper_triangular_in_place(r, x.as_mut(), Par::Seq);
            mat_to_array(x.as_ref())
        } else {
            // A' = Q R  =>  A = R' Q', and the minimum-norm solution is Q R'^-1 B.
            let transposed = self.t();
            let faer_view = FaerArrayView::new(&transposed);
            let qr = faer_view.as_ref().qr();
            let r = qr.R().get(..m, ..m);
            check_triangular_rank(r)?;
            let mut z = rhs_view.as_ref().to_owned();
            solve_lower_triangular_in_place(r.transpose(), z.as_mut(), Par::Seq);
            let q = qr.compute_thin_Q();
            mat_to_array((q.as_ref() * z.as_ref()).as_ref())
        };

        if solution.iter().any(|v| !v.is_finite()) {
            return Err(FaerLinalgError::NonFiniteSolution);
        }
        Ok(solution)
    }
}

fn check_triangular_rank(r: MatRef<'_, f64>) -> Result<(), FaerLinalgError> {
    let size = r.nrows().min(r.ncols());
    let largest = (0..size).fold(0.0f64, |acc, i| acc.max(r[(i, i)].abs()));
    if !largest.is_finite() || largest == 0.0 {
        return Err(FaerLinalgError::RankDeficient {
            index: 0,
            pivot: 0.0,
            largest,
        });
    }
    for index in 0..size {
        let pivot = r[(index, index)];
        if pivot.abs() <= RANK_REL_TOL * largest {
            return Err(FaerLinalgError::RankDeficient {
                index,
                pivot,
                largest,
            });
        }
    }
    Ok(())
}

/// Minimum-norm least-squares solve for a symmetric, possibly singular `A`.
///
/// Uses the eigendecomposition `A = U diag(l) U'` and drops eigenvalues with
/// `|l| <= 1e-12 * max|l|`.
pub trait FaerSymmetricPinv {
    fn symmetric_pinv_solve(&self, rhs: &Array2<f64>) -> Result<Array2<f64>, FaerLinalgError>;
}

impl<S: Data<Elem = f64>> FaerSymmetricPinv for ArrayBase<S, Ix2> {
    fn symmetric_pinv_solve(&self, rhs: &Array2<f64>) -> Result<Array2<f64>, FaerLinalgError> {
        let (m, n) = self.dim();
        if m != n || rhs.nrows() != m {
            return Err(FaerLinalgError::DimensionMismatch(format!(
                "symmetric solve needs a square matrix matching the right-hand side, got {m}x{n} and {} rows",
                rhs.nrows()
            )));
        }

        let faer_view = FaerArrayView::new(self);
        let eigen = faer_view
            .as_ref()
            .self_adjoint_eigen(Side::Lower)
            .map_err(|_| FaerLinalgError::FactorizationFailed)?;
        let values = diag_to_array(eigen.S());
        let vectors = mat_to_array(eigen.U());

        let largest = values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()));
        if !largest.is_finite() || largest == 0.0 {
            return Err(FaerLinalgError::RankDeficient {
                index: 0,
                pivot: 0.0,
                largest,
            });
        }
        let inverse = values.mapv(|v| {
            if v.abs() > RANK_REL_TOL * largest {
                1.0 / v
            } else {
                0.0
            }
        });

        let mut projected = vectors.t().dot(rhs);
        for (mut row, scale) in projected.rows_mut().into_iter().zip(inverse.iter()) {
            row *= *scale;
        }
        let solution = vectors.dot(&projected);
        if solution.iter().any(|v| !v.is_finite()) {
            return Err(FaerLinalgError::NonFiniteSolution);
        }
        Ok(solution)
    }
}

fn diag_to_array(diag: DiagRef<'_, f64>) -> Array1<f64> {
    let mat = diag.column_vector().as_mat();
    let mut out = Array1::<f64>::zeros(mat.nrows());
    for i in 0..mat.nrows() {
        out[i] = mat[(i, 0)];
    }
    out
}
