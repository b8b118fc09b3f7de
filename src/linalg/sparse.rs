use crate::linalg::faer_ndarray::{FaerArrayView, FaerLinalgError};
use faer::linalg::solvers::Solve;
use faer::sparse::{SparseColMat, Triplet};
use ndarray::Array2;

/// Builds a CSC matrix from `(row, col, value)` entries, summing repeated coordinates.
pub fn sparse_from_entries(
    nrows: usize,
    ncols: usize,
    mut entries: Vec<(usize, usize, f64)>,
) -> Result<SparseColMat<usize, f64>, FaerLinalgError> {
    entries.sort_unstable_by_key(|&(row, col, _)| (col, row));
    let mut triplets: Vec<Triplet<usize, usize, f64>> = Vec::with_capacity(entries.len());
    let mut current: Option<(usize, usize, f64)> = None;
    for (row, col, value) in entries {
        current = match current {
            Some((r, c, acc)) if r == row && c == col => Some((r, c, acc + value)),
            Some((r, c, acc)) => {
                triplets.push(Triplet::new(r, c, acc));
                Some((row, col, value))
            }
            None => Some((row, col, value)),
        };
    }
    if let Some((r, c, acc)) = current {
        triplets.push(Triplet::new(r, c, acc));
    }

    SparseColMat::try_new_from_triplets(nrows, ncols, &triplets)
        .map_err(|err| FaerLinalgError::SparseCreation(format!("{err:?}")))
}

/// All stored entries of a CSC matrix as `(row, col, value)`.
pub fn sparse_entries(matrix: &SparseColMat<usize, f64>) -> Vec<(usize, usize, f64)> {
    let (symbolic, values) = matrix.parts();
    let col_ptr = symbolic.col_ptr();
    let row_idx = symbolic.row_idx();
    let mut out = Vec::with_capacity(values.len());
    for col in 0..matrix.ncols() {
        for idx in col_ptr[col]..col_ptr[col + 1] {
            out.push((row_idx[idx], col, values[idx]));
        }
    }
    out
}

pub fn sparse_identity(n: usize) -> Result<SparseColMat<usize, f64>, FaerLinalgError> {
    sparse_from_entries(n, n, (0..n).map(|i| (i, i, 1.0)).collect())
}

pub fn sparse_to_dense(matrix: &SparseColMat<usize, f64>) -> Array2<f64> {
    let mut dense = Array2::<f64>::zeros((matrix.nrows(), matrix.ncols()));
    for (row, col, value) in sparse_entries(matrix) {
        dense[[row, col]] += value;
    }
    dense
}

fn check_weights(nrows: usize, weights: Option<&[f64]>) -> Result<(), FaerLinalgError> {
    match weights {
        Some(w) if w.len() != nrows => Err(FaerLinalgError::DimensionMismatch(format!(
            "expected {nrows} weights, got {}",
            w.len()
        ))),
        _ => Ok(()),
    }
}

/// `A' W A` for sparse `A` and diagonal `W` (identity when `weights` is `None`).
///
/// Each row contributes the outer product of its nonzeros, so the cost is
/// `sum(nnz_row^2)` rather than anything proportional to `ncols^2`.
pub fn sparse_weighted_gram(
    matrix: &SparseColMat<usize, f64>,
    weights: Option<&[f64]>,
) -> Result<SparseColMat<usize, f64>, FaerLinalgError> {
    let nrows = matrix.nrows();
    let ncols = matrix.ncols();
    check_weights(nrows, weights)?;

    let mut rows: Vec<Vec<(usize, f64)>> = vec![Vec::new(); nrows];
    for (row, col, value) in sparse_entries(matrix) {
        rows[row].push((col, value));
    }

    let capacity = rows.iter().map(|r| r.len() * r.len()).sum();
    let mut entries = Vec::with_capacity(capacity);
    for (row, nonzeros) in rows.iter().enumerate() {
        let w = weights.map_or(1.0, |w| w[row]);
        if w == 0.0 {
            continue;
        }
        for &(ci, vi) in nonzeros {
            for &(cj, vj) in nonzeros {
                entries.push((ci, cj, w * vi * vj));
            }
        }
    }
    sparse_from_entries(ncols, ncols, entries)
}

/// `A' W B` for sparse `A`, diagonal `W`, and dense `B`.
pub fn sparse_weighted_transpose_mul_dense(
    matrix: &SparseColMat<usize, f64>,
    weights: Option<&[f64]>,
    rhs: &Array2<f64>,
) -> Result<Array2<f64>, FaerLinalgError> {
    let nrows = matrix.nrows();
    if rhs.nrows() != nrows {
        return Err(FaerLinalgError::DimensionMismatch(format!(
            "sparse matrix has {nrows} rows but dense operand has {}",
            rhs.nrows()
        )));
    }
    check_weights(nrows, weights)?;

    let mut out = Array2::<f64>::zeros((matrix.ncols(), rhs.ncols()));
    for (row, col, value) in sparse_entries(matrix) {
        let scale = value * weights.map_or(1.0, |w| w[row]);
        if scale == 0.0 {
            continue;
        }
        out.row_mut(col).scaled_add(scale, &rhs.row(row));
    }
    Ok(out)
}

/// `A + alpha * B` for sparse matrices of equal shape.
pub fn sparse_add_scaled(
    a: &SparseColMat<usize, f64>,
    b: &SparseColMat<usize, f64>,
    alpha: f64,
) -> Result<SparseColMat<usize, f64>, FaerLinalgError> {
    if a.nrows() != b.nrows() || a.ncols() != b.ncols() {
        return Err(FaerLinalgError::DimensionMismatch(format!(
            "cannot add {}x{} and {}x{} matrices",
            a.nrows(),
            a.ncols(),
            b.nrows(),
            b.ncols()
        )));
    }
    let mut entries = sparse_entries(a);
    if alpha != 0.0 {
        entries.extend(
            sparse_entries(b)
                .into_iter()
                .map(|(row, col, value)| (row, col, alpha * value)),
        );
    }
    sparse_from_entries(a.nrows(), a.ncols(), entries)
}

/// Solves the square system `A X = B` with a sparse LU factorization.
pub fn solve_sparse_lu(
    matrix: &SparseColMat<usize, f64>,
    rhs: &Array2<f64>,
) -> Result<Array2<f64>, FaerLinalgError> {
    if matrix.nrows() != matrix.ncols() {
        return Err(FaerLinalgError::DimensionMismatch(format!(
            "sparse LU needs a square matrix, got {}x{}",
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if rhs.nrows() != matrix.nrows() {
        return Err(FaerLinalgError::DimensionMismatch(format!(
            "matrix has {} rows but right-hand side has {}",
            matrix.nrows(),
            rhs.nrows()
        )));
    }

    let lu = matrix
        .as_ref()
        .sp_lu()
        .map_err(|_| FaerLinalgError::FactorizationFailed)?;
    let rhs_view = FaerArrayView::new(rhs);
    let out = lu.solve(rhs_view.as_ref());

    let mut result = Array2::<f64>::zeros(rhs.raw_dim());
    for j in 0..rhs.ncols() {
        for i in 0..rhs.nrows() {
            result[[i, j]] = out[(i, j)];
        }
    }
    if result.iter().any(|v| !v.is_finite()) {
        return Err(FaerLinalgError::NonFiniteSolution);
    }
    Ok(result)
}
