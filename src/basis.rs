use crate::bspline::BSpline;
use crate::data_table::DataTable;
use faer::sparse::{SparseColMat, Triplet};
use ndarray::{Array1, Array2, ArrayView1};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::OnceLock;
use thiserror::Error;

/// Tables with at least this many samples assemble their design matrix in parallel.
const PAR_THRESHOLD: usize = 256;
const CHUNK_SIZE: usize = 1024;

fn bspline_thread_pool() -> &'static ThreadPool {
    static POOL: OnceLock<ThreadPool> = OnceLock::new();
    POOL.get_or_init(|| {
        ThreadPoolBuilder::new()
            .build()
            .expect("bspline thread pool initialization should succeed")
    })
}

/// Errors raised while constructing or evaluating a tensor-product B-spline.
#[derive(Error, Debug)]
pub enum BasisError {
    #[error(
        "Insufficient knots for degree {degree} spline: need at least {required} knots but only {provided} were provided."
    )]
    InsufficientKnotsForDegree {
        degree: usize,
        required: usize,
        provided: usize,
    },

    #[error(
        "The provided knot vector is invalid: {0}. It must be non-decreasing and contain only finite values."
    )]
    InvalidKnotVector(String),

    #[error("Failed to build sparse basis matrix: {0}")]
    SparseCreation(String),

    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    #[error("Control points have not been set; the spline can only evaluate its basis.")]
    MissingControlPoints,
}

pub(crate) fn validate_knots_for_degree(
    knot_vector: ArrayView1<f64>,
    degree: usize,
) -> Result<(), BasisError> {
    // At least `degree + 1` basis functions, so every span has a full support window.
    let required_knots = 2 * (degree + 1);
    if knot_vector.len() < required_knots {
        return Err(BasisError::InsufficientKnotsForDegree {
            degree,
            required: required_knots,
            provided: knot_vector.len(),
        });
    }

    if knot_vector.iter().any(|&k| !k.is_finite()) {
        return Err(BasisError::InvalidKnotVector(
            "knot vector contains non-finite (NaN or Infinity) values".to_string(),
        ));
    }

    for i in 0..(knot_vector.len() - 1) {
        if knot_vector[i] > knot_vector[i + 1] {
            return Err(BasisError::InvalidKnotVector(
                "knot vector is not non-decreasing".to_string(),
            ));
        }
    }

    // A positive-degree basis over an empty domain is identically zero.
    let num_basis = knot_vector.len() - degree - 1;
    if degree > 0 && knot_vector[degree] >= knot_vector[num_basis] {
        return Err(BasisError::InvalidKnotVector(format!(
            "domain [{}, {}] is empty",
            knot_vector[degree], knot_vector[num_basis]
        )));
    }

    Ok(())
}

/// Row-major strides over the tensor basis grid: the last dimension varies fastest.
pub(crate) fn compute_tensor_strides(num_basis: &[usize]) -> Result<Vec<usize>, BasisError> {
    let mut strides = vec![1usize; num_basis.len()];
    let mut acc = 1usize;
    for i in (0..num_basis.len()).rev() {
        strides[i] = acc;
        acc = acc
            .checked_mul(num_basis[i])
            .ok_or_else(|| BasisError::DimensionMismatch("tensor basis too large".to_string()))?;
    }
    Ok(strides)
}

/// Reusable per-dimension buffers for evaluating one tensor basis row.
#[derive(Clone, Debug)]
pub struct TensorBasisScratch {
    splines: Vec<internal::BsplineScratch>,
    values: Vec<Vec<f64>>,
    starts: Vec<usize>,
    indices: Vec<usize>,
}

impl TensorBasisScratch {
    pub fn new(degrees: &[usize]) -> Self {
        Self {
            splines: degrees
                .iter()
                .map(|&d| internal::BsplineScratch::new(d))
                .collect(),
            values: degrees.iter().map(|&d| vec![0.0; d + 1]).collect(),
            starts: vec![0; degrees.len()],
            indices: vec![0; degrees.len()],
        }
    }
}

/// Evaluates the nonzero tensor-product basis functions at `x`, reporting each as
/// `(flattened column, value)`. Callers guarantee matching lengths and valid knots.
pub(crate) fn evaluate_tensor_basis_into<F>(
    x: &[f64],
    knot_vectors: &[Array1<f64>],
    degrees: &[usize],
    strides: &[usize],
    scratch: &mut TensorBasisScratch,
    mut write_entry: F,
) where
    F: FnMut(usize, f64),
{
    let dims = x.len();
    for dim in 0..dims {
        scratch.starts[dim] = internal::evaluate_splines_sparse_into(
            x[dim],
            degrees[dim],
            knot_vectors[dim].view(),
            &mut scratch.values[dim],
            &mut scratch.splines[dim],
        );
    }

    scratch.indices.fill(0);
    loop {
        let mut product = 1.0f64;
        let mut col = 0usize;
        for dim in 0..dims {
            product *= scratch.values[dim][scratch.indices[dim]];
            if product == 0.0 {
                break;
            }
            col += (scratch.starts[dim] + scratch.indices[dim]) * strides[dim];
        }
        if product != 0.0 {
            write_entry(col, product);
        }

        let mut carried = true;
        for dim in (0..dims).rev() {
            scratch.indices[dim] += 1;
            if scratch.indices[dim] <= degrees[dim] {
                carried = false;
                break;
            }
            scratch.indices[dim] = 0;
        }
        if carried {
            break;
        }
    }
}

/// Design matrix `B` with one row per sample (table order) and one column per tensor
/// basis function. Entries are the nonzero basis values reported by the spline.
pub fn build_basis_matrix(
    bspline: &BSpline,
    table: &DataTable,
) -> Result<SparseColMat<usize, f64>, BasisError> {
    if table.dim_x() != bspline.dim_x() {
        return Err(BasisError::DimensionMismatch(format!(
            "table has {} inputs but the spline has {}",
            table.dim_x(),
            bspline.dim_x()
        )));
    }

    let nrows = table.num_samples();
    let ncols = bspline.num_basis_functions();
    let per_row = bspline.num_supported();
    let samples = table.samples();

    let triplets: Vec<Triplet<usize, usize, f64>> = if nrows >= PAR_THRESHOLD {
        let chunks = bspline_thread_pool().install(|| {
            samples
                .par_chunks(CHUNK_SIZE)
                .enumerate()
                .map_init(
                    || bspline.basis_scratch(),
                    |scratch, (chunk_idx, chunk)| {
                        let base_row = chunk_idx * CHUNK_SIZE;
                        let mut local = Vec::with_capacity(chunk.len().saturating_mul(per_row));
                        for (i, sample) in chunk.iter().enumerate() {
                            let row = base_row + i;
                            bspline.eval_basis_into(&sample.x, scratch, |col, v| {
                                local.push(Triplet::new(row, col, v))
                            })?;
                        }
                        Ok(local)
                    },
                )
                .collect::<Result<Vec<_>, BasisError>>()
        })?;

        let mut flattened = Vec::with_capacity(nrows.saturating_mul(per_row));
        for mut chunk in chunks {
            flattened.append(&mut chunk);
        }
        flattened
    } else {
        let mut scratch = bspline.basis_scratch();
        let mut triplets = Vec::with_capacity(nrows.saturating_mul(per_row));
        for (row, sample) in samples.iter().enumerate() {
            bspline.eval_basis_into(&sample.x, &mut scratch, |col, v| {
                triplets.push(Triplet::new(row, col, v))
            })?;
        }
        triplets
    };

    SparseColMat::try_new_from_triplets(nrows, ncols, &triplets)
        .map_err(|err| BasisError::SparseCreation(format!("{err:?}")))
}

/// Sample outputs stacked row by row into a `num_samples x dim_y` matrix.
pub fn stack_sample_values(table: &DataTable) -> Array2<f64> {
    let mut stacked = Array2::<f64>::zeros((table.num_samples(), table.dim_y()));
    for (mut row, sample) in stacked.rows_mut().into_iter().zip(table.samples()) {
        for (dst, &src) in row.iter_mut().zip(sample.y.iter()) {
            *dst = src;
        }
    }
    stacked
}

pub(crate) mod internal {
    use super::*;

    #[derive(Clone, Debug)]
    pub struct BsplineScratch {
        left: Vec<f64>,
        right: Vec<f64>,
        n: Vec<f64>,
    }

    impl BsplineScratch {
        #[inline]
        pub fn new(degree: usize) -> Self {
            let len = degree + 1;
            Self {
                left: vec![0.0; len],
                right: vec![0.0; len],
                n: vec![0.0; len],
            }
        }

        #[inline]
        fn ensure_degree(&mut self, degree: usize) {
            let len = degree + 1;
            if self.left.len() != len {
                self.left.resize(len, 0.0);
                self.right.resize(len, 0.0);
                self.n.resize(len, 0.0);
            }
        }
    }

    /// Evaluates the `degree + 1` possibly-nonzero basis functions at `x` with the
    /// Cox-de Boor recurrence (Piegl & Tiller, Algorithm A2.2) and returns the index of
    /// the first one. Points outside the domain use the boundary span, so the basis
    /// extrapolates polynomially instead of dropping to zero.
    #[inline]
    pub fn evaluate_splines_sparse_into(
        x: f64,
        degree: usize,
        knots: ArrayView1<f64>,
        values: &mut [f64],
        scratch: &mut BsplineScratch,
    ) -> usize {
        let num_knots = knots.len();
        let num_basis = num_knots - degree - 1;
        debug_assert_eq!(values.len(), degree + 1);

        scratch.ensure_degree(degree);
        scratch.n.fill(0.0);
        scratch.left.fill(0.0);
        scratch.right.fill(0.0);

        let mu = {
            if x >= knots[num_basis] {
                num_basis - 1
            } else if x < knots[degree] {
                degree
            } else {
                let mut span = degree;
                while span < num_basis && x >= knots[span + 1] {
                    span += 1;
                }
                span
            }
        };

        let left = &mut scratch.left;
        let right = &mut scratch.right;
        let n = &mut scratch.n;

        n[0] = 1.0;

        for d in 1..=degree {
            left[d] = x - knots[mu + 1 - d];
            right[d] = knots[mu + d] - x;

            let mut saved = 0.0;

            for r in 0..d {
                let den = right[r + 1] + left[d - r];
                let temp = if den.abs() > 1e-12 { n[r] / den } else { 0.0 };

                n[r] = saved + right[r + 1] * temp;
                saved = left[d - r] * temp;
            }
            n[d] = saved;
        }

        values.copy_from_slice(&n[..=degree]);

        mu.saturating_sub(degree)
    }
}
