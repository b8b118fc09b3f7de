use crate::types::KnotSpacing;
use ndarray::{Array, Array1};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum KnotError {
    #[error("Expected {expected} {what} (one per input variable), got {found}.")]
    InconsistentSizes {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error(
        "Dimension {dim}: only {unique} unique sample values for a degree {degree} basis with {requested} basis functions; at least degree + 1 are required."
    )]
    TooFewBasisFunctions {
        dim: usize,
        degree: usize,
        unique: usize,
        requested: usize,
    },

    #[error("Dimension {dim}: sample values span a zero-width range at {value}.")]
    DegenerateRange { dim: usize, value: f64 },
}

/// One knot vector per input dimension from the marginal sample values.
///
/// `marginals[d]` holds the values of input `d` over all samples (any order, duplicates
/// allowed). `target_basis_counts[d] <= 1` lets the data decide the basis size.
pub fn compute_knot_vectors(
    marginals: &[Vec<f64>],
    degrees: &[usize],
    target_basis_counts: &[usize],
    spacing: KnotSpacing,
) -> Result<Vec<Array1<f64>>, KnotError> {
    let dim_x = marginals.len();
    if degrees.len() != dim_x {
        return Err(KnotError::InconsistentSizes {
            what: "degrees",
            expected: dim_x,
            found: degrees.len(),
        });
    }
    if target_basis_counts.len() != dim_x {
        return Err(KnotError::InconsistentSizes {
            what: "basis function counts",
            expected: dim_x,
            found: target_basis_counts.len(),
        });
    }

    marginals
        .iter()
        .enumerate()
        .map(|(dim, values)| {
            compute_knot_vector(dim, values, degrees[dim], target_basis_counts[dim], spacing)
        })
        .collect()
}

pub fn compute_knot_vector(
    dim: usize,
    values: &[f64],
    degree: usize,
    target_basis_count: usize,
    spacing: KnotSpacing,
) -> Result<Array1<f64>, KnotError> {
    let unique = unique_sorted(values);
    match spacing {
        KnotSpacing::AsSampled => knot_vector_moving_average(dim, &unique, degree),
        KnotSpacing::Equidistant => {
            knot_vector_equidistant(dim, &unique, degree, target_basis_count)
        }
        KnotSpacing::Experimental => {
            knot_vector_equidistant_unclamped(dim, &unique, degree, target_basis_count)
        }
    }
}

/// Sorted by `total_cmp`, exact duplicates removed.
pub(crate) fn unique_sorted(values: &[f64]) -> Vec<f64> {
    let mut unique = values.to_vec();
    unique.sort_by(f64::total_cmp);
    unique.dedup();
    unique
}

fn resolve_basis_count(
    dim: usize,
    unique: &[f64],
    degree: usize,
    target_basis_count: usize,
) -> Result<usize, KnotError> {
    let requested = if target_basis_count > 1 {
        target_basis_count
    } else {
        unique.len()
    };
    if unique.is_empty() || requested < degree + 1 {
        return Err(KnotError::TooFewBasisFunctions {
            dim,
            degree,
            unique: unique.len(),
            requested,
        });
    }
    Ok(requested)
}

fn check_range(
    dim: usize,
    unique: &[f64],
    degree: usize,
    num_basis: usize,
) -> Result<(f64, f64), KnotError> {
    let (min_val, max_val) = (unique[0], unique[unique.len() - 1]);
    // A single constant basis function is the only basis that fits on a point.
    if min_val == max_val && !(degree == 0 && num_basis == 1) {
        return Err(KnotError::DegenerateRange {
            dim,
            value: min_val,
        });
    }
    Ok((min_val, max_val))
}

/// Clamped knots whose interior positions are moving averages over windows of
/// `degree + 2` consecutive unique values, the first window starting at the minimum.
/// Gives one basis function per unique value, so a complete grid yields a square
/// interpolation system.
fn knot_vector_moving_average(
    dim: usize,
    unique: &[f64],
    degree: usize,
) -> Result<Array1<f64>, KnotError> {
    let n = resolve_basis_count(dim, unique, degree, 0)?;
    let (min_val, max_val) = check_range(dim, unique, degree, n)?;

    let num_interior = n - degree - 1;
    let window_len = degree + 2;
    let mut knots = Vec::with_capacity(n + degree + 1);
    knots.extend(std::iter::repeat_n(min_val, degree + 1));
    knots.extend(
        unique
            .windows(window_len)
            .take(num_interior)
            .map(|window| window.iter().sum::<f64>() / window_len as f64),
    );
    knots.extend(std::iter::repeat_n(max_val, degree + 1));

    Ok(Array::from_vec(knots))
}

/// Clamped knots with `num_basis - degree - 1` uniformly spaced interior knots.
fn knot_vector_equidistant(
    dim: usize,
    unique: &[f64],
    degree: usize,
    target_basis_count: usize,
) -> Result<Array1<f64>, KnotError> {
    let n = resolve_basis_count(dim, unique, degree, target_basis_count)?;
    let (min_val, max_val) = check_range(dim, unique, degree, n)?;

    let num_interior = n - degree - 1;
    let h = (max_val - min_val) / (num_interior as f64 + 1.0);
    let mut knots = Vec::with_capacity(n + degree + 1);
    knots.extend(std::iter::repeat_n(min_val, degree + 1));
    for i in 1..=num_interior {
        knots.push(min_val + i as f64 * h);
    }
    knots.extend(std::iter::repeat_n(max_val, degree + 1));

    Ok(Array::from_vec(knots))
}

/// Uniform knots without end clamping. The spacing is chosen so that the valid domain
/// `[t_degree, t_n]` coincides with the sample range.
fn knot_vector_equidistant_unclamped(
    dim: usize,
    unique: &[f64],
    degree: usize,
    target_basis_count: usize,
) -> Result<Array1<f64>, KnotError> {
    let n = resolve_basis_count(dim, unique, degree, target_basis_count)?;
    let (min_val, max_val) = check_range(dim, unique, degree, n)?;

    if min_val == max_val {
        return Ok(Array::from_vec(vec![min_val; n + degree + 1]));
    }
    let h = (max_val - min_val) / (n - degree) as f64;
    let knots = (0..n + degree + 1)
        .map(|i| min_val + (i as f64 - degree as f64) * h)
        .collect();

    Ok(Array::from_vec(knots))
}
