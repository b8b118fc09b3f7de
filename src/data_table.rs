use crate::knots::unique_sorted;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DataTableError {
    #[error("Sample has {found} {kind} values but the table expects {expected}.")]
    DimensionMismatch {
        kind: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Sample contains a non-finite {kind} value at position {index}.")]
    NonFinite { kind: &'static str, index: usize },

    #[error("Input dimension {dim} is out of range for a table with {dim_x} input variables.")]
    DimensionOutOfRange { dim: usize, dim_x: usize },
}

/// One `(x, y)` observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
}

/// Ordered collection of samples sharing the same input/output dimensionality.
///
/// Samples keep their insertion order; everything downstream (design-matrix rows,
/// stacked targets, sample weights) is indexed by that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataTable {
    dim_x: usize,
    dim_y: usize,
    samples: Vec<Sample>,
}

impl DataTable {
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self {
            dim_x,
            dim_y,
            samples: Vec::new(),
        }
    }

    pub fn add_sample(&mut self, x: Vec<f64>, y: Vec<f64>) -> Result<(), DataTableError> {
        if x.len() != self.dim_x {
            return Err(DataTableError::DimensionMismatch {
                kind: "input",
                expected: self.dim_x,
                found: x.len(),
            });
        }
        if y.len() != self.dim_y {
            return Err(DataTableError::DimensionMismatch {
                kind: "output",
                expected: self.dim_y,
                found: y.len(),
            });
        }
        if let Some(index) = x.iter().position(|v| !v.is_finite()) {
            return Err(DataTableError::NonFinite {
                kind: "input",
                index,
            });
        }
        if let Some(index) = y.iter().position(|v| !v.is_finite()) {
            return Err(DataTableError::NonFinite {
                kind: "output",
                index,
            });
        }
        self.samples.push(Sample { x, y });
        Ok(())
    }

    /// Convenience for the common single-input, single-output case.
    pub fn add_scalar_sample(&mut self, x: f64, y: f64) -> Result<(), DataTableError> {
        self.add_sample(vec![x], vec![y])
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.dim_y
    }

    pub fn num_samples(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    /// The `dim`-th input of every sample, in table order.
    pub fn marginal_values(&self, dim: usize) -> Result<Vec<f64>, DataTableError> {
        self.check_dim(dim)?;
        Ok(self.samples.iter().map(|s| s.x[dim]).collect())
    }

    /// Sorted, deduplicated values of the `dim`-th input.
    pub fn unique_marginal_values(&self, dim: usize) -> Result<Vec<f64>, DataTableError> {
        Ok(unique_sorted(&self.marginal_values(dim)?))
    }

    /// True when the samples cover every point of the Cartesian grid spanned by the
    /// per-dimension unique values exactly once.
    pub fn is_grid_complete(&self) -> bool {
        if self.samples.is_empty() {
            return false;
        }

        let mut grid_points = 1usize;
        for dim in 0..self.dim_x {
            let unique = match self.unique_marginal_values(dim) {
                Ok(u) => u.len(),
                Err(_) => return false,
            };
            grid_points = match grid_points.checked_mul(unique) {
                Some(p) => p,
                None => return false,
            };
        }
        if grid_points != self.samples.len() {
            return false;
        }

        // -0.0 and 0.0 are the same grid coordinate.
        let mut seen = HashSet::with_capacity(self.samples.len());
        self.samples.iter().all(|s| {
            let key: Vec<u64> = s.x.iter().map(|v| (v + 0.0).to_bits()).collect();
            seen.insert(key)
        })
    }

    fn check_dim(&self, dim: usize) -> Result<(), DataTableError> {
        if dim >= self.dim_x {
            return Err(DataTableError::DimensionOutOfRange {
                dim,
                dim_x: self.dim_x,
            });
        }
        Ok(())
    }
}
