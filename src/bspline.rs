use crate::basis::{
    BasisError, TensorBasisScratch, compute_tensor_strides, evaluate_tensor_basis_into,
    validate_knots_for_degree,
};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};

/// Tensor-product B-spline: per-dimension knot vectors and degrees, plus the control
/// points attached once the spline has been fitted.
///
/// Basis functions are indexed on the flattened tensor grid with the last input
/// dimension varying fastest.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "BSplineParts", into = "BSplineParts")]
pub struct BSpline {
    dim_x: usize,
    dim_y: usize,
    degrees: Vec<usize>,
    knot_vectors: Vec<Array1<f64>>,
    num_basis_per_variable: Vec<usize>,
    strides: Vec<usize>,
    num_basis_functions: usize,
    control_points: Option<Array2<f64>>,
}

/// Serialized form; derived quantities are rebuilt (and re-validated) on load.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct BSplineParts {
    dim_x: usize,
    dim_y: usize,
    degrees: Vec<usize>,
    knot_vectors: Vec<Array1<f64>>,
    control_points: Option<Array2<f64>>,
}

impl From<BSpline> for BSplineParts {
    fn from(spline: BSpline) -> Self {
        Self {
            dim_x: spline.dim_x,
            dim_y: spline.dim_y,
            degrees: spline.degrees,
            knot_vectors: spline.knot_vectors,
            control_points: spline.control_points,
        }
    }
}

impl TryFrom<BSplineParts> for BSpline {
    type Error = BasisError;

    fn try_from(parts: BSplineParts) -> Result<Self, Self::Error> {
        let mut spline = BSpline::new(parts.dim_x, parts.dim_y, parts.knot_vectors, parts.degrees)?;
        if let Some(control_points) = parts.control_points {
            spline.set_control_points(control_points)?;
        }
        Ok(spline)
    }
}

impl BSpline {
    /// Builds a spline shell without control points. It can evaluate its basis but not
    /// the spline itself until [`BSpline::set_control_points`] is called.
    pub fn new(
        dim_x: usize,
        dim_y: usize,
        knot_vectors: Vec<Array1<f64>>,
        degrees: Vec<usize>,
    ) -> Result<Self, BasisError> {
        if dim_x == 0 || dim_y == 0 {
            return Err(BasisError::DimensionMismatch(format!(
                "a spline needs at least one input and one output, got dim_x={dim_x}, dim_y={dim_y}"
            )));
        }
        if knot_vectors.len() != dim_x || degrees.len() != dim_x {
            return Err(BasisError::DimensionMismatch(format!(
                "expected {dim_x} knot vectors and degrees, got {} and {}",
                knot_vectors.len(),
                degrees.len()
            )));
        }

        let mut num_basis_per_variable = Vec::with_capacity(dim_x);
        for (knots, &degree) in knot_vectors.iter().zip(degrees.iter()) {
            validate_knots_for_degree(knots.view(), degree)?;
            num_basis_per_variable.push(knots.len() - degree - 1);
        }
        let strides = compute_tensor_strides(&num_basis_per_variable)?;
        let num_basis_functions = strides[0] * num_basis_per_variable[0];

        Ok(Self {
            dim_x,
            dim_y,
            degrees,
            knot_vectors,
            num_basis_per_variable,
            strides,
            num_basis_functions,
            control_points: None,
        })
    }

    pub fn dim_x(&self) -> usize {
        self.dim_x
    }

    pub fn dim_y(&self) -> usize {
        self.dim_y
    }

    pub fn degrees(&self) -> &[usize] {
        &self.degrees
    }

    pub fn knot_vectors(&self) -> &[Array1<f64>] {
        &self.knot_vectors
    }

    pub fn num_basis_functions(&self) -> usize {
        self.num_basis_functions
    }

    pub fn num_basis_functions_per_variable(&self) -> &[usize] {
        &self.num_basis_per_variable
    }

    /// Upper bound on the nonzero basis functions at any point: `prod(degree + 1)`.
    pub fn num_supported(&self) -> usize {
        self.degrees
            .iter()
            .fold(1usize, |acc, &d| acc.saturating_mul(d + 1))
    }

    pub fn domain_lower_bound(&self) -> Vec<f64> {
        self.knot_vectors
            .iter()
            .zip(&self.degrees)
            .map(|(knots, &degree)| knots[degree])
            .collect()
    }

    pub fn domain_upper_bound(&self) -> Vec<f64> {
        self.knot_vectors
            .iter()
            .zip(&self.num_basis_per_variable)
            .map(|(knots, &n)| knots[n])
            .collect()
    }

    pub fn control_points(&self) -> Option<&Array2<f64>> {
        self.control_points.as_ref()
    }

    pub fn has_control_points(&self) -> bool {
        self.control_points.is_some()
    }

    /// Attaches a `num_basis_functions x dim_y` coefficient matrix.
    pub fn set_control_points(&mut self, control_points: Array2<f64>) -> Result<(), BasisError> {
        if control_points.dim() != (self.num_basis_functions, self.dim_y) {
            return Err(BasisError::DimensionMismatch(format!(
                "control points must be {}x{}, got {}x{}",
                self.num_basis_functions,
                self.dim_y,
                control_points.nrows(),
                control_points.ncols()
            )));
        }
        self.control_points = Some(control_points);
        Ok(())
    }

    pub fn basis_scratch(&self) -> TensorBasisScratch {
        TensorBasisScratch::new(&self.degrees)
    }

    /// Streams the nonzero basis values at `x` as `(basis index, value)`.
    pub fn eval_basis_into<F>(
        &self,
        x: &[f64],
        scratch: &mut TensorBasisScratch,
        write_entry: F,
    ) -> Result<(), BasisError>
    where
        F: FnMut(usize, f64),
    {
        self.check_input(x)?;
        evaluate_tensor_basis_into(
            x,
            &self.knot_vectors,
            &self.degrees,
            &self.strides,
            scratch,
            write_entry,
        );
        Ok(())
    }

    /// Sparse basis row at `x`: only basis functions with local support appear.
    pub fn eval_basis(&self, x: &[f64]) -> Result<Vec<(usize, f64)>, BasisError> {
        let mut scratch = self.basis_scratch();
        let mut entries = Vec::with_capacity(self.num_supported());
        self.eval_basis_into(x, &mut scratch, |col, value| entries.push((col, value)))?;
        Ok(entries)
    }

    /// Spline value at `x`, one entry per output.
    pub fn eval(&self, x: &[f64]) -> Result<Array1<f64>, BasisError> {
        let control_points = self
            .control_points
            .as_ref()
            .ok_or(BasisError::MissingControlPoints)?;
        let mut out = Array1::<f64>::zeros(self.dim_y);
        let mut scratch = self.basis_scratch();
        self.eval_basis_into(x, &mut scratch, |col, value| {
            out.scaled_add(value, &control_points.row(col));
        })?;
        Ok(out)
    }

    fn check_input(&self, x: &[f64]) -> Result<(), BasisError> {
        if x.len() != self.dim_x {
            return Err(BasisError::DimensionMismatch(format!(
                "expected an input of length {}, got {}",
                self.dim_x,
                x.len()
            )));
        }
        Ok(())
    }
}
