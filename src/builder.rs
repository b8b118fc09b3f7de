use crate::basis::{BasisError, build_basis_matrix, stack_sample_values};
use crate::bspline::BSpline;
use crate::data_table::{DataTable, DataTableError};
use crate::knots::{KnotError, compute_knot_vectors};
use crate::penalty::{PenaltyError, check_second_difference_sizes};
use crate::regularization::{RegularizationError, build_regularized_system};
use crate::solver::LinearSolver;
use crate::types::{BuilderConfig, DegreeSpec, KnotSpacing, SampleWeights, Smoothing, SolvePath};
use log::{debug, info};
use ndarray::Array1;
use thiserror::Error;

/// Errors surfaced by [`Builder::fit`]. Everything except `SolveFailure` is detected
/// before any matrix is assembled.
#[derive(Error, Debug)]
pub enum FitError {
    #[error("Dimension mismatch: expected {expected} {what}, found {found}.")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Inconsistent builder configuration: {0}")]
    InconsistentConfiguration(String),

    #[error("Invalid configuration for this data: {0}")]
    InvalidConfiguration(String),

    #[error("Failed to solve for control points: {0}")]
    SolveFailure(String),

    #[error("Underlying basis construction failed: {0}")]
    Basis(#[from] BasisError),

    #[error("Failed to assemble the regularized system: {0}")]
    SparseAssembly(String),
}

impl From<KnotError> for FitError {
    fn from(err: KnotError) -> Self {
        match err {
            KnotError::InconsistentSizes { .. } => {
                FitError::InconsistentConfiguration(err.to_string())
            }
            KnotError::TooFewBasisFunctions { .. } | KnotError::DegenerateRange { .. } => {
                FitError::InvalidConfiguration(err.to_string())
            }
        }
    }
}

impl From<DataTableError> for FitError {
    fn from(err: DataTableError) -> Self {
        match err {
            DataTableError::DimensionMismatch {
                kind,
                expected,
                found,
            } => FitError::DimensionMismatch {
                what: kind,
                expected,
                found,
            },
            other => FitError::InvalidParameter(other.to_string()),
        }
    }
}

impl From<PenaltyError> for FitError {
    fn from(err: PenaltyError) -> Self {
        match err {
            PenaltyError::Basis(inner) => FitError::Basis(inner),
            PenaltyError::Linalg(inner) => FitError::SparseAssembly(inner.to_string()),
            other => FitError::InvalidConfiguration(other.to_string()),
        }
    }
}

impl From<RegularizationError> for FitError {
    fn from(err: RegularizationError) -> Self {
        match err {
            RegularizationError::TargetMismatch {
                basis_rows,
                target_rows,
            } => FitError::DimensionMismatch {
                what: "target rows",
                expected: basis_rows,
                found: target_rows,
            },
            RegularizationError::Penalty(inner) => inner.into(),
            RegularizationError::Linalg(inner) => FitError::SparseAssembly(inner.to_string()),
        }
    }
}

/// A fitted spline together with how its coefficients were obtained.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub spline: BSpline,
    pub solve_path: SolvePath,
    pub num_equations: usize,
}

/// Fits tensor-product B-splines to a [`DataTable`].
///
/// Setters consume and return the builder; fitting borrows it, so one configured
/// builder can fit any number of tables.
#[derive(Debug, Clone, PartialEq)]
pub struct Builder {
    config: BuilderConfig,
}

impl Builder {
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self {
            config: BuilderConfig::new(dim_x, dim_y),
        }
    }

    pub fn from_config(config: BuilderConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Same degree in every input dimension.
    pub fn degree(mut self, degree: usize) -> Self {
        self.config.degrees = DegreeSpec::Explicit(vec![degree; self.config.dim_x]);
        self
    }

    pub fn degrees(mut self, degrees: Vec<usize>) -> Self {
        self.config.degrees = DegreeSpec::Explicit(degrees);
        self
    }

    /// Same basis-function count in every input dimension.
    pub fn num_basis_functions(mut self, num_basis_functions: usize) -> Self {
        self.config.num_basis_functions = vec![num_basis_functions; self.config.dim_x];
        self
    }

    pub fn num_basis_functions_per_dim(mut self, num_basis_functions: Vec<usize>) -> Self {
        self.config.num_basis_functions = num_basis_functions;
        self
    }

    pub fn knot_spacing(mut self, knot_spacing: KnotSpacing) -> Self {
        self.config.knot_spacing = knot_spacing;
        self
    }

    pub fn dense_solve_threshold(mut self, threshold: usize) -> Self {
        self.config.dense_solve_threshold = threshold;
        self
    }

    pub fn sample_weights(mut self, weights: SampleWeights) -> Self {
        self.config.sample_weights = weights;
        self
    }

    pub fn fit(
        &self,
        table: &DataTable,
        smoothing: Smoothing,
        alpha: f64,
    ) -> Result<BSpline, FitError> {
        Ok(self.fit_detailed(table, smoothing, alpha)?.spline)
    }

    /// Like [`Builder::fit`], also reporting the solve path and system size.
    pub fn fit_detailed(
        &self,
        table: &DataTable,
        smoothing: Smoothing,
        alpha: f64,
    ) -> Result<FitOutcome, FitError> {
        self.validate(table, alpha)?;
        if !table.is_grid_complete() {
            info!(
                "Fitting on an incomplete grid ({} samples); the fit may be poorly determined.",
                table.num_samples()
            );
        }

        let degrees = self.resolve_degrees(table)?;
        let knot_vectors = self.knot_vectors_for(table, &degrees)?;
        let mut spline = BSpline::new(
            self.config.dim_x,
            self.config.dim_y,
            knot_vectors,
            degrees,
        )?;
        if smoothing == Smoothing::PSpline {
            check_second_difference_sizes(spline.num_basis_functions_per_variable())?;
        }

        let weights = match &self.config.sample_weights {
            SampleWeights::Uniform => None,
            SampleWeights::PerSample(w) => {
                if smoothing != Smoothing::PSpline {
                    debug!("Sample weights only apply to P-spline smoothing; ignoring them");
                }
                Some(w.as_slice())
            }
        };

        let basis = build_basis_matrix(&spline, table)?;
        let targets = stack_sample_values(table);
        let system = build_regularized_system(
            &basis,
            &targets,
            smoothing,
            alpha,
            weights,
            spline.num_basis_functions_per_variable(),
        )?;
        let num_equations = system.num_equations();

        let solver = LinearSolver::new(self.config.dense_solve_threshold);
        let (control_points, solve_path) = solver.solve(&system.lhs, &system.rhs)?;
        spline.set_control_points(control_points)?;

        Ok(FitOutcome {
            spline,
            solve_path,
            num_equations,
        })
    }

    /// Knot vectors this builder would place for `table`, one per input dimension.
    pub fn compute_knot_vectors(&self, table: &DataTable) -> Result<Vec<Array1<f64>>, FitError> {
        self.check_dimensions(table)?;
        self.check_config_sizes()?;
        if table.is_empty() {
            return Err(FitError::InvalidParameter(
                "cannot place knots without samples".to_string(),
            ));
        }
        let degrees = self.resolve_degrees(table)?;
        self.knot_vectors_for(table, &degrees)
    }

    fn knot_vectors_for(
        &self,
        table: &DataTable,
        degrees: &[usize],
    ) -> Result<Vec<Array1<f64>>, FitError> {
        let marginals = (0..self.config.dim_x)
            .map(|dim| table.marginal_values(dim))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(compute_knot_vectors(
            &marginals,
            degrees,
            &self.config.target_basis_counts(),
            self.config.knot_spacing,
        )?)
    }

    /// Explicit degrees are used as given. The default degree is capped per dimension at
    /// `unique values - 1` so sparse inputs still get a valid, lower-order basis.
    fn resolve_degrees(&self, table: &DataTable) -> Result<Vec<usize>, FitError> {
        match &self.config.degrees {
            DegreeSpec::Explicit(degrees) => Ok(degrees.clone()),
            DegreeSpec::Default(degree) => (0..self.config.dim_x)
                .map(|dim| -> Result<usize, FitError> {
                    let unique = table.unique_marginal_values(dim)?.len();
                    let capped = (*degree).min(unique.saturating_sub(1));
                    if capped < *degree {
                        debug!(
                            "Dimension {dim} has {unique} unique values; lowering degree from {degree} to {capped}"
                        );
                    }
                    Ok(capped)
                })
                .collect(),
        }
    }

    fn validate(&self, table: &DataTable, alpha: f64) -> Result<(), FitError> {
        self.check_dimensions(table)?;

        if !alpha.is_finite() || alpha < 0.0 {
            return Err(FitError::InvalidParameter(format!(
                "regularization weight alpha must be finite and non-negative, got {alpha}"
            )));
        }

        self.check_config_sizes()?;

        if let SampleWeights::PerSample(weights) = &self.config.sample_weights {
            if weights.len() != table.num_samples() {
                return Err(FitError::InvalidParameter(format!(
                    "expected {} sample weights, got {}",
                    table.num_samples(),
                    weights.len()
                )));
            }
            if let Some(index) = weights.iter().position(|w| !w.is_finite() || *w < 0.0) {
                return Err(FitError::InvalidParameter(format!(
                    "sample weight {index} is {}; weights must be finite and non-negative",
                    weights[index]
                )));
            }
        }

        if table.is_empty() {
            return Err(FitError::InvalidParameter(
                "cannot fit a spline to an empty table".to_string(),
            ));
        }
        Ok(())
    }

    fn check_dimensions(&self, table: &DataTable) -> Result<(), FitError> {
        if table.dim_x() != self.config.dim_x {
            return Err(FitError::DimensionMismatch {
                what: "input dimensions",
                expected: self.config.dim_x,
                found: table.dim_x(),
            });
        }
        if table.dim_y() != self.config.dim_y {
            return Err(FitError::DimensionMismatch {
                what: "output dimensions",
                expected: self.config.dim_y,
                found: table.dim_y(),
            });
        }
        Ok(())
    }

    fn check_config_sizes(&self) -> Result<(), FitError> {
        let dim_x = self.config.dim_x;
        if let DegreeSpec::Explicit(degrees) = &self.config.degrees {
            if degrees.len() != dim_x {
                return Err(FitError::InconsistentConfiguration(format!(
                    "{} degrees given for {dim_x} input variables",
                    degrees.len()
                )));
            }
        }
        let counts = &self.config.num_basis_functions;
        if !counts.is_empty() && counts.len() != dim_x {
            return Err(FitError::InconsistentConfiguration(format!(
                "{} basis function counts given for {dim_x} input variables",
                counts.len()
            )));
        }
        Ok(())
    }
}
