use serde::{Deserialize, Serialize};

/// Degree used for every input dimension unless the caller overrides it.
pub const DEFAULT_DEGREE: usize = 3;

/// Systems with fewer equations than this are solved densely without a sparse attempt.
pub const DENSE_SOLVE_THRESHOLD: usize = 100;

/// Regularisation applied when solving for control points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Smoothing {
    /// Plain least squares on the design matrix.
    #[default]
    None,
    /// Tikhonov (ridge) penalty `alpha * I` on the normal equations.
    Identity,
    /// Second-order difference penalty `alpha * D'D` on the coefficient grid.
    PSpline,
}

/// Knot placement strategy, applied independently per input dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum KnotSpacing {
    /// Moving average of the sorted unique sample values, clamped at both ends.
    #[default]
    AsSampled,
    /// Uniform interior knots across the sample range, clamped at both ends.
    Equidistant,
    /// Uniform knots that continue past the sample range (unclamped).
    Experimental,
}

/// Per-dimension spline degrees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegreeSpec {
    /// Same degree in every dimension, lowered when a dimension has too few distinct samples.
    Default(usize),
    /// Caller-provided degrees; used as-is and validated against the data.
    Explicit(Vec<usize>),
}

/// Diagonal of the sample weight matrix `W` used by P-spline smoothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum SampleWeights {
    #[default]
    Uniform,
    PerSample(Vec<f64>),
}

/// Which factorisation produced a solution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SolvePath {
    Sparse,
    Dense,
}

pub fn default_dense_solve_threshold() -> usize {
    DENSE_SOLVE_THRESHOLD
}

pub fn default_degree_spec() -> DegreeSpec {
    DegreeSpec::Default(DEFAULT_DEGREE)
}

/// Immutable per-fit configuration owned by [`crate::builder::Builder`].
///
/// An empty `num_basis_functions` list is read as "derive every dimension from the data",
/// which keeps hand-written configuration files short.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuilderConfig {
    pub dim_x: usize,
    pub dim_y: usize,
    #[serde(default = "default_degree_spec")]
    pub degrees: DegreeSpec,
    #[serde(default)]
    pub num_basis_functions: Vec<usize>,
    #[serde(default)]
    pub knot_spacing: KnotSpacing,
    #[serde(default = "default_dense_solve_threshold")]
    pub dense_solve_threshold: usize,
    #[serde(default)]
    pub sample_weights: SampleWeights,
}

impl BuilderConfig {
    pub fn new(dim_x: usize, dim_y: usize) -> Self {
        Self {
            dim_x,
            dim_y,
            degrees: default_degree_spec(),
            num_basis_functions: vec![1; dim_x],
            knot_spacing: KnotSpacing::default(),
            dense_solve_threshold: DENSE_SOLVE_THRESHOLD,
            sample_weights: SampleWeights::default(),
        }
    }

    /// Target basis-function counts, one per input dimension (values `<= 1` mean unconstrained).
    pub fn target_basis_counts(&self) -> Vec<usize> {
        if self.num_basis_functions.is_empty() {
            vec![1; self.dim_x]
        } else {
            self.num_basis_functions.clone()
        }
    }
}
