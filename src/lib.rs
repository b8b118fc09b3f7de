pub mod basis;
pub mod bspline;
pub mod builder;
pub mod data_table;
pub mod knots;
pub mod linalg;
pub mod penalty;
pub mod regularization;
pub mod solver;
pub mod types;

pub use basis::{BasisError, build_basis_matrix, stack_sample_values};
pub use bspline::BSpline;
pub use builder::{Builder, FitError, FitOutcome};
pub use data_table::{DataTable, DataTableError, Sample};
pub use knots::{KnotError, compute_knot_vectors};
pub use penalty::{second_order_difference_matrix, second_order_difference_penalty};
pub use regularization::{RegularizedSystem, build_regularized_system};
pub use solver::LinearSolver;
pub use types::{
    BuilderConfig, DEFAULT_DEGREE, DENSE_SOLVE_THRESHOLD, DegreeSpec, KnotSpacing, SampleWeights,
    Smoothing, SolvePath,
};
