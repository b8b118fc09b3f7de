use approx::assert_abs_diff_eq;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splinefit::{BSpline, Builder, DataTable, FitError, KnotSpacing, Smoothing, SolvePath};

fn grid_table(nx: usize, ny: usize, f: impl Fn(f64, f64) -> Vec<f64>, dim_y: usize) -> DataTable {
    let mut table = DataTable::new(2, dim_y);
    for i in 0..nx {
        for j in 0..ny {
            let x0 = i as f64 / (nx - 1) as f64;
            let x1 = -1.0 + 2.0 * j as f64 / (ny - 1) as f64;
            table
                .add_sample(vec![x0, x1], f(x0, x1))
                .expect("grid sample should be accepted");
        }
    }
    table
}

fn scattered_line(n: usize, seed: u64, f: impl Fn(f64) -> f64) -> DataTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut table = DataTable::new(1, 1);
    table.add_scalar_sample(-2.0, f(-2.0)).unwrap();
    table.add_scalar_sample(3.0, f(3.0)).unwrap();
    for _ in 0..n {
        let x: f64 = rng.random_range(-2.0..3.0);
        table.add_scalar_sample(x, f(x)).unwrap();
    }
    table
}

fn assert_reproduces_samples(spline: &BSpline, table: &DataTable, tol: f64) {
    for sample in table.samples() {
        let value = spline.eval(&sample.x).expect("fitted spline evaluates");
        for (fitted, expected) in value.iter().zip(sample.y.iter()) {
            assert_abs_diff_eq!(*fitted, *expected, epsilon = tol);
        }
    }
}

#[test]
fn cubic_fit_through_parabola_samples() {
    let mut table = DataTable::new(1, 1);
    for (x, y) in [(0.0, 0.0), (1.0, 1.0), (2.0, 4.0), (3.0, 9.0), (4.0, 16.0)] {
        table.add_scalar_sample(x, y).unwrap();
    }

    let spline = Builder::new(1, 1)
        .degree(3)
        .knot_spacing(KnotSpacing::AsSampled)
        .fit(&table, Smoothing::None, 0.0)
        .expect("square interpolation system");

    assert_eq!(spline.num_basis_functions(), 5);
    assert_eq!(spline.knot_vectors()[0].to_vec(), vec![
        0.0, 0.0, 0.0, 0.0, 2.0, 4.0, 4.0, 4.0, 4.0
    ]);
    assert_abs_diff_eq!(spline.eval(&[2.0]).unwrap()[0], 4.0, epsilon = 1e-9);
    // A cubic space contains the parabola, so it is reproduced between samples too.
    assert_abs_diff_eq!(spline.eval(&[2.5]).unwrap()[0], 6.25, epsilon = 1e-9);
}

#[test]
fn complete_grid_is_interpolated_for_every_output() {
    let table = grid_table(6, 5, |x0, x1| vec![(3.0 * x0).sin() + x1 * x1, x0 * x1], 2);
    assert!(table.is_grid_complete());

    let outcome = Builder::new(2, 2)
        .fit_detailed(&table, Smoothing::None, 0.0)
        .expect("grid interpolation");

    let spline = &outcome.spline;
    assert_eq!(spline.num_basis_functions_per_variable(), &[6, 5]);
    assert_eq!(spline.num_basis_functions(), 30);
    assert_eq!(spline.control_points().map(|c| c.dim()), Some((30, 2)));
    assert_eq!(outcome.num_equations, 30);
    assert_eq!(outcome.solve_path, SolvePath::Dense);
    assert_reproduces_samples(spline, &table, 1e-9);
}

#[test]
fn large_square_systems_take_the_sparse_path() {
    let table = grid_table(12, 10, |x0, x1| vec![(x0 - 0.3).powi(2) * x1.exp()], 1);

    let sparse = Builder::new(2, 1)
        .fit_detailed(&table, Smoothing::None, 0.0)
        .expect("sparse interpolation");
    assert_eq!(sparse.num_equations, 120);
    assert_eq!(sparse.solve_path, SolvePath::Sparse);
    assert_reproduces_samples(&sparse.spline, &table, 1e-8);

    let dense = Builder::new(2, 1)
        .dense_solve_threshold(1_000)
        .fit_detailed(&table, Smoothing::None, 0.0)
        .expect("dense interpolation");
    assert_eq!(dense.solve_path, SolvePath::Dense);

    let a = sparse.spline.control_points().unwrap();
    let b = dense.spline.control_points().unwrap();
    for (lhs, rhs) in a.iter().zip(b.iter()) {
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-8);
    }
}

#[test]
fn equidistant_least_squares_recovers_a_cubic() {
    let f = |x: f64| 0.5 * x * x * x - x + 2.0;
    let table = scattered_line(200, 7, f);

    let outcome = Builder::new(1, 1)
        .knot_spacing(KnotSpacing::Equidistant)
        .num_basis_functions(8)
        .fit_detailed(&table, Smoothing::None, 0.0)
        .expect("overdetermined least squares");

    assert_eq!(outcome.spline.num_basis_functions(), 8);
    // Rectangular systems are always solved densely.
    assert_eq!(outcome.num_equations, 202);
    assert_eq!(outcome.solve_path, SolvePath::Dense);
    for x in [-2.0, -0.75, 0.1, 1.9, 3.0] {
        assert_abs_diff_eq!(outcome.spline.eval(&[x]).unwrap()[0], f(x), epsilon = 1e-8);
    }
}

#[test]
fn unclamped_knots_cover_the_sample_range() {
    let f = |x: f64| 1.0 - 3.0 * x + 0.25 * x * x;
    let table = scattered_line(60, 11, f);

    let spline = Builder::new(1, 1)
        .degree(2)
        .knot_spacing(KnotSpacing::Experimental)
        .num_basis_functions(7)
        .fit(&table, Smoothing::None, 0.0)
        .expect("unclamped fit");

    assert_abs_diff_eq!(spline.domain_lower_bound()[0], -2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(spline.domain_upper_bound()[0], 3.0, epsilon = 1e-12);
    let knots = &spline.knot_vectors()[0];
    assert!(knots[0] < -2.0 && knots[knots.len() - 1] > 3.0);
    assert_reproduces_samples(&spline, &table, 1e-8);
}

#[test]
fn incomplete_grid_still_fits() {
    let full = grid_table(5, 5, |x0, x1| vec![x0 * x0 - x1], 1);
    let mut table = DataTable::new(2, 1);
    for (idx, sample) in full.samples().iter().enumerate() {
        if idx != 3 && idx != 12 && idx != 20 {
            table.add_sample(sample.x.clone(), sample.y.clone()).unwrap();
        }
    }
    assert!(!table.is_grid_complete());

    let outcome = Builder::new(2, 1)
        .fit_detailed(&table, Smoothing::None, 0.0)
        .expect("underdetermined fit");
    assert_eq!(outcome.num_equations, 22);
    assert_eq!(outcome.spline.num_basis_functions(), 25);
    assert_reproduces_samples(&outcome.spline, &table, 1e-9);

    let ridge = Builder::new(2, 1)
        .fit(&table, Smoothing::Identity, 1e-3)
        .expect("ridge fit on incomplete grid");
    assert!(ridge.has_control_points());
}

#[test]
fn unregularised_normal_equations_on_an_incomplete_grid_use_the_minimum_norm_fit() {
    let full = grid_table(5, 5, |x0, x1| vec![x0 * x0 - x1], 1);
    let mut table = DataTable::new(2, 1);
    for (idx, sample) in full.samples().iter().enumerate() {
        if idx != 3 && idx != 12 && idx != 20 {
            table.add_sample(sample.x.clone(), sample.y.clone()).unwrap();
        }
    }

    // 22 samples for 25 coefficients: B'B is singular but the system is consistent.
    let normal = Builder::new(2, 1)
        .fit_detailed(&table, Smoothing::Identity, 0.0)
        .expect("singular normal equations still fit");
    assert_eq!(normal.num_equations, 25);
    assert_eq!(normal.solve_path, SolvePath::Dense);
    assert_reproduces_samples(&normal.spline, &table, 1e-7);

    let plain = Builder::new(2, 1)
        .fit(&table, Smoothing::None, 0.0)
        .expect("underdetermined fit");
    for (lhs, rhs) in normal
        .spline
        .control_points()
        .unwrap()
        .iter()
        .zip(plain.control_points().unwrap().iter())
    {
        assert_abs_diff_eq!(lhs, rhs, epsilon = 1e-6);
    }
}

#[test]
fn fitted_spline_survives_serialization() {
    let table = grid_table(4, 4, |x0, x1| vec![x0 + 2.0 * x1], 1);
    let spline = Builder::new(2, 1)
        .fit(&table, Smoothing::None, 0.0)
        .expect("grid interpolation");

    let json = serde_json::to_string(&spline).expect("serialize spline");
    let restored: BSpline = serde_json::from_str(&json).expect("deserialize spline");
    for x in [[0.1, -0.4], [0.5, 0.5], [0.9, 0.95]] {
        assert_abs_diff_eq!(
            restored.eval(&x).unwrap()[0],
            spline.eval(&x).unwrap()[0],
            epsilon = 1e-14
        );
        assert_abs_diff_eq!(restored.eval(&x).unwrap()[0], x[0] + 2.0 * x[1], epsilon = 1e-9);
    }
}

#[test]
fn invalid_requests_fail_before_fitting() {
    let table = grid_table(4, 4, |x0, x1| vec![x0 - x1], 1);

    assert!(matches!(
        Builder::new(1, 1).fit(&table, Smoothing::None, 0.0),
        Err(FitError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        Builder::new(2, 3).fit(&table, Smoothing::None, 0.0),
        Err(FitError::DimensionMismatch { .. })
    ));
    assert!(matches!(
        Builder::new(2, 1).fit(&table, Smoothing::Identity, -1.0),
        Err(FitError::InvalidParameter(_))
    ));
    assert!(matches!(
        Builder::new(2, 1)
            .knot_spacing(KnotSpacing::Equidistant)
            .num_basis_functions_per_dim(vec![2, 6])
            .degree(1)
            .fit(&table, Smoothing::PSpline, 1.0),
        Err(FitError::InvalidConfiguration(_))
    ));
}
