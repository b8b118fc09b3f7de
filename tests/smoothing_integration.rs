use approx::assert_abs_diff_eq;
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use splinefit::{
    BSpline, Builder, DataTable, KnotSpacing, SampleWeights, Smoothing, SolvePath,
    second_order_difference_matrix,
};

fn noisy_samples(n: usize, seed: u64, f: impl Fn(f64) -> f64, noise: f64) -> DataTable {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut table = DataTable::new(1, 1);
    for _ in 0..n {
        let x: f64 = rng.random_range(0.0..1.0);
        let eps: f64 = if noise > 0.0 {
            rng.random_range(-noise..noise)
        } else {
            0.0
        };
        table.add_scalar_sample(x, f(x) + eps).unwrap();
    }
    table
}

fn coefficient_norm(spline: &BSpline) -> f64 {
    spline
        .control_points()
        .expect("fitted spline has control points")
        .iter()
        .map(|v| v * v)
        .sum::<f64>()
        .sqrt()
}

fn roughness(spline: &BSpline) -> f64 {
    let d = splinefit::linalg::sparse::sparse_to_dense(
        &second_order_difference_matrix(spline.num_basis_functions_per_variable()).unwrap(),
    );
    let coeffs: Array1<f64> = spline.control_points().unwrap().column(0).to_owned();
    d.dot(&coeffs).iter().map(|v| v * v).sum::<f64>().sqrt()
}

#[test]
fn ridge_shrinks_coefficients_monotonically() {
    let table = noisy_samples(60, 3, |x| (2.0 * std::f64::consts::PI * x).sin() + 1.5, 0.1);
    let builder = Builder::new(1, 1)
        .knot_spacing(KnotSpacing::Equidistant)
        .num_basis_functions(10);

    let mut previous = f64::INFINITY;
    for alpha in [0.0, 1e-3, 1e-2, 0.1, 1.0, 10.0, 100.0] {
        let spline = builder
            .fit(&table, Smoothing::Identity, alpha)
            .expect("ridge fit");
        let norm = coefficient_norm(&spline);
        assert!(
            norm <= previous + 1e-12,
            "alpha {alpha}: norm {norm} grew from {previous}"
        );
        previous = norm;
    }
}

#[test]
fn zero_alpha_matches_plain_least_squares() {
    let table = noisy_samples(40, 5, |x| x * x - 0.5 * x, 0.05);
    let builder = Builder::new(1, 1)
        .knot_spacing(KnotSpacing::Equidistant)
        .num_basis_functions(6);

    let plain = builder.fit(&table, Smoothing::None, 0.0).unwrap();
    for mode in [Smoothing::Identity, Smoothing::PSpline] {
        let normal = builder.fit(&table, mode, 0.0).unwrap();
        for x in [0.05, 0.3, 0.6, 0.95] {
            assert_abs_diff_eq!(
                normal.eval(&[x]).unwrap()[0],
                plain.eval(&[x]).unwrap()[0],
                epsilon = 1e-8
            );
        }
    }
}

#[test]
fn pspline_penalty_flattens_coefficients_as_alpha_grows() {
    let table = noisy_samples(80, 9, |x| (6.0 * x).cos(), 0.2);
    let builder = Builder::new(1, 1)
        .knot_spacing(KnotSpacing::Equidistant)
        .num_basis_functions(12);

    let rough = roughness(&builder.fit(&table, Smoothing::PSpline, 0.0).unwrap());
    let mut previous = rough;
    for alpha in [1e-2, 1.0, 1e2, 1e6] {
        let r = roughness(&builder.fit(&table, Smoothing::PSpline, alpha).unwrap());
        assert!(r <= previous + 1e-10, "alpha {alpha}: roughness {r} > {previous}");
        previous = r;
    }
    assert!(previous < 1e-3 * rough);
}

#[test]
fn pspline_leaves_linear_data_untouched_on_uniform_knots() {
    // Uniform unclamped knots have evenly spaced Greville points, so a straight line has
    // coefficients with zero second differences and no penalty.
    let table = noisy_samples(50, 13, |x| 3.0 * x - 1.0, 0.0);
    let spline = Builder::new(1, 1)
        .knot_spacing(KnotSpacing::Experimental)
        .num_basis_functions(9)
        .fit(&table, Smoothing::PSpline, 1e4)
        .expect("heavily penalised fit");
    for sample in table.samples() {
        assert_abs_diff_eq!(spline.eval(&sample.x).unwrap()[0], sample.y[0], epsilon = 1e-7);
    }
}

#[test]
fn pspline_penalises_every_tensor_direction() {
    let mut table = DataTable::new(2, 1);
    for i in 0..7 {
        for j in 0..6 {
            let (x0, x1) = (i as f64 / 6.0, j as f64 / 5.0);
            table.add_sample(vec![x0, x1], vec![2.0 * x0 - x1 + 0.5]).unwrap();
        }
    }
    let spline = Builder::new(2, 1)
        .degrees(vec![2, 2])
        .knot_spacing(KnotSpacing::Experimental)
        .num_basis_functions_per_dim(vec![5, 4])
        .fit(&table, Smoothing::PSpline, 50.0)
        .expect("tensor P-spline");
    assert_eq!(spline.num_basis_functions(), 20);
    assert!(roughness(&spline) < 1e-8);
    assert_abs_diff_eq!(spline.eval(&[0.4, 0.7]).unwrap()[0], 0.6, epsilon = 1e-8);
}

#[test]
fn zero_weights_remove_outliers_from_pspline_fits() {
    let line = |x: f64| 1.0 + 0.5 * x;
    let mut table = noisy_samples(30, 17, line, 0.0);
    let mut weights = vec![1.0; table.num_samples()];
    for x in [0.25, 0.5, 0.75] {
        table.add_scalar_sample(x, line(x) + 5.0).unwrap();
        weights.push(0.0);
    }

    let builder = Builder::new(1, 1)
        .knot_spacing(KnotSpacing::Experimental)
        .num_basis_functions(8);
    let weighted = builder
        .clone()
        .sample_weights(SampleWeights::PerSample(weights))
        .fit(&table, Smoothing::PSpline, 1.0)
        .expect("weighted fit");
    let unweighted = builder
        .fit(&table, Smoothing::PSpline, 1.0)
        .expect("unweighted fit");

    assert_abs_diff_eq!(weighted.eval(&[0.5]).unwrap()[0], line(0.5), epsilon = 1e-8);
    assert!((unweighted.eval(&[0.5]).unwrap()[0] - line(0.5)).abs() > 0.1);
}

#[test]
fn regularised_systems_are_square_and_use_the_sparse_path_when_large() {
    let mut table = DataTable::new(2, 1);
    let mut rng = StdRng::seed_from_u64(21);
    for _ in 0..400 {
        let x0: f64 = rng.random_range(0.0..1.0);
        let x1: f64 = rng.random_range(0.0..1.0);
        table
            .add_sample(vec![x0, x1], vec![(3.0 * x0).sin() * x1])
            .unwrap();
    }
    let builder = Builder::new(2, 1)
        .knot_spacing(KnotSpacing::Equidistant)
        .num_basis_functions(11);

    let outcome = builder
        .fit_detailed(&table, Smoothing::PSpline, 0.5)
        .expect("sparse P-spline fit");
    assert_eq!(outcome.num_equations, 121);
    assert_eq!(outcome.solve_path, SolvePath::Sparse);

    let small = Builder::new(2, 1)
        .knot_spacing(KnotSpacing::Equidistant)
        .num_basis_functions(9)
        .fit_detailed(&table, Smoothing::Identity, 0.5)
        .expect("dense ridge fit");
    assert_eq!(small.num_equations, 81);
    assert_eq!(small.solve_path, SolvePath::Dense);
}
