use matrixcompare::assert_scalar_eq;
use nalgebra::Point2;
use quadfem::problem::{ExactSolution, Problem, ScalarFunction};

/// `-Δu` by central differences.
fn negative_laplacian(u: &dyn ExactSolution, x: &Point2<f64>) -> f64 {
    let h = 1e-4;
    let value = |dx: f64, dy: f64| u.value(&Point2::new(x.x + dx, x.y + dy));
    -(value(h, 0.0) + value(-h, 0.0) + value(0.0, h) + value(0.0, -h) - 4.0 * value(0.0, 0.0)) / (h * h)
}

fn sample_points() -> Vec<Point2<f64>> {
    vec![
        Point2::new(0.0, 0.0),
        Point2::new(0.3, -0.7),
        Point2::new(-0.9, 0.25),
        Point2::new(0.5, 0.5),
    ]
}

#[test]
fn sources_are_negative_laplacians() {
    for problem in [Problem::ExpProduct, Problem::SinSin, Problem::Zero] {
        let u = problem.exact_solution();
        for x in sample_points() {
            assert_scalar_eq!(u.source(&x), negative_laplacian(u, &x), comp = abs, tol = 1e-5);
            assert_eq!(problem.source().value(&x), u.source(&x));
        }
    }
}

#[test]
fn gradients_match_finite_differences() {
    let h = 1e-6;
    for problem in [Problem::ExpProduct, Problem::SinSin] {
        let u = problem.exact_solution();
        for x in sample_points() {
            let gradient = u.gradient(&x);
            let dx = (u.value(&Point2::new(x.x + h, x.y)) - u.value(&Point2::new(x.x - h, x.y))) / (2.0 * h);
            let dy = (u.value(&Point2::new(x.x, x.y + h)) - u.value(&Point2::new(x.x, x.y - h))) / (2.0 * h);
            assert_scalar_eq!(gradient.x, dx, comp = abs, tol = 1e-8);
            assert_scalar_eq!(gradient.y, dy, comp = abs, tol = 1e-8);
        }
    }
}

#[test]
fn closures_are_scalar_functions() {
    let f = |x: &Point2<f64>| x.x - x.y;
    assert_eq!(f.value(&Point2::new(3.0, 1.0)), 2.0);
    assert_eq!(Problem::default(), Problem::ExpProduct);
}
