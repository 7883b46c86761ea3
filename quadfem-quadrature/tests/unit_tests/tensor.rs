use quadfem_quadrature::tensor::{quadrilateral_gauss, try_quadrilateral_gauss};
use quadfem_quadrature::{integrate, Error};
use matrixcompare::assert_scalar_eq;

#[test]
fn quadrilateral_gauss_rules_satisfy_expected_accuracy() {
    for n in 1..=10 {
        // Polynomial degree that the rule can exactly integrate *along each dimension*
        let expected_polynomial_degree = 2 * n - 1;
        let rule = quadrilateral_gauss(n);

        assert_eq!(rule.0.len(), n * n);
        assert!(rule.0.iter().all(|&w| w > 0.0));

        for alpha in 0..=expected_polynomial_degree as i32 {
            for beta in 0..=expected_polynomial_degree as i32 {
                let monomial = |x: f64, y: f64| x.powi(alpha) * y.powi(beta);
                let monomial_integral_1d = |alpha| (1.0 - (-1.0f64).powi(alpha + 1)) / (alpha as f64 + 1.0);
                let monomial_integral_2d = monomial_integral_1d(alpha) * monomial_integral_1d(beta);
                let estimated_integral = integrate(&rule, |&[x, y]| monomial(x, y));

                assert_scalar_eq!(estimated_integral, monomial_integral_2d, comp = abs, tol = 1e-13);
            }
        }
    }
}

#[test]
fn quadrilateral_gauss_points_are_x_major() {
    let (_, points) = quadrilateral_gauss(2);
    assert!(points[0][0] < 0.0 && points[0][1] < 0.0);
    assert!(points[1][0] < 0.0 && points[1][1] > 0.0);
    assert!(points[2][0] > 0.0 && points[2][1] < 0.0);
    assert!(points[3][0] > 0.0 && points[3][1] > 0.0);
}

#[test]
fn try_quadrilateral_gauss_rejects_zero_points() {
    assert_eq!(try_quadrilateral_gauss(0), Err(Error::InvalidNumberOfPoints { requested: 0 }));
}
