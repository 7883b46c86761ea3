//! Manufactured problems for `-Δu = f` with Dirichlet data taken from the exact solution.
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// A scalar field on the plane.
pub trait ScalarFunction: Sync {
    fn value(&self, x: &Point2<f64>) -> f64;
}

impl<F> ScalarFunction for F
where
    F: Fn(&Point2<f64>) -> f64 + Sync,
{
    fn value(&self, x: &Point2<f64>) -> f64 {
        self(x)
    }
}

/// A smooth exact solution `u` together with its gradient and `-Δu`.
pub trait ExactSolution: ScalarFunction {
    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64>;

    /// The right-hand side `f = -Δu`.
    fn source(&self, x: &Point2<f64>) -> f64;
}

/// The source term `-Δu` of an exact solution, viewed as a scalar function.
#[derive(Clone, Copy)]
pub struct SourceOf<'a, U: ?Sized>(pub &'a U);

impl<'a, U: ExactSolution + ?Sized> ScalarFunction for SourceOf<'a, U> {
    fn value(&self, x: &Point2<f64>) -> f64 {
        self.0.source(x)
    }
}

/// `u = exp(x) exp(y)`, so `f = -2 exp(x) exp(y)`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ExpProduct;

impl ScalarFunction for ExpProduct {
    fn value(&self, x: &Point2<f64>) -> f64 {
        x.x.exp() * x.y.exp()
    }
}

impl ExactSolution for ExpProduct {
    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64> {
        let u = self.value(x);
        Vector2::new(u, u)
    }

    fn source(&self, x: &Point2<f64>) -> f64 {
        -2.0 * self.value(x)
    }
}

/// `u = sin(πx) sin(πy)`, so `f = 2π² u`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct SinSin;

impl ScalarFunction for SinSin {
    fn value(&self, x: &Point2<f64>) -> f64 {
        (PI * x.x).sin() * (PI * x.y).sin()
    }
}

impl ExactSolution for SinSin {
    fn gradient(&self, x: &Point2<f64>) -> Vector2<f64> {
        let (sx, cx) = (PI * x.x).sin_cos();
        let (sy, cy) = (PI * x.y).sin_cos();
        Vector2::new(PI * cx * sy, PI * sx * cy)
    }

    fn source(&self, x: &Point2<f64>) -> f64 {
        2.0 * PI * PI * self.value(x)
    }
}

/// `u = 0` with `f = 0`.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Zero;

impl ScalarFunction for Zero {
    fn value(&self, _x: &Point2<f64>) -> f64 {
        0.0
    }
}

impl ExactSolution for Zero {
    fn gradient(&self, _x: &Point2<f64>) -> Vector2<f64> {
        Vector2::zeros()
    }

    fn source(&self, _x: &Point2<f64>) -> f64 {
        0.0
    }
}

/// Choice of built-in manufactured problem.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Problem {
    #[default]
    ExpProduct,
    SinSin,
    Zero,
}

impl Problem {
    pub fn exact_solution(&self) -> &'static dyn ExactSolution {
        match self {
            Problem::ExpProduct => &ExpProduct,
            Problem::SinSin => &SinSin,
            Problem::Zero => &Zero,
        }
    }

    pub fn source(&self) -> SourceOf<'static, dyn ExactSolution> {
        SourceOf(self.exact_solution())
    }
}
