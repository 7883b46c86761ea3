//! Error norms of finite element solutions against exact solutions, and mean values.
use crate::assembly::local::CellValues;
use crate::dofs::DofHandler;
use crate::element::Quad4Element;
use crate::mesh::QuadTreeMesh;
use crate::problem::ExactSolution;
use crate::quadrature::QuadratureRule2d;
use eyre::{eyre, WrapErr};
use nalgebra::{DVector, Point2, Vector4};
use serde::{Deserialize, Serialize};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NormType {
    L2,
    H1Seminorm,
    /// The full $H^1$ norm, $\norm{e}^2_{L^2} + \seminorm{e}^2_{H^1}$.
    H1,
}

/// Squared error $\norm{u_h - u}^2$ on one element, with `values` initialized for that element.
#[allow(non_snake_case)]
pub fn element_error_squared<U>(values: &CellValues, u_h_element: &Vector4<f64>, u: &U, norm: NormType) -> f64
where
    U: ExactSolution + ?Sized,
{
    let mut result = 0.0;
    for (q, x) in values.quadrature_points().iter().enumerate() {
        let JxW = values.jxw(q);
        if matches!(norm, NormType::L2 | NormType::H1) {
            let e = values.value(u_h_element, q) - u.value(x);
            result += e * e * JxW;
        }
        if matches!(norm, NormType::H1Seminorm | NormType::H1) {
            let e_grad = values.gradient(u_h_element, q) - u.gradient(x);
            result += e_grad.norm_squared() * JxW;
        }
    }
    result
}

/// Calls `f(active_index, values, local_coefficients)` for every active cell with `values`
/// initialized for that cell.
fn for_each_cell(
    mesh: &QuadTreeMesh,
    dofs: &DofHandler,
    u_h: &DVector<f64>,
    rule: &QuadratureRule2d,
    mut f: impl FnMut(usize, &CellValues, &Vector4<f64>),
) -> eyre::Result<()> {
    dofs.check_generation(mesh)?;
    if u_h.len() != dofs.num_dofs() {
        return Err(eyre!(
            "Solution vector has length {}, expected {}",
            u_h.len(),
            dofs.num_dofs()
        ));
    }

    let mut values = CellValues::default();
    for (k, &cell) in mesh.active_cells().iter().enumerate() {
        let element = Quad4Element::from_vertices(mesh.cell_vertex_points(cell));
        values
            .reinit(&element, rule)
            .wrap_err_with(|| format!("Singular element Jacobian encountered in element {}", k))?;
        let cell_dofs = dofs.cell_dofs(k);
        let u_h_element = Vector4::from_fn(|i, _| u_h[cell_dofs[i]]);
        f(k, &values, &u_h_element);
    }
    Ok(())
}

/// Computes the error $\norm{u_h - u}_K$ on each active cell $K$, in active-cell order.
///
/// The rule should be of higher order than the one used for assembly, otherwise the error
/// is underestimated.
pub fn integrate_difference<U>(
    mesh: &QuadTreeMesh,
    dofs: &DofHandler,
    u_h: &DVector<f64>,
    u: &U,
    rule: &QuadratureRule2d,
    norm: NormType,
) -> eyre::Result<Vec<f64>>
where
    U: ExactSolution + ?Sized,
{
    let mut errors = vec![0.0; mesh.num_active_cells()];
    for_each_cell(mesh, dofs, u_h, rule, |k, values, u_h_element| {
        errors[k] = element_error_squared(values, u_h_element, u, norm).sqrt();
    })?;
    Ok(errors)
}

/// The global norm from per-cell norms, i.e. the Euclidean norm of the per-cell values.
pub fn global_norm(per_cell: &[f64]) -> f64 {
    per_cell.iter().map(|e| e * e).sum::<f64>().sqrt()
}

/// Mean value of `u_h` over the domain, integrated with the given rule on every cell.
pub fn compute_mean_value(
    mesh: &QuadTreeMesh,
    dofs: &DofHandler,
    u_h: &DVector<f64>,
    rule: &QuadratureRule2d,
) -> eyre::Result<f64> {
    let mut integral = 0.0;
    for_each_cell(mesh, dofs, u_h, rule, |_, values, u_h_element| {
        integral += (0..values.num_quadrature_points())
            .map(|q| values.value(u_h_element, q) * values.jxw(q))
            .sum::<f64>();
    })?;
    Ok(integral / mesh.domain_measure())
}

/// Local vertex (SW, SE, NE, NW) at a corner of the reference square.
fn reference_vertex(xi: &Point2<f64>) -> usize {
    match (xi.x > 0.0, xi.y > 0.0) {
        (false, false) => 0,
        (true, false) => 1,
        (true, true) => 2,
        (false, true) => 3,
    }
}

/// Mean value of `u_h` computed from nodal values with the trapezoidal rule on every cell.
///
/// Does not evaluate basis functions. The rule is exact for bilinear functions on rectangles,
/// so the result agrees with [`compute_mean_value`] up to round-off.
pub fn compute_mean_value_nodal(mesh: &QuadTreeMesh, dofs: &DofHandler, u_h: &DVector<f64>) -> eyre::Result<f64> {
    dofs.check_generation(mesh)?;
    if u_h.len() != dofs.num_dofs() {
        return Err(eyre!(
            "Solution vector has length {}, expected {}",
            u_h.len(),
            dofs.num_dofs()
        ));
    }

    let rule = QuadratureRule2d::trapezoidal();
    let reference_measure: f64 = rule.weights().iter().sum();
    let integral: f64 = mesh
        .active_cells()
        .iter()
        .enumerate()
        .map(|(k, &cell)| {
            let cell_dofs = dofs.cell_dofs(k);
            let reference_integral = rule.integrate(|xi| u_h[cell_dofs[reference_vertex(xi)]]);
            mesh.cell_measure(cell) / reference_measure * reference_integral
        })
        .sum();
    Ok(integral / mesh.domain_measure())
}
