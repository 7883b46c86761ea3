//! The solve-estimate-refine loop for the Laplace problem.
use crate::adapt::{RefinementDriver, RefinementStrategy};
use crate::assembly::{LaplaceElementAssembler, SystemAssembler};
use crate::config::SimulationConfig;
use crate::constraints::build_constraints;
use crate::convergence::{ConvergenceRow, ConvergenceTable};
use crate::dofs::DofHandler;
use crate::error::{compute_mean_value, compute_mean_value_nodal, global_norm, integrate_difference, NormType};
use crate::estimate::KellyErrorEstimator;
use crate::io::vtk::SolutionDataSetBuilder;
use crate::mesh::{QuadTreeMesh, RefinementSummary};
use crate::problem::ScalarFunction;
use crate::quadrature::{QuadratureRule1d, QuadratureRule2d};
use crate::solve::solve_linear_system;
use crate::timing::{PhaseTimer, TimingReport};
use eyre::WrapErr;
use log::info;
use nalgebra::DVector;
use std::path::PathBuf;

/// Results of one cycle of [`LaplaceSimulation`].
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub cycle: usize,
    pub cells: usize,
    pub dofs: usize,
    pub constrained_dofs: usize,
    pub l2_error: f64,
    pub h1_seminorm_error: f64,
    pub h1_error: f64,
    /// Global norm of the error indicators. Not computed under global refinement.
    pub estimator: Option<f64>,
    pub mean_value: f64,
    pub mean_value_nodal: f64,
    pub cg_iterations: usize,
    pub residual_norm: f64,
    /// Refinement applied at the end of the cycle. Absent for the last cycle.
    pub refinement: Option<RefinementSummary>,
    pub output_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub cycles: Vec<CycleReport>,
    pub table: ConvergenceTable,
    pub timing: TimingReport,
}

/// The final state of one cycle, kept for inspection after [`LaplaceSimulation::run_cycle`].
#[derive(Debug, Clone)]
pub struct CycleState {
    pub dofs: DofHandler,
    pub solution: DVector<f64>,
}

/// Solves `-Δu = f` with Dirichlet data from the exact solution on a sequence of refined meshes.
///
/// Each cycle sets up DoFs and constraints, assembles, solves, computes error norms, estimates
/// and marks (adaptive strategies only), writes output and refines the mesh. All steps are
/// timed with an explicit [`PhaseTimer`].
pub struct LaplaceSimulation {
    config: SimulationConfig,
    mesh: QuadTreeMesh,
    assembler: SystemAssembler,
    driver: RefinementDriver,
    timer: PhaseTimer,
    table: ConvergenceTable,
    last_state: Option<CycleState>,
}

impl LaplaceSimulation {
    /// Validates the configuration and creates the initial mesh.
    pub fn new(config: SimulationConfig) -> eyre::Result<Self> {
        config.validate()?;
        let mut timer = PhaseTimer::new();
        let mesh = timer.measure("make_grid", || -> eyre::Result<_> {
            let [lo, hi] = config.domain;
            let mut mesh = QuadTreeMesh::hyper_cube(lo, hi)?.with_max_level(config.refinement.max_level)?;
            mesh.refine_global(config.initial_refinements);
            Ok(mesh)
        })?;

        let face_quadrature = QuadratureRule1d::face_gauss(config.assembly.face_quadrature_points)?;
        let estimator = KellyErrorEstimator::new(face_quadrature).with_boundary_faces(config.refinement.boundary_faces);
        Ok(Self {
            assembler: SystemAssembler::new(config.assembly.strategy),
            driver: RefinementDriver::new(config.refinement.strategy, estimator),
            mesh,
            timer,
            table: ConvergenceTable::new(),
            last_state: None,
            config,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn mesh(&self) -> &QuadTreeMesh {
        &self.mesh
    }

    pub fn table(&self) -> &ConvergenceTable {
        &self.table
    }

    /// DoFs and solution of the most recent cycle.
    pub fn last_state(&self) -> Option<&CycleState> {
        self.last_state.as_ref()
    }

    /// Runs all configured cycles.
    pub fn run(&mut self) -> eyre::Result<RunReport> {
        let cycles = (0..self.config.cycles)
            .map(|cycle| self.run_cycle(cycle))
            .collect::<eyre::Result<Vec<_>>>()?;
        Ok(RunReport {
            cycles,
            table: self.table.clone(),
            timing: self.timer.report(),
        })
    }

    /// Runs one cycle. The mesh is refined at the end unless `cycle` is the last configured one.
    pub fn run_cycle(&mut self, cycle: usize) -> eyre::Result<CycleReport> {
        let Self {
            config,
            mesh,
            assembler,
            driver,
            timer,
            table,
            last_state,
        } = self;
        let exact = config.problem.exact_solution();
        let source = config.problem.source();
        info!("Cycle {}: {} active cells", cycle, mesh.num_active_cells());

        let (dofs, constraints) = timer.measure("setup_system", || -> eyre::Result<_> {
            let dofs = DofHandler::distribute(mesh);
            let constraints = build_constraints(mesh, &dofs, |x| exact.value(x))?;
            Ok((dofs, constraints))
        })?;
        info!(
            "Cycle {}: {} DoFs, {} constrained",
            cycle,
            dofs.num_dofs(),
            constraints.num_constraints()
        );

        let system = timer
            .measure("assemble_system", || -> eyre::Result<_> {
                let quadrature = QuadratureRule2d::gauss(config.assembly.quadrature_points)?;
                let element_assembler = LaplaceElementAssembler::new(mesh, &dofs, &source, quadrature);
                let elimination = config.assembly.elimination.strategy();
                assembler.assemble(mesh, &dofs, &constraints, &element_assembler, elimination)
            })
            .wrap_err_with(|| format!("Assembly failed in cycle {}", cycle))?;

        let solution = timer
            .measure("solve", || solve_linear_system(&system, &constraints, &config.solver))
            .wrap_err_with(|| format!("Linear solve failed in cycle {}", cycle))?;
        info!(
            "Cycle {}: CG converged in {} iterations (residual norm {:e})",
            cycle, solution.iterations, solution.residual_norm
        );

        let [l2_per_cell, h1_per_cell, h1_seminorm_per_cell] = timer.measure("compute_error", || -> eyre::Result<_> {
            let rule = QuadratureRule2d::gauss(config.assembly.error_quadrature_points)?;
            let norm = |norm_type| integrate_difference(mesh, &dofs, &solution.values, exact, &rule, norm_type);
            Ok([norm(NormType::L2)?, norm(NormType::H1)?, norm(NormType::H1Seminorm)?])
        })?;
        let (l2_error, h1_error, h1_seminorm_error) = (
            global_norm(&l2_per_cell),
            global_norm(&h1_per_cell),
            global_norm(&h1_seminorm_per_cell),
        );
        info!(
            "Cycle {}: L2 error {:e}, H1 error {:e}, H1 seminorm error {:e}",
            cycle, l2_error, h1_error, h1_seminorm_error
        );

        let adaptive = !matches!(config.refinement.strategy, RefinementStrategy::Global);
        let indicators = if adaptive {
            let indicators = timer.measure("estimate_error", || {
                driver
                    .estimate(mesh, &dofs, &solution.values)
                    .map(|eta| eta.to_vec())
            })?;
            timer.measure("mark_cells_for_refinement", || driver.mark().map(|_| ()))?;
            Some(indicators)
        } else {
            None
        };
        let estimator = indicators.as_deref().map(global_norm);
        if let Some(estimator) = estimator {
            info!("Cycle {}: estimated error {:e}", cycle, estimator);
        }

        let (mean_value, mean_value_nodal, output_file) =
            timer.measure("output_results", || -> eyre::Result<_> {
                let rule = QuadratureRule2d::gauss(config.assembly.quadrature_points)?;
                let mean_value = compute_mean_value(mesh, &dofs, &solution.values, &rule)?;
                let mean_value_nodal = compute_mean_value_nodal(mesh, &dofs, &solution.values)?;

                let output_file = if config.output.write_vtk {
                    let mut builder = SolutionDataSetBuilder::new(mesh, &dofs)
                        .with_title(format!("Laplace solution, cycle {}", cycle))
                        .with_point_scalars("solution", &solution.values)
                        .with_cell_scalars("L2_error", &l2_per_cell)
                        .with_cell_scalars("H1_error", &h1_per_cell);
                    if let Some(indicators) = &indicators {
                        builder = builder.with_cell_scalars("error_estimator", indicators);
                    }
                    Some(builder.try_export_cycle(&config.output.directory, cycle)?)
                } else {
                    None
                };
                Ok((mean_value, mean_value_nodal, output_file))
            })?;
        info!("Cycle {}: mean value {} (nodal {})", cycle, mean_value, mean_value_nodal);

        table.add_row(ConvergenceRow {
            cycle,
            cells: mesh.num_active_cells(),
            dofs: dofs.num_dofs(),
            l2: l2_error,
            h1_seminorm: h1_seminorm_error,
            h1: h1_error,
            estimator,
        });

        let report = CycleReport {
            cycle,
            cells: mesh.num_active_cells(),
            dofs: dofs.num_dofs(),
            constrained_dofs: constraints.num_constraints(),
            l2_error,
            h1_seminorm_error,
            h1_error,
            estimator,
            mean_value,
            mean_value_nodal,
            cg_iterations: solution.iterations,
            residual_norm: solution.residual_norm,
            refinement: None,
            output_file,
        };
        *last_state = Some(CycleState {
            dofs,
            solution: solution.values,
        });

        let is_last_cycle = cycle + 1 >= config.cycles;
        if is_last_cycle {
            driver.reset();
            return Ok(report);
        }

        let summary = timer.measure("refine_grid", || -> eyre::Result<_> {
            if adaptive {
                Ok(driver.execute(mesh)?)
            } else {
                Ok(mesh.refine_global(1))
            }
        })?;
        info!(
            "Cycle {}: refined {} cells, coarsened {} families",
            cycle, summary.refined, summary.coarsened
        );
        Ok(CycleReport {
            refinement: Some(summary),
            ..report
        })
    }
}
