//! Uniform refinement with boundary values eliminated after assembly. The errors of Q1 elements
//! for a smooth solution behave like `h^2` in L2 and `h` in H1.
use super::quiet;
use quadfem::config::SimulationConfig;
use quadfem::convergence::ErrorColumn;
use quadfem::simulation::LaplaceSimulation;
use util::relative_difference;

#[test]
fn optimal_rates_under_global_refinement() -> eyre::Result<()> {
    let config = SimulationConfig {
        initial_refinements: 2,
        cycles: 4,
        ..quiet(SimulationConfig::global_refinement_variant())
    };
    let report = LaplaceSimulation::new(config)?.run()?;

    for (cycle, n) in report.cycles.iter().zip([4, 8, 16, 32]) {
        assert_eq!(cycle.cells, n * n);
        assert_eq!(cycle.dofs, (n + 1) * (n + 1));
        // Only boundary values are constrained
        assert_eq!(cycle.constrained_dofs, 4 * n);
        assert_eq!(cycle.estimator, None);
    }
    assert_eq!(
        report.cycles[2].refinement.map(|summary| summary.refined),
        Some(256)
    );
    assert!(report.timing.phase("estimate_error").is_none());

    let last = &report.cycles[3];
    let prev = &report.cycles[2];
    let l2_ratio = prev.l2_error / last.l2_error;
    let h1_ratio = prev.h1_error / last.h1_error;
    assert!(relative_difference(l2_ratio, 4.0) < 0.05, "L2 error ratio {}", l2_ratio);
    assert!(relative_difference(h1_ratio, 2.0) < 0.05, "H1 error ratio {}", h1_ratio);

    let rates = report.table.rates(ErrorColumn::H1);
    assert!(rates[3].map_or(false, |rate| rate > 0.9));
    assert!(report.table.rates(ErrorColumn::Estimator).iter().all(Option::is_none));
    Ok(())
}
