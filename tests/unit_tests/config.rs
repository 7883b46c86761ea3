use quadfem::adapt::RefinementStrategy;
use quadfem::assembly::{AssemblyStrategy, Elimination};
use quadfem::config::{ConfigError, SimulationConfig};
use quadfem::mesh::MAX_LEVEL;
use quadfem::problem::Problem;
use quadfem::solve::Preconditioner;
use std::path::PathBuf;

fn temp_file(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("quadfem-{}-{}", std::process::id(), name))
}

#[test]
fn default_config_is_the_adaptive_program() {
    let config = SimulationConfig::default();
    assert_eq!(config.domain, [-1.0, 1.0]);
    assert_eq!(config.initial_refinements, 3);
    assert_eq!(config.cycles, 6);
    assert_eq!(config.problem, Problem::ExpProduct);
    assert_eq!(config.refinement.strategy, RefinementStrategy::default());
    assert_eq!(config.assembly.elimination, Elimination::DuringScatter);
    assert!(matches!(config.assembly.strategy, AssemblyStrategy::Parallel { .. }));
    assert_eq!(config.assembly.quadrature_points, 2);
    assert_eq!(config.assembly.error_quadrature_points, 3);
    assert_eq!(config.validate(), Ok(()));
}

#[test]
fn global_refinement_variant() {
    let config = SimulationConfig::global_refinement_variant();
    assert_eq!(config.refinement.strategy, RefinementStrategy::Global);
    assert_eq!(config.assembly.strategy, AssemblyStrategy::Serial);
    assert_eq!(config.assembly.elimination, Elimination::PostProcess);
    assert_eq!(config.cycles, SimulationConfig::default().cycles);
    assert_eq!(config.validate(), Ok(()));
}

fn check(modify: impl FnOnce(&mut SimulationConfig)) -> ConfigError {
    let mut config = SimulationConfig::default();
    modify(&mut config);
    config.validate().unwrap_err()
}

#[test]
fn invalid_configs_are_rejected() {
    assert_eq!(
        check(|c| c.domain = [1.0, 1.0]),
        ConfigError::InvalidDomain { lo: 1.0, hi: 1.0 }
    );
    assert!(matches!(
        check(|c| c.domain = [0.0, f64::INFINITY]),
        ConfigError::InvalidDomain { .. }
    ));
    assert_eq!(check(|c| c.cycles = 0), ConfigError::ZeroCycles);
    assert_eq!(
        check(|c| c.assembly.face_quadrature_points = 0),
        ConfigError::InvalidQuadrature { name: "face", points: 0 }
    );
    assert_eq!(
        check(|c| c.assembly.error_quadrature_points = 2),
        ConfigError::ErrorQuadratureTooLow { assembly: 2, error: 2 }
    );
    assert_eq!(
        check(|c| c.assembly.strategy = AssemblyStrategy::Parallel { chunk_size: 0 }),
        ConfigError::ZeroChunkSize
    );
    assert_eq!(
        check(|c| {
            c.refinement.strategy = RefinementStrategy::FixedFraction {
                top_fraction: 0.8,
                bottom_fraction: 0.3,
            }
        }),
        ConfigError::InvalidFractions { top: 0.8, bottom: 0.3 }
    );
    assert_eq!(
        check(|c| c.refinement.max_level = MAX_LEVEL + 1),
        ConfigError::MaxLevelTooLarge {
            requested: MAX_LEVEL + 1,
            max: MAX_LEVEL
        }
    );
    assert_eq!(
        check(|c| c.solver.tolerance = 0.0),
        ConfigError::InvalidTolerance { tolerance: 0.0 }
    );
    assert_eq!(check(|c| c.solver.max_iterations = 0), ConfigError::ZeroMaxIterations);
    assert_eq!(
        check(|c| c.solver.preconditioner = Preconditioner::Ssor { omega: 2.0 }),
        ConfigError::InvalidRelaxation { omega: 2.0 }
    );
}

#[test]
fn partial_json_uses_defaults() {
    let path = temp_file("partial.json");
    std::fs::write(
        &path,
        r#"{
            "domain": [0.0, 2.0],
            "cycles": 2,
            "problem": "sin-sin",
            "refinement": { "strategy": "global" },
            "solver": { "preconditioner": "jacobi" }
        }"#,
    )
    .unwrap();
    let config = SimulationConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();

    assert_eq!(config.domain, [0.0, 2.0]);
    assert_eq!(config.cycles, 2);
    assert_eq!(config.problem, Problem::SinSin);
    assert_eq!(config.refinement.strategy, RefinementStrategy::Global);
    assert_eq!(config.refinement.max_level, SimulationConfig::default().refinement.max_level);
    assert_eq!(config.solver.preconditioner, Preconditioner::Jacobi);
    assert_eq!(config.solver.max_iterations, 1000);
    assert_eq!(config.initial_refinements, 3);
}

#[test]
fn json_round_trip() {
    let mut config = SimulationConfig::global_refinement_variant();
    config.solver.preconditioner = Preconditioner::Ssor { omega: 1.5 };
    config.output.write_vtk = false;
    let path = temp_file("round-trip.json");
    std::fs::write(&path, serde_json::to_string_pretty(&config).unwrap()).unwrap();
    let loaded = SimulationConfig::from_json_file(&path).unwrap();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn invalid_json_files_are_rejected() {
    assert!(SimulationConfig::from_json_file(temp_file("does-not-exist.json")).is_err());

    let path = temp_file("invalid.json");
    std::fs::write(&path, r#"{ "cycles": 0 }"#).unwrap();
    let err = SimulationConfig::from_json_file(&path).unwrap_err();
    std::fs::remove_file(&path).unwrap();
    assert_eq!(err.downcast_ref::<ConfigError>(), Some(&ConfigError::ZeroCycles));
}
