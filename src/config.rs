//! Configuration of a simulation run, loadable from JSON.
use crate::adapt::RefinementStrategy;
use crate::assembly::{AssemblyStrategy, Elimination};
use crate::estimate::BoundaryFaces;
use crate::mesh::MAX_LEVEL;
use crate::problem::Problem;
use crate::solve::{Preconditioner, SolverConfig};
use eyre::WrapErr;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ConfigError {
    InvalidDomain { lo: f64, hi: f64 },
    ZeroCycles,
    InvalidQuadrature { name: &'static str, points: usize },
    /// Error norms must be computed with more quadrature points than assembly uses.
    ErrorQuadratureTooLow { assembly: usize, error: usize },
    InvalidFractions { top: f64, bottom: f64 },
    MaxLevelTooLarge { requested: u8, max: u8 },
    InvalidTolerance { tolerance: f64 },
    ZeroMaxIterations,
    InvalidRelaxation { omega: f64 },
    ZeroChunkSize,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidDomain { lo, hi } => write!(f, "invalid domain [{}, {}]^2", lo, hi),
            Self::ZeroCycles => write!(f, "number of cycles must be positive"),
            Self::InvalidQuadrature { name, points } => {
                write!(f, "{} quadrature must have at least one point (got {})", name, points)
            }
            Self::ErrorQuadratureTooLow { assembly, error } => write!(
                f,
                "error quadrature ({} points) must be of higher order than assembly quadrature ({} points)",
                error, assembly
            ),
            Self::InvalidFractions { top, bottom } => write!(
                f,
                "invalid refinement fractions (top {}, bottom {}): each must be in [0, 1] and their sum at most 1",
                top, bottom
            ),
            Self::MaxLevelTooLarge { requested, max } => {
                write!(f, "maximum level {} exceeds the supported maximum {}", requested, max)
            }
            Self::InvalidTolerance { tolerance } => {
                write!(f, "solver tolerance must be positive and finite (got {})", tolerance)
            }
            Self::ZeroMaxIterations => write!(f, "maximum number of solver iterations must be positive"),
            Self::InvalidRelaxation { omega } => {
                write!(f, "SSOR relaxation parameter must be in (0, 2) (got {})", omega)
            }
            Self::ZeroChunkSize => write!(f, "parallel assembly chunk size must be positive"),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinementConfig {
    pub strategy: RefinementStrategy,
    /// Cells at this level are never refined further.
    pub max_level: u8,
    pub boundary_faces: BoundaryFaces,
}

impl Default for RefinementConfig {
    fn default() -> Self {
        Self {
            strategy: RefinementStrategy::default(),
            max_level: 12,
            boundary_faces: BoundaryFaces::Skip,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssemblyConfig {
    pub strategy: AssemblyStrategy,
    pub elimination: Elimination,
    /// Gauss points per direction for assembly.
    pub quadrature_points: usize,
    /// Gauss points per direction for error norms.
    pub error_quadrature_points: usize,
    /// Gauss points on each face for the error estimator.
    pub face_quadrature_points: usize,
}

impl Default for AssemblyConfig {
    fn default() -> Self {
        Self {
            strategy: AssemblyStrategy::Parallel { chunk_size: 256 },
            elimination: Elimination::DuringScatter,
            quadrature_points: 2,
            error_quadrature_points: 3,
            face_quadrature_points: 2,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    pub write_vtk: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            write_vtk: true,
        }
    }
}

/// All parameters of a [`LaplaceSimulation`](crate::simulation::LaplaceSimulation).
///
/// The default is the adaptive program: Kelly estimator, 33 % of the cells refined per cycle,
/// constraints eliminated during scatter and parallel assembly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// The domain is `[lo, hi]^2`.
    pub domain: [f64; 2],
    pub initial_refinements: usize,
    pub cycles: usize,
    pub problem: Problem,
    pub refinement: RefinementConfig,
    pub solver: SolverConfig,
    pub assembly: AssemblyConfig,
    pub output: OutputConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            domain: [-1.0, 1.0],
            initial_refinements: 3,
            cycles: 6,
            problem: Problem::ExpProduct,
            refinement: RefinementConfig::default(),
            solver: SolverConfig::default(),
            assembly: AssemblyConfig::default(),
            output: OutputConfig::default(),
        }
    }
}

impl SimulationConfig {
    /// Uniform refinement, boundary values eliminated after assembling the unconstrained system,
    /// serial assembly.
    pub fn global_refinement_variant() -> Self {
        Self {
            refinement: RefinementConfig {
                strategy: RefinementStrategy::Global,
                ..RefinementConfig::default()
            },
            assembly: AssemblyConfig {
                strategy: AssemblyStrategy::Serial,
                elimination: Elimination::PostProcess,
                ..AssemblyConfig::default()
            },
            ..Self::default()
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).wrap_err_with(|| format!("Failed to open config file {}", path.display()))?;
        let config: Self = serde_json::from_reader(BufReader::new(file))
            .wrap_err_with(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let [lo, hi] = self.domain;
        if !(lo.is_finite() && hi.is_finite() && lo < hi) {
            return Err(ConfigError::InvalidDomain { lo, hi });
        }
        if self.cycles == 0 {
            return Err(ConfigError::ZeroCycles);
        }

        let assembly = &self.assembly;
        for (name, points) in [
            ("assembly", assembly.quadrature_points),
            ("error", assembly.error_quadrature_points),
            ("face", assembly.face_quadrature_points),
        ] {
            if points == 0 {
                return Err(ConfigError::InvalidQuadrature { name, points });
            }
        }
        if assembly.error_quadrature_points <= assembly.quadrature_points {
            return Err(ConfigError::ErrorQuadratureTooLow {
                assembly: assembly.quadrature_points,
                error: assembly.error_quadrature_points,
            });
        }
        if let AssemblyStrategy::Parallel { chunk_size: 0 } = assembly.strategy {
            return Err(ConfigError::ZeroChunkSize);
        }

        if let RefinementStrategy::FixedFraction {
            top_fraction: top,
            bottom_fraction: bottom,
        } = self.refinement.strategy
        {
            let valid_fraction = |t: f64| (0.0..=1.0).contains(&t);
            if !valid_fraction(top) || !valid_fraction(bottom) || top + bottom > 1.0 {
                return Err(ConfigError::InvalidFractions { top, bottom });
            }
        }
        if self.refinement.max_level > MAX_LEVEL {
            return Err(ConfigError::MaxLevelTooLarge {
                requested: self.refinement.max_level,
                max: MAX_LEVEL,
            });
        }

        let solver = &self.solver;
        if !(solver.tolerance > 0.0 && solver.tolerance.is_finite()) {
            return Err(ConfigError::InvalidTolerance {
                tolerance: solver.tolerance,
            });
        }
        if solver.max_iterations == 0 {
            return Err(ConfigError::ZeroMaxIterations);
        }
        if let Preconditioner::Ssor { omega } = solver.preconditioner {
            if !(omega > 0.0 && omega < 2.0) {
                return Err(ConfigError::InvalidRelaxation { omega });
            }
        }
        Ok(())
    }
}
