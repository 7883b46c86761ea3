//! Marking of cells from error indicators and the estimate/mark/refine cycle.
use crate::dofs::{DofHandler, StaleMeshState};
use crate::estimate::KellyErrorEstimator;
use crate::mesh::{MeshError, QuadTreeMesh, RefinementSummary};
use log::debug;
use nalgebra::DVector;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;

/// How cells are selected for refinement after each cycle.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RefinementStrategy {
    /// Every active cell is refined.
    Global,
    /// The cells with the largest indicators are refined, those with the smallest coarsened.
    FixedFraction { top_fraction: f64, bottom_fraction: f64 },
}

impl Default for RefinementStrategy {
    fn default() -> Self {
        Self::FixedFraction {
            top_fraction: 0.33,
            bottom_fraction: 0.0,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefinementPhase {
    Idle,
    Estimating,
    Marking,
    Executing,
}

impl fmt::Display for RefinementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Estimating => "estimating",
            Self::Marking => "marking",
            Self::Executing => "executing",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum RefinementError {
    InvalidFractions { top: f64, bottom: f64 },
    NonFiniteIndicator { index: usize, value: f64 },
    IndicatorCountMismatch { expected: usize, actual: usize },
    InvalidTransition { from: RefinementPhase, to: RefinementPhase },
    StaleMesh(StaleMeshState),
    Mesh(MeshError),
}

impl fmt::Display for RefinementError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFractions { top, bottom } => write!(
                f,
                "invalid refinement fractions (top {}, bottom {}): each must be in [0, 1] and their sum at most 1",
                top, bottom
            ),
            Self::NonFiniteIndicator { index, value } => {
                write!(f, "indicator of cell {} is not finite ({})", index, value)
            }
            Self::IndicatorCountMismatch { expected, actual } => {
                write!(f, "expected {} indicators (one per active cell), got {}", expected, actual)
            }
            Self::InvalidTransition { from, to } => {
                write!(f, "invalid refinement transition from {} to {}", from, to)
            }
            Self::StaleMesh(err) => write!(f, "{}", err),
            Self::Mesh(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for RefinementError {}

impl From<MeshError> for RefinementError {
    fn from(err: MeshError) -> Self {
        Self::Mesh(err)
    }
}

impl From<StaleMeshState> for RefinementError {
    fn from(err: StaleMeshState) -> Self {
        Self::StaleMesh(err)
    }
}

/// Active-cell indices selected for refinement and for coarsening. The two sets are disjoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marking {
    pub refine: Vec<usize>,
    pub coarsen: Vec<usize>,
}

/// Marks the `floor(top * n)` cells with the largest indicators for refinement and the
/// `floor(bottom * n)` cells with the smallest for coarsening.
///
/// Cells with equal indicators are ranked by active-cell order, so the result is deterministic.
pub fn mark_fixed_fraction(indicators: &[f64], top: f64, bottom: f64) -> Result<Marking, RefinementError> {
    let valid_fraction = |t: f64| (0.0..=1.0).contains(&t);
    if !valid_fraction(top) || !valid_fraction(bottom) || top + bottom > 1.0 {
        return Err(RefinementError::InvalidFractions { top, bottom });
    }
    if let Some((index, &value)) = indicators.iter().enumerate().find(|(_, v)| !v.is_finite()) {
        return Err(RefinementError::NonFiniteIndicator { index, value });
    }

    let n = indicators.len();
    let num_refine = (top * n as f64).floor() as usize;
    let num_coarsen = ((bottom * n as f64).floor() as usize).min(n - num_refine);

    // Stable sort, so ties keep active-cell order
    let mut ranking: Vec<usize> = (0..n).collect();
    ranking.sort_by_key(|&i| Reverse(OrderedFloat(indicators[i])));

    let mut refine = ranking[..num_refine].to_vec();
    let mut coarsen = ranking[n - num_coarsen..].to_vec();
    refine.sort_unstable();
    coarsen.sort_unstable();
    Ok(Marking { refine, coarsen })
}

fn apply_marking(mesh: &mut QuadTreeMesh, marking: &Marking) -> Result<(), MeshError> {
    let active = mesh.active_cells().to_vec();
    for &i in &marking.refine {
        mesh.set_refine_flag(active[i])?;
    }
    for &i in &marking.coarsen {
        mesh.set_coarsen_flag(active[i])?;
    }
    Ok(())
}

/// Drives one estimate, mark and refine step per cycle.
///
/// The driver moves through `Idle -> Estimating -> Marking -> Executing -> Idle`:
/// [`estimate`](Self::estimate) leaves it in `Estimating` with indicators available,
/// [`mark`](Self::mark) in `Marking` with a marking available, and [`execute`](Self::execute)
/// applies the marks and returns to `Idle`. Calling a step out of order fails with
/// [`RefinementError::InvalidTransition`] and leaves the driver unchanged.
#[derive(Debug, Clone)]
pub struct RefinementDriver {
    strategy: RefinementStrategy,
    estimator: KellyErrorEstimator,
    phase: RefinementPhase,
    indicators: Vec<f64>,
    marking: Marking,
    generation: u64,
}

impl RefinementDriver {
    pub fn new(strategy: RefinementStrategy, estimator: KellyErrorEstimator) -> Self {
        Self {
            strategy,
            estimator,
            phase: RefinementPhase::Idle,
            indicators: Vec::new(),
            marking: Marking::default(),
            generation: 0,
        }
    }

    pub fn strategy(&self) -> RefinementStrategy {
        self.strategy
    }

    pub fn phase(&self) -> RefinementPhase {
        self.phase
    }

    /// Indicators of the last estimate, one per active cell.
    pub fn indicators(&self) -> &[f64] {
        &self.indicators
    }

    pub fn marking(&self) -> &Marking {
        &self.marking
    }

    fn transition(&mut self, from: RefinementPhase, to: RefinementPhase) -> Result<(), RefinementError> {
        if self.phase == from {
            self.phase = to;
            Ok(())
        } else {
            Err(RefinementError::InvalidTransition { from: self.phase, to })
        }
    }

    /// Computes error indicators for the current solution.
    pub fn estimate(&mut self, mesh: &QuadTreeMesh, dofs: &DofHandler, solution: &DVector<f64>) -> eyre::Result<&[f64]> {
        if self.phase != RefinementPhase::Idle {
            return Err(RefinementError::InvalidTransition {
                from: self.phase,
                to: RefinementPhase::Estimating,
            }
            .into());
        }
        self.indicators = self.estimator.estimate(mesh, dofs, solution)?;
        self.generation = mesh.generation();
        self.transition(RefinementPhase::Idle, RefinementPhase::Estimating)?;
        Ok(&self.indicators)
    }

    /// Selects cells to refine and coarsen from the indicators of the last estimate.
    pub fn mark(&mut self) -> Result<&Marking, RefinementError> {
        if self.phase != RefinementPhase::Estimating {
            return Err(RefinementError::InvalidTransition {
                from: self.phase,
                to: RefinementPhase::Marking,
            });
        }
        self.marking = match self.strategy {
            RefinementStrategy::Global => Marking {
                refine: (0..self.indicators.len()).collect(),
                coarsen: Vec::new(),
            },
            RefinementStrategy::FixedFraction {
                top_fraction,
                bottom_fraction,
            } => mark_fixed_fraction(&self.indicators, top_fraction, bottom_fraction)?,
        };
        debug!(
            "Marked {} cells for refinement and {} for coarsening",
            self.marking.refine.len(),
            self.marking.coarsen.len()
        );
        self.transition(RefinementPhase::Estimating, RefinementPhase::Marking)?;
        Ok(&self.marking)
    }

    /// Flags the marked cells and refines the mesh.
    ///
    /// The mesh must be in the state it was in when the indicators were computed.
    pub fn execute(&mut self, mesh: &mut QuadTreeMesh) -> Result<RefinementSummary, RefinementError> {
        if self.phase != RefinementPhase::Marking {
            return Err(RefinementError::InvalidTransition {
                from: self.phase,
                to: RefinementPhase::Executing,
            });
        }
        if mesh.generation() != self.generation {
            return Err(StaleMeshState {
                built_for: self.generation,
                current: mesh.generation(),
            }
            .into());
        }
        if self.indicators.len() != mesh.num_active_cells() {
            return Err(RefinementError::IndicatorCountMismatch {
                expected: mesh.num_active_cells(),
                actual: self.indicators.len(),
            });
        }
        self.transition(RefinementPhase::Marking, RefinementPhase::Executing)?;

        if let Err(err) = apply_marking(mesh, &self.marking) {
            mesh.clear_flags();
            self.phase = RefinementPhase::Marking;
            return Err(err.into());
        }

        let summary = mesh.execute_coarsening_and_refinement();
        self.phase = RefinementPhase::Idle;
        Ok(summary)
    }

    /// Discards indicators and marks and returns to `Idle`.
    pub fn reset(&mut self) {
        self.phase = RefinementPhase::Idle;
        self.indicators.clear();
        self.marking = Marking::default();
    }
}
