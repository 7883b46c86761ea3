//! Wall-clock and CPU timing of named phases of a computation.
use cpu_time::ProcessTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Accumulated timing of one phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseTiming {
    pub label: String,
    pub calls: usize,
    pub wall: Duration,
    /// CPU time of the whole process, so it includes time spent in worker threads.
    pub cpu: Duration,
}

/// Records wall and CPU time per labelled phase, in order of first use.
///
/// The timer is passed explicitly to the code being measured.
#[derive(Debug, Clone, Default)]
pub struct PhaseTimer {
    phases: Vec<PhaseTiming>,
}

impl PhaseTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f`, adding its wall and CPU time to the phase `label`.
    pub fn measure<R>(&mut self, label: &str, f: impl FnOnce() -> R) -> R {
        let cpu_start = ProcessTime::now();
        let wall_start = Instant::now();
        let result = f();
        let wall = wall_start.elapsed();
        self.record(label, wall, cpu_start.elapsed());
        result
    }

    pub fn record(&mut self, label: &str, wall: Duration, cpu: Duration) {
        match self.phases.iter_mut().find(|phase| phase.label == label) {
            Some(phase) => {
                phase.calls += 1;
                phase.wall += wall;
                phase.cpu += cpu;
            }
            None => self.phases.push(PhaseTiming {
                label: label.to_string(),
                calls: 1,
                wall,
                cpu,
            }),
        }
    }

    pub fn report(&self) -> TimingReport {
        TimingReport {
            phases: self.phases.clone(),
        }
    }
}

/// A snapshot of a [`PhaseTimer`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingReport {
    pub phases: Vec<PhaseTiming>,
}

impl TimingReport {
    /// Total wall time over all phases.
    pub fn total(&self) -> Duration {
        self.phases.iter().map(|phase| phase.wall).sum()
    }

    pub fn total_cpu(&self) -> Duration {
        self.phases.iter().map(|phase| phase.cpu).sum()
    }

    pub fn phase(&self, label: &str) -> Option<&PhaseTiming> {
        self.phases.iter().find(|phase| phase.label == label)
    }
}

impl fmt::Display for TimingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total().as_secs_f64();
        let width = self
            .phases
            .iter()
            .map(|phase| phase.label.len())
            .max()
            .unwrap_or(0)
            .max("Section".len());

        writeln!(f, "Total wall time: {:.3} s", total)?;
        writeln!(f, "Total CPU time: {:.3} s", self.total_cpu().as_secs_f64())?;
        writeln!(
            f,
            "{:<width$} {:>6} {:>11} {:>7} {:>11}",
            "Section", "calls", "wall time", "share", "CPU time"
        )?;
        for phase in &self.phases {
            let seconds = phase.wall.as_secs_f64();
            let share = if total > 0.0 { 100.0 * seconds / total } else { 0.0 };
            writeln!(
                f,
                "{:<width$} {:>6} {:>9.3} s {:>6.1}% {:>9.3} s",
                phase.label,
                phase.calls,
                seconds,
                share,
                phase.cpu.as_secs_f64()
            )?;
        }
        Ok(())
    }
}
