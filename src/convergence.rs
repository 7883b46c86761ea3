//! Tabulation of error norms over refinement cycles, with empirical convergence rates.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error norms of one refinement cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceRow {
    pub cycle: usize,
    pub cells: usize,
    pub dofs: usize,
    pub l2: f64,
    pub h1_seminorm: f64,
    pub h1: f64,
    /// Global norm of the error indicators, if they were computed.
    pub estimator: Option<f64>,
}

/// A column of the table for which rates can be computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorColumn {
    L2,
    H1Seminorm,
    H1,
    Estimator,
}

impl ErrorColumn {
    pub const ALL: [ErrorColumn; 4] = [Self::L2, Self::H1Seminorm, Self::H1, Self::Estimator];

    pub fn name(&self) -> &'static str {
        match self {
            Self::L2 => "L2",
            Self::H1Seminorm => "H1-semi",
            Self::H1 => "H1",
            Self::Estimator => "estimator",
        }
    }

    fn value(&self, row: &ConvergenceRow) -> Option<f64> {
        match self {
            Self::L2 => Some(row.l2),
            Self::H1Seminorm => Some(row.h1_seminorm),
            Self::H1 => Some(row.h1),
            Self::Estimator => row.estimator,
        }
    }
}

/// Append-only table of [`ConvergenceRow`]s.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceTable {
    rows: Vec<ConvergenceRow>,
}

impl ConvergenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_row(&mut self, row: ConvergenceRow) {
        self.rows.push(row);
    }

    pub fn rows(&self) -> &[ConvergenceRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Convergence rates with respect to the number of DoFs in two dimensions,
    /// `rate_k = 2 ln(e_{k-1} / e_k) / ln(N_k / N_{k-1})`.
    ///
    /// The rate of the first row is `None`, as is any rate whose inputs are missing,
    /// non-positive or whose DoF counts coincide.
    pub fn rates(&self, column: ErrorColumn) -> Vec<Option<f64>> {
        let mut rates = Vec::with_capacity(self.rows.len());
        if !self.rows.is_empty() {
            rates.push(None);
        }
        rates.extend(self.rows.windows(2).map(|pair| {
            let (prev, next) = (&pair[0], &pair[1]);
            let e_prev = column.value(prev)?;
            let e_next = column.value(next)?;
            if e_prev <= 0.0 || e_next <= 0.0 || prev.dofs == next.dofs || prev.dofs == 0 {
                return None;
            }
            let dof_ratio = next.dofs as f64 / prev.dofs as f64;
            Some(2.0 * (e_prev / e_next).ln() / dof_ratio.ln())
        }));
        rates
    }
}

fn fmt_optional(value: Option<f64>, precision: usize) -> String {
    match value {
        Some(value) => format!("{:.*e}", precision, value),
        None => "-".to_string(),
    }
}

impl fmt::Display for ConvergenceTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let columns = [ErrorColumn::L2, ErrorColumn::H1, ErrorColumn::Estimator];
        write!(f, "{:>5} {:>8} {:>8}", "cycle", "cells", "dofs")?;
        for column in &columns {
            write!(f, " {:>11} {:>6}", column.name(), "rate")?;
        }
        writeln!(f)?;

        let rates: Vec<_> = columns.iter().map(|&column| self.rates(column)).collect();
        for (k, row) in self.rows.iter().enumerate() {
            write!(f, "{:>5} {:>8} {:>8}", row.cycle, row.cells, row.dofs)?;
            for (column, column_rates) in columns.iter().zip(&rates) {
                let rate = match column_rates[k] {
                    Some(rate) => format!("{:.2}", rate),
                    None => "-".to_string(),
                };
                write!(f, " {:>11} {:>6}", fmt_optional(column.value(row), 3), rate)?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}
