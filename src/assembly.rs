//! Assembly of global linear systems.
//!
//! [`local`] computes element contributions, [`global`] scatters them into a sparse system
//! with one of the [`global::ConstraintElimination`] strategies.
pub mod global;
pub mod local;

pub use global::{
    AssemblyStrategy, ConstraintElimination, EliminateAsPostProcess, EliminateDuringScatter, Elimination, LinearSystem,
    SystemAssembler,
};
pub use local::{
    CellCopyData, CellScratch, CellValues, ElementConnectivityAssembler, ElementSystemAssembler, LaplaceElementAssembler,
};
