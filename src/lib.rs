//! Adaptive bilinear finite elements for the Laplace equation on quadtree meshes.
//!
//! The building blocks are usable on their own: [`mesh`] and [`dofs`] describe the
//! discretization, [`constraints`] handles hanging nodes and Dirichlet data, [`assembly`] builds
//! condensed linear systems, [`solve`] solves them, and [`estimate`] and [`adapt`] drive local
//! refinement. [`simulation`] ties everything together into the usual solve-estimate-refine loop.
pub mod adapt;
pub mod assembly;
pub mod config;
pub mod constraints;
pub mod convergence;
pub mod dofs;
pub mod element;
pub mod error;
pub mod estimate;
pub mod io;
pub mod mesh;
pub mod problem;
#[cfg(feature = "proptest")]
pub mod proptest;
pub mod quadrature;
pub mod simulation;
pub mod solve;
pub mod timing;

pub extern crate nalgebra;
pub extern crate nalgebra_sparse;
pub extern crate vtkio;
