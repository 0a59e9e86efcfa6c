//! This module contains the iterative solver and its configuration.
//!
//! It includes the `Solver`, which owns every coefficient array of a system and runs the
//! synchronous fixed-point sweeps, and `SolverOptions`, which sets the truncation order, the
//! quadrature densities and the convergence criteria.

mod implementation;
mod options;

pub use implementation::{ConvergenceReport, Solver, SolverState};
pub use options::SolverOptions;
