//! Iterative multipole solver for the linearized Poisson-Boltzmann equation around assemblies
//! of molecules built from charge-bearing dielectric spheres.
//!
//! A [`System`] of rigid [`Molecule`]s is handed to a [`Solver`], which builds the geometry
//! matrices and the re-expansion operator once and then sweeps the per-sphere multipole
//! coefficients `H` and `F` to self-consistency.

pub mod coefficients;
pub mod error;
pub mod math;
pub mod params;
pub mod reexpansion;
pub mod solver;
pub mod system;

pub use coefficients::{CoefficientArena, Coefficients};
pub use error::PbsamError;
pub use params::PhysicalConstants;
pub use reexpansion::{Kernel, ReExpansion, TMatrix};
pub use solver::{ConvergenceReport, Solver, SolverOptions, SolverState};
pub use system::{Charge, Molecule, Sphere, SphereId, System};

use std::sync::OnceLock;

static DEFAULT_CONSTANTS: OnceLock<PhysicalConstants> = OnceLock::new();

/// Physical constants of an aqueous 10 mM salt solution at room temperature.
pub fn get_default_constants() -> &'static PhysicalConstants {
    DEFAULT_CONSTANTS.get_or_init(|| {
        const DEFAULT_CONSTANTS_TOML: &str = include_str!("../resources/constants.toml");
        PhysicalConstants::load_from_str(DEFAULT_CONSTANTS_TOML)
            .expect("Failed to parse embedded default constants. This is a library bug.")
    })
}
