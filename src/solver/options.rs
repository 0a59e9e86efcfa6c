//! This module defines configuration options for the iterative multipole solver.
//!
//! `SolverOptions` controls the truncation order of every expansion, the quadrature densities
//! of the surface integrals, the analytic/numerical switch of the re-expansion operator and
//! the convergence criteria of the outer iteration.

use crate::error::PbsamError;

/// Configuration parameters for the multipole solver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SolverOptions {
    /// The truncation order `p` shared by every coefficient array (degrees `0..p`).
    ///
    /// Cost grows as `p⁴` per sphere pair; 10 is accurate to a few parts in a thousand for
    /// spheres in contact.
    pub truncation_order: usize,
    /// The convergence tolerance on the summed relative change `mu` of the `H` coefficients.
    pub tolerance: f64,
    /// The maximum number of sweeps of [`Solver::solve`](super::Solver::solve).
    pub max_iterations: u32,
    /// Extra gap in ångströms beyond contact above which a sphere pair is re-expanded
    /// analytically.
    pub analytic_margin: f64,
    /// Surface grid of the self-interaction tensor, in multiples of `p²` points.
    pub surface_grid_factor: f64,
    /// Source grid of numerical re-expansions, in multiples of `p²` points.
    pub reexpansion_grid_factor: f64,
}

impl Default for SolverOptions {
    fn default() -> Self {
        Self {
            truncation_order: 10,
            tolerance: 1.0e-4,
            max_iterations: 10_000,
            analytic_margin: 5.0,
            surface_grid_factor: 20.0,
            reexpansion_grid_factor: 2.5,
        }
    }
}

impl SolverOptions {
    /// Checks that the options describe a usable solve.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::InvalidOptions` naming the first offending field.
    pub fn validate(&self) -> Result<(), PbsamError> {
        if self.truncation_order == 0 {
            return Err(PbsamError::InvalidOptions(
                "truncation_order must be at least 1".to_string(),
            ));
        }
        if !(self.tolerance.is_finite() && self.tolerance > 0.0) {
            return Err(PbsamError::InvalidOptions(format!(
                "tolerance must be positive, got {}",
                self.tolerance
            )));
        }
        if !(self.analytic_margin.is_finite() && self.analytic_margin >= 0.0) {
            return Err(PbsamError::InvalidOptions(format!(
                "analytic_margin must be non-negative, got {}",
                self.analytic_margin
            )));
        }
        for (name, factor) in [
            ("surface_grid_factor", self.surface_grid_factor),
            ("reexpansion_grid_factor", self.reexpansion_grid_factor),
        ] {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(PbsamError::InvalidOptions(format!(
                    "{name} must be positive, got {factor}"
                )));
            }
        }
        Ok(())
    }
}
