//! This module defines fundamental physical and numerical constants used throughout the pbsam library.
//!
//! Lengths are measured in angstroms, charges in elementary charges and concentrations in mol/l.
//! Potentials produced by the solver are therefore in reduced units of e/Å (divide by the
//! relevant permittivity already folded into the coefficients).

/// Number of angstroms in one meter.
pub const ANGSTROM_PER_METER: f64 = 1e10;

/// Volume of one cubic angstrom expressed in liters.
pub const LITER_PER_ANGSTROM3: f64 = 1e-27;

/// Threshold below which two points are considered coincident, in angstroms.
///
/// Used to guard the `1/r` singularities of the multipole kernels and the angular part of
/// cartesian-to-spherical conversions.
pub const DISTANCE_THRESHOLD: f64 = 1e-12;

/// Largest argument for which `n!` is finite in double precision.
pub const MAX_FACTORIAL_ARGUMENT: usize = 170;

/// Upper bound on the number of power-series terms used for the scaled Bessel `î_n`.
pub const BESSEL_SERIES_MAX_TERMS: usize = 2000;
