//! This module provides the mathematical building blocks of the multipole solver.
//!
//! It contains the special functions of the screened and unscreened Coulomb kernels, the
//! angular-momentum coupling coefficients used by the translation operators, the spherical
//! quadrature grids, and the physical relations that turn a solvent description into a
//! screening constant.

/// Scaled modified spherical Bessel functions `î_n` and `k̂_n`.
pub mod bessel;

/// Physical and numerical constants shared across the library.
pub mod constants;

/// Bjerrum and Debye lengths of a 1:1 electrolyte.
pub mod debye;

/// Spiral point sets used for surface quadrature.
pub mod grid;

/// Schmidt semi-normalized spherical harmonics and coordinate conversion.
pub mod spherical;

/// Wigner 3j symbols and Gaunt coefficients.
pub mod wigner;
