//! This module provides the physical constants of a calculation and utilities for loading them
//! from TOML files.
//!
//! A `PhysicalConstants` value describes the dielectric environment (solute interior and
//! solvent), the temperature and the 1:1 salt concentration. The inverse Debye length κ that
//! screens the solvent field is derived from these unless an explicit value overrides it.

use super::error::PbsamError;
use crate::math::debye;
use serde::Deserialize;
use std::path::Path;

/// The dielectric and electrolyte description of a system.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct PhysicalConstants {
    /// Relative permittivity inside the molecular spheres (`ε_in`).
    pub dielectric_interior: f64,
    /// Relative permittivity of the solvent (`ε_out`).
    pub dielectric_solvent: f64,
    /// Temperature in kelvin.
    pub temperature: f64,
    /// Concentration of a 1:1 salt in mol/l; equal to the ionic strength.
    pub salt_concentration: f64,
    /// Inverse Debye length in 1/Å. When set, it takes precedence over the value implied by
    /// temperature, permittivity and salt.
    #[serde(default)]
    pub kappa: Option<f64>,
}

impl PhysicalConstants {
    /// Loads physical constants from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns a `PbsamError::IoError` if the file cannot be read, or a
    /// `PbsamError::DeserializationError` if the TOML content is invalid.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use pbsam::PhysicalConstants;
    /// use std::path::Path;
    ///
    /// let constants = PhysicalConstants::load_from_file(Path::new("constants.toml")).unwrap();
    /// ```
    pub fn load_from_file(path: &Path) -> Result<Self, PbsamError> {
        let content = std::fs::read_to_string(path).map_err(|io_error| PbsamError::IoError {
            path: path.to_path_buf(),
            source: io_error,
        })?;

        Self::load_from_str(&content)
    }

    /// Parses physical constants from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns a `PbsamError::DeserializationError` if the TOML content is invalid or a
    /// required field is missing.
    ///
    /// # Examples
    ///
    /// ```
    /// use pbsam::PhysicalConstants;
    ///
    /// let toml_data = r#"
    /// dielectric_interior = 2.0
    /// dielectric_solvent = 80.0
    /// temperature = 300.0
    /// salt_concentration = 0.1
    /// "#;
    ///
    /// let constants = PhysicalConstants::load_from_str(toml_data).unwrap();
    /// assert!(constants.kappa() > 0.0);
    /// ```
    pub fn load_from_str(toml_str: &str) -> Result<Self, PbsamError> {
        toml::from_str(toml_str).map_err(PbsamError::from)
    }

    /// Constants with an explicit screening constant, ignoring temperature and salt.
    pub fn with_kappa(dielectric_interior: f64, dielectric_solvent: f64, kappa: f64) -> Self {
        Self {
            dielectric_interior,
            dielectric_solvent,
            temperature: 298.15,
            salt_concentration: 0.0,
            kappa: Some(kappa),
        }
    }

    /// Inverse Debye length κ in 1/Å.
    pub fn kappa(&self) -> f64 {
        self.kappa.unwrap_or_else(|| {
            debye::inverse_debye_length(
                self.temperature,
                self.dielectric_solvent,
                self.salt_concentration,
            )
        })
    }

    /// Ratio `ε_in / ε_out` entering the boundary conditions.
    pub fn dielectric_ratio(&self) -> f64 {
        self.dielectric_interior / self.dielectric_solvent
    }
}
