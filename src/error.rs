use std::path::PathBuf;
use thiserror::Error;

/// The primary error type for all fallible operations in the `pbsam` library.
///
/// Geometry validation, configuration loading and the dense linear algebra used by the
/// sphere-local self-interaction solve all report through this enum. Non-convergence of the
/// outer iteration is not an error by itself; it only surfaces as
/// [`PbsamError::NotConverged`] when a caller asks for it through
/// [`ConvergenceReport::ensure_converged`](crate::solver::ConvergenceReport::ensure_converged).
#[derive(Error, Debug)]
pub enum PbsamError {
    /// The system contains no molecules. At least one molecule is required.
    #[error("Input validation failed: at least one molecule is required")]
    NoMolecules,

    /// A molecule was constructed without any spheres.
    #[error("Molecule {0} has no dielectric spheres")]
    EmptyMolecule(usize),

    /// A sphere radius is not strictly positive (or not finite).
    #[error("Sphere {sphere} of molecule {molecule} has invalid radius {radius}")]
    InvalidRadius {
        /// Index of the offending molecule.
        molecule: usize,
        /// Index of the offending sphere within its molecule.
        sphere: usize,
        /// The rejected radius in angstroms.
        radius: f64,
    },

    /// A sphere lists a charge index that does not exist in its molecule.
    #[error("Sphere {sphere} of molecule {molecule} references missing charge {charge}")]
    InvalidChargeIndex {
        /// Index of the offending molecule.
        molecule: usize,
        /// Index of the sphere holding the bad reference.
        sphere: usize,
        /// The charge index that could not be resolved.
        charge: usize,
    },

    /// A charge assigned to a sphere lies outside that sphere.
    ///
    /// The multipole expansion of a sphere's own charges only converges inside the sphere, so
    /// every charge must be enclosed by the sphere that owns it.
    #[error(
        "Charge {charge} of molecule {molecule} lies {distance:.3} A from the center of sphere {sphere} (radius {radius:.3} A)"
    )]
    ChargeOutsideSphere {
        /// Index of the offending molecule.
        molecule: usize,
        /// Index of the sphere that claims the charge.
        sphere: usize,
        /// Index of the charge within the molecule.
        charge: usize,
        /// Distance of the charge from the sphere center.
        distance: f64,
        /// Radius of the sphere.
        radius: f64,
    },

    /// A charge is owned by no sphere, or by more than one sphere.
    #[error("Charge {charge} of molecule {molecule} must belong to exactly one sphere (found {owners})")]
    UnassignedCharge {
        /// Index of the offending molecule.
        molecule: usize,
        /// Index of the charge within the molecule.
        charge: usize,
        /// Number of spheres that listed the charge.
        owners: usize,
    },

    /// Spheres belonging to two different molecules overlap.
    #[error("Molecules {first} and {second} overlap")]
    OverlappingMolecules {
        /// Index of the first molecule of the overlapping pair.
        first: usize,
        /// Index of the second molecule of the overlapping pair.
        second: usize,
    },

    /// A molecule index passed to the solver is out of range.
    #[error("Molecule index {index} is out of range for a system of {count} molecules")]
    MoleculeIndexOutOfRange {
        /// The requested index.
        index: usize,
        /// The number of molecules in the system.
        count: usize,
    },

    /// The periodic box or the inter-molecular cutoff is unusable.
    #[error("Invalid boundary conditions: {0}")]
    InvalidBoundary(String),

    /// The solver options are inconsistent (for example a zero truncation order).
    #[error("Invalid solver options: {0}")]
    InvalidOptions(String),

    /// A failure within the dense linear algebra used for the sphere-local solve,
    /// for example a singular self-interaction system.
    #[error("Failed to solve the linear matrix system: {0}")]
    LinalgError(String),

    /// The outer iteration hit its iteration cap before reaching the requested tolerance.
    #[error(
        "Iteration failed to converge after {max_iterations} sweeps. Final convergence measure: {mu:.2e}"
    )]
    NotConverged {
        /// The number of sweeps that were performed.
        max_iterations: u32,
        /// The convergence measure after the final sweep.
        mu: f64,
    },

    /// An I/O error that occurred while attempting to read a constants file.
    #[error("I/O error at path '{path}': {source}")]
    IoError {
        /// The path of the file that caused the I/O error.
        path: PathBuf,
        /// The underlying `std::io::Error`.
        #[source]
        source: std::io::Error,
    },

    /// An error that occurred while parsing a TOML constants file.
    #[error("Failed to deserialize TOML constants: {0}")]
    DeserializationError(#[from] toml::de::Error),
}
