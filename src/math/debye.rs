//! Screening-length relations for a 1:1 electrolyte.

use super::constants::{ANGSTROM_PER_METER, LITER_PER_ANGSTROM3};
use physical_constants::{
    AVOGADRO_CONSTANT, BOLTZMANN_CONSTANT, ELEMENTARY_CHARGE, VACUUM_ELECTRIC_PERMITTIVITY,
};
use std::f64::consts::PI;

/// Calculates the Bjerrum length, λ𝐵 = e²/4πε𝑘𝑇, in angstroms.
pub fn bjerrum_length(kelvin: f64, relative_permittivity: f64) -> f64 {
    ELEMENTARY_CHARGE * ELEMENTARY_CHARGE * ANGSTROM_PER_METER
        / (4.0
            * PI
            * relative_permittivity
            * VACUUM_ELECTRIC_PERMITTIVITY
            * BOLTZMANN_CONSTANT
            * kelvin)
}

/// Calculates the Debye length in angstroms, λ𝐷 = 1/√(8π·λ𝐵·𝐼·𝑁𝐴·𝑉), where 𝐼 is the
/// ionic strength in mol/l.
///
/// Returns `None` for a vanishing ionic strength, where the screening length is infinite.
pub fn debye_length(kelvin: f64, relative_permittivity: f64, ionic_strength: f64) -> Option<f64> {
    if ionic_strength <= 0.0 {
        return None;
    }
    let length = (8.0
        * PI
        * bjerrum_length(kelvin, relative_permittivity)
        * ionic_strength
        * AVOGADRO_CONSTANT
        * LITER_PER_ANGSTROM3)
        .sqrt()
        .recip();
    Some(length)
}

/// Inverse Debye length κ in 1/Å; zero for pure solvent.
pub fn inverse_debye_length(kelvin: f64, relative_permittivity: f64, ionic_strength: f64) -> f64 {
    debye_length(kelvin, relative_permittivity, ionic_strength).map_or(0.0, f64::recip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bjerrum_length_in_water() {
        assert_relative_eq!(bjerrum_length(293.0, 80.0), 7.1288799871283, epsilon = 1e-8);
    }

    #[test]
    fn debye_length_of_thirty_millimolar_salt() {
        let length = debye_length(293.0, 80.0, 0.03).unwrap();
        assert_relative_eq!(length, 17.576538097378368, epsilon = 1e-8);
    }

    #[test]
    fn pure_solvent_is_unscreened() {
        assert!(debye_length(298.15, 78.0, 0.0).is_none());
        assert_eq!(inverse_debye_length(298.15, 78.0, 0.0), 0.0);
    }

    #[test]
    fn kappa_scales_with_square_root_of_ionic_strength() {
        let low = inverse_debye_length(298.15, 78.0, 0.01);
        let high = inverse_debye_length(298.15, 78.0, 0.04);
        assert_relative_eq!(high / low, 2.0, epsilon = 1e-12);
    }
}
