//! Coupling fields re-expanded from other spheres.
//!
//! - `LF`, `LH`: the `F` (Coulomb kernel) and `H` (screened kernel) multipoles of the other
//!   spheres of the same molecule, re-expanded about sphere `k`.
//! - `LHN`: the `H` multipoles of every sphere of every other molecule, re-expanded about
//!   sphere `k`. It needs every molecule's current `H` and is computed after the sweep barrier.
//!   Molecules the T-matrix does not couple to `k` (beyond the cutoff) are skipped.

use super::{CoefficientArena, Coefficients};
use crate::reexpansion::{Kernel, TMatrix};
use crate::system::SphereId;

fn intra_molecular(
    tmatrix: &TMatrix,
    molecule: usize,
    k: usize,
    sources: &[Coefficients],
    kernel: Kernel,
) -> Coefficients {
    let target = SphereId::new(molecule, k);
    let mut total = Coefficients::zeros(tmatrix.order());
    for (j, x) in sources.iter().enumerate() {
        if j == k || x.is_zero() {
            continue;
        }
        total += &tmatrix.re_expand(x, target, SphereId::new(molecule, j), kernel);
    }
    total
}

/// `LF` of sphere `k` of `molecule`, from that molecule's `F` arrays.
pub fn compute_lf(tmatrix: &TMatrix, molecule: usize, k: usize, f: &[Coefficients]) -> Coefficients {
    intra_molecular(tmatrix, molecule, k, f, Kernel::Coulomb)
}

/// `LH` of sphere `k` of `molecule`, from that molecule's `H` arrays.
pub fn compute_lh(tmatrix: &TMatrix, molecule: usize, k: usize, h: &[Coefficients]) -> Coefficients {
    intra_molecular(tmatrix, molecule, k, h, Kernel::Screened)
}

/// `LHN` of sphere `k` of `molecule`, from the `H` arrays of every other coupled molecule.
pub fn compute_lhn(tmatrix: &TMatrix, molecule: usize, k: usize, h: &CoefficientArena) -> Coefficients {
    let target = SphereId::new(molecule, k);
    let mut total = Coefficients::zeros(tmatrix.order());
    for (other, spheres) in h.molecules().iter().enumerate() {
        if other == molecule {
            continue;
        }
        for (l, x) in spheres.iter().enumerate() {
            let source = SphereId::new(other, l);
            if x.is_zero() || !tmatrix.couples(target, source) {
                continue;
            }
            total += &tmatrix.re_expand(x, target, source, Kernel::Screened);
        }
    }
    total
}
