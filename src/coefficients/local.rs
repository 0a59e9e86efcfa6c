//! Sphere-local combinations `XH`, `XF` and the self-interaction update of `H` and `F`.
//!
//! Per sphere the boundary conditions couple the new `(H, F)` to themselves through the surface
//! overlap tensor `IE`:
//!
//! ```text
//! H_nm = î_n Σ_ls IE(nm;ls) [ c_l H_ls + F_ls + XH_ls ]
//! F_nm =     Σ_ls IE(nm;ls) [ e^{-κa} d_l H_ls + g_l F_ls + XF_ls ]
//! ```
//!
//! with `c_l = (2l+1)/î_l − e^{-κa} k̂_l`, `d_l = l k̂_l − (2l+1) k̂_{l+1}` and
//! `g_l = 2l+1 − l ε_in/ε_out`, all Bessel functions taken at `κa`. Substituting the previous
//! iterate on the right-hand side diverges for exposed spheres (the `H` diagonal of the map
//! is `1 − î_0 e^{-κa}` at `n = 0` and grows with `n`), so [`SelfInteraction`] solves the
//! sphere-local system exactly once per sweep instead. The fixed point is the same.

use super::statics::SurfaceOverlap;
use super::{Coefficients, modes};
use crate::error::PbsamError;
use crate::math::bessel::BesselCalculator;
use faer::{Mat, c64, prelude::*};
use num_complex::Complex64;
use std::panic::{self, AssertUnwindSafe};

/// Bessel values and constants of one sphere at `κa`.
#[derive(Debug, Clone, PartialEq)]
pub struct SphereFactors {
    pub radius: f64,
    pub kappa: f64,
    /// `î_n(κa)` for `n ∈ [0, p]`.
    pub bessel_i: Vec<f64>,
    /// `k̂_n(κa)` for `n ∈ [0, p]`.
    pub bessel_k: Vec<f64>,
    /// `e^{-κa}`.
    pub decay: f64,
}

impl SphereFactors {
    pub fn new(radius: f64, kappa: f64, order: usize) -> Self {
        let bessel = BesselCalculator::new(order + 1);
        let z = kappa * radius;
        Self {
            radius,
            kappa,
            bessel_i: bessel.modified_i(order + 1, z),
            bessel_k: bessel.modified_k(order + 1, z),
            decay: (-z).exp(),
        }
    }

    fn c(&self, l: usize) -> f64 {
        (2 * l + 1) as f64 / self.bessel_i[l] - self.decay * self.bessel_k[l]
    }

    fn d(&self, l: usize) -> f64 {
        l as f64 * self.bessel_k[l] - (2 * l + 1) as f64 * self.bessel_k[l + 1]
    }
}

fn g(l: usize, dielectric_ratio: f64) -> f64 {
    (2 * l + 1) as f64 - l as f64 * dielectric_ratio
}

/// Elementwise sum of two arrays of equal order.
fn sum(a: &Coefficients, b: &Coefficients) -> Coefficients {
    let mut total = a.clone();
    total += b;
    total
}

/// `XH = E + a (LE + LF) − a î_n (LH + LHN)`.
pub fn compute_xh(
    e: &Coefficients,
    le: &Coefficients,
    lf: &Coefficients,
    lh: &Coefficients,
    lhn: &Coefficients,
    factors: &SphereFactors,
) -> Coefficients {
    let interior = sum(le, lf);
    let exterior = sum(lh, lhn);
    let a = factors.radius;
    Coefficients::from_fn(e.order(), |n, m| {
        e[(n, m)] + interior[(n, m)] * a - exterior[(n, m)] * (a * factors.bessel_i[n])
    })
}

/// `XF = a [(κa)² î_{n+1}/(2n+3) + n î_n] (LH + LHN) + ε [(n+1) E − n a (LE + LF)]`,
/// with `ε = ε_in/ε_out`.
pub fn compute_xf(
    e: &Coefficients,
    le: &Coefficients,
    lf: &Coefficients,
    lh: &Coefficients,
    lhn: &Coefficients,
    factors: &SphereFactors,
    dielectric_ratio: f64,
) -> Coefficients {
    let interior = sum(le, lf);
    let exterior = sum(lh, lhn);
    let a = factors.radius;
    let ka2 = (factors.kappa * a).powi(2);
    Coefficients::from_fn(e.order(), |n, m| {
        let bessel = ka2 * factors.bessel_i[n + 1] / (2 * n + 3) as f64
            + n as f64 * factors.bessel_i[n];
        exterior[(n, m)] * (a * bessel)
            + (e[(n, m)] * (n + 1) as f64 - interior[(n, m)] * (n as f64 * a)) * dielectric_ratio
    })
}

/// One literal application of the self-interaction map to `(h, f)`.
///
/// Its fixed point is what [`SelfInteraction::solve`] returns.
pub fn apply_update(
    ie: &SurfaceOverlap,
    factors: &SphereFactors,
    dielectric_ratio: f64,
    h: &Coefficients,
    f: &Coefficients,
    xh: &Coefficients,
    xf: &Coefficients,
) -> (Coefficients, Coefficients) {
    let order = ie.order();
    let degrees: Vec<usize> = modes(order).map(|(n, _)| n).collect();
    let h_input: Vec<Complex64> = degrees
        .iter()
        .enumerate()
        .map(|(i, &l)| h.as_slice()[i] * factors.c(l) + f.as_slice()[i] + xh.as_slice()[i])
        .collect();
    let f_input: Vec<Complex64> = degrees
        .iter()
        .enumerate()
        .map(|(i, &l)| {
            h.as_slice()[i] * (factors.decay * factors.d(l))
                + f.as_slice()[i] * g(l, dielectric_ratio)
                + xf.as_slice()[i]
        })
        .collect();

    let mut new_h = ie.apply(&h_input);
    for (value, &n) in new_h.iter_mut().zip(&degrees) {
        *value *= factors.bessel_i[n];
    }
    (
        Coefficients::from_vec(new_h),
        Coefficients::from_vec(ie.apply(&f_input)),
    )
}

/// Exact sphere-local solve of the self-interaction system.
///
/// Stores `G = (I − J)⁻¹ B`, of size `2p² × 2p²`, so that `[H; F] = G [XH; XF]`.
#[derive(Debug, Clone, PartialEq)]
pub struct SelfInteraction {
    order: usize,
    /// Row-major.
    propagator: Vec<Complex64>,
}

impl SelfInteraction {
    pub fn new(
        ie: &SurfaceOverlap,
        factors: &SphereFactors,
        dielectric_ratio: f64,
    ) -> Result<Self, PbsamError> {
        let order = ie.order();
        let size = order * order;
        let degrees: Vec<usize> = modes(order).map(|(n, _)| n).collect();
        let to_c64 = |z: Complex64| c64::new(z.re, z.im);

        let coupling = |row: usize, col: usize| -> Complex64 {
            let (r, c) = (row % size, col % size);
            let (n, l) = (degrees[r], degrees[c]);
            let overlap = ie.row(r)[c];
            match (row < size, col < size) {
                (true, true) => overlap * (factors.bessel_i[n] * factors.c(l)),
                (true, false) => overlap * factors.bessel_i[n],
                (false, true) => overlap * (factors.decay * factors.d(l)),
                (false, false) => overlap * g(l, dielectric_ratio),
            }
        };

        let system = Mat::<c64>::from_fn(2 * size, 2 * size, |row, col| {
            let identity = if row == col { 1.0 } else { 0.0 };
            to_c64(Complex64::new(identity, 0.0) - coupling(row, col))
        });
        let sources = Mat::<c64>::from_fn(2 * size, 2 * size, |row, col| {
            if (row < size) != (col < size) {
                return c64::new(0.0, 0.0);
            }
            let (r, c) = (row % size, col % size);
            let overlap = ie.row(r)[c];
            if row < size {
                to_c64(overlap * factors.bessel_i[degrees[r]])
            } else {
                to_c64(overlap)
            }
        });

        let solve_result =
            panic::catch_unwind(AssertUnwindSafe(|| system.partial_piv_lu().solve(&sources)));
        let solution = match solve_result {
            Ok(sol) => sol,
            Err(_) => {
                return Err(PbsamError::LinalgError(
                    "Self-interaction solve panicked. Matrix might be singular.".to_string(),
                ));
            }
        };

        let mut propagator = Vec::with_capacity(4 * size * size);
        for row in 0..2 * size {
            for col in 0..2 * size {
                let value = solution[(row, col)];
                if !value.re.is_finite() || !value.im.is_finite() {
                    return Err(PbsamError::LinalgError(format!(
                        "Self-interaction system is singular (non-finite entry at {row}, {col})"
                    )));
                }
                propagator.push(Complex64::new(value.re, value.im));
            }
        }

        Ok(Self { order, propagator })
    }

    /// Truncation order `p` of the solved system.
    pub fn order(&self) -> usize {
        self.order
    }

    /// New `(H, F)` of the sphere for the given `XH` and `XF`.
    pub fn solve(&self, xh: &Coefficients, xf: &Coefficients) -> (Coefficients, Coefficients) {
        let size = self.order * self.order;
        let input: Vec<Complex64> = xh
            .as_slice()
            .iter()
            .chain(xf.as_slice())
            .copied()
            .collect();
        let output: Vec<Complex64> = self
            .propagator
            .chunks_exact(2 * size)
            .map(|row| row.iter().zip(&input).map(|(a, b)| a * b).sum())
            .collect();
        let (h, f) = output.split_at(size);
        (Coefficients::from_vec(h.to_vec()), Coefficients::from_vec(f.to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::system::{Charge, Molecule};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;

    fn born_ion(radius: f64) -> Molecule {
        Molecule::single_sphere(
            Vector3::zeros(),
            radius,
            vec![Charge { position: Vector3::zeros(), charge: 1.0, radius: 1.0 }],
        )
    }

    #[test]
    fn factors_at_zero_screening() {
        let factors = SphereFactors::new(3.0, 0.0, 4);
        assert_eq!(factors.bessel_i.len(), 5);
        assert!(factors.bessel_i.iter().all(|&v| v == 1.0));
        assert_eq!(factors.decay, 1.0);
        assert_relative_eq!(factors.c(2), 4.0);
        assert_relative_eq!(factors.d(1), -2.0);
    }

    #[test]
    fn born_ion_reaches_analytic_coefficients() {
        let (radius, kappa, eps_in, eps_out) = (3.0, 0.2, 4.0, 80.0);
        let ratio = eps_in / eps_out;
        let order = 4;
        let molecule = born_ion(radius);
        let ie = SurfaceOverlap::compute(&molecule, 0, order, 20 * order * order);
        let factors = SphereFactors::new(radius, kappa, order);
        let local = SelfInteraction::new(&ie, &factors, ratio).unwrap();

        let e = super::super::statics::charge_expansion(&molecule, 0, order, eps_in);
        let zero = Coefficients::zeros(order);
        let xh = compute_xh(&e, &zero, &zero, &zero, &zero, &factors);
        let xf = compute_xf(&e, &zero, &zero, &zero, &zero, &factors, ratio);
        let (h, f) = local.solve(&xh, &xf);

        let screened = 1.0 / (eps_out * (1.0 + kappa * radius));
        assert_relative_eq!(h[(0, 0)].re * factors.decay, screened, max_relative = 1e-10);
        assert_relative_eq!(f[(0, 0)].re, screened - 1.0 / eps_in, max_relative = 1e-10);
        for ((_, value), (_, other)) in h.iter().zip(f.iter()).skip(1) {
            assert!(value.norm() < 1e-12 * h[(0, 0)].norm());
            assert!(other.norm() < 1e-12 * f[(0, 0)].norm());
        }

        let (h2, f2) = apply_update(&ie, &factors, ratio, &h, &f, &xh, &xf);
        for (a, b) in h2.as_slice().iter().zip(h.as_slice()) {
            assert!((a - b).norm() < 1e-9);
        }
        for (a, b) in f2.as_slice().iter().zip(f.as_slice()) {
            assert!((a - b).norm() < 1e-9);
        }
    }

    #[test]
    fn zero_sources_give_zero_coefficients() {
        let order = 3;
        let molecule = born_ion(2.0);
        let ie = SurfaceOverlap::compute(&molecule, 0, order, 180);
        let factors = SphereFactors::new(2.0, 0.1, order);
        let local = SelfInteraction::new(&ie, &factors, 0.05).unwrap();
        let zero = Coefficients::zeros(order);
        let (h, f) = local.solve(&zero, &zero);
        assert!(h.is_zero());
        assert!(f.is_zero());
    }
}
