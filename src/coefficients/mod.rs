//! This module holds the per-sphere spherical-harmonic coefficient arrays and the matrix kinds
//! built from them.
//!
//! Every array of one solve shares the truncation order `p`: degrees `n ∈ [0, p)` and orders
//! `m ∈ [-n, n]`, stored densely at index `n² + n + m`. Arrays are grouped per molecule in a
//! [`CoefficientArena`] addressed by [`SphereId`].
//!
//! - [`statics`]: `E`, `LE` and the surface overlap tensor `IE`, computed once from geometry.
//! - [`coupling`]: `LF`, `LH` and `LHN`, re-expanded from the other spheres every sweep.
//! - [`local`]: `XH`, `XF` and the sphere-local update of `H` and `F`.

pub mod coupling;
pub mod local;
pub mod statics;

use crate::math::bessel::BesselCalculator;
use crate::math::spherical::SphericalHarmonics;
use crate::system::{SphereId, System};
use nalgebra::Vector3;
use num_complex::Complex64;
use std::ops::{AddAssign, Index, IndexMut};

/// Dense index of mode `(n, m)`.
#[inline]
pub fn mode_index(n: usize, m: i64) -> usize {
    debug_assert!(m.unsigned_abs() as usize <= n);
    ((n * n + n) as i64 + m) as usize
}

/// Iterates over every `(n, m)` of an expansion of order `order`, in storage order.
pub fn modes(order: usize) -> impl Iterator<Item = (usize, i64)> {
    (0..order).flat_map(|n| (-(n as i64)..=n as i64).map(move |m| (n, m)))
}

/// Spherical-harmonic coefficients of one sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct Coefficients {
    order: usize,
    values: Vec<Complex64>,
}

impl Coefficients {
    /// An all-zero array of truncation order `order`, holding `order²` coefficients.
    pub fn zeros(order: usize) -> Self {
        Self {
            order,
            values: vec![Complex64::new(0.0, 0.0); order * order],
        }
    }

    /// Builds an array from a function of `(n, m)`.
    pub fn from_fn(order: usize, mut f: impl FnMut(usize, i64) -> Complex64) -> Self {
        Self {
            order,
            values: modes(order).map(|(n, m)| f(n, m)).collect(),
        }
    }

    /// Wraps values stored in `(n, m)` order. Panics if the length is not a square.
    pub fn from_vec(values: Vec<Complex64>) -> Self {
        let order = (values.len() as f64).sqrt().round() as usize;
        assert_eq!(order * order, values.len(), "coefficient count must be a square");
        Self { order, values }
    }

    /// Truncation order `p`.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of stored coefficients, `p²`.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Coefficients in storage order, `(n, m)` at index `n² + n + m`.
    pub fn as_slice(&self) -> &[Complex64] {
        &self.values
    }

    /// Mutable coefficients in storage order.
    pub fn as_mut_slice(&mut self) -> &mut [Complex64] {
        &mut self.values
    }

    /// Iterates over `((n, m), value)` in storage order.
    pub fn iter(&self) -> impl Iterator<Item = ((usize, i64), Complex64)> + '_ {
        modes(self.order).zip(self.values.iter().copied())
    }

    /// Sets every coefficient to zero, keeping the order.
    pub fn fill_zero(&mut self) {
        self.values.fill(Complex64::new(0.0, 0.0));
    }

    /// Whether every coefficient is exactly zero.
    pub fn is_zero(&self) -> bool {
        self.values.iter().all(|v| v.re == 0.0 && v.im == 0.0)
    }

    /// Sum of the moduli of all coefficients.
    pub fn l1_norm(&self) -> f64 {
        self.values.iter().map(|v| v.norm()).sum()
    }

    /// Largest coefficient modulus.
    pub fn max_norm(&self) -> f64 {
        self.values.iter().map(|v| v.norm()).fold(0.0, f64::max)
    }

    /// `self · factor`.
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            order: self.order,
            values: self.values.iter().map(|v| *v * factor).collect(),
        }
    }

    /// Evaluates a local (regular) expansion `Σ L_nm î_n(κr)(r/a)^n Y_nm(r̂)` at `r`, relative to
    /// the expansion center.
    ///
    /// # Arguments
    ///
    /// * `r` - Evaluation point relative to the expansion center.
    /// * `radius` - Radius `a` of the sphere the expansion is scaled to.
    /// * `kappa` - Inverse Debye length; zero for the Coulomb kernel.
    pub fn evaluate_local(&self, r: &Vector3<f64>, radius: f64, kappa: f64) -> Complex64 {
        let (dist, table) = SphericalHarmonics::new(self.order).evaluate_direction(r);
        let bessel_i = BesselCalculator::new(self.order).modified_i(self.order, kappa * dist);
        let ratio = dist / radius;
        self.iter()
            .map(|((n, m), c)| c * table.get(n, m) * bessel_i[n] * ratio.powi(n as i32))
            .sum()
    }

    /// Evaluates a multipole (irregular) expansion
    /// `Σ M_nm e^{-κr} k̂_n(κr) a^n / r^{n+1} Y_nm(r̂)` at `r`, relative to the expansion center.
    ///
    /// Same arguments as [`Coefficients::evaluate_local`]; `r` must lie outside the sphere for
    /// the series to converge.
    pub fn evaluate_multipole(&self, r: &Vector3<f64>, radius: f64, kappa: f64) -> Complex64 {
        let (dist, table) = SphericalHarmonics::new(self.order).evaluate_direction(r);
        let bessel_k = BesselCalculator::new(self.order).modified_k(self.order, kappa * dist);
        let decay = (-kappa * dist).exp() / dist;
        let ratio = radius / dist;
        self.iter()
            .map(|((n, m), c)| c * table.get(n, m) * bessel_k[n] * decay * ratio.powi(n as i32))
            .sum()
    }
}

impl Index<(usize, i64)> for Coefficients {
    type Output = Complex64;

    fn index(&self, (n, m): (usize, i64)) -> &Complex64 {
        assert!(n < self.order, "degree {n} exceeds truncation order {}", self.order);
        &self.values[mode_index(n, m)]
    }
}

impl IndexMut<(usize, i64)> for Coefficients {
    fn index_mut(&mut self, (n, m): (usize, i64)) -> &mut Complex64 {
        assert!(n < self.order, "degree {n} exceeds truncation order {}", self.order);
        &mut self.values[mode_index(n, m)]
    }
}

impl AddAssign<&Coefficients> for Coefficients {
    fn add_assign(&mut self, other: &Coefficients) {
        assert_eq!(self.order, other.order, "truncation orders differ");
        for (a, b) in self.values.iter_mut().zip(&other.values) {
            *a += *b;
        }
    }
}

/// Relative change between two iterates of one sphere:
/// `Σ|c - p| / (0.5 Σ(|c| + |p|))`, or zero when both arrays vanish.
pub fn relative_change(current: &Coefficients, previous: &Coefficients) -> f64 {
    let (numerator, denominator) = current
        .values
        .iter()
        .zip(&previous.values)
        .fold((0.0, 0.0), |(num, den), (c, p)| {
            (num + (c - p).norm(), den + c.norm() + p.norm())
        });
    if denominator == 0.0 {
        0.0
    } else {
        numerator / (0.5 * denominator)
    }
}

/// Coefficient arrays for every sphere of every molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct CoefficientArena {
    molecules: Vec<Vec<Coefficients>>,
}

impl CoefficientArena {
    /// An all-zero arena shaped after `system`.
    pub fn zeros(system: &System, order: usize) -> Self {
        Self {
            molecules: system
                .molecules()
                .iter()
                .map(|mol| vec![Coefficients::zeros(order); mol.sphere_count()])
                .collect(),
        }
    }

    /// Wraps per-molecule arrays, indexed by molecule then sphere.
    pub fn from_molecules(molecules: Vec<Vec<Coefficients>>) -> Self {
        Self { molecules }
    }

    /// Array of one sphere. Panics for unknown spheres.
    pub fn get(&self, id: SphereId) -> &Coefficients {
        &self.molecules[id.molecule][id.sphere]
    }

    /// Mutable array of one sphere. Panics for unknown spheres.
    pub fn get_mut(&mut self, id: SphereId) -> &mut Coefficients {
        &mut self.molecules[id.molecule][id.sphere]
    }

    /// Arrays of molecule `i`, indexed by sphere.
    pub fn molecule(&self, i: usize) -> &[Coefficients] {
        &self.molecules[i]
    }

    /// Mutable arrays of molecule `i`, indexed by sphere.
    pub fn molecule_mut(&mut self, i: usize) -> &mut [Coefficients] {
        &mut self.molecules[i]
    }

    /// Arrays of every molecule.
    pub fn molecules(&self) -> &[Vec<Coefficients>] {
        &self.molecules
    }

    /// Mutable arrays of every molecule. A molecule's array list may be replaced whole.
    pub fn molecules_mut(&mut self) -> &mut [Vec<Coefficients>] {
        &mut self.molecules
    }

    /// Number of molecules.
    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    /// Zeroes every array, keeping the shape.
    pub fn fill_zero(&mut self) {
        self.molecules
            .iter_mut()
            .flatten()
            .for_each(Coefficients::fill_zero);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn modes_follow_storage_order() {
        for (i, (n, m)) in modes(5).enumerate() {
            assert_eq!(mode_index(n, m), i);
        }
        assert_eq!(modes(5).count(), 25);
    }

    #[test]
    fn indexing_by_degree_and_order() {
        let mut c = Coefficients::zeros(3);
        c[(2, -1)] = Complex64::new(1.0, 2.0);
        assert_eq!(c.as_slice()[5], Complex64::new(1.0, 2.0));
        assert_eq!(c.l1_norm(), 5f64.sqrt());
        assert!(!c.is_zero());
        c.fill_zero();
        assert!(c.is_zero());
    }

    #[test]
    fn relative_change_of_zero_arrays_is_zero() {
        let a = Coefficients::zeros(4);
        assert_eq!(relative_change(&a, &a), 0.0);

        let b = Coefficients::from_fn(4, |n, _| Complex64::new(n as f64 + 1.0, 0.0));
        assert_relative_eq!(relative_change(&b, &a), 2.0);
        assert_eq!(relative_change(&b, &b), 0.0);
    }

    #[test]
    fn monopole_field_evaluation() {
        let mut c = Coefficients::zeros(2);
        c[(0, 0)] = Complex64::new(3.0, 0.0);
        let r = Vector3::new(0.0, 4.0, 0.0);
        assert_relative_eq!(c.evaluate_multipole(&r, 2.0, 0.0).re, 0.75, epsilon = 1e-14);
        assert_relative_eq!(c.evaluate_local(&r, 2.0, 0.0).re, 3.0, epsilon = 1e-14);

        let screened = c.evaluate_multipole(&r, 2.0, 0.5).re;
        assert_relative_eq!(screened, 3.0 * (-2.0f64).exp() / 4.0, epsilon = 1e-14);
    }
}
