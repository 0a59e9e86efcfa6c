//! This module evaluates the surface spherical harmonics used by every coefficient array.
//!
//! The harmonics are Schmidt semi-normalized and carry no Condon-Shortley phase:
//! `Y_nm(θ, φ) = Q_n^|m|(cos θ) e^{imφ}` with `Q_n^m = sqrt((n-m)!/(n+m)!) P_n^m`. With this
//! normalization `(1/4π)∫|Y_nm|² dΩ = 1/(2n+1)` and the addition theorem reads
//! `P_n(cos γ) = Σ_m Y_nm(a) conj(Y_nm(b))`, which is what makes the Coulomb kernel expansion
//! `1/|r - r'| = Σ r<^n / r>^{n+1} Y_nm(r̂) conj(Y_nm(r̂'))` hold without extra factors.
//!
//! Evaluation returns an explicit [`HarmonicTable`] per call instead of mutating evaluator
//! state, so one evaluator can be shared freely across threads.

use super::constants::DISTANCE_THRESHOLD;
use nalgebra::Vector3;
use num_complex::Complex64;
use std::f64::consts::PI;

/// Converts a cartesian vector into spherical coordinates `(r, θ, φ)`.
///
/// The angles of a vector shorter than [`DISTANCE_THRESHOLD`] are reported as zero.
pub fn spherical_coordinates(v: &Vector3<f64>) -> (f64, f64, f64) {
    let r = v.norm();
    if r < DISTANCE_THRESHOLD {
        return (r, 0.0, 0.0);
    }
    let theta = (v.z / r).clamp(-1.0, 1.0).acos();
    let phi = v.y.atan2(v.x);
    (r, theta, phi)
}

/// Factor `c_nm` converting a Schmidt harmonic into the orthonormal, Condon-Shortley phased
/// harmonic `𝒴_nm = c_nm Y_nm`.
pub fn orthonormal_factor(n: usize, m: i64) -> f64 {
    let sign = if m > 0 && m % 2 == 1 { -1.0 } else { 1.0 };
    sign * ((2 * n + 1) as f64 / (4.0 * PI)).sqrt()
}

/// An evaluator of spherical harmonics up to a fixed maximum degree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SphericalHarmonics {
    max_degree: usize,
}

impl SphericalHarmonics {
    /// Creates an evaluator producing degrees `0..max_degree`.
    pub fn new(max_degree: usize) -> Self {
        Self { max_degree }
    }

    /// Number of degrees every returned table covers.
    pub fn max_degree(&self) -> usize {
        self.max_degree
    }

    /// Evaluates all harmonics of degree `n < max_degree` at the direction `(θ, φ)`.
    pub fn evaluate(&self, theta: f64, phi: f64) -> HarmonicTable {
        HarmonicTable::new(self.max_degree, theta, phi)
    }

    /// Evaluates the harmonics in the direction of `v`, returning the table and `|v|`.
    pub fn evaluate_direction(&self, v: &Vector3<f64>) -> (f64, HarmonicTable) {
        let (r, theta, phi) = spherical_coordinates(v);
        (r, self.evaluate(theta, phi))
    }
}

/// The harmonics `Y_nm(θ, φ)` of one direction, for every `n < degree` and `|m| ≤ n`.
#[derive(Debug, Clone)]
pub struct HarmonicTable {
    degree: usize,
    theta: f64,
    /// `Q_n^m` for `m ≥ 0`, triangular storage.
    legendre: Vec<f64>,
    /// `e^{imφ}` for `m ≥ 0`.
    phases: Vec<Complex64>,
}

impl HarmonicTable {
    fn new(degree: usize, theta: f64, phi: f64) -> Self {
        let x = theta.cos();
        let sin_theta = theta.sin();
        let mut legendre = vec![0.0; degree * (degree + 1) / 2];

        if degree > 0 {
            legendre[0] = 1.0;
        }
        for m in 1..degree {
            let ratio = ((2 * m - 1) as f64 / (2 * m) as f64).sqrt();
            legendre[tri(m, m)] = legendre[tri(m - 1, m - 1)] * ratio * sin_theta;
        }
        for m in 0..degree {
            if m + 1 < degree {
                legendre[tri(m + 1, m)] = ((2 * m + 1) as f64).sqrt() * x * legendre[tri(m, m)];
            }
            for n in (m + 2)..degree {
                let a = (2 * n - 1) as f64 * x * legendre[tri(n - 1, m)];
                let b = (((n + m - 1) * (n - m - 1)) as f64).sqrt() * legendre[tri(n - 2, m)];
                legendre[tri(n, m)] = (a - b) / (((n + m) * (n - m)) as f64).sqrt();
            }
        }

        let phases = (0..degree)
            .map(|m| Complex64::from_polar(1.0, m as f64 * phi))
            .collect();

        Self {
            degree,
            theta,
            legendre,
            phases,
        }
    }

    /// Number of degrees held by the table.
    pub fn degree(&self) -> usize {
        self.degree
    }

    fn check(&self, n: usize, m: i64) {
        assert!(
            n < self.degree,
            "spherical harmonic degree {n} requested from a table of degree {}",
            self.degree
        );
        assert!(
            m.unsigned_abs() as usize <= n,
            "spherical harmonic order {m} out of range for degree {n}"
        );
    }

    fn q(&self, n: usize, m: usize) -> f64 {
        if m > n { 0.0 } else { self.legendre[tri(n, m)] }
    }

    fn phase(&self, m: i64) -> Complex64 {
        let p = self.phases[m.unsigned_abs() as usize];
        if m < 0 { p.conj() } else { p }
    }

    /// The associated Legendre part `Q_n^|m|(cos θ)`.
    pub fn legendre(&self, n: usize, m: i64) -> f64 {
        self.check(n, m);
        self.q(n, m.unsigned_abs() as usize)
    }

    /// `Y_nm(θ, φ)`.
    pub fn get(&self, n: usize, m: i64) -> Complex64 {
        self.check(n, m);
        self.phase(m) * self.q(n, m.unsigned_abs() as usize)
    }

    /// `∂Y_nm/∂θ`.
    pub fn d_theta(&self, n: usize, m: i64) -> Complex64 {
        self.check(n, m);
        let mu = m.unsigned_abs() as usize;
        let derivative = if mu == 0 {
            -((n * (n + 1)) as f64).sqrt() * self.q(n, 1)
        } else {
            let lower = (((n + mu) * (n - mu + 1)) as f64).sqrt() * self.q(n, mu - 1);
            let upper = (((n - mu) * (n + mu + 1)) as f64).sqrt() * self.q(n, mu + 1);
            0.5 * (lower - upper)
        };
        self.phase(m) * derivative
    }

    /// `(1/sin θ) ∂Y_nm/∂φ`, evaluated through a degree-raising identity so that it stays
    /// finite on the poles. Requires `n + 1 < degree` for `m ≠ 0`.
    pub fn phi_derivative_over_sin(&self, n: usize, m: i64) -> Complex64 {
        self.check(n, m);
        if m == 0 {
            return Complex64::new(0.0, 0.0);
        }
        assert!(
            n + 1 < self.degree,
            "azimuthal derivative of degree {n} needs a table of degree at least {}",
            n + 2
        );
        let mu = m.unsigned_abs() as usize;
        let up = (((n + mu + 1) * (n + mu + 2)) as f64).sqrt() * self.q(n + 1, mu + 1);
        let down = (((n - mu + 1) * (n - mu + 2)) as f64).sqrt() * self.q(n + 1, mu - 1);
        let over_sin = (up + down) / (2 * mu) as f64;
        Complex64::new(0.0, m as f64) * self.phase(m) * over_sin
    }

    /// Polar angle the table was evaluated at.
    pub fn theta(&self) -> f64 {
        self.theta
    }
}

fn tri(n: usize, m: usize) -> usize {
    n * (n + 1) / 2 + m
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn low_degrees_match_closed_forms() {
        let (theta, phi) = (0.7_f64, 1.3_f64);
        let table = SphericalHarmonics::new(4).evaluate(theta, phi);
        let (x, s) = (theta.cos(), theta.sin());

        assert_relative_eq!(table.get(0, 0).re, 1.0);
        assert_relative_eq!(table.get(1, 0).re, x, epsilon = 1e-14);
        assert_relative_eq!(table.legendre(1, 1), s / 2f64.sqrt(), epsilon = 1e-14);
        assert_relative_eq!(table.legendre(2, 0), 0.5 * (3.0 * x * x - 1.0), epsilon = 1e-14);
        assert_relative_eq!(table.legendre(2, 1), 1.5f64.sqrt() * x * s, epsilon = 1e-14);
        assert_relative_eq!(table.legendre(2, 2), 0.375f64.sqrt() * s * s, epsilon = 1e-14);
        assert_relative_eq!(
            table.legendre(3, 0),
            0.5 * (5.0 * x.powi(3) - 3.0 * x),
            epsilon = 1e-14
        );

        let y21 = table.get(2, 1);
        assert_relative_eq!(y21.arg(), phi, epsilon = 1e-14);
        let y2m1 = table.get(2, -1);
        assert_relative_eq!(y2m1.re, y21.re, epsilon = 1e-14);
        assert_relative_eq!(y2m1.im, -y21.im, epsilon = 1e-14);
    }

    #[test]
    fn addition_theorem_recovers_legendre_polynomial() {
        let evaluator = SphericalHarmonics::new(6);
        let a = Vector3::new(0.3, -0.4, 0.8).normalize();
        let b = Vector3::new(-0.5, 0.2, 0.1).normalize();
        let (_, ya) = evaluator.evaluate_direction(&a);
        let (_, yb) = evaluator.evaluate_direction(&b);
        let cos_gamma = a.dot(&b);
        let along = SphericalHarmonics::new(6).evaluate(cos_gamma.acos(), 0.0);

        for n in 0..6 {
            let sum: Complex64 = (-(n as i64)..=n as i64)
                .map(|m| ya.get(n, m) * yb.get(n, m).conj())
                .sum();
            assert_relative_eq!(sum.re, along.legendre(n, 0), epsilon = 1e-12);
            assert!(sum.im.abs() < 1e-12);
        }
    }

    #[test]
    fn theta_derivative_matches_finite_difference() {
        let evaluator = SphericalHarmonics::new(6);
        let (theta, phi, h) = (1.1, 0.4, 1e-6);
        let table = evaluator.evaluate(theta, phi);
        let plus = evaluator.evaluate(theta + h, phi);
        let minus = evaluator.evaluate(theta - h, phi);
        for n in 0..6 {
            for m in -(n as i64)..=n as i64 {
                let fd = (plus.get(n, m) - minus.get(n, m)) / (2.0 * h);
                let exact = table.d_theta(n, m);
                assert!((fd - exact).norm() < 1e-7, "n={n} m={m}");
            }
        }
    }

    #[test]
    fn azimuthal_derivative_is_finite_on_the_axis() {
        let evaluator = SphericalHarmonics::new(5);
        let theta = 0.9_f64;
        let table = evaluator.evaluate(theta, 0.2);
        for n in 0..4 {
            for m in -(n as i64)..=n as i64 {
                let expected = Complex64::new(0.0, m as f64) * table.get(n, m) / theta.sin();
                assert!((table.phi_derivative_over_sin(n, m) - expected).norm() < 1e-12);
            }
        }

        let pole = evaluator.evaluate(0.0, 0.0);
        assert!(pole.phi_derivative_over_sin(1, 1).norm().is_finite());
        assert_relative_eq!(pole.phi_derivative_over_sin(1, 1).im, 1.0 / 2f64.sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn orthonormal_factor_carries_condon_shortley_sign() {
        assert!(orthonormal_factor(1, 1) < 0.0);
        assert!(orthonormal_factor(1, -1) > 0.0);
        assert!(orthonormal_factor(2, 2) > 0.0);
        assert_relative_eq!(orthonormal_factor(0, 0), (1.0 / (4.0 * PI)).sqrt());
    }

    #[test]
    #[should_panic]
    fn degree_beyond_table_panics() {
        SphericalHarmonics::new(3).evaluate(0.1, 0.2).get(3, 0);
    }
}
