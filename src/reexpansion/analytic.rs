//! Closed-form translation operators built from Gaunt coefficients.
//!
//! A multipole field about a source sphere `l` (radius `a_l`),
//! `Σ X_ls e^{-κρ} k̂_l(κρ) a_l^l / ρ^{l+1} Y_ls(ρ̂)`, is re-expanded about a target center
//! `k` (radius `a_k`) as `Σ L_nm î_n(κr) (r/a_k)^n Y_nm(r̂)`, exactly up to truncation, by
//!
//! ```text
//! T(nm; ls) = 4π (-1)^l c_nm / (c_ls (2l-1)!! (2n+1)!!)
//!             Σ_ν (2ν-1)!! (a_l/t)^l (a_k/t)^n (κt)^{n+l-ν} e^{-κt} k̂_ν(κt) / t
//!                 c_{ν,m-s} conj(Y_{ν,m-s}(t̂)) Γ(nm; ls; ν)
//! ```
//!
//! where `t` points from the target center to the source center, `c_nm` converts Schmidt
//! harmonics to orthonormal ones and `Γ = ∫ conj(𝒴_nm) 𝒴_ls 𝒴_{ν,m-s}`. For κ = 0 only
//! `ν = n + l` survives and the operator is the Laplace multipole-to-local translation.
//!
//! Everything but the powers of the radius ratios, the powers of `κt` and the `(ν, m-s)`
//! functions of `t` depends on the truncation order alone. Those factors live in one
//! [`TranslationCoefficients`] table per order, shared by every pair, and a pair only keeps
//! its `O(p²)` geometric factors. Operators are applied term by term from the two.

use super::gradient::{GradientCoefficients, GradientFrame};
use crate::coefficients::{Coefficients, mode_index, modes};
use crate::math::bessel::BesselCalculator;
use crate::math::constants::DISTANCE_THRESHOLD;
use crate::math::spherical::{
    HarmonicTable, SphericalHarmonics, orthonormal_factor, spherical_coordinates,
};
use crate::math::wigner::{gaunt, odd_double_factorial, parity};
use log::debug;
use nalgebra::Vector3;
use num_complex::Complex64;
use std::collections::HashMap;
use std::f64::consts::PI;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

static COEFFICIENT_TABLES: OnceLock<Mutex<HashMap<usize, Arc<TranslationCoefficients>>>> =
    OnceLock::new();

/// Which function of the translation vector an operator holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Component {
    Value,
    /// `∂/∂t`
    Radial,
    /// `(1/t) ∂/∂θ`
    Polar,
    /// `(1/(t sin θ)) ∂/∂φ`
    Azimuthal,
}

/// One non-vanishing `(nm; ls; ν)` term of the multipole-to-local operator.
#[derive(Debug, Clone, Copy, PartialEq)]
struct CouplingTerm {
    /// Mode index of `(n, m)`.
    target: u32,
    /// Mode index of `(l, s)`.
    source: u32,
    /// Mode index of `(ν, m - s)`.
    angular: u32,
    /// `n + l - ν`.
    screening_power: u32,
    weight: f64,
}

/// Geometry-independent part of the multipole-to-local operator of one truncation order.
///
/// Holds, for every non-vanishing Gaunt coefficient, the weight
/// `4π (-1)^{l+m} c_nm (2ν-1)!! c_{ν,m-s} Γ(nm; ls; ν) / (c_ls (2l-1)!! (2n+1)!!)`.
#[derive(Debug, PartialEq)]
pub struct TranslationCoefficients {
    order: usize,
    /// Sorted by target mode.
    terms: Vec<CouplingTerm>,
}

impl TranslationCoefficients {
    /// Evaluates the table of order `order`.
    pub fn new(order: usize) -> Self {
        let mut terms = Vec::new();
        for (n, m) in modes(order) {
            let target_part = orthonormal_factor(n, m) / odd_double_factorial(n + 1);
            for (l, s) in modes(order) {
                let mu = m - s;
                let prefactor = 4.0 * PI * parity(l as i64) * parity(m) * target_part
                    / (orthonormal_factor(l, s) * odd_double_factorial(l));
                let mut nu = n.abs_diff(l);
                while nu <= n + l {
                    if mu.unsigned_abs() as usize <= nu {
                        let coupling = gaunt(n as i64, -m, l as i64, s, nu as i64, mu);
                        if coupling != 0.0 {
                            terms.push(CouplingTerm {
                                target: mode_index(n, m) as u32,
                                source: mode_index(l, s) as u32,
                                angular: mode_index(nu, mu) as u32,
                                screening_power: (n + l - nu) as u32,
                                weight: prefactor
                                    * odd_double_factorial(nu)
                                    * orthonormal_factor(nu, mu)
                                    * coupling,
                            });
                        }
                    }
                    nu += 2;
                }
            }
        }
        Self { order, terms }
    }

    /// The table of order `order`, evaluated on first use and shared afterwards.
    pub fn shared(order: usize) -> Arc<Self> {
        let tables = COEFFICIENT_TABLES.get_or_init(Default::default);
        let mut tables = tables.lock().unwrap_or_else(PoisonError::into_inner);
        tables
            .entry(order)
            .or_insert_with(|| {
                let table = Self::new(order);
                debug!("Translation coefficients for p = {order}: {} terms", table.len());
                Arc::new(table)
            })
            .clone()
    }

    /// Truncation order `p` of the table.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of stored terms.
    pub fn len(&self) -> usize {
        self.terms.len()
    }

    /// Whether the table holds no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    fn apply(&self, radial: &RadialFactors, angular: &[Complex64], x: &Coefficients) -> Coefficients {
        assert_eq!(x.order(), self.order, "truncation orders differ");
        let scaled: Vec<Complex64> = x.iter().map(|((l, _), v)| v * radial.source[l]).collect();
        let mut output = vec![Complex64::new(0.0, 0.0); self.order * self.order];
        for term in &self.terms {
            let factor = term.weight * radial.screening[term.screening_power as usize];
            output[term.target as usize] +=
                angular[term.angular as usize] * scaled[term.source as usize] * factor;
        }
        for ((n, _), value) in modes(self.order).zip(output.iter_mut()) {
            *value *= radial.target[n];
        }
        Coefficients::from_vec(output)
    }

    fn get(&self, radial: &RadialFactors, angular: &[Complex64], row: usize, col: usize) -> Complex64 {
        let (n, l) = (degree_of(row), degree_of(col));
        self.terms
            .iter()
            .filter(|term| term.target as usize == row && term.source as usize == col)
            .map(|term| {
                angular[term.angular as usize]
                    * (term.weight * radial.screening[term.screening_power as usize])
            })
            .sum::<Complex64>()
            * (radial.target[n] * radial.source[l])
    }
}

fn degree_of(index: usize) -> usize {
    (index as f64).sqrt().floor() as usize
}

/// Powers of `a_k/t`, `a_l/t` and `κt` of one pair.
#[derive(Debug, Clone, PartialEq)]
struct RadialFactors {
    target: Vec<f64>,
    source: Vec<f64>,
    /// `(κt)^j` for `j < 2p`.
    screening: Vec<f64>,
}

/// The multipole-to-local operator of one sphere pair.
#[derive(Debug, Clone, PartialEq)]
pub struct TranslationBlock {
    coefficients: Arc<TranslationCoefficients>,
    radial: RadialFactors,
    /// `e^{-κt} k̂_ν(κt) conj(Y_νμ(t̂)) / t` by mode index of `(ν, μ)`.
    angular: Vec<Complex64>,
}

impl TranslationBlock {
    /// The multipole-to-local operator for a source centered at `translation` relative to the
    /// target center.
    ///
    /// # Arguments
    ///
    /// * `translation` - Source center minus target center, in angstroms.
    /// * `source_radius` - Radius `a_l` of the source sphere.
    /// * `target_radius` - Radius `a_k` of the target sphere.
    /// * `kappa` - Inverse Debye length; zero gives the Coulomb kernel.
    /// * `order` - Truncation order `p`.
    pub fn new(
        translation: &Vector3<f64>,
        source_radius: f64,
        target_radius: f64,
        kappa: f64,
        order: usize,
    ) -> Self {
        let geometry = PairGeometry::new(translation, source_radius, target_radius, kappa, order);
        Self {
            coefficients: TranslationCoefficients::shared(order),
            angular: geometry.angular(Component::Value),
            radial: geometry.radial,
        }
    }

    /// Truncation order `p` of the operator.
    pub fn order(&self) -> usize {
        self.coefficients.order()
    }

    /// Coefficient coupling source mode `(l,s)` into target mode `(n,m)`.
    pub fn get(&self, n: usize, m: i64, l: usize, s: i64) -> Complex64 {
        self.coefficients
            .get(&self.radial, &self.angular, mode_index(n, m), mode_index(l, s))
    }

    /// Applies the operator to a source array.
    pub fn apply(&self, x: &Coefficients) -> Coefficients {
        self.coefficients.apply(&self.radial, &self.angular, x)
    }
}

/// Gradient of a [`TranslationBlock`] with respect to the source position, in the spherical
/// basis of the translation vector.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientBlock {
    coefficients: Arc<TranslationCoefficients>,
    theta: f64,
    phi: f64,
    radial: RadialFactors,
    angular: [Vec<Complex64>; 3],
}

impl GradientBlock {
    /// Same arguments as [`TranslationBlock::new`].
    pub fn new(
        translation: &Vector3<f64>,
        source_radius: f64,
        target_radius: f64,
        kappa: f64,
        order: usize,
    ) -> Self {
        let geometry = PairGeometry::new(translation, source_radius, target_radius, kappa, order);
        Self {
            coefficients: TranslationCoefficients::shared(order),
            theta: geometry.theta,
            phi: geometry.phi,
            angular: [
                geometry.angular(Component::Radial),
                geometry.angular(Component::Polar),
                geometry.angular(Component::Azimuthal),
            ],
            radial: geometry.radial,
        }
    }

    /// `∇_t (T x)` with components `(∂_t, (1/t)∂_θ, (1/(t sin θ))∂_φ)`.
    pub fn apply(&self, x: &Coefficients) -> GradientCoefficients {
        let [radial, polar, azimuthal] = &self.angular;
        GradientCoefficients {
            frame: GradientFrame::Spherical {
                theta: self.theta,
                phi: self.phi,
            },
            components: [
                self.coefficients.apply(&self.radial, radial, x),
                self.coefficients.apply(&self.radial, polar, x),
                self.coefficients.apply(&self.radial, azimuthal, x),
            ],
        }
    }
}

/// The local-to-local operator moving a regular expansion `Σ L_nm î_n(κr)(r/a)^n Y_nm` from one
/// center to another.
///
/// For κ = 0 the regular basis functions are polynomials and the translation is exact within
/// the truncation order; with screening, higher degrees generated by the shift are dropped.
#[derive(Debug, Clone, PartialEq)]
pub struct RegularTranslation {
    order: usize,
    /// Row `(l,s)` of the new expansion, column `(n,m)` of the old one.
    values: Vec<Complex64>,
}

impl RegularTranslation {
    /// Operator moving an expansion about a center of radius `from_radius` to a center at
    /// `displacement` from it, of radius `to_radius`.
    pub fn new(
        displacement: &Vector3<f64>,
        from_radius: f64,
        to_radius: f64,
        kappa: f64,
        order: usize,
    ) -> Self {
        let size = order * order;
        let mut values = vec![Complex64::new(0.0, 0.0); size * size];
        let (d, theta, phi) = spherical_coordinates(displacement);

        if d < DISTANCE_THRESHOLD {
            let scale = to_radius / from_radius;
            for (n, m) in modes(order) {
                let i = mode_index(n, m);
                values[i * size + i] = Complex64::new(scale.powi(n as i32), 0.0);
            }
            return Self { order, values };
        }

        let degree = (2 * order).max(1);
        let table = SphericalHarmonics::new(degree).evaluate(theta, phi);
        let bessel_i = BesselCalculator::new(degree).modified_i(degree, kappa * d);
        let kd = kappa * d;

        for (n, m) in modes(order) {
            let outer = (d / from_radius).powi(n as i32) / orthonormal_factor(n, m);
            for (l, s) in modes(order) {
                let mu = m - s;
                let prefactor = 4.0 * PI * odd_double_factorial(n + 1) / odd_double_factorial(l + 1)
                    * outer
                    * (to_radius / d).powi(l as i32)
                    * orthonormal_factor(l, s)
                    * parity(m);
                let mut sum = Complex64::new(0.0, 0.0);
                let mut nu = n.abs_diff(l);
                while nu <= n + l {
                    if mu.unsigned_abs() as usize <= nu {
                        let coupling =
                            gaunt(l as i64, -s, nu as i64, -mu, n as i64, m);
                        if coupling != 0.0 {
                            let radial = kd.powi((l + nu - n) as i32) * bessel_i[nu]
                                / odd_double_factorial(nu + 1);
                            sum += table.get(nu, mu)
                                * (radial * orthonormal_factor(nu, mu) * coupling);
                        }
                    }
                    nu += 2;
                }
                values[mode_index(l, s) * size + mode_index(n, m)] = sum * prefactor;
            }
        }
        Self { order, values }
    }

    /// Moves the regular expansion `x` to the new center.
    pub fn apply(&self, x: &Coefficients) -> Coefficients {
        apply_dense(&self.values, self.order, x)
    }
}

/// Geometric factors of one pair, from which operators and their gradients are assembled.
struct PairGeometry {
    order: usize,
    distance: f64,
    theta: f64,
    phi: f64,
    radial: RadialFactors,
    table: HarmonicTable,
    /// `e^{-κt} k̂_ν(κt)` for `ν < 2p`.
    decayed_k: Vec<f64>,
}

impl PairGeometry {
    fn new(
        translation: &Vector3<f64>,
        source_radius: f64,
        target_radius: f64,
        kappa: f64,
        order: usize,
    ) -> Self {
        let (distance, theta, phi) = spherical_coordinates(translation);
        assert!(
            distance > DISTANCE_THRESHOLD,
            "cannot translate between coincident centers"
        );
        let degree = (2 * order).max(1);
        let table = SphericalHarmonics::new(degree).evaluate(theta, phi);
        let kt = kappa * distance;
        let decay = (-kt).exp();
        let decayed_k = BesselCalculator::new(degree)
            .modified_k(degree, kt)
            .into_iter()
            .map(|k| k * decay)
            .collect();
        let powers = |base: f64, count: usize| -> Vec<f64> {
            (0..count).map(|j| base.powi(j as i32)).collect()
        };
        Self {
            order,
            distance,
            theta,
            phi,
            radial: RadialFactors {
                target: powers(target_radius / distance, order),
                source: powers(source_radius / distance, order),
                screening: powers(kt, degree),
            },
            table,
            decayed_k,
        }
    }

    /// The `(ν, μ)` factor of `component`, for `ν ≤ 2p - 2`.
    fn term(&self, component: Component, nu: usize, mu: i64) -> Complex64 {
        let t = self.distance;
        match component {
            Component::Value => self.table.get(nu, mu).conj() * (self.decayed_k[nu] / t),
            Component::Radial => {
                let dk = nu as f64 * self.decayed_k[nu]
                    - (2 * nu + 1) as f64 * self.decayed_k[nu + 1];
                self.table.get(nu, mu).conj() * (dk / (t * t))
            }
            Component::Polar => self.table.d_theta(nu, mu).conj() * (self.decayed_k[nu] / (t * t)),
            Component::Azimuthal => {
                self.table.phi_derivative_over_sin(nu, mu).conj() * (self.decayed_k[nu] / (t * t))
            }
        }
    }

    /// Factors of `component` by mode index of `(ν, μ)`.
    fn angular(&self, component: Component) -> Vec<Complex64> {
        let degrees = (2 * self.order).saturating_sub(1);
        modes(degrees)
            .map(|(nu, mu)| self.term(component, nu, mu))
            .collect()
    }
}

fn apply_dense(values: &[Complex64], order: usize, x: &Coefficients) -> Coefficients {
    assert_eq!(x.order(), order, "truncation orders differ");
    let size = order * order;
    let input = x.as_slice();
    let output = (0..size)
        .map(|row| {
            values[row * size..(row + 1) * size]
                .iter()
                .zip(input)
                .map(|(a, b)| a * b)
                .sum()
        })
        .collect();
    Coefficients::from_vec(output)
}
