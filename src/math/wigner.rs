//! Wigner 3j symbols and Gaunt coefficients for the translation operators.
//!
//! The 3j symbols are computed directly from the Racah formula with a cached table of
//! factorials, which is exact to rounding for the degrees a truncated expansion reaches.

use super::constants::MAX_FACTORIAL_ARGUMENT;
use std::f64::consts::PI;
use std::sync::OnceLock;

static FACTORIALS: OnceLock<Vec<f64>> = OnceLock::new();

/// `n!` as a double, for `n ≤ 170`.
pub fn factorial(n: usize) -> f64 {
    let table = FACTORIALS.get_or_init(|| {
        let mut values = Vec::with_capacity(MAX_FACTORIAL_ARGUMENT + 1);
        values.push(1.0);
        for k in 1..=MAX_FACTORIAL_ARGUMENT {
            values.push(values[k - 1] * k as f64);
        }
        values
    });
    assert!(
        n <= MAX_FACTORIAL_ARGUMENT,
        "factorial argument {n} overflows double precision"
    );
    table[n]
}

/// `(2n - 1)!!`, with the convention `(-1)!! = 1`.
pub fn odd_double_factorial(n: usize) -> f64 {
    (1..n).fold(1.0, |acc, k| acc * (2 * k + 1) as f64)
}

/// The Wigner 3j symbol `(j1 j2 j3; m1 m2 m3)` for integer angular momenta.
pub fn wigner_3j(j1: i64, j2: i64, j3: i64, m1: i64, m2: i64, m3: i64) -> f64 {
    if m1 + m2 + m3 != 0 {
        return 0.0;
    }
    if j3 < (j1 - j2).abs() || j3 > j1 + j2 {
        return 0.0;
    }
    if m1.abs() > j1 || m2.abs() > j2 || m3.abs() > j3 {
        return 0.0;
    }

    let f = |x: i64| factorial(x as usize);
    let triangle = f(j1 + j2 - j3) * f(j1 - j2 + j3) * f(-j1 + j2 + j3) / f(j1 + j2 + j3 + 1);
    let norm = (triangle
        * f(j1 + m1)
        * f(j1 - m1)
        * f(j2 + m2)
        * f(j2 - m2)
        * f(j3 + m3)
        * f(j3 - m3))
        .sqrt();

    let k_min = 0_i64.max(j2 - j3 - m1).max(j1 - j3 + m2);
    let k_max = (j1 + j2 - j3).min(j1 - m1).min(j2 + m2);
    let mut sum = 0.0;
    for k in k_min..=k_max {
        let denominator = f(k)
            * f(j1 + j2 - j3 - k)
            * f(j1 - m1 - k)
            * f(j2 + m2 - k)
            * f(j3 - j2 + m1 + k)
            * f(j3 - j1 - m2 + k);
        sum += parity(k) / denominator;
    }

    parity(j1 - j2 - m3) * norm * sum
}

/// The Gaunt coefficient `∫ 𝒴_{l1 m1} 𝒴_{l2 m2} 𝒴_{l3 m3} dΩ` of three orthonormal,
/// Condon-Shortley phased harmonics.
pub fn gaunt(l1: i64, m1: i64, l2: i64, m2: i64, l3: i64, m3: i64) -> f64 {
    if (l1 + l2 + l3) % 2 != 0 {
        return 0.0;
    }
    let zero = wigner_3j(l1, l2, l3, 0, 0, 0);
    if zero == 0.0 {
        return 0.0;
    }
    let degeneracy = ((2 * l1 + 1) * (2 * l2 + 1) * (2 * l3 + 1)) as f64;
    (degeneracy / (4.0 * PI)).sqrt() * zero * wigner_3j(l1, l2, l3, m1, m2, m3)
}

/// `(-1)^k`.
pub fn parity(k: i64) -> f64 {
    if k.rem_euclid(2) == 0 { 1.0 } else { -1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn known_symbols() {
        assert_relative_eq!(wigner_3j(1, 1, 0, 0, 0, 0), -1.0 / 3f64.sqrt(), epsilon = 1e-14);
        assert_relative_eq!(wigner_3j(0, 1, 1, 0, 0, 0), -1.0 / 3f64.sqrt(), epsilon = 1e-14);
        assert_relative_eq!(wigner_3j(1, 1, 2, 0, 0, 0), (2.0 / 15.0f64).sqrt(), epsilon = 1e-14);
        assert_relative_eq!(wigner_3j(2, 2, 2, 0, 0, 0), -(2.0 / 35.0f64).sqrt(), epsilon = 1e-14);
        assert_relative_eq!(wigner_3j(1, 1, 1, 1, -1, 0), 1.0 / 6f64.sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn selection_rules_vanish() {
        assert_eq!(wigner_3j(1, 1, 3, 0, 0, 0), 0.0);
        assert_eq!(wigner_3j(2, 1, 1, 1, 1, 0), 0.0);
        assert_eq!(gaunt(1, 0, 1, 0, 1, 0), 0.0);
    }

    #[test]
    fn symbols_are_orthonormal() {
        let (j1, j2) = (3, 2);
        for j3 in 1..=5 {
            let mut total = 0.0;
            for m1 in -j1..=j1 {
                for m2 in -j2..=j2 {
                    let w = wigner_3j(j1, j2, j3, m1, m2, -m1 - m2);
                    total += w * w;
                }
            }
            assert_relative_eq!(total, 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn gaunt_of_monopoles() {
        assert_relative_eq!(gaunt(0, 0, 0, 0, 0, 0), 1.0 / (4.0 * PI).sqrt(), epsilon = 1e-14);
        // ∫ 𝒴_00 𝒴_1m 𝒴_1,-m = (-1)^m / sqrt(4π)
        assert_relative_eq!(gaunt(0, 0, 1, 1, 1, -1), -1.0 / (4.0 * PI).sqrt(), epsilon = 1e-14);
    }

    #[test]
    fn double_factorials() {
        assert_eq!(odd_double_factorial(0), 1.0);
        assert_eq!(odd_double_factorial(1), 1.0);
        assert_eq!(odd_double_factorial(3), 15.0);
        assert_eq!(factorial(5), 120.0);
    }
}
