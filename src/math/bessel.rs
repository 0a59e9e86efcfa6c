//! This module evaluates the scaled modified spherical Bessel functions of the screened kernel.
//!
//! The scaling removes the factorial growth and the exponential factors so that both families
//! stay O(1) over the degrees and arguments a solve needs:
//!
//! - `î_n(z) = (2n+1)!! i_n(z) / z^n`, with `î_n(0) = 1`;
//! - `k̂_n(z) = e^{z} z^{n+1} k_n(z) / (2n-1)!!` (up to the constant of `k_n`), with `k̂_n(0) = 1`.
//!
//! `î_n` is summed from its power series, whose terms are all positive. `k̂_n` is a polynomial
//! in `z` and follows the upward recurrence `k̂_{n+1} = k̂_n + z² k̂_{n-1}/((2n+1)(2n-1))`,
//! which is stable in that direction.

use super::constants::BESSEL_SERIES_MAX_TERMS;

/// Evaluator of the scaled modified spherical Bessel functions up to a maximum order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BesselCalculator {
    max_order: usize,
}

impl BesselCalculator {
    /// Creates an evaluator that serves up to `max_order` functions per call.
    pub fn new(max_order: usize) -> Self {
        Self { max_order }
    }

    /// Largest number of functions one call may request.
    pub fn max_order(&self) -> usize {
        self.max_order
    }

    /// Returns `[î_0(z), ..., î_{count-1}(z)]`.
    pub fn modified_i(&self, count: usize, z: f64) -> Vec<f64> {
        self.check(count);
        (0..count).map(|n| scaled_i(n, z)).collect()
    }

    /// Returns `[k̂_0(z), ..., k̂_{count-1}(z)]`.
    pub fn modified_k(&self, count: usize, z: f64) -> Vec<f64> {
        self.check(count);
        let mut values = Vec::with_capacity(count);
        if count > 0 {
            values.push(1.0);
        }
        if count > 1 {
            values.push(1.0 + z);
        }
        for n in 1..count.saturating_sub(1) {
            let next = values[n] + z * z * values[n - 1] / ((2 * n + 1) * (2 * n - 1)) as f64;
            values.push(next);
        }
        values
    }

    fn check(&self, count: usize) {
        assert!(
            count <= self.max_order,
            "requested {count} Bessel orders from an evaluator limited to {}",
            self.max_order
        );
    }
}

fn scaled_i(n: usize, z: f64) -> f64 {
    let half_z2 = 0.5 * z * z;
    let mut term = 1.0;
    let mut sum = 1.0;
    for k in 1..BESSEL_SERIES_MAX_TERMS {
        term *= half_z2 / (k * (2 * n + 2 * k + 1)) as f64;
        sum += term;
        if term <= f64::EPSILON * 1e-2 * sum {
            break;
        }
    }
    sum
}
