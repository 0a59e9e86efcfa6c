//! Geometry-only matrices: the charge expansions `E` and `LE` and the surface overlap
//! tensor `IE`. They depend on nothing but the rigid molecule and the interior permittivity,
//! so a solver builds them once and keeps them across resets and translations.

use super::{Coefficients, mode_index};
use crate::math::constants::DISTANCE_THRESHOLD;
use crate::math::grid::spiral_grid;
use crate::math::spherical::SphericalHarmonics;
use crate::system::Molecule;
use num_complex::Complex64;

/// Expansion `E` of the charges sphere `k` owns:
/// `E_k(n,m) = Σ_α conj(Y_nm(θ_α, φ_α)) (q_α/ε_in) (r_α/a_k)^n`.
///
/// A sphere without charges yields an all-zero array.
pub fn charge_expansion(
    molecule: &Molecule,
    k: usize,
    order: usize,
    dielectric_interior: f64,
) -> Coefficients {
    let harmonics = SphericalHarmonics::new(order);
    let sphere = &molecule.spheres()[k];
    let mut expansion = Coefficients::zeros(order);

    for &alpha in &sphere.charges {
        let charge = &molecule.charges()[alpha];
        let (r, table) = harmonics.evaluate_direction(&(charge.position - sphere.center));
        let strength = charge.charge / dielectric_interior;
        let ratio = r / sphere.radius;
        for n in 0..order {
            let radial = strength * ratio.powi(n as i32);
            for m in -(n as i64)..=n as i64 {
                expansion[(n, m)] += table.get(n, m).conj() * radial;
            }
        }
    }
    expansion
}

/// Expansion `LE` about sphere `k` of the molecule charges owned by its other spheres:
/// `LE_k(n,m) = Σ_α conj(Y_nm(θ_α, φ_α)) (q_α/ε_in) (a_k/r_α)^n / r_α`.
///
/// Charges sitting on the center of `k` would make the series singular and are skipped.
pub fn external_charge_expansion(
    molecule: &Molecule,
    k: usize,
    order: usize,
    dielectric_interior: f64,
) -> Coefficients {
    let harmonics = SphericalHarmonics::new(order);
    let sphere = &molecule.spheres()[k];
    let mut owned = vec![false; molecule.charges().len()];
    for &alpha in &sphere.charges {
        owned[alpha] = true;
    }

    let mut expansion = Coefficients::zeros(order);
    for (alpha, charge) in molecule.charges().iter().enumerate() {
        if owned[alpha] {
            continue;
        }
        let (r, table) = harmonics.evaluate_direction(&(charge.position - sphere.center));
        if r < DISTANCE_THRESHOLD {
            continue;
        }
        let strength = charge.charge / dielectric_interior / r;
        let ratio = sphere.radius / r;
        for n in 0..order {
            let radial = strength * ratio.powi(n as i32);
            for m in -(n as i64)..=n as i64 {
                expansion[(n, m)] += table.get(n, m).conj() * radial;
            }
        }
    }
    expansion
}

/// The surface overlap tensor `IE` of one sphere.
///
/// `IE(n,m; l,s) = δ_nl δ_ms / (2n+1) − (1/M) Σ_g Y_ls(g) conj(Y_nm(g))`, the sum running over
/// the grid points `g` of sphere `k` buried inside another sphere of the same molecule and `M`
/// being the full grid size. The first term is the exact integral over the whole sphere, so a
/// fully exposed sphere gets an exactly diagonal tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct SurfaceOverlap {
    order: usize,
    grid_points: usize,
    exposed_points: usize,
    /// Row-major `(p²) × (p²)`, row `(n,m)`, column `(l,s)`.
    values: Vec<Complex64>,
}

impl SurfaceOverlap {
    /// Integrates over a spiral grid of `grid_points` points on sphere `k`.
    pub fn compute(molecule: &Molecule, k: usize, order: usize, grid_points: usize) -> Self {
        let harmonics = SphericalHarmonics::new(order);
        let sphere = &molecule.spheres()[k];
        let size = order * order;
        let mut values = vec![Complex64::new(0.0, 0.0); size * size];
        let mut exposed_points = 0;
        let mut y = vec![Complex64::new(0.0, 0.0); size];

        for direction in spiral_grid(grid_points) {
            let point = sphere.center + direction * sphere.radius;
            if !molecule.is_buried(k, &point) {
                exposed_points += 1;
                continue;
            }

            let (_, table) = harmonics.evaluate_direction(&direction);
            for n in 0..order {
                for m in -(n as i64)..=n as i64 {
                    y[mode_index(n, m)] = table.get(n, m);
                }
            }
            for (row, y_row) in y.iter().enumerate() {
                let weight = y_row.conj();
                let target = &mut values[row * size..(row + 1) * size];
                for (entry, y_col) in target.iter_mut().zip(&y) {
                    *entry -= y_col * weight;
                }
            }
        }

        let scale = 1.0 / grid_points as f64;
        values.iter_mut().for_each(|v| *v *= scale);
        for n in 0..order {
            for m in -(n as i64)..=n as i64 {
                let index = mode_index(n, m);
                values[index * size + index] += 1.0 / (2 * n + 1) as f64;
            }
        }

        Self {
            order,
            grid_points,
            exposed_points,
            values,
        }
    }

    /// Truncation order `p` of the tensor.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Number of grid points, exposed or not.
    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    /// Number of grid points not buried in another sphere.
    pub fn exposed_points(&self) -> usize {
        self.exposed_points
    }

    /// `IE(n,m; l,s)`.
    pub fn get(&self, n: usize, m: i64, l: usize, s: i64) -> Complex64 {
        self.values[mode_index(n, m) * self.order * self.order + mode_index(l, s)]
    }

    /// Row `(n,m)` of the tensor, indexed by the dense `(l,s)` index.
    pub fn row(&self, row: usize) -> &[Complex64] {
        let size = self.order * self.order;
        &self.values[row * size..(row + 1) * size]
    }

    /// `Σ_ls IE(n,m; l,s) x_ls` for every `(n,m)`.
    pub fn apply(&self, x: &[Complex64]) -> Vec<Complex64> {
        let size = self.order * self.order;
        (0..size)
            .map(|row| self.row(row).iter().zip(x).map(|(a, b)| a * b).sum())
            .collect()
    }
}
