//! Quadrature re-expansion for sphere pairs too close for the analytic operator.
//!
//! The source expansion is turned into the equivalent single-layer density on the source
//! sphere surface, `σ = Σ (2l+1)/(4π a_l²) X_ls Y_ls / î_l(κa_l)`, which generates exactly the
//! source field outside the sphere. The density is sampled on a spiral grid and every sample
//! is projected onto the target's regular basis as a point source.

use crate::coefficients::Coefficients;
use crate::math::bessel::BesselCalculator;
use crate::math::grid::spiral_grid;
use crate::math::spherical::SphericalHarmonics;
use crate::system::Molecule;
use nalgebra::Vector3;
use num_complex::Complex64;

/// Sampling grid of one source sphere, positioned relative to one target sphere.
#[derive(Debug, Clone, PartialEq)]
pub struct NumericalGrid {
    grid_points: usize,
    /// Unit directions of the grid points not buried in the source molecule.
    directions: Vec<Vector3<f64>>,
    /// Source center relative to the target center.
    translation: Vector3<f64>,
    source_radius: f64,
    target_radius: f64,
}

impl NumericalGrid {
    /// Lays `grid_points` spiral points on sphere `source_sphere` of `source_molecule`,
    /// dropping points inside the molecule's other spheres.
    pub fn new(
        source_molecule: &Molecule,
        source_sphere: usize,
        translation: Vector3<f64>,
        target_radius: f64,
        grid_points: usize,
    ) -> Self {
        let sphere = &source_molecule.spheres()[source_sphere];
        let directions = spiral_grid(grid_points)
            .into_iter()
            .filter(|u| {
                let point = sphere.center + u * sphere.radius;
                !source_molecule.is_buried(source_sphere, &point)
            })
            .collect();
        Self {
            grid_points,
            directions,
            translation,
            source_radius: sphere.radius,
            target_radius,
        }
    }

    /// Number of grid points laid on the source sphere.
    pub fn grid_points(&self) -> usize {
        self.grid_points
    }

    /// Number of grid points that take part in the quadrature.
    pub fn exposed_points(&self) -> usize {
        self.directions.len()
    }

    /// Re-expands `x` about the target center with screening constant `kappa`.
    pub fn re_expand(&self, x: &Coefficients, kappa: f64) -> Coefficients {
        let order = x.order();
        let harmonics = SphericalHarmonics::new(order);
        let bessel = BesselCalculator::new(order);
        let source_i = bessel.modified_i(order, kappa * self.source_radius);
        let weight = 1.0 / self.grid_points as f64;
        let mut result = Coefficients::zeros(order);

        for direction in &self.directions {
            let (_, source_table) = harmonics.evaluate_direction(direction);
            let density: Complex64 = x
                .iter()
                .map(|((l, s), value)| {
                    value * source_table.get(l, s) * ((2 * l + 1) as f64 / source_i[l])
                })
                .sum::<Complex64>()
                * weight;

            let rho = direction * self.source_radius + self.translation;
            let (distance, target_table) = harmonics.evaluate_direction(&rho);
            if distance <= self.target_radius {
                continue;
            }
            let target_k = bessel.modified_k(order, kappa * distance);
            let base = density * ((-kappa * distance).exp() / distance);
            let ratio = self.target_radius / distance;
            for n in 0..order {
                let radial = base * (ratio.powi(n as i32) * target_k[n]);
                for m in -(n as i64)..=n as i64 {
                    result[(n, m)] += radial * target_table.get(n, m).conj();
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reexpansion::analytic::TranslationBlock;
    use crate::system::Sphere;

    fn lone_sphere(radius: f64) -> Molecule {
        Molecule::with_center(
            Vector3::zeros(),
            vec![],
            vec![Sphere {
                center: Vector3::zeros(),
                radius,
                charges: vec![],
            }],
        )
    }

    #[test]
    fn monopole_source_matches_analytic_operator() {
        let translation = Vector3::new(0.0, 5.0, 4.0);
        let grid = NumericalGrid::new(&lone_sphere(2.0), 0, translation, 1.5, 4000);
        let mut x = Coefficients::zeros(3);
        x[(0, 0)] = Complex64::new(1.0, 0.0);

        let numerical = grid.re_expand(&x, 0.1);
        let analytic = TranslationBlock::new(&translation, 2.0, 1.5, 0.1, 3).apply(&x);
        for (a, b) in numerical.as_slice().iter().zip(analytic.as_slice()) {
            assert!((a - b).norm() < 5e-3 * analytic.max_norm());
        }
    }

    #[test]
    fn buried_points_are_skipped() {
        let molecule = Molecule::with_center(
            Vector3::zeros(),
            vec![],
            vec![
                Sphere { center: Vector3::zeros(), radius: 2.0, charges: vec![] },
                Sphere { center: Vector3::new(2.5, 0.0, 0.0), radius: 1.5, charges: vec![] },
            ],
        );
        let grid = NumericalGrid::new(&molecule, 0, Vector3::new(0.0, 0.0, 9.0), 2.0, 500);
        assert_eq!(grid.grid_points(), 500);
        assert!(grid.exposed_points() < 500);
    }
}
