//! Gradients of re-expanded coefficient arrays and their basis conversions.

use crate::coefficients::Coefficients;
use num_complex::Complex64;

/// Basis in which the three gradient components are expressed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GradientFrame {
    /// `(ê_r, ê_θ, ê_φ)` of the direction `(θ, φ)`.
    Spherical { theta: f64, phi: f64 },
    /// `(ê_x, ê_y, ê_z)`.
    Cartesian,
}

/// Three coefficient arrays holding the components of a gradient.
#[derive(Debug, Clone, PartialEq)]
pub struct GradientCoefficients {
    pub frame: GradientFrame,
    pub components: [Coefficients; 3],
}

impl GradientCoefficients {
    /// Expresses the gradient in the cartesian basis.
    pub fn to_cartesian(&self) -> Self {
        match self.frame {
            GradientFrame::Cartesian => self.clone(),
            GradientFrame::Spherical { theta, phi } => {
                let rows = basis(theta, phi);
                // columns of `rows` are ê_r, ê_θ, ê_φ
                let transposed = [
                    [rows[0][0], rows[1][0], rows[2][0]],
                    [rows[0][1], rows[1][1], rows[2][1]],
                    [rows[0][2], rows[1][2], rows[2][2]],
                ];
                Self {
                    frame: GradientFrame::Cartesian,
                    components: self.rotate(&transposed),
                }
            }
        }
    }

    /// Expresses the gradient in the spherical basis of direction `(θ, φ)`.
    pub fn to_spherical(&self, theta: f64, phi: f64) -> Self {
        let cartesian = self.to_cartesian();
        Self {
            frame: GradientFrame::Spherical { theta, phi },
            components: cartesian.rotate(&basis(theta, phi)),
        }
    }

    fn rotate(&self, matrix: &[[f64; 3]; 3]) -> [Coefficients; 3] {
        let order = self.components[0].order();
        let mut out = [
            Coefficients::zeros(order),
            Coefficients::zeros(order),
            Coefficients::zeros(order),
        ];
        for (row, target) in matrix.iter().zip(out.iter_mut()) {
            let values = target.as_mut_slice();
            for (weight, component) in row.iter().zip(&self.components) {
                for (v, c) in values.iter_mut().zip(component.as_slice()) {
                    *v += *c * *weight;
                }
            }
        }
        out
    }

    /// Scalar product of every component with a fixed coefficient array, as used when
    /// contracting a gradient against multipole moments.
    pub fn contract(&self, moments: &Coefficients) -> [Complex64; 3] {
        let dot = |c: &Coefficients| -> Complex64 {
            c.as_slice()
                .iter()
                .zip(moments.as_slice())
                .map(|(a, b)| a * b)
                .sum()
        };
        [
            dot(&self.components[0]),
            dot(&self.components[1]),
            dot(&self.components[2]),
        ]
    }
}

/// Rows `ê_r`, `ê_θ`, `ê_φ` in cartesian components.
fn basis(theta: f64, phi: f64) -> [[f64; 3]; 3] {
    let (st, ct) = theta.sin_cos();
    let (sp, cp) = phi.sin_cos();
    [
        [st * cp, st * sp, ct],
        [ct * cp, ct * sp, -st],
        [-sp, cp, 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit(order: usize, value: f64) -> Coefficients {
        Coefficients::from_fn(order, |_, _| Complex64::new(value, 0.0))
    }

    #[test]
    fn radial_unit_vector_maps_to_direction() {
        let (theta, phi) = (0.6, -1.1);
        let gradient = GradientCoefficients {
            frame: GradientFrame::Spherical { theta, phi },
            components: [unit(2, 1.0), unit(2, 0.0), unit(2, 0.0)],
        };
        let cartesian = gradient.to_cartesian();
        assert_eq!(cartesian.frame, GradientFrame::Cartesian);
        assert_relative_eq!(cartesian.components[0][(1, 0)].re, theta.sin() * phi.cos());
        assert_relative_eq!(cartesian.components[1][(1, 0)].re, theta.sin() * phi.sin());
        assert_relative_eq!(cartesian.components[2][(1, 0)].re, theta.cos());
    }

    #[test]
    fn spherical_round_trip() {
        let gradient = GradientCoefficients {
            frame: GradientFrame::Cartesian,
            components: [unit(3, 0.2), unit(3, -1.0), unit(3, 0.7)],
        };
        let back = gradient.to_spherical(1.2, 2.3).to_cartesian();
        for axis in 0..3 {
            for (a, b) in back.components[axis]
                .as_slice()
                .iter()
                .zip(gradient.components[axis].as_slice())
            {
                assert!((a - b).norm() < 1e-14);
            }
        }
    }

    #[test]
    fn contraction_sums_each_component() {
        let gradient = GradientCoefficients {
            frame: GradientFrame::Cartesian,
            components: [unit(2, 1.0), unit(2, -2.0), unit(2, 0.0)],
        };
        let moments = unit(2, 0.5);
        let [x, y, z] = gradient.contract(&moments);
        assert_relative_eq!(x.re, 2.0);
        assert_relative_eq!(y.re, -4.0);
        assert_eq!(z, Complex64::new(0.0, 0.0));
    }
}
