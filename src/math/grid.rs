//! Near-uniform point sets on the unit sphere.

use nalgebra::Vector3;
use std::f64::consts::PI;

/// Generalized-spiral points on the unit sphere.
///
/// The polar coordinates are equispaced in `cos θ` from the south to the north pole and the
/// azimuth advances by `3.6/sqrt(M (1 - h²))`, which spreads the points with close to equal
/// area each. All points therefore carry the same quadrature weight `4π/M`.
pub fn spiral_grid(count: usize) -> Vec<Vector3<f64>> {
    match count {
        0 => return Vec::new(),
        1 => return vec![Vector3::z()],
        _ => {}
    }

    let m = count as f64;
    let step = 3.6 / m.sqrt();
    let mut points = Vec::with_capacity(count);
    let mut phi: f64 = 0.0;

    for k in 0..count {
        let h = -1.0 + 2.0 * k as f64 / (m - 1.0);
        let sin_theta = (1.0 - h * h).max(0.0).sqrt();
        if k == 0 || k == count - 1 {
            phi = 0.0;
        } else {
            phi = (phi + step / sin_theta).rem_euclid(2.0 * PI);
        }
        points.push(Vector3::new(sin_theta * phi.cos(), sin_theta * phi.sin(), h));
    }
    points
}

/// Number of grid points for a quadrature of `factor · p²` points.
pub fn grid_size(factor: f64, order: usize) -> usize {
    ((factor * (order * order) as f64).ceil() as usize).max(1)
}
