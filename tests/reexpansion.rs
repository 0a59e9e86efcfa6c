mod common;

use common::{constants, ion};
use nalgebra::Vector3;
use num_complex::Complex64;
use pbsam::reexpansion::analytic::TranslationBlock;
use pbsam::reexpansion::gradient::GradientFrame;
use pbsam::{Coefficients, Kernel, Molecule, ReExpansion, Sphere, SphereId, System, TMatrix};

fn sample(order: usize) -> Coefficients {
    Coefficients::from_fn(order, |n, m| {
        Complex64::new(1.0 / (n + 1) as f64, 0.3 * m as f64 / (n + 1) as f64)
    })
}

fn dimer_and_ion(ion_x: f64) -> System {
    let dimer = Molecule::new(
        vec![],
        vec![
            Sphere {
                center: Vector3::zeros(),
                radius: 2.0,
                charges: vec![],
            },
            Sphere {
                center: Vector3::new(3.0, 0.0, 0.0),
                radius: 2.0,
                charges: vec![],
            },
        ],
    );
    System::new(vec![dimer, ion(Vector3::new(ion_x, 0.0, 0.0), 2.0, 1.0)], constants(0.1)).unwrap()
}

#[test]
fn test_pairs_are_classified_once() {
    let system = dimer_and_ion(20.0);
    let tmatrix = TMatrix::new(&system, 4, 5.0, 40);

    let (a0, a1, b) = (SphereId::new(0, 0), SphereId::new(0, 1), SphereId::new(1, 0));
    assert!(!tmatrix.is_analytic(a0, a1));
    assert!(!tmatrix.is_analytic(a1, a0));
    assert!(tmatrix.is_analytic(b, a0));
    assert!(tmatrix.is_analytic(a1, b));
    assert_eq!(tmatrix.pair_counts(), (4, 2));

    match tmatrix.entry(a0, a1) {
        ReExpansion::Numerical(grid) => {
            assert_eq!(grid.grid_points(), 40);
            assert!(grid.exposed_points() < 40);
        }
        ReExpansion::Analytic { .. } => panic!("overlapping spheres must be numerical"),
    }
    match tmatrix.entry(b, a0) {
        ReExpansion::Analytic { coulomb, .. } => assert!(coulomb.is_none()),
        ReExpansion::Numerical(_) => panic!("distant spheres must be analytic"),
    }
}

#[test]
fn test_translation_reclassifies_moved_pairs() {
    let mut system = dimer_and_ion(20.0);
    let mut tmatrix = TMatrix::new(&system, 3, 5.0, 40);
    let before = tmatrix.entry(SphereId::new(0, 0), SphereId::new(0, 1)).clone();

    system
        .translate_molecule(1, &Vector3::new(-10.5, 0.0, 0.0))
        .unwrap();
    tmatrix.update_molecule(&system, 1);

    assert!(!tmatrix.is_analytic(SphereId::new(1, 0), SphereId::new(0, 1)));
    assert!(tmatrix.is_analytic(SphereId::new(1, 0), SphereId::new(0, 0)));
    assert_eq!(
        tmatrix.entry(SphereId::new(0, 0), SphereId::new(0, 1)),
        &before
    );
}

#[test]
fn test_analytic_and_numerical_paths_agree() {
    let order = 4;
    let system = System::new(
        vec![
            ion(Vector3::zeros(), 2.0, 1.0),
            ion(Vector3::new(1.0, 6.0, 4.0), 1.5, -1.0),
        ],
        constants(0.1),
    )
    .unwrap();
    let analytic = TMatrix::new(&system, order, 0.0, 4000);
    let numerical = TMatrix::new(&system, order, 100.0, 4000);
    let (target, source) = (SphereId::new(0, 0), SphereId::new(1, 0));
    assert!(analytic.is_analytic(target, source));
    assert!(!numerical.is_analytic(target, source));

    let mut x = Coefficients::zeros(order);
    x[(0, 0)] = Complex64::new(1.0, 0.0);
    x[(1, 1)] = Complex64::new(0.2, -0.1);
    x[(1, -1)] = Complex64::new(-0.2, -0.1);
    x[(1, 0)] = Complex64::new(0.3, 0.0);

    let exact = analytic.re_expand(&x, target, source, Kernel::Screened);
    let sampled = numerical.re_expand(&x, target, source, Kernel::Screened);
    let scale = exact.max_norm();
    for (a, b) in exact.as_slice().iter().zip(sampled.as_slice()) {
        assert!((a - b).norm() < 5e-3 * scale, "{a} vs {b}");
    }
}

#[test]
fn test_regular_translation_round_trip() {
    let order = 6;
    let system = System::new(
        vec![
            ion(Vector3::zeros(), 2.0, 1.0),
            ion(Vector3::new(-3.0, 7.0, 9.0), 2.5, 1.0),
        ],
        constants(0.0),
    )
    .unwrap();
    let tmatrix = TMatrix::new(&system, order, 5.0, 100);
    let (first, second) = (SphereId::new(0, 0), SphereId::new(1, 0));

    let x = sample(order);
    let there = tmatrix.translate_regular(&x, first, second, Kernel::Coulomb);
    let back = tmatrix.translate_regular(&there, second, first, Kernel::Coulomb);
    for (a, b) in x.as_slice().iter().zip(back.as_slice()) {
        assert!((a - b).norm() < 1e-6 * x.max_norm());
    }
}

#[test]
fn test_gradient_field_is_cartesian_and_matches_finite_differences() {
    let order = 4;
    let system = System::new(
        vec![
            ion(Vector3::zeros(), 2.0, 1.0),
            ion(Vector3::new(4.0, -8.0, 6.0), 1.5, 1.0),
        ],
        constants(0.15),
    )
    .unwrap();
    let tmatrix = TMatrix::new(&system, order, 5.0, 100);
    let (target, source) = (SphereId::new(0, 0), SphereId::new(1, 0));
    let x = sample(order);

    let gradient = tmatrix.re_expand_gradient(&x, target, source);
    assert!(matches!(gradient.frame, GradientFrame::Spherical { .. }));
    let cartesian = gradient.to_cartesian();

    let translation = Vector3::new(4.0, -8.0, 6.0);
    let step = 1e-5;
    for axis in 0..3 {
        let mut delta = Vector3::zeros();
        delta[axis] = step;
        let plus = TranslationBlock::new(&(translation + delta), 1.5, 2.0, 0.15, order).apply(&x);
        let minus = TranslationBlock::new(&(translation - delta), 1.5, 2.0, 0.15, order).apply(&x);
        for ((p, q), g) in plus
            .as_slice()
            .iter()
            .zip(minus.as_slice())
            .zip(cartesian.components[axis].as_slice())
        {
            let fd = (p - q) / (2.0 * step);
            assert!((fd - g).norm() < 1e-6 + 1e-5 * fd.norm());
        }
    }

    let field = tmatrix.re_expand_gradient_field(&gradient, source, target);
    assert_eq!(field.frame, GradientFrame::Cartesian);
    let expected_x = tmatrix.re_expand(&cartesian.components[0], source, target, Kernel::Screened);
    assert_eq!(field.components[0], expected_x);
}

#[test]
#[should_panic(expected = "Coulomb re-expansion requested across molecules")]
fn test_coulomb_kernel_is_intra_molecular() {
    let system = System::new(
        vec![ion(Vector3::zeros(), 2.0, 1.0), ion(Vector3::new(20.0, 0.0, 0.0), 2.0, 1.0)],
        constants(0.1),
    )
    .unwrap();
    let tmatrix = TMatrix::new(&system, 3, 5.0, 40);
    tmatrix.re_expand(
        &Coefficients::zeros(3),
        SphereId::new(0, 0),
        SphereId::new(1, 0),
        Kernel::Coulomb,
    );
}
