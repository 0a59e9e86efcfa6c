#![allow(dead_code)]

use nalgebra::Vector3;
use pbsam::{Charge, Molecule, PhysicalConstants, Solver, SolverOptions, System};

pub const EPS_IN: f64 = 4.0;
pub const EPS_OUT: f64 = 80.0;

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

pub fn constants(kappa: f64) -> PhysicalConstants {
    PhysicalConstants::with_kappa(EPS_IN, EPS_OUT, kappa)
}

pub fn options(order: usize) -> SolverOptions {
    SolverOptions {
        truncation_order: order,
        ..Default::default()
    }
}

/// A single sphere with one charge at its center.
pub fn ion(center: Vector3<f64>, radius: f64, charge: f64) -> Molecule {
    Molecule::single_sphere(
        center,
        radius,
        vec![Charge {
            position: center,
            charge,
            radius: 1.0,
        }],
    )
}

pub fn build_solver(molecules: Vec<Molecule>, kappa: f64, order: usize) -> Solver {
    let system = System::new(molecules, constants(kappa)).expect("Invalid test geometry");
    Solver::with_options(system, options(order)).expect("Solver construction failed")
}

pub struct BornCase<'a> {
    pub name: &'a str,
    pub radius: f64,
    pub charge: f64,
    pub kappa: f64,
}

/// Solves isolated central-charge spheres and compares `H_00` and `F_00` with the closed
/// form of the Born ion. Every `n > 0` coefficient must vanish relative to the monopole.
pub fn run_born_group(group_name: &str, cases: Vec<BornCase>, order: usize, max_relative_error: f64) {
    let mut group_max_error: f64 = 0.0;

    println!("\nRunning Group Test: {}", group_name);
    println!("{:-<80}", "");
    println!(
        "{:<16} | {:<6} | {:<12} | {:<12} | {:<12} | {:<12}",
        "Ion", "Coeff", "Expected", "Calculated", "Rel. Error", "Sweeps"
    );

    for case in cases {
        let mut solver = build_solver(
            vec![ion(Vector3::zeros(), case.radius, case.charge)],
            case.kappa,
            order,
        );
        let report = solver.solve(1e-10, 20).ensure_converged().expect("Born ion did not converge");

        let ka = case.kappa * case.radius;
        let screened = case.charge / (EPS_OUT * (1.0 + ka));
        let expected_h = screened * ka.exp();
        let expected_f = screened - case.charge / EPS_IN;
        let calculated_h = solver.h(0)[0][(0, 0)].re;
        let calculated_f = solver.f(0)[0][(0, 0)].re;

        for (label, expected, calculated) in [
            ("H_00", expected_h, calculated_h),
            ("F_00", expected_f, calculated_f),
        ] {
            let error = ((calculated - expected) / expected).abs();
            println!(
                "{:<16} | {:<6} | {:<12.6} | {:<12.6} | {:<12.2e} | {:<12}",
                case.name, label, expected, calculated, error, report.iterations
            );
            group_max_error = group_max_error.max(error);
        }

        let leakage = solver.h(0)[0]
            .iter()
            .zip(solver.f(0)[0].iter())
            .filter(|((mode, _), _)| mode.0 > 0)
            .map(|((_, h), (_, f))| (h.norm() / calculated_h.abs()).max(f.norm() / calculated_f.abs()))
            .fold(0.0, f64::max);
        println!("{:<16} | {:<6} | {:<12} | {:<12} | {:<12.2e} |", case.name, "n>0", "0", "", leakage);
        group_max_error = group_max_error.max(leakage);
    }

    println!("{:-<80}", "");
    println!("Group Statistics for '{}':", group_name);
    println!(
        "  Group Max Rel. Error: {:.2e} (Limit: {:.2e})",
        group_max_error, max_relative_error
    );
    println!("{:-<80}\n", "");

    assert!(
        group_max_error <= max_relative_error,
        "Group maximum relative error {:.2e} exceeds limit {:.2e}",
        group_max_error,
        max_relative_error
    );
}
