mod common;

use common::{BornCase, init_logger, run_born_group};

#[test]
fn test_born_ions_group() {
    init_logger();
    let cases = vec![
        BornCase {
            name: "Na+ unscreened",
            radius: 1.5,
            charge: 1.0,
            kappa: 0.0,
        },
        BornCase {
            name: "Cl- 10 mM",
            radius: 2.0,
            charge: -1.0,
            kappa: 0.033,
        },
        BornCase {
            name: "Mg2+ 150 mM",
            radius: 1.8,
            charge: 2.0,
            kappa: 0.128,
        },
        BornCase {
            name: "Large sphere",
            radius: 10.0,
            charge: 5.0,
            kappa: 0.1,
        },
    ];

    run_born_group("Born Ions", cases, 6, 1e-9);
}

#[test]
fn test_born_ions_default_order() {
    let cases = vec![BornCase {
        name: "Default order",
        radius: 3.0,
        charge: 1.0,
        kappa: 0.2,
    }];

    run_born_group("Born Ions p=10", cases, 10, 1e-9);
}

#[test]
fn test_born_ions_low_order() {
    let cases = vec![BornCase {
        name: "Monopole only",
        radius: 3.0,
        charge: 1.0,
        kappa: 0.2,
    }];

    run_born_group("Born Ions p=1", cases, 1, 1e-10);
}
