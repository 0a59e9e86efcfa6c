//! This module implements the `Solver` that drives the coefficient arrays to self-consistency.
//!
//! Construction computes everything that depends only on geometry: the charge expansions `E`
//! and `LE`, the surface overlap tensors `IE` with their factored sphere-local systems, and
//! the T-matrix. Each sweep then updates every molecule in parallel from a frozen view of the
//! previous sweep's coupling fields, synchronizes, and recomputes the inter-molecular field
//! `LHN` from every molecule's new `H`.

use super::options::SolverOptions;
use crate::coefficients::local::{self, SelfInteraction, SphereFactors};
use crate::coefficients::statics::{self, SurfaceOverlap};
use crate::coefficients::{CoefficientArena, Coefficients, coupling, relative_change};
use crate::error::PbsamError;
use crate::math::grid::grid_size;
use crate::reexpansion::TMatrix;
use crate::system::{Molecule, SphereId, System};
use log::{debug, info, warn};
use nalgebra::{UnitQuaternion, Vector3};
use rayon::prelude::*;

/// Lifecycle of a [`Solver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// Geometry-dependent matrices are built and the coefficients are zero (or stale after a
    /// translation).
    StaticMatricesComputed,
    /// At least one sweep ran since the last reset and no terminal outcome was recorded.
    Iterating,
    Converged,
    MaxIterReached,
}

/// Outcome of [`Solver::solve`].
#[derive(Debug, Clone, PartialEq)]
pub struct ConvergenceReport {
    /// Number of sweeps performed.
    pub iterations: u32,
    /// Convergence measure after the last sweep (infinite when no sweep ran).
    pub mu: f64,
    pub converged: bool,
    /// `mu` of every sweep, in order.
    pub history: Vec<f64>,
}

impl ConvergenceReport {
    /// Turns an unconverged run into an error.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::NotConverged` carrying the sweep count and final `mu`.
    pub fn ensure_converged(self) -> Result<Self, PbsamError> {
        if self.converged {
            Ok(self)
        } else {
            Err(PbsamError::NotConverged {
                max_iterations: self.iterations,
                mu: self.mu,
            })
        }
    }
}

/// Geometry-only data of the spheres of one molecule.
#[derive(Debug, Clone)]
struct MoleculeStatics {
    e: Vec<Coefficients>,
    le: Vec<Coefficients>,
    ie: Vec<SurfaceOverlap>,
    factors: Vec<SphereFactors>,
    local: Vec<SelfInteraction>,
}

impl MoleculeStatics {
    fn build(
        molecule: &Molecule,
        options: &SolverOptions,
        dielectric_interior: f64,
        dielectric_ratio: f64,
        kappa: f64,
    ) -> Result<Self, PbsamError> {
        let order = options.truncation_order;
        let grid_points = grid_size(options.surface_grid_factor, order);
        let count = molecule.sphere_count();

        let mut built = Self {
            e: Vec::with_capacity(count),
            le: Vec::with_capacity(count),
            ie: Vec::with_capacity(count),
            factors: Vec::with_capacity(count),
            local: Vec::with_capacity(count),
        };
        for (k, sphere) in molecule.spheres().iter().enumerate() {
            let ie = SurfaceOverlap::compute(molecule, k, order, grid_points);
            let factors = SphereFactors::new(sphere.radius, kappa, order);
            built.local.push(SelfInteraction::new(&ie, &factors, dielectric_ratio)?);
            built.e.push(statics::charge_expansion(molecule, k, order, dielectric_interior));
            built.le.push(statics::external_charge_expansion(
                molecule,
                k,
                order,
                dielectric_interior,
            ));
            built.ie.push(ie);
            built.factors.push(factors);
        }
        Ok(built)
    }
}

/// New per-sphere arrays of one molecule produced by a sweep.
struct MoleculeUpdate {
    h: Vec<Coefficients>,
    f: Vec<Coefficients>,
    xh: Vec<Coefficients>,
    xf: Vec<Coefficients>,
    lf: Vec<Coefficients>,
    lh: Vec<Coefficients>,
}

/// The iterative multipole solver of a [`System`].
#[derive(Debug, Clone)]
pub struct Solver {
    system: System,
    options: SolverOptions,
    statics: Vec<MoleculeStatics>,
    tmatrix: TMatrix,
    h: CoefficientArena,
    f: CoefficientArena,
    prev_h: CoefficientArena,
    prev_f: CoefficientArena,
    lf: CoefficientArena,
    lh: CoefficientArena,
    lhn: CoefficientArena,
    xh: CoefficientArena,
    xf: CoefficientArena,
    state: SolverState,
}

impl Solver {
    /// Creates a solver with default options.
    ///
    /// # Errors
    ///
    /// See [`Solver::with_options`].
    pub fn new(system: System) -> Result<Self, PbsamError> {
        Self::with_options(system, SolverOptions::default())
    }

    /// Creates a solver and builds every geometry-dependent matrix.
    ///
    /// # Arguments
    ///
    /// * `system` - The validated geometry to solve.
    /// * `options` - Truncation order, tolerances and grid sizes.
    ///
    /// # Returns
    ///
    /// A solver in [`SolverState::StaticMatricesComputed`] with every coefficient at zero.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::InvalidOptions` for unusable options, or
    /// `PbsamError::LinalgError` if a sphere-local self-interaction system is singular.
    ///
    /// # Examples
    ///
    /// ```
    /// use nalgebra::Vector3;
    /// use pbsam::{Charge, Molecule, PhysicalConstants, Solver, SolverOptions, System};
    ///
    /// let ion = Molecule::single_sphere(
    ///     Vector3::zeros(),
    ///     2.0,
    ///     vec![Charge { position: Vector3::zeros(), charge: 1.0, radius: 1.0 }],
    /// );
    /// let system = System::new(vec![ion], PhysicalConstants::with_kappa(4.0, 78.0, 0.1)).unwrap();
    /// let options = SolverOptions { truncation_order: 4, ..Default::default() };
    ///
    /// let mut solver = Solver::with_options(system, options).unwrap();
    /// let report = solver.solve(1e-6, 50);
    /// assert!(report.converged);
    /// ```
    pub fn with_options(system: System, options: SolverOptions) -> Result<Self, PbsamError> {
        options.validate()?;
        let order = options.truncation_order;
        let kappa = system.constants().kappa();

        let (statics, tmatrix) = rayon::join(
            || {
                system
                    .molecules()
                    .par_iter()
                    .map(|molecule| Self::build_statics(&system, molecule, &options))
                    .collect::<Result<Vec<_>, _>>()
            },
            || {
                TMatrix::new(
                    &system,
                    order,
                    options.analytic_margin,
                    grid_size(options.reexpansion_grid_factor, order),
                )
            },
        );
        let statics = statics?;

        let (analytic, numerical) = tmatrix.pair_counts();
        info!(
            "Solver ready: {} molecules, {} spheres, p = {}, kappa = {:.4} 1/A, lambda = {:.3} A, {} analytic / {} numerical pairs",
            system.len(),
            system.sphere_count(),
            order,
            kappa,
            system.average_radius(),
            analytic,
            numerical
        );

        let zeros = CoefficientArena::zeros(&system, order);
        Ok(Self {
            options,
            statics,
            tmatrix,
            h: zeros.clone(),
            f: zeros.clone(),
            prev_h: zeros.clone(),
            prev_f: zeros.clone(),
            lf: zeros.clone(),
            lh: zeros.clone(),
            lhn: zeros.clone(),
            xh: zeros.clone(),
            xf: zeros,
            system,
            state: SolverState::StaticMatricesComputed,
        })
    }

    fn build_statics(
        system: &System,
        molecule: &Molecule,
        options: &SolverOptions,
    ) -> Result<MoleculeStatics, PbsamError> {
        let constants = system.constants();
        MoleculeStatics::build(
            molecule,
            options,
            constants.dielectric_interior,
            constants.dielectric_ratio(),
            constants.kappa(),
        )
    }

    /// Runs one sweep and returns its convergence measure `mu`.
    ///
    /// Every molecule is updated in parallel from the coupling fields of the previous sweep;
    /// `LHN` is then recomputed from the new `H` of every molecule, and the previous iterate is
    /// replaced by the current one.
    pub fn iterate(&mut self) -> f64 {
        self.state = SolverState::Iterating;

        let updates: Vec<MoleculeUpdate> = (0..self.system.len())
            .into_par_iter()
            .map(|i| self.sweep_molecule(i))
            .collect();
        for (i, update) in updates.into_iter().enumerate() {
            self.h.molecules_mut()[i] = update.h;
            self.f.molecules_mut()[i] = update.f;
            self.xh.molecules_mut()[i] = update.xh;
            self.xf.molecules_mut()[i] = update.xf;
            self.lf.molecules_mut()[i] = update.lf;
            self.lh.molecules_mut()[i] = update.lh;
        }

        self.lhn = self.inter_molecular_field();

        let mu: f64 = self
            .system
            .sphere_ids()
            .map(|id| relative_change(self.h.get(id), self.prev_h.get(id)))
            .sum();
        self.prev_h.clone_from(&self.h);
        self.prev_f.clone_from(&self.f);

        debug!("Sweep finished with mu = {mu:.3e}");
        mu
    }

    fn sweep_molecule(&self, i: usize) -> MoleculeUpdate {
        let statics = &self.statics[i];
        let ratio = self.system.constants().dielectric_ratio();
        let count = statics.e.len();

        let mut update = MoleculeUpdate {
            h: Vec::with_capacity(count),
            f: Vec::with_capacity(count),
            xh: Vec::with_capacity(count),
            xf: Vec::with_capacity(count),
            lf: Vec::with_capacity(count),
            lh: Vec::with_capacity(count),
        };
        for k in 0..count {
            let id = SphereId::new(i, k);
            let (lf, lh, lhn) = (self.lf.get(id), self.lh.get(id), self.lhn.get(id));
            let factors = &statics.factors[k];
            let xh = local::compute_xh(&statics.e[k], &statics.le[k], lf, lh, lhn, factors);
            let xf = local::compute_xf(&statics.e[k], &statics.le[k], lf, lh, lhn, factors, ratio);
            let (h, f) = statics.local[k].solve(&xh, &xf);
            update.xh.push(xh);
            update.xf.push(xf);
            update.h.push(h);
            update.f.push(f);
        }
        for k in 0..count {
            update.lf.push(coupling::compute_lf(&self.tmatrix, i, k, &update.f));
            update.lh.push(coupling::compute_lh(&self.tmatrix, i, k, &update.h));
        }
        update
    }

    fn inter_molecular_field(&self) -> CoefficientArena {
        let molecules = (0..self.system.len())
            .into_par_iter()
            .map(|i| {
                (0..self.system.molecule(i).sphere_count())
                    .map(|k| coupling::compute_lhn(&self.tmatrix, i, k, &self.h))
                    .collect()
            })
            .collect();
        CoefficientArena::from_molecules(molecules)
    }

    /// Sweeps until `mu < tolerance` or `max_iterations` sweeps have run.
    ///
    /// # Arguments
    ///
    /// * `tolerance` - Sweeps stop once the convergence measure falls below this value.
    /// * `max_iterations` - Upper bound on the number of sweeps.
    ///
    /// # Returns
    ///
    /// A [`ConvergenceReport`] with the sweep count, the final `mu` and its history.
    ///
    /// Hitting the cap is not an error; inspect the report or call
    /// [`ConvergenceReport::ensure_converged`].
    pub fn solve(&mut self, tolerance: f64, max_iterations: u32) -> ConvergenceReport {
        let mut history = Vec::new();
        for iteration in 1..=max_iterations {
            let mu = self.iterate();
            history.push(mu);
            if mu < tolerance {
                self.state = SolverState::Converged;
                info!("Converged after {iteration} sweeps (mu = {mu:.3e})");
                return ConvergenceReport {
                    iterations: iteration,
                    mu,
                    converged: true,
                    history,
                };
            }
        }

        self.state = SolverState::MaxIterReached;
        let mu = history.last().copied().unwrap_or(f64::INFINITY);
        warn!("Stopped after {max_iterations} sweeps without convergence (mu = {mu:.3e}, tolerance = {tolerance:.1e})");
        ConvergenceReport {
            iterations: max_iterations,
            mu,
            converged: false,
            history,
        }
    }

    /// [`Solver::solve`] with the tolerance and iteration cap of the options.
    pub fn solve_with_options(&mut self) -> ConvergenceReport {
        self.solve(self.options.tolerance, self.options.max_iterations)
    }

    /// Zeroes every dynamic array, keeping `E`, `LE`, `IE` and the T-matrix.
    pub fn reset_all(&mut self) {
        for arena in [
            &mut self.h,
            &mut self.f,
            &mut self.prev_h,
            &mut self.prev_f,
            &mut self.lf,
            &mut self.lh,
            &mut self.lhn,
            &mut self.xh,
            &mut self.xf,
        ] {
            arena.fill_zero();
        }
        self.state = SolverState::StaticMatricesComputed;
    }

    /// Moves molecule `i` rigidly and rebuilds the T-matrix pairs it takes part in.
    ///
    /// The current `H` and `F` are kept as the starting point of the next solve and `LHN` is
    /// recomputed for the new geometry.
    ///
    /// # Arguments
    ///
    /// * `i` - Index of the molecule to move.
    /// * `displacement` - Rigid displacement in angstroms.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::MoleculeIndexOutOfRange` or `PbsamError::OverlappingMolecules`;
    /// the solver is unchanged in both cases.
    pub fn translate_molecule(
        &mut self,
        i: usize,
        displacement: &Vector3<f64>,
    ) -> Result<(), PbsamError> {
        self.system.translate_molecule(i, displacement)?;
        self.tmatrix.update_molecule(&self.system, i);
        self.lhn = self.inter_molecular_field();
        self.state = SolverState::StaticMatricesComputed;
        debug!("Translated molecule {i} by {:?}", displacement.as_slice());
        Ok(())
    }

    /// Rotates molecule `i` rigidly about its center.
    ///
    /// Rotation changes the molecule's own geometry, so its `E`, `LE`, `IE` and local systems
    /// are rebuilt together with every T-matrix pair it takes part in. `H` and `F` are kept
    /// as the starting point of the next solve; `LF`, `LH` of the molecule and `LHN` of every
    /// molecule are recomputed from them.
    ///
    /// # Arguments
    ///
    /// * `i` - Index of the molecule to rotate.
    /// * `rotation` - Rotation applied about the molecule center.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::MoleculeIndexOutOfRange`, `PbsamError::OverlappingMolecules`, or
    /// `PbsamError::LinalgError` if a rebuilt local system is singular; the solver is
    /// unchanged in every case.
    pub fn rotate_molecule(
        &mut self,
        i: usize,
        rotation: &UnitQuaternion<f64>,
    ) -> Result<(), PbsamError> {
        let mut system = self.system.clone();
        system.rotate_molecule(i, rotation)?;
        let statics = Self::build_statics(&system, system.molecule(i), &self.options)?;

        self.system = system;
        self.statics[i] = statics;
        self.tmatrix.reorient_molecule(&self.system, i);
        let (f, h) = (self.f.molecule(i), self.h.molecule(i));
        let lf = (0..f.len())
            .map(|k| coupling::compute_lf(&self.tmatrix, i, k, f))
            .collect();
        let lh = (0..h.len())
            .map(|k| coupling::compute_lh(&self.tmatrix, i, k, h))
            .collect();
        self.lf.molecules_mut()[i] = lf;
        self.lh.molecules_mut()[i] = lh;
        self.lhn = self.inter_molecular_field();
        self.state = SolverState::StaticMatricesComputed;
        debug!("Rotated molecule {i} by {:.4} rad", rotation.angle());
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// Options the solver was built with.
    pub fn options(&self) -> &SolverOptions {
        &self.options
    }

    /// The geometry being solved, including any translations and rotations applied since
    /// construction.
    pub fn system(&self) -> &System {
        &self.system
    }

    /// Re-expansion operators of every coupled sphere pair.
    pub fn tmatrix(&self) -> &TMatrix {
        &self.tmatrix
    }

    /// Multipole coefficients `H` of the spheres of molecule `i`.
    pub fn h(&self, i: usize) -> &[Coefficients] {
        self.h.molecule(i)
    }

    /// Interior reaction coefficients `F` of the spheres of molecule `i`.
    pub fn f(&self, i: usize) -> &[Coefficients] {
        self.f.molecule(i)
    }

    /// `H` of the spheres of molecule `i` after the previous sweep. Equal to [`Solver::h`]
    /// between sweeps.
    pub fn prev_h(&self, i: usize) -> &[Coefficients] {
        self.prev_h.molecule(i)
    }

    /// `F` of the spheres of molecule `i` after the previous sweep.
    pub fn prev_f(&self, i: usize) -> &[Coefficients] {
        self.prev_f.molecule(i)
    }

    /// Expansions `E` of the charges each sphere of molecule `i` owns.
    pub fn e(&self, i: usize) -> &[Coefficients] {
        &self.statics[i].e
    }

    /// Expansions `LE` of the molecule's other charges about each sphere of molecule `i`.
    pub fn le(&self, i: usize) -> &[Coefficients] {
        &self.statics[i].le
    }

    /// Surface overlap tensors `IE` of the spheres of molecule `i`.
    pub fn ie(&self, i: usize) -> &[SurfaceOverlap] {
        &self.statics[i].ie
    }

    /// Intra-molecular Coulomb coupling `LF` of the spheres of molecule `i`.
    pub fn lf(&self, i: usize) -> &[Coefficients] {
        self.lf.molecule(i)
    }

    /// Intra-molecular screened coupling `LH` of the spheres of molecule `i`.
    pub fn lh(&self, i: usize) -> &[Coefficients] {
        self.lh.molecule(i)
    }

    /// Inter-molecular screened coupling `LHN` of the spheres of molecule `i`.
    pub fn lhn(&self, i: usize) -> &[Coefficients] {
        self.lhn.molecule(i)
    }

    /// `XH` of the spheres of molecule `i` from the last sweep.
    pub fn xh(&self, i: usize) -> &[Coefficients] {
        self.xh.molecule(i)
    }

    /// `XF` of the spheres of molecule `i` from the last sweep.
    pub fn xf(&self, i: usize) -> &[Coefficients] {
        self.xf.molecule(i)
    }

    /// Bessel factors of the spheres of molecule `i`.
    pub fn sphere_factors(&self, i: usize) -> &[SphereFactors] {
        &self.statics[i].factors
    }

    /// `H` of every sphere.
    pub fn h_arena(&self) -> &CoefficientArena {
        &self.h
    }

    /// `F` of every sphere.
    pub fn f_arena(&self) -> &CoefficientArena {
        &self.f
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::PhysicalConstants;
    use crate::system::Charge;
    use approx::assert_relative_eq;

    fn ion(center: Vector3<f64>, charge: f64) -> Molecule {
        Molecule::single_sphere(
            center,
            2.0,
            vec![Charge { position: center, charge, radius: 1.0 }],
        )
    }

    fn options(order: usize) -> SolverOptions {
        SolverOptions {
            truncation_order: order,
            ..Default::default()
        }
    }

    #[test]
    fn construction_rejects_invalid_options() {
        let system =
            System::new(vec![ion(Vector3::zeros(), 1.0)], PhysicalConstants::with_kappa(4.0, 80.0, 0.1))
                .unwrap();
        let result = Solver::with_options(system, options(0));
        assert!(matches!(result, Err(PbsamError::InvalidOptions(_))));
    }

    #[test]
    fn new_solver_starts_from_zero() {
        let system = System::new(
            vec![ion(Vector3::zeros(), 1.0), ion(Vector3::new(12.0, 0.0, 0.0), -1.0)],
            PhysicalConstants::with_kappa(4.0, 80.0, 0.1),
        )
        .unwrap();
        let solver = Solver::with_options(system, options(3)).unwrap();
        assert_eq!(solver.state(), SolverState::StaticMatricesComputed);
        assert!(solver.h(0).iter().all(Coefficients::is_zero));
        assert!(solver.lhn(1).iter().all(Coefficients::is_zero));
        assert!(!solver.e(0)[0].is_zero());
        assert_eq!(solver.tmatrix().pair_counts(), (2, 0));
    }

    #[test]
    fn single_ion_converges_to_born_coefficients() {
        let (kappa, eps_in, eps_out) = (0.1, 4.0, 80.0);
        let system = System::new(
            vec![ion(Vector3::zeros(), 1.0)],
            PhysicalConstants::with_kappa(eps_in, eps_out, kappa),
        )
        .unwrap();
        let mut solver = Solver::with_options(system, options(4)).unwrap();
        let report = solver.solve(1e-8, 10);
        assert!(report.converged);
        assert_eq!(solver.state(), SolverState::Converged);

        let decay = solver.sphere_factors(0)[0].decay;
        let screened = 1.0 / (eps_out * (1.0 + 2.0 * kappa));
        assert_relative_eq!(solver.h(0)[0][(0, 0)].re * decay, screened, max_relative = 1e-10);
        assert_relative_eq!(
            solver.f(0)[0][(0, 0)].re,
            screened - 1.0 / eps_in,
            max_relative = 1e-10
        );
        assert_eq!(solver.prev_h(0), solver.h(0));
        assert_eq!(solver.prev_f(0), solver.f(0));
    }

    #[test]
    fn report_without_sweeps_is_not_converged() {
        let system =
            System::new(vec![ion(Vector3::zeros(), 1.0)], PhysicalConstants::with_kappa(4.0, 80.0, 0.1))
                .unwrap();
        let mut solver = Solver::with_options(system, options(2)).unwrap();
        let report = solver.solve(1e-4, 0);
        assert_eq!(report.iterations, 0);
        assert!(report.mu.is_infinite());
        assert!(matches!(
            report.ensure_converged(),
            Err(PbsamError::NotConverged { max_iterations: 0, .. })
        ));
    }
}
