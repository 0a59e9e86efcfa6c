//! This module implements the re-expansion operator (the T-matrix) that couples spheres.
//!
//! For every ordered pair of distinct spheres (target `(I,k)`, source `(J,l)`) the T-matrix
//! resolves once whether the source's multipole field can be translated analytically onto the
//! target's regular basis or has to go through surface quadrature, and stores the prepared
//! operator as a [`ReExpansion`]. Pairs whose centers are at least `a_k + a_l + margin` apart
//! are analytic; closer (or overlapping) pairs are numerical.
//!
//! In a periodic system the source of an inter-molecular pair is the nearest image of its
//! molecule. Pairs between molecules beyond the system cutoff are not prepared at all and
//! contribute nothing to the coupling fields.

pub mod analytic;
pub mod gradient;
pub mod numerical;

use crate::coefficients::Coefficients;
use crate::system::{SphereId, System, minimum_image};
use analytic::{GradientBlock, RegularTranslation, TranslationBlock};
use gradient::{GradientCoefficients, GradientFrame};
use log::{debug, trace};
use nalgebra::Vector3;
use numerical::NumericalGrid;
use rayon::prelude::*;
use std::collections::HashMap;

/// Green's function a re-expansion propagates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kernel {
    /// `e^{-κr}/r`, the solvent-side kernel of the `H` fields.
    Screened,
    /// `1/r`, the interior kernel of the `F` fields.
    Coulomb,
}

/// The prepared re-expansion of one sphere pair.
#[derive(Debug, Clone, PartialEq)]
pub enum ReExpansion {
    Analytic {
        screened: TranslationBlock,
        /// Present for pairs within one molecule, whose `F` fields are re-expanded too.
        coulomb: Option<TranslationBlock>,
    },
    Numerical(NumericalGrid),
}

impl ReExpansion {
    pub fn is_analytic(&self) -> bool {
        matches!(self, ReExpansion::Analytic { .. })
    }
}

/// Whether a pair at center distance `distance` qualifies for the analytic operator.
pub fn is_well_separated(distance: f64, target_radius: f64, source_radius: f64, margin: f64) -> bool {
    distance >= target_radius + source_radius + margin
}

/// Re-expansion operators for every ordered pair of distinct spheres of a system.
#[derive(Debug, Clone)]
pub struct TMatrix {
    order: usize,
    kappa: f64,
    margin: f64,
    grid_points: usize,
    box_length: Option<f64>,
    /// Molecule centers.
    centers: Vec<Vector3<f64>>,
    /// Center relative to its molecule and radius of every sphere, by molecule.
    spheres: Vec<Vec<(Vector3<f64>, f64)>>,
    entries: HashMap<(SphereId, SphereId), ReExpansion>,
}

impl TMatrix {
    /// Classifies and prepares every pair of `system` within its cutoff.
    ///
    /// # Arguments
    ///
    /// * `system` - The geometry whose sphere pairs are prepared.
    /// * `order` - Truncation order `p` of every operator.
    /// * `margin` - Extra separation, in angstroms, beyond contact that a pair needs to be
    ///   treated analytically.
    /// * `grid_points` - Quadrature size used on the source sphere of numerical pairs.
    pub fn new(system: &System, order: usize, margin: f64, grid_points: usize) -> Self {
        let mut tmatrix = Self {
            order,
            kappa: system.constants().kappa(),
            margin,
            grid_points,
            box_length: system.box_length(),
            centers: Vec::new(),
            spheres: Vec::new(),
            entries: HashMap::new(),
        };
        tmatrix.rebuild(system, interacting_pairs(system, |_, _| true));
        tmatrix
    }

    /// Rebuilds every pair that couples molecule `i` to another molecule, after it moved.
    ///
    /// Pairs within one molecule are invariant under translation and are kept. Pairs that left
    /// the cutoff are dropped and pairs that entered it are prepared.
    pub fn update_molecule(&mut self, system: &System, i: usize) {
        let moved = |target: SphereId, source: SphereId| {
            target.molecule != source.molecule && (target.molecule == i || source.molecule == i)
        };
        self.entries.retain(|&(target, source), _| !moved(target, source));
        self.rebuild(system, interacting_pairs(system, moved));
    }

    /// Rebuilds every pair involving molecule `i`, its own pairs included, after it rotated.
    pub fn reorient_molecule(&mut self, system: &System, i: usize) {
        let touched = |target: SphereId, source: SphereId| {
            target.molecule == i || source.molecule == i
        };
        self.entries.retain(|&(target, source), _| !touched(target, source));
        self.rebuild(system, interacting_pairs(system, touched));
    }

    fn rebuild(&mut self, system: &System, pairs: Vec<(SphereId, SphereId)>) {
        self.centers = system.molecules().iter().map(|mol| mol.center()).collect();
        self.spheres = system
            .molecules()
            .iter()
            .map(|mol| mol.spheres().iter().map(|s| (s.center, s.radius)).collect())
            .collect();

        debug!("Preparing {} sphere pairs", pairs.len());
        let built: Vec<((SphereId, SphereId), ReExpansion)> = pairs
            .into_par_iter()
            .map(|(target, source)| ((target, source), self.prepare(system, target, source)))
            .collect();
        self.entries.extend(built);
    }

    fn prepare(&self, system: &System, target: SphereId, source: SphereId) -> ReExpansion {
        let translation = self.translation(target, source);
        let (target_radius, source_radius) = (self.radius(target), self.radius(source));
        let distance = translation.norm();

        if is_well_separated(distance, target_radius, source_radius, self.margin) {
            trace!("pair {target:?} <- {source:?}: analytic at {distance:.3} A");
            let screened =
                TranslationBlock::new(&translation, source_radius, target_radius, self.kappa, self.order);
            let coulomb = (target.molecule == source.molecule).then(|| {
                TranslationBlock::new(&translation, source_radius, target_radius, 0.0, self.order)
            });
            ReExpansion::Analytic { screened, coulomb }
        } else {
            trace!("pair {target:?} <- {source:?}: numerical at {distance:.3} A");
            ReExpansion::Numerical(NumericalGrid::new(
                system.molecule(source.molecule),
                source.sphere,
                translation,
                target_radius,
                self.grid_points,
            ))
        }
    }

    /// Source center minus target center, through the nearest image across molecules.
    fn translation(&self, target: SphereId, source: SphereId) -> Vector3<f64> {
        let centers = if target.molecule == source.molecule {
            Vector3::zeros()
        } else {
            minimum_image(
                &(self.centers[source.molecule] - self.centers[target.molecule]),
                self.box_length,
            )
        };
        centers + self.spheres[source.molecule][source.sphere].0
            - self.spheres[target.molecule][target.sphere].0
    }

    fn radius(&self, id: SphereId) -> f64 {
        self.spheres[id.molecule][id.sphere].1
    }

    /// Truncation order `p` of every operator.
    pub fn order(&self) -> usize {
        self.order
    }

    /// Inverse Debye length of the screened operators.
    pub fn kappa(&self) -> f64 {
        self.kappa
    }

    /// The prepared operator of a pair, or `None` when the pair is not coupled (same sphere,
    /// beyond the cutoff, or unknown spheres).
    pub fn get(&self, target: SphereId, source: SphereId) -> Option<&ReExpansion> {
        self.entries.get(&(target, source))
    }

    /// Whether the pair is coupled.
    pub fn couples(&self, target: SphereId, source: SphereId) -> bool {
        self.entries.contains_key(&(target, source))
    }

    /// The prepared operator of a pair. Panics when the pair is not coupled.
    pub fn entry(&self, target: SphereId, source: SphereId) -> &ReExpansion {
        self.get(target, source)
            .unwrap_or_else(|| panic!("no re-expansion prepared for {target:?} <- {source:?}"))
    }

    /// Whether the pair uses the closed-form operator. Panics when the pair is not coupled.
    pub fn is_analytic(&self, target: SphereId, source: SphereId) -> bool {
        self.entry(target, source).is_analytic()
    }

    /// Number of analytic and numerical pairs.
    pub fn pair_counts(&self) -> (usize, usize) {
        let analytic = self.entries.values().filter(|e| e.is_analytic()).count();
        (analytic, self.entries.len() - analytic)
    }

    /// Re-expands the multipole coefficients `x` of `source` about `target`.
    ///
    /// The Coulomb kernel is only prepared for pairs within one molecule.
    pub fn re_expand(
        &self,
        x: &Coefficients,
        target: SphereId,
        source: SphereId,
        kernel: Kernel,
    ) -> Coefficients {
        match (self.entry(target, source), kernel) {
            (ReExpansion::Analytic { screened, .. }, Kernel::Screened) => screened.apply(x),
            (ReExpansion::Analytic { coulomb, .. }, Kernel::Coulomb) => coulomb
                .as_ref()
                .unwrap_or_else(|| {
                    panic!("Coulomb re-expansion requested across molecules: {target:?} <- {source:?}")
                })
                .apply(x),
            (ReExpansion::Numerical(grid), Kernel::Screened) => grid.re_expand(x, self.kappa),
            (ReExpansion::Numerical(grid), Kernel::Coulomb) => grid.re_expand(x, 0.0),
        }
    }

    /// Gradient of the screened re-expansion of `x` with respect to the source position,
    /// in the spherical basis of the source-minus-target direction.
    ///
    /// The translation is differentiated analytically regardless of the pair classification.
    pub fn re_expand_gradient(
        &self,
        x: &Coefficients,
        target: SphereId,
        source: SphereId,
    ) -> GradientCoefficients {
        GradientBlock::new(
            &self.translation(target, source),
            self.radius(source),
            self.radius(target),
            self.kappa,
            self.order,
        )
        .apply(x)
    }

    /// Re-expands each cartesian component of a gradient field from `source` to `target`.
    pub fn re_expand_gradient_field(
        &self,
        gradient: &GradientCoefficients,
        target: SphereId,
        source: SphereId,
    ) -> GradientCoefficients {
        let cartesian = gradient.to_cartesian();
        let [x, y, z] = &cartesian.components;
        GradientCoefficients {
            frame: GradientFrame::Cartesian,
            components: [
                self.re_expand(x, target, source, Kernel::Screened),
                self.re_expand(y, target, source, Kernel::Screened),
                self.re_expand(z, target, source, Kernel::Screened),
            ],
        }
    }

    /// Moves a regular (local) expansion about `from` to the center of `to`.
    pub fn translate_regular(
        &self,
        x: &Coefficients,
        from: SphereId,
        to: SphereId,
        kernel: Kernel,
    ) -> Coefficients {
        let kappa = match kernel {
            Kernel::Screened => self.kappa,
            Kernel::Coulomb => 0.0,
        };
        RegularTranslation::new(
            &self.translation(from, to),
            self.radius(from),
            self.radius(to),
            kappa,
            self.order,
        )
        .apply(x)
    }
}

/// Ordered pairs of distinct spheres whose molecules interact under the cutoff and that
/// `include` accepts.
fn interacting_pairs(
    system: &System,
    include: impl Fn(SphereId, SphereId) -> bool,
) -> Vec<(SphereId, SphereId)> {
    system
        .sphere_ids()
        .flat_map(move |target| system.sphere_ids().map(move |source| (target, source)))
        .filter(|&(target, source)| {
            target != source
                && include(target, source)
                && system.within_cutoff(target.molecule, source.molecule)
        })
        .collect()
}
