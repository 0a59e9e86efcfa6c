//! This module defines the geometric model consumed by the solver.
//!
//! A [`System`] is a set of rigid [`Molecule`]s. Each molecule is a union of dielectric
//! [`Sphere`]s, and each sphere owns the point [`Charge`]s it encloses. Positions are given in
//! absolute coordinates at construction and stored relative to the molecule center, so rigid
//! translation only touches the center and rigid rotation only the relative positions.
//!
//! A system may be periodic in a cubic box, in which case every inter-molecular vector is
//! taken to the nearest image of the other molecule, and may carry a cutoff beyond which two
//! molecules do not interact.

use crate::error::PbsamError;
use crate::params::PhysicalConstants;
use nalgebra::{UnitQuaternion, Vector3};

/// Tolerance, in angstroms, applied to containment and overlap checks.
const GEOMETRY_TOLERANCE: f64 = 1e-9;

/// A point charge of a molecule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Charge {
    /// Position of the charge.
    pub position: Vector3<f64>,
    /// Charge in units of the elementary charge.
    pub charge: f64,
    /// Van der Waals radius in angstroms.
    pub radius: f64,
}

/// A dielectric sphere of a molecule.
#[derive(Debug, Clone, PartialEq)]
pub struct Sphere {
    /// Sphere center.
    pub center: Vector3<f64>,
    /// Sphere radius `a_k` in angstroms.
    pub radius: f64,
    /// Indices, into the molecule's charge list, of the charges this sphere owns.
    pub charges: Vec<usize>,
}

/// Identifies sphere `sphere` of molecule `molecule`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SphereId {
    pub molecule: usize,
    pub sphere: usize,
}

impl SphereId {
    /// Identifies sphere `sphere` (index within its molecule) of molecule `molecule`.
    pub fn new(molecule: usize, sphere: usize) -> Self {
        Self { molecule, sphere }
    }
}

/// A rigid molecule made of charge-bearing dielectric spheres.
#[derive(Debug, Clone, PartialEq)]
pub struct Molecule {
    center: Vector3<f64>,
    charges: Vec<Charge>,
    spheres: Vec<Sphere>,
}

impl Molecule {
    /// Creates a molecule centered on the centroid of its charge positions (or on the centroid
    /// of its sphere centers when it carries no charges).
    ///
    /// Charge and sphere positions are absolute. Validation happens when the molecule joins a
    /// [`System`].
    pub fn new(charges: Vec<Charge>, spheres: Vec<Sphere>) -> Self {
        let center = if charges.is_empty() {
            centroid(spheres.iter().map(|s| s.center))
        } else {
            centroid(charges.iter().map(|c| c.position))
        };
        Self::with_center(center, charges, spheres)
    }

    /// Creates a molecule with an explicit center.
    pub fn with_center(center: Vector3<f64>, charges: Vec<Charge>, spheres: Vec<Sphere>) -> Self {
        let charges = charges
            .into_iter()
            .map(|c| Charge {
                position: c.position - center,
                ..c
            })
            .collect();
        let spheres = spheres
            .into_iter()
            .map(|s| Sphere {
                center: s.center - center,
                ..s
            })
            .collect();
        Self {
            center,
            charges,
            spheres,
        }
    }

    /// A molecule made of a single sphere that owns every charge.
    pub fn single_sphere(center: Vector3<f64>, radius: f64, charges: Vec<Charge>) -> Self {
        let sphere = Sphere {
            center,
            radius,
            charges: (0..charges.len()).collect(),
        };
        Self::with_center(center, charges, vec![sphere])
    }

    /// Absolute position of the molecule center.
    pub fn center(&self) -> Vector3<f64> {
        self.center
    }

    /// Charges with positions relative to the molecule center.
    pub fn charges(&self) -> &[Charge] {
        &self.charges
    }

    /// Spheres with centers relative to the molecule center.
    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    /// Number of dielectric spheres.
    pub fn sphere_count(&self) -> usize {
        self.spheres.len()
    }

    /// Absolute center of sphere `k`.
    pub fn sphere_center(&self, k: usize) -> Vector3<f64> {
        self.center + self.spheres[k].center
    }

    /// Radius of the smallest sphere about the molecule center enclosing every sphere.
    pub fn enclosing_radius(&self) -> f64 {
        self.spheres
            .iter()
            .map(|s| s.center.norm() + s.radius)
            .fold(0.0, f64::max)
    }

    /// Total charge in elementary charges.
    pub fn net_charge(&self) -> f64 {
        self.charges.iter().map(|c| c.charge).sum()
    }

    /// Whether `point` (relative to the molecule center) lies inside any sphere other than `k`.
    pub fn is_buried(&self, k: usize, point: &Vector3<f64>) -> bool {
        self.spheres
            .iter()
            .enumerate()
            .any(|(j, s)| j != k && (point - s.center).norm() < s.radius - GEOMETRY_TOLERANCE)
    }

    /// Moves the molecule rigidly by `displacement`.
    pub fn translate(&mut self, displacement: &Vector3<f64>) {
        self.center += displacement;
    }

    /// Rotates the molecule rigidly about its center.
    pub fn rotate(&mut self, rotation: &UnitQuaternion<f64>) {
        for charge in &mut self.charges {
            charge.position = rotation * charge.position;
        }
        for sphere in &mut self.spheres {
            sphere.center = rotation * sphere.center;
        }
    }

    fn validate(&self, index: usize) -> Result<(), PbsamError> {
        if self.spheres.is_empty() {
            return Err(PbsamError::EmptyMolecule(index));
        }

        let mut owners = vec![0usize; self.charges.len()];
        for (k, sphere) in self.spheres.iter().enumerate() {
            if !(sphere.radius.is_finite() && sphere.radius > 0.0) {
                return Err(PbsamError::InvalidRadius {
                    molecule: index,
                    sphere: k,
                    radius: sphere.radius,
                });
            }
            for &alpha in &sphere.charges {
                let charge = self.charges.get(alpha).ok_or(PbsamError::InvalidChargeIndex {
                    molecule: index,
                    sphere: k,
                    charge: alpha,
                })?;
                let distance = (charge.position - sphere.center).norm();
                if distance > sphere.radius + GEOMETRY_TOLERANCE {
                    return Err(PbsamError::ChargeOutsideSphere {
                        molecule: index,
                        sphere: k,
                        charge: alpha,
                        distance,
                        radius: sphere.radius,
                    });
                }
                owners[alpha] += 1;
            }
        }

        if let Some((alpha, &count)) = owners.iter().enumerate().find(|(_, count)| **count != 1) {
            return Err(PbsamError::UnassignedCharge {
                molecule: index,
                charge: alpha,
                owners: count,
            });
        }
        Ok(())
    }
}

/// Nearest-image form of `v` in a cubic box of edge `box_length`; `v` itself without a box.
pub fn minimum_image(v: &Vector3<f64>, box_length: Option<f64>) -> Vector3<f64> {
    match box_length {
        Some(length) => v.map(|x| x - length * (x / length).round()),
        None => *v,
    }
}

/// The full assembly of molecules together with its physical constants.
#[derive(Debug, Clone, PartialEq)]
pub struct System {
    molecules: Vec<Molecule>,
    constants: PhysicalConstants,
    box_length: Option<f64>,
    cutoff: Option<f64>,
}

impl System {
    /// Validates and assembles a system.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::NoMolecules` for an empty input, one of the molecule validation
    /// errors (`EmptyMolecule`, `InvalidRadius`, `InvalidChargeIndex`, `ChargeOutsideSphere`,
    /// `UnassignedCharge`), or `PbsamError::OverlappingMolecules` when spheres of two
    /// different molecules intersect.
    pub fn new(molecules: Vec<Molecule>, constants: PhysicalConstants) -> Result<Self, PbsamError> {
        if molecules.is_empty() {
            return Err(PbsamError::NoMolecules);
        }
        for (i, molecule) in molecules.iter().enumerate() {
            molecule.validate(i)?;
        }
        let system = Self {
            molecules,
            constants,
            box_length: None,
            cutoff: None,
        };
        system.check_for_overlap()?;
        Ok(system)
    }

    /// Makes the system periodic in a cubic box of edge `box_length` angstroms.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::InvalidBoundary` for a non-positive edge or one shorter than twice
    /// the cutoff, and `PbsamError::OverlappingMolecules` when two nearest images intersect.
    pub fn with_periodic_box(mut self, box_length: f64) -> Result<Self, PbsamError> {
        if !(box_length.is_finite() && box_length > 0.0) {
            return Err(PbsamError::InvalidBoundary(format!(
                "box length must be positive, got {box_length}"
            )));
        }
        self.box_length = Some(box_length);
        self.check_boundary()?;
        self.check_for_overlap()?;
        Ok(self)
    }

    /// Restricts inter-molecular coupling to molecule pairs whose centers are closer than
    /// `cutoff` angstroms.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::InvalidBoundary` for a non-positive cutoff or one longer than half
    /// the periodic box.
    pub fn with_cutoff(mut self, cutoff: f64) -> Result<Self, PbsamError> {
        if !(cutoff.is_finite() && cutoff > 0.0) {
            return Err(PbsamError::InvalidBoundary(format!(
                "cutoff must be positive, got {cutoff}"
            )));
        }
        self.cutoff = Some(cutoff);
        self.check_boundary()?;
        Ok(self)
    }

    /// All molecules, in input order.
    pub fn molecules(&self) -> &[Molecule] {
        &self.molecules
    }

    /// Molecule `i`. Panics when out of range.
    pub fn molecule(&self, i: usize) -> &Molecule {
        &self.molecules[i]
    }

    /// Number of molecules.
    pub fn len(&self) -> usize {
        self.molecules.len()
    }

    /// Whether the system holds no molecules. Never true for a validated system.
    pub fn is_empty(&self) -> bool {
        self.molecules.is_empty()
    }

    /// Permittivities and screening of the solvent.
    pub fn constants(&self) -> &PhysicalConstants {
        &self.constants
    }

    /// Edge of the periodic box, if any.
    pub fn box_length(&self) -> Option<f64> {
        self.box_length
    }

    /// Inter-molecular cutoff, if any.
    pub fn cutoff(&self) -> Option<f64> {
        self.cutoff
    }

    /// Vector from the center of molecule `i` to the nearest image of the center of `j`.
    pub fn molecule_displacement(&self, i: usize, j: usize) -> Vector3<f64> {
        minimum_image(
            &(self.molecules[j].center - self.molecules[i].center),
            self.box_length,
        )
    }

    /// Whether molecules `i` and `j` interact under the cutoff. A molecule always interacts
    /// with itself.
    pub fn within_cutoff(&self, i: usize, j: usize) -> bool {
        match self.cutoff {
            Some(cutoff) if i != j => self.molecule_displacement(i, j).norm() < cutoff,
            _ => true,
        }
    }

    /// Vector from the center of sphere `target` to the center of sphere `source`, using the
    /// nearest image of the source molecule when the two belong to different molecules.
    pub fn sphere_translation(&self, target: SphereId, source: SphereId) -> Vector3<f64> {
        let (from, to) = (
            &self.molecules[target.molecule],
            &self.molecules[source.molecule],
        );
        let centers = if target.molecule == source.molecule {
            Vector3::zeros()
        } else {
            self.molecule_displacement(target.molecule, source.molecule)
        };
        centers + to.spheres[source.sphere].center - from.spheres[target.sphere].center
    }

    /// Total number of spheres over all molecules.
    pub fn sphere_count(&self) -> usize {
        self.molecules.iter().map(Molecule::sphere_count).sum()
    }

    /// Every sphere of the system, in molecule-major order.
    pub fn sphere_ids(&self) -> impl Iterator<Item = SphereId> + '_ {
        self.molecules.iter().enumerate().flat_map(|(i, mol)| {
            (0..mol.sphere_count()).map(move |k| SphereId::new(i, k))
        })
    }

    /// Sphere `id`, with its center relative to its molecule.
    pub fn sphere(&self, id: SphereId) -> &Sphere {
        &self.molecules[id.molecule].spheres[id.sphere]
    }

    /// Absolute center of a sphere.
    pub fn sphere_center(&self, id: SphereId) -> Vector3<f64> {
        self.molecules[id.molecule].sphere_center(id.sphere)
    }

    /// Distance between the centers of two spheres (nearest image across molecules).
    pub fn sphere_distance(&self, a: SphereId, b: SphereId) -> f64 {
        self.sphere_translation(a, b).norm()
    }

    /// Average enclosing radius of the molecules (λ).
    pub fn average_radius(&self) -> f64 {
        let total: f64 = self.molecules.iter().map(Molecule::enclosing_radius).sum();
        total / self.molecules.len() as f64
    }

    /// Translates molecule `i` rigidly, refusing moves that would create an overlap.
    ///
    /// # Arguments
    ///
    /// * `i` - Index of the molecule to move.
    /// * `displacement` - Rigid displacement in angstroms.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::MoleculeIndexOutOfRange` or `PbsamError::OverlappingMolecules`.
    /// On error the system is left unchanged.
    pub fn translate_molecule(
        &mut self,
        i: usize,
        displacement: &Vector3<f64>,
    ) -> Result<(), PbsamError> {
        self.check_index(i)?;
        self.molecules[i].translate(displacement);
        if let Err(error) = self.check_for_overlap() {
            self.molecules[i].translate(&-displacement);
            return Err(error);
        }
        Ok(())
    }

    /// Rotates molecule `i` rigidly about its center, refusing rotations that would create an
    /// overlap.
    ///
    /// # Arguments
    ///
    /// * `i` - Index of the molecule to rotate.
    /// * `rotation` - Rotation applied to every charge and sphere position.
    ///
    /// # Errors
    ///
    /// Returns `PbsamError::MoleculeIndexOutOfRange` or `PbsamError::OverlappingMolecules`.
    /// On error the system is left unchanged.
    pub fn rotate_molecule(
        &mut self,
        i: usize,
        rotation: &UnitQuaternion<f64>,
    ) -> Result<(), PbsamError> {
        self.check_index(i)?;
        let original = self.molecules[i].clone();
        self.molecules[i].rotate(rotation);
        if let Err(error) = self.check_for_overlap() {
            self.molecules[i] = original;
            return Err(error);
        }
        Ok(())
    }

    fn check_index(&self, i: usize) -> Result<(), PbsamError> {
        if i >= self.molecules.len() {
            return Err(PbsamError::MoleculeIndexOutOfRange {
                index: i,
                count: self.molecules.len(),
            });
        }
        Ok(())
    }

    fn check_boundary(&self) -> Result<(), PbsamError> {
        if let (Some(length), Some(cutoff)) = (self.box_length, self.cutoff) {
            if cutoff > 0.5 * length {
                return Err(PbsamError::InvalidBoundary(format!(
                    "cutoff {cutoff} exceeds half the box length {length}"
                )));
            }
        }
        Ok(())
    }

    fn check_for_overlap(&self) -> Result<(), PbsamError> {
        for (i, first) in self.molecules.iter().enumerate() {
            for (j, second) in self.molecules.iter().enumerate().skip(i + 1) {
                let displacement = self.molecule_displacement(i, j);
                if displacement.norm() > first.enclosing_radius() + second.enclosing_radius() {
                    continue;
                }
                for a in &first.spheres {
                    for b in &second.spheres {
                        let distance = (displacement + b.center - a.center).norm();
                        if distance < a.radius + b.radius - GEOMETRY_TOLERANCE {
                            return Err(PbsamError::OverlappingMolecules {
                                first: i,
                                second: j,
                            });
                        }
                    }
                }
            }
        }
        Ok(())
    }
}

fn centroid(points: impl Iterator<Item = Vector3<f64>>) -> Vector3<f64> {
    let (sum, count) = points.fold((Vector3::zeros(), 0usize), |(sum, n), p| (sum + p, n + 1));
    if count == 0 { sum } else { sum / count as f64 }
}
