//! Classical force field used for both the true and the block-restricted context
//!
//! A [`ForceField`] is an ordered list of [`ForceTerm`] collections. Every term
//! kind that the partitioner knows how to restrict can also be evaluated here,
//! so a restricted copy of a force field is itself a force provider.
//!
//! # Units
//!
//! Lengths in nm, energies in kJ/mol, charges in elementary charges, angles in
//! radians. Forces come out in kJ/mol/nm.
//!
//! # Term kinds
//!
//! - harmonic bond: ½k(r − r₀)²
//! - harmonic angle: ½k(θ − θ₀)²
//! - periodic torsion: k(1 + cos(nφ − φ₀))
//! - Ryckaert-Bellemans torsion: Σ cₙ cosⁿ(φ − π)
//! - nonbonded / pair potential: 4ε((σ/r)¹² − (σ/r)⁶) + 138.935456·q₁q₂/r
//!
//! Center-of-mass motion removal and unsupported kinds contribute nothing.

mod kernels;
mod terms;

pub use kernels::COULOMB;
pub use terms::{
    ForceTerm, HarmonicAngle, HarmonicBond, NonbondedException, NonbondedParticle,
    PairInteraction, PeriodicTorsion, RbTorsion,
};

use crate::error::{LtmdError, Result};
use crate::system::ForceProvider;
use nalgebra::Vector3;
use std::collections::HashMap;

/// Key for a particle pair that ignores the order the pair was given in
pub(crate) fn pair_key(i: usize, j: usize) -> (usize, usize) {
    if i <= j {
        (i, j)
    } else {
        (j, i)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForceField {
    terms: Vec<ForceTerm>,
}

/// Running energy and force totals for one evaluation
struct Accumulator<'a> {
    positions: &'a [Vector3<f64>],
    forces: Vec<Vector3<f64>>,
    energy: f64,
    term: &'a str,
}

impl<'a> Accumulator<'a> {
    fn new(positions: &'a [Vector3<f64>]) -> Self {
        Accumulator {
            positions,
            forces: vec![Vector3::zeros(); positions.len()],
            energy: 0.0,
            term: "",
        }
    }

    fn gather<const K: usize>(&self, particles: &[usize; K]) -> Result<[Vector3<f64>; K]> {
        let mut out = [Vector3::zeros(); K];
        for (slot, &p) in out.iter_mut().zip(particles) {
            *slot = *self.positions.get(p).ok_or_else(|| {
                LtmdError::evaluation(format!(
                    "{} term references particle {} but the system has {} particles",
                    self.term,
                    p,
                    self.positions.len()
                ))
            })?;
        }
        Ok(out)
    }

    fn scatter<const K: usize>(
        &mut self,
        particles: &[usize; K],
        (energy, forces): (f64, [Vector3<f64>; K]),
    ) {
        self.energy += energy;
        for (&p, f) in particles.iter().zip(forces) {
            self.forces[p] += f;
        }
    }

    fn pair(&mut self, particles: &[usize; 2], charge_product: f64, sigma: f64, epsilon: f64) -> Result<()> {
        let [p0, p1] = self.gather(particles)?;
        let contribution = kernels::lennard_jones_coulomb(p0, p1, charge_product, sigma, epsilon);
        self.scatter(particles, contribution);
        Ok(())
    }

    fn add(&mut self, term: &'a ForceTerm) -> Result<()> {
        self.term = term.kind();
        match term {
            ForceTerm::HarmonicBond { bonds } => {
                for bond in bonds {
                    let [p0, p1] = self.gather(&bond.particles)?;
                    let contribution = kernels::harmonic_bond(p0, p1, bond.length, bond.k);
                    self.scatter(&bond.particles, contribution);
                }
            }
            ForceTerm::HarmonicAngle { angles } => {
                for angle in angles {
                    let p = self.gather(&angle.particles)?;
                    let contribution = kernels::harmonic_angle(p, angle.angle, angle.k);
                    self.scatter(&angle.particles, contribution);
                }
            }
            ForceTerm::PeriodicTorsion { torsions } => {
                for torsion in torsions {
                    let p = self.gather(&torsion.particles)?;
                    let contribution =
                        kernels::periodic_torsion(p, torsion.periodicity, torsion.phase, torsion.k);
                    self.scatter(&torsion.particles, contribution);
                }
            }
            ForceTerm::RbTorsion { torsions } => {
                for torsion in torsions {
                    let p = self.gather(&torsion.particles)?;
                    let contribution = kernels::rb_torsion(p, &torsion.coefficients);
                    self.scatter(&torsion.particles, contribution);
                }
            }
            ForceTerm::Nonbonded {
                particles,
                exceptions,
            } => {
                if particles.len() > self.positions.len() {
                    return Err(LtmdError::dimension(
                        "nonbonded parameters",
                        self.positions.len(),
                        particles.len(),
                    ));
                }
                let overrides: HashMap<(usize, usize), &NonbondedException> = exceptions
                    .iter()
                    .map(|e| (pair_key(e.particles[0], e.particles[1]), e))
                    .collect();

                for i in 0..particles.len() {
                    for j in (i + 1)..particles.len() {
                        let (q, sigma, epsilon) = match overrides.get(&(i, j)) {
                            Some(e) => (e.charge_product, e.sigma, e.epsilon),
                            None => particles[i].combine(&particles[j]),
                        };
                        self.pair(&[i, j], q, sigma, epsilon)?;
                    }
                }
            }
            ForceTerm::PairPotential { pairs } => {
                for pair in pairs {
                    self.pair(&pair.particles, pair.charge_product, pair.sigma, pair.epsilon)?;
                }
            }
            ForceTerm::CenterOfMassMotion | ForceTerm::Unsupported { .. } => {}
        }
        Ok(())
    }
}

impl ForceField {
    pub fn new(terms: Vec<ForceTerm>) -> Self {
        ForceField { terms }
    }

    pub fn terms(&self) -> &[ForceTerm] {
        &self.terms
    }

    fn evaluate<'a>(&'a self, positions: &'a [Vector3<f64>]) -> Result<Accumulator<'a>> {
        let mut acc = Accumulator::new(positions);
        for term in &self.terms {
            acc.add(term)?;
        }
        Ok(acc)
    }

    /// Total potential energy at `positions`
    pub fn energy(&self, positions: &[Vector3<f64>]) -> Result<f64> {
        Ok(self.evaluate(positions)?.energy)
    }
}

impl ForceProvider for ForceField {
    fn compute_forces(&self, positions: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        let acc = self.evaluate(positions)?;
        if let Some(bad) = acc.forces.iter().position(|f| !f.iter().all(|c| c.is_finite())) {
            return Err(LtmdError::evaluation(format!(
                "Non-finite force on particle {}",
                bad
            )));
        }
        Ok(acc.forces)
    }
}
