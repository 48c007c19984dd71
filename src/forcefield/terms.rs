use serde::{Deserialize, Serialize};

/// One force-field term collection, tagged by kind.
///
/// Every variant owns its parameter payload so the partitioner can rebuild a
/// filtered collection of the same kind without inspecting runtime types.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ForceTerm {
    HarmonicBond {
        bonds: Vec<HarmonicBond>,
    },
    HarmonicAngle {
        angles: Vec<HarmonicAngle>,
    },
    PeriodicTorsion {
        torsions: Vec<PeriodicTorsion>,
    },
    /// Ryckaert-Bellemans torsions, used for impropers
    RbTorsion {
        torsions: Vec<RbTorsion>,
    },
    /// Lennard-Jones + Coulomb over all particle pairs, with per-pair exceptions
    Nonbonded {
        particles: Vec<NonbondedParticle>,
        #[serde(default)]
        exceptions: Vec<NonbondedException>,
    },
    /// Explicit list of Lennard-Jones + Coulomb pairs
    PairPotential {
        pairs: Vec<PairInteraction>,
    },
    /// Center-of-mass motion removal; contributes no force
    CenterOfMassMotion,
    /// A term kind this crate cannot evaluate or restrict
    Unsupported {
        name: String,
    },
}

impl ForceTerm {
    pub fn kind(&self) -> &str {
        match self {
            ForceTerm::HarmonicBond { .. } => "harmonic_bond",
            ForceTerm::HarmonicAngle { .. } => "harmonic_angle",
            ForceTerm::PeriodicTorsion { .. } => "periodic_torsion",
            ForceTerm::RbTorsion { .. } => "rb_torsion",
            ForceTerm::Nonbonded { .. } => "nonbonded",
            ForceTerm::PairPotential { .. } => "pair_potential",
            ForceTerm::CenterOfMassMotion => "center_of_mass_motion",
            ForceTerm::Unsupported { name } => name,
        }
    }

    /// Number of individual interactions carried by the term
    pub fn len(&self) -> usize {
        match self {
            ForceTerm::HarmonicBond { bonds } => bonds.len(),
            ForceTerm::HarmonicAngle { angles } => angles.len(),
            ForceTerm::PeriodicTorsion { torsions } => torsions.len(),
            ForceTerm::RbTorsion { torsions } => torsions.len(),
            ForceTerm::Nonbonded { particles, .. } => {
                particles.len() * particles.len().saturating_sub(1) / 2
            }
            ForceTerm::PairPotential { pairs } => pairs.len(),
            ForceTerm::CenterOfMassMotion | ForceTerm::Unsupported { .. } => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Particle index lists of every interaction with explicit participants
    pub fn participants(&self) -> Vec<Vec<usize>> {
        match self {
            ForceTerm::HarmonicBond { bonds } => {
                bonds.iter().map(|b| b.particles.to_vec()).collect()
            }
            ForceTerm::HarmonicAngle { angles } => {
                angles.iter().map(|a| a.particles.to_vec()).collect()
            }
            ForceTerm::PeriodicTorsion { torsions } => {
                torsions.iter().map(|t| t.particles.to_vec()).collect()
            }
            ForceTerm::RbTorsion { torsions } => {
                torsions.iter().map(|t| t.particles.to_vec()).collect()
            }
            ForceTerm::Nonbonded { exceptions, .. } => {
                exceptions.iter().map(|e| e.particles.to_vec()).collect()
            }
            ForceTerm::PairPotential { pairs } => {
                pairs.iter().map(|p| p.particles.to_vec()).collect()
            }
            ForceTerm::CenterOfMassMotion | ForceTerm::Unsupported { .. } => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct HarmonicBond {
    pub particles: [usize; 2],
    /// Equilibrium length (nm)
    pub length: f64,
    /// Force constant (kJ/mol/nm^2)
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct HarmonicAngle {
    /// Vertex is the middle particle
    pub particles: [usize; 3],
    /// Equilibrium angle (rad)
    pub angle: f64,
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PeriodicTorsion {
    pub particles: [usize; 4],
    pub periodicity: u32,
    pub phase: f64,
    pub k: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RbTorsion {
    pub particles: [usize; 4],
    pub coefficients: [f64; 6],
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct NonbondedParticle {
    pub charge: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct NonbondedException {
    pub particles: [usize; 2],
    pub charge_product: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PairInteraction {
    pub particles: [usize; 2],
    pub charge_product: f64,
    pub sigma: f64,
    pub epsilon: f64,
}

impl NonbondedParticle {
    /// Lorentz-Berthelot combination with another particle
    pub fn combine(&self, other: &NonbondedParticle) -> (f64, f64, f64) {
        (
            self.charge * other.charge,
            0.5 * (self.sigma + other.sigma),
            (self.epsilon * other.epsilon).sqrt(),
        )
    }
}
