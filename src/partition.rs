//! Division of the particle table into contiguous blocks and restriction of a
//! force field to intra-block interactions.

use crate::error::{LtmdError, Result};
use crate::forcefield::{pair_key, ForceTerm, NonbondedException, PairInteraction};
use std::collections::HashMap;
use std::ops::Range;
use tracing::{debug, warn};

/// A contiguous half-open particle range `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub index: usize,
    pub start: usize,
    pub end: usize,
}

impl Block {
    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end == self.start
    }

    /// Degrees of freedom (3 per particle)
    pub fn dof(&self) -> usize {
        3 * self.len()
    }

    pub fn first_dof(&self) -> usize {
        3 * self.start
    }

    pub fn dof_range(&self) -> Range<usize> {
        3 * self.start..3 * self.end
    }

    pub fn particles(&self) -> Range<usize> {
        self.start..self.end
    }

    pub fn contains(&self, particle: usize) -> bool {
        self.start <= particle && particle < self.end
    }
}

/// Ordered block boundaries covering every particle exactly once
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockPartition {
    starts: Vec<usize>,
    num_particles: usize,
}

impl BlockPartition {
    /// Group consecutive residues, `residues_per_block` at a time, into blocks
    pub fn from_residues(
        num_particles: usize,
        residue_sizes: &[usize],
        residues_per_block: usize,
    ) -> Result<Self> {
        if residues_per_block == 0 {
            return Err(LtmdError::config("residues_per_block must be positive"));
        }
        if residue_sizes.is_empty() {
            return Err(LtmdError::config("Residue size list is empty"));
        }
        if let Some(r) = residue_sizes.iter().position(|&s| s == 0) {
            return Err(LtmdError::config(format!("Residue {} has no particles", r)));
        }
        let total: usize = residue_sizes.iter().sum();
        if total != num_particles {
            return Err(LtmdError::config(format!(
                "Residue sizes cover {} particles but the system has {}",
                total, num_particles
            )));
        }

        let mut starts = Vec::with_capacity(residue_sizes.len() / residues_per_block + 1);
        let mut first = 0;
        for (r, &size) in residue_sizes.iter().enumerate() {
            if r % residues_per_block == 0 {
                starts.push(first);
            }
            first += size;
        }

        debug!(
            "Partitioned {} particles in {} residues into {} blocks",
            num_particles,
            residue_sizes.len(),
            starts.len()
        );
        Ok(BlockPartition {
            starts,
            num_particles,
        })
    }

    /// Build a partition from explicit block start indices
    pub fn from_starts(starts: Vec<usize>, num_particles: usize) -> Result<Self> {
        if starts.first() != Some(&0) {
            return Err(LtmdError::config("First block must start at particle 0"));
        }
        if starts.windows(2).any(|w| w[0] >= w[1]) {
            return Err(LtmdError::config("Block starts must be strictly increasing"));
        }
        if starts.last().is_some_and(|&s| s >= num_particles) {
            return Err(LtmdError::config(format!(
                "Block start beyond the last of {} particles",
                num_particles
            )));
        }
        Ok(BlockPartition {
            starts,
            num_particles,
        })
    }

    pub fn num_blocks(&self) -> usize {
        self.starts.len()
    }

    pub fn num_particles(&self) -> usize {
        self.num_particles
    }

    pub fn starts(&self) -> &[usize] {
        &self.starts
    }

    pub fn block(&self, index: usize) -> Block {
        let end = self
            .starts
            .get(index + 1)
            .copied()
            .unwrap_or(self.num_particles);
        Block {
            index,
            start: self.starts[index],
            end,
        }
    }

    pub fn blocks(&self) -> impl Iterator<Item = Block> + '_ {
        (0..self.num_blocks()).map(move |b| self.block(b))
    }

    /// Index of the block holding `particle`, `None` when out of range
    pub fn block_of(&self, particle: usize) -> Option<usize> {
        if particle >= self.num_particles {
            return None;
        }
        Some(self.starts.partition_point(|&s| s <= particle) - 1)
    }

    /// Whether every listed particle lies in one block
    pub fn same_block(&self, particles: &[usize]) -> bool {
        let mut blocks = particles.iter().map(|&p| self.block_of(p));
        match blocks.next() {
            Some(Some(first)) => blocks.all(|b| b == Some(first)),
            Some(None) => false,
            None => true,
        }
    }

    /// Degrees of freedom of the largest block
    pub fn largest_block_dof(&self) -> usize {
        self.blocks().map(|b| b.dof()).max().unwrap_or(0)
    }

    /// Copy of `terms` keeping only interactions whose particles share a block.
    ///
    /// Nonbonded collections become explicit pair potentials over the
    /// intra-block pairs, so cross-block nonbonded interactions vanish.
    /// Unrecognized kinds are dropped with a warning.
    pub fn restrict(&self, terms: &[ForceTerm]) -> Vec<ForceTerm> {
        let mut restricted = Vec::with_capacity(terms.len());
        for term in terms {
            let kept = match term {
                ForceTerm::HarmonicBond { bonds } => ForceTerm::HarmonicBond {
                    bonds: self.keep_local(bonds, |b| &b.particles[..]),
                },
                ForceTerm::HarmonicAngle { angles } => ForceTerm::HarmonicAngle {
                    angles: self.keep_local(angles, |a| &a.particles[..]),
                },
                ForceTerm::PeriodicTorsion { torsions } => ForceTerm::PeriodicTorsion {
                    torsions: self.keep_local(torsions, |t| &t.particles[..]),
                },
                ForceTerm::RbTorsion { torsions } => ForceTerm::RbTorsion {
                    torsions: self.keep_local(torsions, |t| &t.particles[..]),
                },
                ForceTerm::PairPotential { pairs } => ForceTerm::PairPotential {
                    pairs: self.keep_local(pairs, |p| &p.particles[..]),
                },
                ForceTerm::Nonbonded {
                    particles,
                    exceptions,
                } => ForceTerm::PairPotential {
                    pairs: self.intra_block_pairs(particles.len(), exceptions, |i, j| {
                        particles[i].combine(&particles[j])
                    }),
                },
                ForceTerm::CenterOfMassMotion => ForceTerm::CenterOfMassMotion,
                ForceTerm::Unsupported { name } => {
                    warn!("Skipping unsupported force term '{}' in block restriction", name);
                    continue;
                }
            };
            debug!(
                "Restricted {} from {} to {} interactions ({})",
                term.kind(),
                term.len(),
                kept.len(),
                kept.kind()
            );
            restricted.push(kept);
        }
        restricted
    }

    fn keep_local<T: Copy>(&self, items: &[T], particles: impl Fn(&T) -> &[usize]) -> Vec<T> {
        items
            .iter()
            .filter(|item| self.same_block(particles(*item)))
            .copied()
            .collect()
    }

    /// Same-block pairs of a nonbonded collection, enumerated block by block
    fn intra_block_pairs(
        &self,
        num_parameterized: usize,
        exceptions: &[NonbondedException],
        combine: impl Fn(usize, usize) -> (f64, f64, f64),
    ) -> Vec<PairInteraction> {
        let overrides: HashMap<(usize, usize), &NonbondedException> = exceptions
            .iter()
            .map(|e| (pair_key(e.particles[0], e.particles[1]), e))
            .collect();

        let mut pairs = Vec::new();
        for block in self.blocks() {
            let end = block.end.min(num_parameterized);
            for i in block.start..end {
                for j in (i + 1)..end {
                    let (charge_product, sigma, epsilon) = match overrides.get(&(i, j)) {
                        Some(e) => (e.charge_product, e.sigma, e.epsilon),
                        None => combine(i, j),
                    };
                    pairs.push(PairInteraction {
                        particles: [i, j],
                        charge_product,
                        sigma,
                        epsilon,
                    });
                }
            }
        }
        pairs
    }
}
