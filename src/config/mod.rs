//! Configuration management for subspace construction
//!
//! This module handles the YAML input: particle table, force-field terms and
//! construction parameters, plus command-line overrides.

mod args;

pub use args::Args;

use crate::analysis::LtmdParameters;
use crate::error::{LtmdError, Result};
use crate::forcefield::{ForceField, ForceTerm};
use crate::system::Simulation;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Top-level input file
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct Config {
    pub system: SystemConfig,
    /// Force-field term collections, tagged by `kind`
    #[serde(default)]
    pub force_field: Vec<ForceTerm>,
    pub ltmd: LtmdParameters,
}

/// Particle table
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Atomic masses (per atom or single value for all)
    pub masses: MassConfig,
    /// Positions in nm
    pub positions: Vec<[f64; 3]>,
}

/// Mass configuration options
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum MassConfig {
    /// Single mass for all atoms
    Uniform(f64),
    /// Individual masses per atom
    Individual(Vec<f64>),
}

impl MassConfig {
    pub fn resolve(&self, n_atoms: usize) -> Result<Vec<f64>> {
        match self {
            MassConfig::Uniform(mass) => Ok(vec![*mass; n_atoms]),
            MassConfig::Individual(masses) => {
                if masses.len() != n_atoms {
                    return Err(LtmdError::config(format!(
                        "Number of masses ({}) doesn't match number of atoms ({})",
                        masses.len(),
                        n_atoms
                    )));
                }
                Ok(masses.clone())
            }
        }
    }
}

impl Config {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Config = serde_yml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to YAML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yml::to_string(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        let n_atoms = self.system.positions.len();
        if n_atoms == 0 {
            return Err(LtmdError::config("System has no particles"));
        }

        let masses = self.system.masses.resolve(n_atoms)?;
        if let Some(bad) = masses.iter().position(|&m| !(m > 0.0)) {
            return Err(LtmdError::config(format!(
                "Particle {} has non-positive mass {}",
                bad, masses[bad]
            )));
        }

        self.ltmd.validate()?;
        let covered: usize = self.ltmd.residue_sizes.iter().sum();
        if covered != n_atoms {
            return Err(LtmdError::config(format!(
                "Residue sizes cover {} particles but {} positions were given",
                covered, n_atoms
            )));
        }

        for term in &self.force_field {
            for participants in term.participants() {
                if let Some(&p) = participants.iter().find(|&&p| p >= n_atoms) {
                    return Err(LtmdError::config(format!(
                        "{} term references particle {} but only {} exist",
                        term.kind(),
                        p,
                        n_atoms
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.system
            .positions
            .iter()
            .map(|&c| Vector3::new(c[0], c[1], c[2]))
            .collect()
    }

    /// Particle table driven by the configured force field
    pub fn build_simulation(&self) -> Result<Simulation<ForceField>> {
        let positions = self.positions();
        let masses = self.system.masses.resolve(positions.len())?;
        Simulation::new(masses, positions, ForceField::new(self.force_field.clone()))
    }

    /// Apply command-line overrides on top of the file values
    pub fn apply_overrides(&mut self, args: &Args) -> Result<()> {
        if let Some(modes) = args.modes {
            self.ltmd.modes = modes;
        }
        if let Some(bdof) = args.bdof {
            self.ltmd.bdof = bdof;
        }
        if let Some(delta) = args.delta {
            self.ltmd.delta = delta;
        }
        if let Some(residues_per_block) = args.residues_per_block {
            self.ltmd.residues_per_block = residues_per_block;
        }
        if let Some(backend) = &args.eigen_backend {
            self.ltmd.eigen_backend = backend.parse()?;
        }
        if let Some(dir) = &args.diagnostics_dir {
            self.ltmd.diagnostics_dir = Some(dir.clone());
        }
        self.validate()
    }
}
