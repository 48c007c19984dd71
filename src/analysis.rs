//! Subspace construction driver and the published projection state
//!
//! [`SubspaceBuilder`] runs one full rebuild: partition, block-restricted
//! Hessian, per-block diagonalization, coarse basis, reduced stiffness and
//! refinement. [`ModeProjection`] holds what the integrator consumes between
//! rebuilds.

use crate::error::{LtmdError, Result};
use crate::forcefield::{ForceField, ForceTerm};
use crate::hessian_impl::{build_block_hessian, FiniteDifference};
use crate::io::dump_diagnostics;
use crate::linalg::{EigenBackend, Eigensolver};
use crate::modes_impl::{assemble_coarse_basis, reduced_stiffness, refine, ModeSet};
use crate::partition::BlockPartition;
use crate::projection_impl::diagonalize_blocks;
use crate::system::{Simulation, SimulationContext};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

fn default_residues_per_block() -> usize {
    1
}

fn default_delta() -> f64 {
    1e-4
}

fn default_bdof() -> usize {
    12
}

fn default_rediagonalize_frequency() -> usize {
    1000
}

/// Parameters of one subspace construction
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct LtmdParameters {
    /// Number of modes to publish
    pub modes: usize,
    #[serde(default = "default_residues_per_block")]
    pub residues_per_block: usize,
    /// Particle count of each residue, in particle order
    pub residue_sizes: Vec<usize>,
    /// Finite-difference step (nm), used for both the block Hessian and S
    #[serde(default = "default_delta")]
    pub delta: f64,
    /// Eigenvectors kept per block in the coarse basis quota
    #[serde(default = "default_bdof")]
    pub bdof: usize,
    /// Scale the Hessian step with each coordinate instead of using `delta`
    #[serde(default)]
    pub adaptive_delta: bool,
    /// Integration steps between rebuilds
    #[serde(default = "default_rediagonalize_frequency")]
    pub rediagonalize_frequency: usize,
    #[serde(default)]
    pub eigen_backend: EigenBackend,
    /// Directory for `s_eig_out.txt` and `eigenvectors.txt`
    #[serde(default)]
    pub diagnostics_dir: Option<PathBuf>,
}

impl LtmdParameters {
    pub fn new(modes: usize, residue_sizes: Vec<usize>) -> Self {
        LtmdParameters {
            modes,
            residues_per_block: default_residues_per_block(),
            residue_sizes,
            delta: default_delta(),
            bdof: default_bdof(),
            adaptive_delta: false,
            rediagonalize_frequency: default_rediagonalize_frequency(),
            eigen_backend: EigenBackend::default(),
            diagnostics_dir: None,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.modes == 0 {
            return Err(LtmdError::config("Number of modes must be positive"));
        }
        if self.residues_per_block == 0 {
            return Err(LtmdError::config("residues_per_block must be positive"));
        }
        if self.residue_sizes.is_empty() {
            return Err(LtmdError::config("Residue size list is empty"));
        }
        if !(self.delta > 0.0 && self.delta.is_finite()) {
            return Err(LtmdError::config(format!(
                "Finite-difference delta must be positive, got {}",
                self.delta
            )));
        }
        if self.bdof == 0 {
            return Err(LtmdError::config("bdof must be positive"));
        }
        if self.rediagonalize_frequency == 0 {
            return Err(LtmdError::config("rediagonalize_frequency must be positive"));
        }
        Ok(())
    }

    pub fn finite_difference(&self) -> FiniteDifference {
        FiniteDifference {
            delta: self.delta,
            adaptive: self.adaptive_delta,
        }
    }
}

/// Builds the low-frequency mode set of a system
pub struct SubspaceBuilder {
    params: LtmdParameters,
    solver: Box<dyn Eigensolver>,
}

impl SubspaceBuilder {
    pub fn new(params: LtmdParameters) -> Result<Self> {
        let solver = params.eigen_backend.solver();
        Self::with_solver(params, solver)
    }

    pub fn with_solver(params: LtmdParameters, solver: Box<dyn Eigensolver>) -> Result<Self> {
        params.validate()?;
        Ok(SubspaceBuilder { params, solver })
    }

    pub fn params(&self) -> &LtmdParameters {
        &self.params
    }

    /// Partition by residues, then run [`SubspaceBuilder::build_with_partition`]
    pub fn build<C: SimulationContext + ?Sized>(
        &self,
        context: &mut C,
        terms: &[ForceTerm],
    ) -> Result<ModeSet> {
        let partition = BlockPartition::from_residues(
            context.num_particles(),
            &self.params.residue_sizes,
            self.params.residues_per_block,
        )?;
        self.build_with_partition(context, terms, &partition)
    }

    /// One full rebuild over an explicit partition.
    ///
    /// `terms` describes the force field acting in `context`; its
    /// block-restricted copy drives the Hessian while `context` itself is used
    /// for the reduced stiffness. Positions in `context` are unchanged on
    /// return, whether or not the rebuild succeeds.
    pub fn build_with_partition<C: SimulationContext + ?Sized>(
        &self,
        context: &mut C,
        terms: &[ForceTerm],
        partition: &BlockPartition,
    ) -> Result<ModeSet> {
        let n = context.num_particles();
        if partition.num_particles() != n {
            return Err(LtmdError::config(format!(
                "Block partition covers {} particles but the system has {}",
                partition.num_particles(),
                n
            )));
        }
        let quota = self.params.bdof * partition.num_blocks();
        if self.params.modes > quota {
            return Err(LtmdError::config(format!(
                "Requested {} modes but at most {} can be selected ({} blocks x bdof {})",
                self.params.modes,
                quota,
                partition.num_blocks(),
                self.params.bdof
            )));
        }
        info!(
            "Building subspace: {} particles, {} blocks, largest block {} dof, solver {}",
            n,
            partition.num_blocks(),
            partition.largest_block_dof(),
            self.solver.name()
        );

        let start = Instant::now();
        let hessian = {
            let mut block_context = Simulation::new(
                context.masses().to_vec(),
                context.positions().to_vec(),
                ForceField::new(partition.restrict(terms)),
            )?;
            build_block_hessian(&mut block_context, partition, &self.params.finite_difference())?
        };
        let mut mark = Instant::now();
        info!("Time to compute hessian: {:.3} s", (mark - start).as_secs_f64());

        let block_modes = diagonalize_blocks(
            &hessian,
            context.positions(),
            context.masses(),
            self.solver.as_ref(),
        )?;
        mark = log_phase("diagonalize block hessian", mark);

        let coarse = assemble_coarse_basis(&block_modes, 3 * n, quota)?;
        if self.params.modes > coarse.dimension() {
            return Err(LtmdError::config(format!(
                "Requested {} modes but only {} block eigenvectors were selected",
                self.params.modes,
                coarse.dimension()
            )));
        }
        mark = log_phase("compute E", mark);

        let stiffness = reduced_stiffness(context, &coarse, self.params.delta)?;
        mark = log_phase("compute S", mark);

        let refinement = refine(&stiffness, &coarse, self.params.modes, self.solver.as_ref())?;
        log_phase("compute Q and U", mark);

        if let Some(dir) = &self.params.diagnostics_dir {
            if let Err(err) = dump_diagnostics(dir, &refinement) {
                warn!("Could not write diagnostics to {}: {}", dir.display(), err);
            }
        }

        info!(
            "Subspace built: {} modes from {} coarse vectors, max eigenvalue {:.6e}",
            refinement.modes.len(),
            refinement.modes.coarse_dimension,
            refinement.modes.max_eigenvalue
        );
        info!(
            "Overall diagonalization time: {:.3} s",
            start.elapsed().as_secs_f64()
        );
        Ok(refinement.modes)
    }
}

fn log_phase(phase: &str, since: Instant) -> Instant {
    let now = Instant::now();
    info!("Time to {}: {:.3} s", phase, (now - since).as_secs_f64());
    now
}

/// Mode set shared with the integrator, plus the rebuild schedule
#[derive(Debug, Clone)]
pub struct ModeProjection {
    current: ModeSet,
    changed: bool,
    steps_since_rebuild: usize,
    rebuild_interval: usize,
}

impl ModeProjection {
    pub fn new(rebuild_interval: usize) -> Self {
        ModeProjection {
            current: ModeSet::default(),
            changed: false,
            steps_since_rebuild: 0,
            rebuild_interval,
        }
    }

    /// True before the first rebuild and once the interval has elapsed
    pub fn needs_rebuild(&self) -> bool {
        self.current.is_empty() || self.steps_since_rebuild >= self.rebuild_interval
    }

    pub fn record_step(&mut self) {
        self.steps_since_rebuild += 1;
    }

    pub fn steps_since_rebuild(&self) -> usize {
        self.steps_since_rebuild
    }

    /// Replace the published set; consumers see `changed()` until they acknowledge
    pub fn publish(&mut self, modes: ModeSet) {
        self.current = modes;
        self.changed = true;
        self.steps_since_rebuild = 0;
    }

    /// Run a rebuild and publish it. On failure the previous set stays in effect.
    pub fn rebuild<C: SimulationContext + ?Sized>(
        &mut self,
        builder: &SubspaceBuilder,
        context: &mut C,
        terms: &[ForceTerm],
    ) -> Result<()> {
        let modes = builder.build(context, terms)?;
        self.publish(modes);
        Ok(())
    }

    pub fn changed(&self) -> bool {
        self.changed
    }

    pub fn acknowledge(&mut self) {
        self.changed = false;
    }

    pub fn modes(&self) -> Result<&ModeSet> {
        if self.current.is_empty() {
            return Err(LtmdError::config("Projection vector size is zero"));
        }
        Ok(&self.current)
    }

    pub fn max_eigenvalue(&self) -> f64 {
        self.current.max_eigenvalue
    }
}
