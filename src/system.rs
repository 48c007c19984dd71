use crate::error::{LtmdError, Result};
use nalgebra::Vector3;
use tracing::warn;

/// Computes per-particle forces for a configuration
pub trait ForceProvider {
    fn compute_forces(&self, positions: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>>;
}

/// The particle table the subspace pipeline reads and perturbs
pub trait SimulationContext {
    fn masses(&self) -> &[f64];

    fn positions(&self) -> &[Vector3<f64>];

    fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<()>;

    /// Forces at the current positions
    fn forces(&mut self) -> Result<Vec<Vector3<f64>>>;

    fn num_particles(&self) -> usize {
        self.masses().len()
    }
}

/// Particles plus the force provider that acts on them
pub struct Simulation<F: ForceProvider> {
    masses: Vec<f64>,
    positions: Vec<Vector3<f64>>,
    provider: F,
}

impl<F: ForceProvider> Simulation<F> {
    pub fn new(masses: Vec<f64>, positions: Vec<Vector3<f64>>, provider: F) -> Result<Self> {
        if masses.len() != positions.len() {
            return Err(LtmdError::config(format!(
                "Number of masses ({}) doesn't match number of positions ({})",
                masses.len(),
                positions.len()
            )));
        }
        if let Some(bad) = masses.iter().position(|&m| !(m > 0.0)) {
            return Err(LtmdError::config(format!(
                "Particle {} has non-positive mass {}",
                bad, masses[bad]
            )));
        }
        Ok(Simulation {
            masses,
            positions,
            provider,
        })
    }

    pub fn provider(&self) -> &F {
        &self.provider
    }
}

impl<F: ForceProvider> SimulationContext for Simulation<F> {
    fn masses(&self) -> &[f64] {
        &self.masses
    }

    fn positions(&self) -> &[Vector3<f64>] {
        &self.positions
    }

    fn set_positions(&mut self, positions: &[Vector3<f64>]) -> Result<()> {
        if positions.len() != self.positions.len() {
            return Err(LtmdError::dimension(
                "set_positions",
                self.positions.len(),
                positions.len(),
            ));
        }
        self.positions.copy_from_slice(positions);
        Ok(())
    }

    fn forces(&mut self) -> Result<Vec<Vector3<f64>>> {
        self.provider.compute_forces(&self.positions)
    }
}

/// Exclusive access to a context's positions for finite-difference work.
///
/// The positions seen on construction are put back by [`ScopedPositions::restore`]
/// or, on any early return, when the scope is dropped.
pub struct ScopedPositions<'a, C: SimulationContext + ?Sized> {
    context: &'a mut C,
    original: Vec<Vector3<f64>>,
    restored: bool,
}

impl<'a, C: SimulationContext + ?Sized> ScopedPositions<'a, C> {
    pub fn new(context: &'a mut C) -> Self {
        let original = context.positions().to_vec();
        ScopedPositions {
            context,
            original,
            restored: false,
        }
    }

    /// Positions as they were when the scope was opened
    pub fn original(&self) -> &[Vector3<f64>] {
        &self.original
    }

    pub fn masses(&self) -> &[f64] {
        self.context.masses()
    }

    /// Move the context to `positions` and evaluate forces there
    pub fn forces_at(&mut self, positions: &[Vector3<f64>]) -> Result<Vec<Vector3<f64>>> {
        self.context.set_positions(positions)?;
        let forces = self.context.forces()?;
        if forces.len() != positions.len() {
            return Err(LtmdError::dimension(
                "force evaluation",
                positions.len(),
                forces.len(),
            ));
        }
        Ok(forces)
    }

    pub fn restore(mut self) -> Result<()> {
        self.restored = true;
        self.context.set_positions(&self.original)
    }
}

impl<C: SimulationContext + ?Sized> Drop for ScopedPositions<'_, C> {
    fn drop(&mut self) {
        if self.restored {
            return;
        }
        if let Err(err) = self.context.set_positions(&self.original) {
            warn!("Failed to restore positions after perturbation: {}", err);
        }
    }
}
