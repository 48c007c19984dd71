// Block-Hessian low-frequency subspace construction

pub mod analysis;
pub mod config;
pub mod error;
pub mod forcefield;
pub mod hessian_impl;
pub mod io;
pub mod linalg;
pub mod modes_impl;
pub mod partition;
pub mod projection_impl;
pub mod system;

pub use analysis::{LtmdParameters, ModeProjection, SubspaceBuilder};
pub use error::{LtmdError, Result};
pub use forcefield::{ForceField, ForceTerm};
pub use linalg::{EigenBackend, Eigensolver};
pub use modes_impl::ModeSet;
pub use partition::{Block, BlockPartition};
pub use system::{ForceProvider, ScopedPositions, Simulation, SimulationContext};
