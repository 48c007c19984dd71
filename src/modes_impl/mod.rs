//! Global mode assembly and refinement
//!
//! The surviving block eigenvectors are merged into a coarse basis E, the true
//! force field is projected onto it and the small projected matrix is
//! diagonalized to give the output modes.
//!
//! # Steps
//!
//! 1. [`assemble_coarse_basis`]: sort every surviving eigenvalue by |λ|. With
//!    more survivors than the quota `bdof × numBlocks`, the value at index
//!    `quota` is the cutoff and only vectors with |λ| strictly below it are
//!    kept, so ties at the cutoff can leave fewer than `quota` columns.
//!    Columns stay in block order.
//! 2. [`reduced_stiffness`]: for each column e_k, displace the true positions
//!    by ±ε e_k/√m, central-difference the forces, mass-scale and project with
//!    Eᵗ. This gives S = Eᵗ H E column by column without ever forming H. S is
//!    then symmetrized.
//! 3. [`refine`]: diagonalize S into Q, reorder by ascending |λ|, take the
//!    largest |λ| as the stiffness bound and back-project U = E Q. The first
//!    `numModes` columns of U, reshaped to per-particle 3-vectors, are the
//!    modes.

mod modes;
#[cfg(test)]
mod tests;

pub use modes::{assemble_coarse_basis, reduced_stiffness, refine, CoarseBasis, ModeSet, Refinement};
