//! Block-diagonal Hessian by central finite differences of forces
//!
//! Only interactions inside a block contribute, so the Hessian of the
//! block-restricted force field is block diagonal. Each finite-difference step
//! perturbs the same local degree of freedom in every block at once: the
//! displaced coordinates in different blocks never interact, so a single pair
//! of force evaluations fills one column of every block sub-Hessian.
//!
//! # Entries
//!
//! For local column `i` of a block (particle `a`) and every row `j` of the same
//! block (particle `b`):
//!
//! H[j][i] = (F_j(x − δ e_i) − F_j(x + δ e_i)) / (2δ √(m_a m_b))
//!
//! which is the mass-weighted second derivative of the potential. Each block is
//! symmetrized by averaging mirrored entries afterwards.
//!
//! # Step size
//!
//! [`perturbation_delta`] returns the configured fixed step unless
//! [`FiniteDifference::adaptive`] is set, in which case a coordinate-scaled
//! step `√δ · max(|x|, 0.1)` is used instead.

mod hessian;
#[cfg(test)]
mod tests;

pub use hessian::{build_block_hessian, perturbation_delta, BlockHessian, FiniteDifference};
