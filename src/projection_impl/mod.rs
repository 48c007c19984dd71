//! Per-block diagonalization with rigid-body motion projected out
//!
//! Each block sub-Hessian is diagonalized on its own. The eigenvectors are
//! then taken in ascending |λ| and Gram-Schmidt orthogonalized against the
//! block's rigid basis (three mass-weighted translations and up to three
//! mass-weighted rotations about the center of mass) and against every vector
//! accepted before them. A candidate whose squared residual norm drops below
//! [`DISCARD_THRESHOLD`] carries no new direction and is skipped; it does not
//! use up a slot. Acceptance stops once rigid columns plus accepted vectors
//! reach the block's degree-of-freedom count.
//!
//! Rotations about an axis the block is symmetric around (a linear block, or a
//! single particle) have no extent and are left out of the rigid basis, which
//! leaves their slots to vibrational vectors.
//!
//! Blocks share no mutable state, so [`diagonalize_blocks`] handles them on the
//! rayon thread pool and returns results in block order.

mod projection;

pub use projection::{
    diagonalize_block, diagonalize_blocks, rigid_body_basis, BlockModes, DISCARD_THRESHOLD,
};
