//! Input/Output operations for subspace construction
//!
//! This module handles logging setup, mode reports and the text dumps of the
//! reduced-stiffness eigenvectors and final modes.

mod output;

pub use output::{
    dump_diagnostics, report_modes, setup_output, write_mode_vectors, write_stiffness_eigenvectors,
    MODE_VECTORS_FILE, STIFFNESS_EIGENVECTORS_FILE,
};
