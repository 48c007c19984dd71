//! Command-line argument parsing for subspace construction

use clap::Parser;
use std::path::PathBuf;

/// Build low-frequency modes of a molecular system from a YAML configuration
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the YAML configuration file
    #[arg(short, long, default_value = "config.yaml")]
    pub config_file: PathBuf,

    /// Override output file: (default stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write the mode vectors to this file
    #[arg(long)]
    pub modes_file: Option<PathBuf>,

    /// Override number of modes
    #[arg(long)]
    pub modes: Option<usize>,

    /// Override eigenvectors kept per block
    #[arg(long)]
    pub bdof: Option<usize>,

    /// Override finite-difference delta
    #[arg(long)]
    pub delta: Option<f64>,

    /// Override residues per block
    #[arg(long)]
    pub residues_per_block: Option<usize>,

    /// Eigensolver backend (nalgebra or jacobi)
    #[arg(long)]
    pub eigen_backend: Option<String>,

    /// Directory for s_eig_out.txt and eigenvectors.txt
    #[arg(long)]
    pub diagnostics_dir: Option<PathBuf>,
}
