//! Output formatting and logging utilities

use crate::error::Result;
use crate::modes_impl::{ModeSet, Refinement};
use nalgebra::DMatrix;
use std::fmt;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::time::SystemTime as StdSystemTime;
use tracing::info;
use tracing_subscriber::{
    fmt::format::Writer, fmt::layer, fmt::time::FormatTime, layer::SubscriberExt,
    util::SubscriberInitExt, Registry,
};

/// File name of the reduced-stiffness eigenvector dump
pub const STIFFNESS_EIGENVECTORS_FILE: &str = "s_eig_out.txt";
/// File name of the mode vector dump
pub const MODE_VECTORS_FILE: &str = "eigenvectors.txt";

/// Custom time formatter that shows only seconds
struct SecondPrecisionTimer;

impl FormatTime for SecondPrecisionTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        let now = StdSystemTime::now();
        let duration = now
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default();

        // HH:MM:SS
        let total_seconds = duration.as_secs();
        let hours = (total_seconds / 3600) % 24;
        let minutes = (total_seconds / 60) % 60;
        let seconds = total_seconds % 60;

        write!(w, "{:02}:{:02}:{:02}", hours, minutes, seconds)
    }
}

/// Setup logging to a file, or to stdout when no path is given
pub fn setup_output(output_path: Option<&Path>) -> Result<()> {
    match output_path {
        Some(path) => {
            let log = File::create(path)?;
            let file_layer = layer()
                .with_writer(Mutex::new(log))
                .with_timer(SecondPrecisionTimer)
                .with_ansi(false);
            if Registry::default().with(file_layer).try_init().is_err() {
                eprintln!("Logging already initialized, not redirecting to {}", path.display());
            }
            info!("Output will be written to: {}", path.display());
        }
        None => {
            let stdout_layer = layer()
                .with_writer(std::io::stdout)
                .with_timer(SecondPrecisionTimer)
                .with_ansi(true);
            if Registry::default().with(stdout_layer).try_init().is_ok() {
                info!("Output will be printed to stdout");
            }
        }
    }
    Ok(())
}

/// Write every entry of the solver-order eigenvectors of S as `row column value`
pub fn write_stiffness_eigenvectors<W: Write>(writer: &mut W, q: &DMatrix<f64>) -> Result<()> {
    for col in 0..q.ncols() {
        for row in 0..q.nrows() {
            writeln!(writer, "{} {} {:.9e}", row, col, q[(row, col)])?;
        }
    }
    Ok(())
}

/// Write each mode as `component mode value` lines, component = 3 * particle + axis
pub fn write_mode_vectors<W: Write>(writer: &mut W, modes: &ModeSet) -> Result<()> {
    for (i, mode) in modes.modes.iter().enumerate() {
        for (j, v) in mode.iter().enumerate() {
            for c in 0..3 {
                writeln!(writer, "{} {} {:.9e}", 3 * j + c, i, v[c])?;
            }
        }
    }
    Ok(())
}

/// Write both diagnostic dumps of a refinement into `dir`
pub fn dump_diagnostics(dir: &Path, refinement: &Refinement) -> Result<()> {
    fs::create_dir_all(dir)?;

    let mut s_eig = BufWriter::new(File::create(dir.join(STIFFNESS_EIGENVECTORS_FILE))?);
    write_stiffness_eigenvectors(&mut s_eig, &refinement.stiffness_eigenvectors)?;
    s_eig.flush()?;

    let mut modes = BufWriter::new(File::create(dir.join(MODE_VECTORS_FILE))?);
    write_mode_vectors(&mut modes, &refinement.modes)?;
    modes.flush()?;

    info!("Diagnostics written to {}", dir.display());
    Ok(())
}

/// Log a summary of a published mode set
pub fn report_modes(modes: &ModeSet) {
    info!(
        "{} modes from a {}-vector coarse basis",
        modes.len(),
        modes.coarse_dimension
    );
    for (i, (mode, lambda)) in modes.modes.iter().zip(&modes.eigenvalues).enumerate() {
        let norm = mode.iter().map(|v| v.norm_squared()).sum::<f64>().sqrt();
        info!("  Mode {:>3}: eigenvalue {:>14.6e}, norm {:.6}", i, lambda, norm);
    }
    info!("Maximum eigenvalue: {:.6e}", modes.max_eigenvalue);
}
