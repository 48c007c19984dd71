//! Subspace construction command-line interface
//!
//! Reads a YAML configuration, builds the low-frequency modes once and reports
//! them.

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr};
use ltmd::config::{Args, Config};
use ltmd::io::{report_modes, setup_output, write_mode_vectors};
use ltmd::{ModeProjection, SimulationContext, SubspaceBuilder};
use std::fs::File;
use std::io::{BufWriter, Write};
use tracing::info;

fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();
    setup_output(args.output.as_deref()).wrap_err("Unable to set up logging")?;

    info!("Reading configuration from: {}", args.config_file.display());
    let mut config = Config::from_file(&args.config_file).wrap_err_with(|| {
        format!(
            "Unable to load configuration file: {}",
            args.config_file.display()
        )
    })?;
    config
        .apply_overrides(&args)
        .wrap_err("Invalid command-line override")?;
    info!("Configuration loaded:\n{:?}", config.ltmd);

    let mut simulation = config
        .build_simulation()
        .wrap_err("Failed to set up the particle table")?;
    info!(
        "System: {} particles, {} force terms",
        simulation.num_particles(),
        config.force_field.len()
    );

    let builder = SubspaceBuilder::new(config.ltmd.clone()).wrap_err("Invalid parameters")?;
    let mut projection = ModeProjection::new(config.ltmd.rediagonalize_frequency);
    projection
        .rebuild(&builder, &mut simulation, &config.force_field)
        .wrap_err("Subspace construction failed")?;

    let modes = projection.modes()?;
    report_modes(modes);

    if let Some(path) = &args.modes_file {
        let file = File::create(path)
            .wrap_err_with(|| format!("Unable to create modes file: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        write_mode_vectors(&mut writer, modes)?;
        writer.flush()?;
        info!("Mode vectors written to: {}", path.display());
    }
    projection.acknowledge();

    Ok(())
}
