use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use lbm_srt::{Config, Diagnostics, Medium, Shape, SrtSolver};
use log::info;
use std::env;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <config.json> [geometry.stl]", args[0]);
        eprintln!("  config.json  - JSON file containing simulation parameters");
        eprintln!("  geometry.stl - optional STL obstacle, one STL unit per cell");
        std::process::exit(1);
    }

    let config_path = &args[1];
    info!("Loading configuration from: {}", config_path);
    let config = Config::from_file(config_path)
        .with_context(|| format!("reading configuration {}", config_path))?;
    let tau = config.tau()?;

    let d = &config.domain;
    info!("Simulation parameters:");
    info!("  Lattice: {:?}", config.lattice);
    info!("  Domain: {}x{}x{}", d.nx, d.ny, d.nz);
    info!("  Tau (relaxation time): {}", tau);
    info!("  Iterations: {}", config.simulation.iterations);
    info!("  Output frequency: {}", config.output.frequency);

    let medium = match args.get(2) {
        Some(stl_path) => Medium::from_stl(stl_path, Shape::new(d.nx, d.ny, d.nz), 1.0)
            .with_context(|| format!("voxelising {}", stl_path))?,
        None => Medium::fluid(d.nx, d.ny, d.nz),
    };

    let out = &config.output;
    let mut diagnostics = Diagnostics::new(
        &out.directory,
        out.precision,
        out.fields.clone(),
        Shape::new(d.nx, d.ny, d.nz),
        out.slice.axis,
        out.slice.index,
    )?;
    if out.vtk {
        diagnostics = diagnostics.with_vtk();
    }

    let mut solver = SrtSolver::new(tau, medium, config.initial_fluid(), config.boundary_set())?
        .with_diagnostics(Box::new(diagnostics), out.frequency);

    let iterations = config.simulation.iterations;
    let progress = ProgressBar::new(iterations as u64);
    progress.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?,
    );

    let mut report = solver.initialize();
    info!("Initial total rho: {}", report.total_rho);
    for _ in 0..iterations {
        report = solver.step()?;
        progress.set_message(format!("rho = {:.6}", report.total_rho));
        progress.inc(1);
    }
    progress.finish_with_message(format!("rho = {:.6}", report.total_rho));

    info!(
        "Simulation completed: {} iterations, total rho {}",
        report.iteration, report.total_rho
    );
    info!("Output files written to: {}", out.directory);
    Ok(())
}
