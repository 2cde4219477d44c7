//! Top-level application orchestration.
//!
//! `src/main.rs` is intentionally tiny; this module is the "real main" that:
//! - parses CLI arguments
//! - loads configuration and opens the observation store
//! - runs reduction, stacking and the spectral fit
//! - prints reports and writes optional exports

use std::fs::File;
use std::path::{Path, PathBuf};

use clap::Parser;

use crate::cli::{Command, InfoArgs, RunArgs, SimulateArgs};
use crate::data::{DataStore, ObservationSource, SimulationConfig, simulate_observations};
use crate::domain::AnalysisConfig;
use crate::error::AppError;

pub mod pipeline;

/// Entry point for the `gspec` binary.
pub fn run() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = crate::cli::Cli::parse();

    match cli.command {
        Command::Run(args) => handle_run(args),
        Command::Simulate(args) => handle_simulate(args),
        Command::Info(args) => handle_info(args),
        Command::Config => handle_config(),
    }
}

fn handle_run(args: RunArgs) -> Result<(), AppError> {
    let config = config_from_args(&args)?;
    let store = open_store(args.data_dir.as_deref())?;
    let run = pipeline::run_analysis(&config, &store)?;

    println!(
        "{}",
        crate::report::format_run_summary(&config, &run.geom, &run.reduction.datasets, &run.reduction.failures)
    );
    println!("Datasets:");
    println!("{}", crate::report::format_info_table(&run.info));
    println!("Cumulative:");
    println!("{}", crate::report::format_info_table(&run.cumulative));
    println!("{}", crate::report::format_fit_result(&run.fit));

    if args.residuals {
        let residuals = crate::report::compute_residuals(&run.stacked, &run.fit.model)?;
        println!("Residuals (stacked):");
        println!("{}", crate::report::format_residuals(&residuals));
    }

    // Optional exports.
    if let Some(path) = &args.export_dataset {
        crate::io::write_dataset_json(path, &run.stacked)?;
        log::info!("wrote stacked dataset to {}", path.display());
    }
    if let Some(path) = &args.export_params {
        crate::io::write_params_csv(path, &run.fit)?;
        log::info!("wrote parameters to {}", path.display());
    }
    if let Some(path) = &args.export_info {
        crate::io::write_info_csv(path, &run.info)?;
        log::info!("wrote statistics to {}", path.display());
    }

    Ok(())
}

fn handle_simulate(args: SimulateArgs) -> Result<(), AppError> {
    let config = simulation_config_from_args(&args)?;
    let observations = simulate_observations(&config)?;

    let store = DataStore::create(&args.out)?;
    let mut summaries = Vec::with_capacity(observations.len());
    for obs in &observations {
        let path = store.write(obs)?;
        log::debug!("wrote {}", path.display());
        summaries.push(obs.summary());
    }
    store.write_index(&summaries)?;

    println!(
        "Simulated {} observation(s) into {}",
        observations.len(),
        store.dir().display()
    );
    println!("{}", crate::report::format_observations(&summaries));
    Ok(())
}

fn handle_info(args: InfoArgs) -> Result<(), AppError> {
    if !args.dataset.is_empty() {
        let mut datasets = Vec::with_capacity(args.dataset.len());
        for path in &args.dataset {
            datasets.push(crate::io::read_dataset_json(path)?.dataset);
        }
        let rows = crate::datasets::info_table(&datasets);
        println!("{}", crate::report::format_info_table(&rows));
        return Ok(());
    }

    let store = open_store(args.data_dir.as_deref())?;
    let summaries = store.summaries()?;
    println!("Data store: {}", store.dir().display());
    println!("{}", crate::report::format_observations(&summaries));
    Ok(())
}

fn handle_config() -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(&AnalysisConfig::default())
        .map_err(|e| AppError::new(4, format!("Failed to serialize default config: {e}")))?;
    println!("{json}");
    Ok(())
}

/// Configuration file (or defaults) with command-line overrides applied.
pub fn config_from_args(args: &RunArgs) -> Result<AnalysisConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => crate::io::read_config_json(path)?,
        None => AnalysisConfig::default(),
    };
    if args.no_stack {
        config.stack = false;
    }
    if !args.obs_ids.is_empty() {
        config.selection.obs_ids = args.obs_ids.clone();
    }
    if args.region_center {
        config.spectrum.use_region_center = true;
    }
    config.validate()?;
    Ok(config)
}

fn simulation_config_from_args(args: &SimulateArgs) -> Result<SimulationConfig, AppError> {
    let mut config = match &args.config {
        Some(path) => read_simulation_json(path)?,
        None => SimulationConfig::default(),
    };
    if let Some(n) = args.n_obs {
        config.n_observations = n;
    }
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if let Some(livetime) = args.livetime {
        config.livetime = livetime;
    }
    if let Some(wobble) = args.wobble {
        config.wobble_offset = wobble;
    }
    config.validate()?;
    Ok(config)
}

fn read_simulation_json(path: &Path) -> Result<SimulationConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open simulation config '{}': {e}", path.display())))?;
    serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid simulation config '{}': {e}", path.display())))
}

/// `--data-dir` when given, otherwise `$GAMMASPEC_DATA` (a `.env` file is honoured).
fn open_store(dir: Option<&Path>) -> Result<DataStore, AppError> {
    let store = match dir {
        Some(dir) => DataStore::open(PathBuf::from(dir))?,
        None => DataStore::from_env()?,
    };
    Ok(store)
}
