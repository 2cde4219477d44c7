//! Command-line parsing for the `gspec` spectral analysis tool.
//!
//! The goal of this module is to keep **argument parsing** and **command dispatch**
//! separate from the reduction/fitting code.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Top-level CLI.
#[derive(Debug, Parser)]
#[command(
    name = "gspec",
    version,
    about = "Region-based spectral extraction and fitting for gamma-ray observations"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

/// CLI subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Reduce observations, stack them, fit a spectral model and print a report.
    Run(RunArgs),
    /// Write synthetic observations into a data directory.
    Simulate(SimulateArgs),
    /// List the observations of a data directory, or summarise dataset files.
    Info(InfoArgs),
    /// Print the default analysis configuration as JSON.
    Config,
}

/// Options for a full analysis run.
#[derive(Debug, Args, Clone)]
pub struct RunArgs {
    /// Analysis configuration JSON (defaults are used when omitted).
    #[arg(short = 'c', long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Observation directory (falls back to $GAMMASPEC_DATA).
    #[arg(short = 'd', long, value_name = "DIR")]
    pub data_dir: Option<PathBuf>,

    /// Fit all datasets jointly instead of the stacked dataset.
    #[arg(long)]
    pub no_stack: bool,

    /// Restrict the run to these observation ids.
    #[arg(long = "obs", value_delimiter = ',')]
    pub obs_ids: Vec<u64>,

    /// Use the response at the region centre instead of the region average.
    #[arg(long)]
    pub region_center: bool,

    /// Print per-bin counts versus prediction for the fitted model.
    #[arg(long)]
    pub residuals: bool,

    /// Export the stacked dataset to JSON.
    #[arg(long = "export-dataset", value_name = "JSON")]
    pub export_dataset: Option<PathBuf>,

    /// Export best-fit parameters to CSV.
    #[arg(long = "export-params", value_name = "CSV")]
    pub export_params: Option<PathBuf>,

    /// Export per-dataset statistics to CSV.
    #[arg(long = "export-info", value_name = "CSV")]
    pub export_info: Option<PathBuf>,
}

/// Options for generating a synthetic data store.
#[derive(Debug, Args, Clone)]
pub struct SimulateArgs {
    /// Output directory (created if missing).
    #[arg(short = 'o', long, value_name = "DIR")]
    pub out: PathBuf,

    /// Simulation configuration JSON; flags below override it.
    #[arg(short = 'c', long, value_name = "JSON")]
    pub config: Option<PathBuf>,

    /// Number of observations.
    #[arg(short = 'n', long)]
    pub n_obs: Option<usize>,

    /// Random seed.
    #[arg(long)]
    pub seed: Option<u64>,

    /// Livetime per observation (s).
    #[arg(long)]
    pub livetime: Option<f64>,

    /// Pointing offset from the source (degrees).
    #[arg(long)]
    pub wobble: Option<f64>,
}

/// Options for `gspec info`.
#[derive(Debug, Args, Clone)]
pub struct InfoArgs {
    /// Observation directory (falls back to $GAMMASPEC_DATA).
    #[arg(short = 'd', long, value_name = "DIR", conflicts_with = "dataset")]
    pub data_dir: Option<PathBuf>,

    /// Dataset JSON file(s) produced by `gspec run --export-dataset`.
    #[arg(long, value_name = "JSON", num_args = 1..)]
    pub dataset: Vec<PathBuf>,
}
