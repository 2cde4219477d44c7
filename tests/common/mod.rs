#![allow(dead_code)]

use std::path::PathBuf;

use gammaspec::data::{InMemoryStore, SimulationConfig, simulate_observations};
use gammaspec::domain::{AnalysisConfig, AxisSpec};
use gammaspec::models::SpectralModel;
use gammaspec::sky::{SkyCoord, SkyRegion};

pub const LIVETIME: f64 = 3600.0;
pub const AEFF: f64 = 1e6;
pub const E_MIN: f64 = 0.3;
pub const E_MAX: f64 = 40.0;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn source_position() -> SkyCoord {
    SkyCoord::new(83.633, 22.014)
}

pub fn circle(radius: f64) -> SkyRegion {
    SkyRegion::circle(source_position(), radius).unwrap()
}

/// Power-law amplitude giving `expected` signal counts over `[E_MIN, E_MAX]`
/// with index 2, reference 1 TeV, flat `AEFF` and `LIVETIME`.
pub fn amplitude_for_counts(expected: f64) -> f64 {
    expected / (AEFF * LIVETIME * (1.0 / E_MIN - 1.0 / E_MAX))
}

/// Wobble observations with a flat, energy-limited effective area and no
/// energy dispersion.
pub fn flat_simulation(n_observations: usize, seed: u64, radius: f64) -> SimulationConfig {
    SimulationConfig {
        n_observations,
        seed,
        livetime: LIVETIME,
        wobble_offset: 1.0,
        source: circle(radius),
        spectrum: SpectralModel::power_law(2.0, amplitude_for_counts(100.0), 1.0),
        background_rate: 5.0,
        aeff_area: AEFF,
        aeff_energy_min: E_MIN,
        aeff_energy_max: E_MAX,
        aeff_sigma_offset: None,
        fov_radius: 2.5,
        edisp_bias: 0.0,
        edisp_resolution: 0.0,
        ..SimulationConfig::default()
    }
}

pub fn flat_store(n_observations: usize, seed: u64, radius: f64) -> InMemoryStore {
    let observations = simulate_observations(&flat_simulation(n_observations, seed, radius)).unwrap();
    InMemoryStore::new(observations)
}

/// Analysis of a circular on region around the source, reco axis over the
/// flat effective-area range and the true axis copied from it.
pub fn flat_analysis(radius: f64) -> AnalysisConfig {
    let mut config = AnalysisConfig::default();
    config.geometry.region = circle(radius);
    config.geometry.energy = AxisSpec::nbin(E_MIN, E_MAX, 10);
    config.geometry.energy_true = None;
    config.model = SpectralModel::power_law(2.2, amplitude_for_counts(80.0), 1.0);
    config
}

pub fn temp_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("gammaspec-{name}-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}
