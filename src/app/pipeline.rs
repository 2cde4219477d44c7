//! Shared analysis pipeline used by the `run` command and the integration tests.
//!
//! Keeping this in one place avoids duplicating the core workflow:
//! selection -> per-observation reduction -> stacking -> statistics -> fit
//!
//! The CLI can then focus on presentation and exports.

use rayon::prelude::*;

use crate::data::{ObsId, Observation, ObservationSource, select_observations};
use crate::datasets::{InfoRow, SpectrumDatasetOnOff, cumulative_info_table, info_table, stack_all};
use crate::domain::AnalysisConfig;
use crate::error::AnalysisError;
use crate::fit::{Fit, FitResult};
use crate::makers::{ReflectedRegionsBackgroundMaker, SafeMaskMaker, SpectrumDatasetMaker};
use crate::sky::RegionGeom;

/// The three per-observation reduction steps, configured once per run.
#[derive(Debug, Clone)]
pub struct Makers {
    pub spectrum: SpectrumDatasetMaker,
    pub background: ReflectedRegionsBackgroundMaker,
    pub safe: SafeMaskMaker,
}

impl Makers {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        Self {
            spectrum: SpectrumDatasetMaker::new(config.spectrum.clone()),
            background: ReflectedRegionsBackgroundMaker::new(config.background.clone()),
            safe: SafeMaskMaker::new(config.safe_mask.clone()),
        }
    }
}

/// Outcome of reducing a set of observations.
///
/// Both lists are ordered by observation id.
#[derive(Debug, Default)]
pub struct ReductionReport {
    pub datasets: Vec<SpectrumDatasetOnOff>,
    pub failures: Vec<(ObsId, AnalysisError)>,
}

/// All computed outputs of a single `gspec run`.
#[derive(Debug)]
pub struct RunOutput {
    pub geom: RegionGeom,
    pub selected: Vec<ObsId>,
    pub reduction: ReductionReport,
    /// Stack of every reduced dataset.
    pub stacked: SpectrumDatasetOnOff,
    pub info: Vec<InfoRow>,
    /// Row `i` summarises the first `i + 1` datasets.
    pub cumulative: Vec<InfoRow>,
    pub fit: FitResult,
}

/// Reduce one observation to a spectrum dataset with background and safe mask.
pub fn reduce_observation(
    geom: &RegionGeom,
    observation: &Observation,
    makers: &Makers,
) -> Result<SpectrumDatasetOnOff, AnalysisError> {
    let dataset = makers.spectrum.run(geom, observation);
    let dataset = makers.background.run(dataset, observation, geom.region())?;
    Ok(makers.safe.run(dataset, observation))
}

/// Load and reduce observations in parallel.
///
/// A failing observation (not found, too few off regions, ...) is recorded
/// and skipped; the others are unaffected.
pub fn reduce_observations(
    geom: &RegionGeom,
    source: &dyn ObservationSource,
    obs_ids: &[ObsId],
    makers: &Makers,
) -> ReductionReport {
    let mut results: Vec<(ObsId, Result<SpectrumDatasetOnOff, AnalysisError>)> = obs_ids
        .par_iter()
        .map(|&obs_id| {
            let result = source
                .load(obs_id)
                .and_then(|obs| reduce_observation(geom, &obs, makers));
            (obs_id, result)
        })
        .collect();
    results.sort_by_key(|(obs_id, _)| *obs_id);

    let mut report = ReductionReport::default();
    for (obs_id, result) in results {
        match result {
            Ok(dataset) => {
                log::debug!("obs {obs_id}: {} safe bins", dataset.n_safe_bins());
                report.datasets.push(dataset);
            }
            Err(err) => {
                log::warn!("obs {obs_id} excluded: {err}");
                report.failures.push((obs_id, err));
            }
        }
    }
    report
}

/// Execute the full analysis against an observation source.
pub fn run_analysis(
    config: &AnalysisConfig,
    source: &dyn ObservationSource,
) -> Result<RunOutput, AnalysisError> {
    config.validate()?;
    let geom = config.geom()?;

    // 1) Select observations.
    let summaries = source.summaries()?;
    let selected = select_observations(&summaries, &config.selection_center(), &config.selection);
    log::info!(
        "selected {} of {} observations",
        selected.len(),
        summaries.len()
    );
    if selected.is_empty() {
        return Err(AnalysisError::EmptyStack);
    }

    // 2) Reduce.
    let makers = Makers::from_config(config);
    let reduction = reduce_observations(&geom, source, &selected, &makers);
    log::info!(
        "reduced {} observations, {} excluded",
        reduction.datasets.len(),
        reduction.failures.len()
    );

    // 3) Stack and summarise.
    let stacked = stack_all(&reduction.datasets)?;
    let info = info_table(&reduction.datasets);
    let cumulative = cumulative_info_table(&reduction.datasets)?;

    // 4) Fit.
    let fit = Fit::new(config.fit.clone());
    let fit = if config.stack {
        fit.run(std::slice::from_ref(&stacked), &config.model)?
    } else {
        fit.run(&reduction.datasets, &config.model)?
    };

    Ok(RunOutput {
        geom,
        selected,
        reduction,
        stacked,
        info,
        cumulative,
        fit,
    })
}
