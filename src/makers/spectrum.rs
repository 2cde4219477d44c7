//! Counts and response extraction for one observation.

use serde::{Deserialize, Serialize};

use crate::data::Observation;
use crate::datasets::{DatasetMeta, SpectrumDatasetOnOff};
use crate::irf::{EDispKernel, EnergyDispersion2D};
use crate::makers::response::{ResponseMode, SamplingConfig, region_response};
use crate::sky::RegionGeom;

/// Which quantities the maker fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakerSelection {
    pub counts: bool,
    pub exposure: bool,
    pub edisp: bool,
}

impl Default for MakerSelection {
    fn default() -> Self {
        Self {
            counts: true,
            exposure: true,
            edisp: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpectrumMakerConfig {
    pub selection: MakerSelection,
    /// Evaluate the response at the region centre only.
    pub use_region_center: bool,
    pub sampling: SamplingConfig,
}

#[derive(Debug, Clone, Default)]
pub struct SpectrumDatasetMaker {
    config: SpectrumMakerConfig,
}

impl SpectrumDatasetMaker {
    pub fn new(config: SpectrumMakerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &SpectrumMakerConfig {
        &self.config
    }

    /// Fill counts, exposure and dispersion for `observation` in `geom`.
    pub fn run(&self, geom: &RegionGeom, observation: &Observation) -> SpectrumDatasetOnOff {
        let mut dataset = SpectrumDatasetOnOff::empty(format!("obs-{}", observation.obs_id), geom);
        dataset.livetime = observation.livetime;
        dataset.meta = DatasetMeta {
            obs_ids: vec![observation.obs_id],
            offset: Some(observation.offset_of(&geom.region().center())),
            ..DatasetMeta::default()
        };

        if self.config.selection.counts {
            for event in observation.events_in(geom.region()) {
                if let Some(r) = geom.energy().bin_of(event.energy) {
                    dataset.counts[r] += 1.0;
                }
            }
        }

        if self.config.selection.exposure || self.config.selection.edisp {
            let mode = if self.config.use_region_center {
                ResponseMode::RegionCenter
            } else {
                ResponseMode::RegionAverage(self.config.sampling)
            };
            let response = region_response(
                observation,
                geom.region(),
                geom.energy_true(),
                geom.energy(),
                mode,
            );
            dataset.meta.response_converged = Some(response.converged);
            dataset.exposure_valid = response.valid;
            if self.config.selection.exposure {
                dataset.exposure = response.exposure;
            }
            dataset.edisp = if self.config.selection.edisp {
                response.edisp
            } else {
                diagonal_kernel(geom)
            };
            log::debug!(
                "obs {}: response from {} samples (converged: {})",
                observation.obs_id,
                response.n_samples,
                response.converged
            );
        } else {
            dataset.edisp = diagonal_kernel(geom);
        }

        dataset
    }
}

fn diagonal_kernel(geom: &RegionGeom) -> EDispKernel {
    EDispKernel::from_edisp(&EnergyDispersion2D::perfect(), 0.0, geom.energy_true(), geom.energy())
}
