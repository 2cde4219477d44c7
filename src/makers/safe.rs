//! Safe energy range.
//!
//! Each method marks reconstructed-energy bins it considers unreliable; a bin
//! is safe only when every configured method keeps it. On top of the methods,
//! a reco bin whose matching true bin has invalid exposure is always unsafe.
//! The mask is rebuilt from scratch on every run, so applying the maker twice
//! gives the same result as applying it once.

use serde::{Deserialize, Serialize};

use crate::data::Observation;
use crate::datasets::SpectrumDatasetOnOff;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "kebab-case")]
pub enum SafeMaskMethod {
    /// Drop bins where the effective area is below `percent` of its peak.
    AeffMax { percent: f64 },
    /// Keep bins inside the thresholds declared with the effective area.
    AeffDefault,
    /// Drop bins below the lowest energy with |bias| under `percent`.
    EdispBias { percent: f64 },
    /// Drop the whole dataset when the on region is further than this from the pointing.
    OffsetMax { max_offset_deg: f64 },
    /// Drop bins with fewer off counts than this.
    MinOffCounts { min: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafeMaskConfig {
    pub methods: Vec<SafeMaskMethod>,
}

impl Default for SafeMaskConfig {
    fn default() -> Self {
        Self {
            methods: vec![SafeMaskMethod::AeffMax { percent: 10.0 }],
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct SafeMaskMaker {
    config: SafeMaskConfig,
}

impl SafeMaskMaker {
    pub fn new(config: SafeMaskConfig) -> Self {
        Self { config }
    }

    pub fn run(&self, mut dataset: SpectrumDatasetOnOff, observation: &Observation) -> SpectrumDatasetOnOff {
        let mut mask = valid_exposure_mask(&dataset);
        let offset = dataset.meta.offset.unwrap_or(0.0);

        for method in &self.config.methods {
            let keep = match method {
                SafeMaskMethod::AeffMax { percent } => {
                    aeff_max_mask(&dataset, observation, offset, *percent)
                }
                SafeMaskMethod::AeffDefault => aeff_default_mask(&dataset, observation),
                SafeMaskMethod::EdispBias { percent } => {
                    edisp_bias_mask(&dataset, observation, offset, *percent)
                }
                SafeMaskMethod::OffsetMax { max_offset_deg } => {
                    vec![offset <= *max_offset_deg; dataset.energy.nbin()]
                }
                SafeMaskMethod::MinOffCounts { min } => match &dataset.counts_off {
                    Some(off) => off.iter().map(|n| n >= min).collect(),
                    None => vec![true; dataset.energy.nbin()],
                },
            };
            for (m, k) in mask.iter_mut().zip(keep) {
                *m &= k;
            }
        }

        let n_safe = mask.iter().filter(|m| **m).count();
        if n_safe == 0 {
            log::warn!("obs {}: no safe energy bins left", observation.obs_id);
        } else {
            log::debug!(
                "obs {}: {n_safe}/{} safe energy bins",
                observation.obs_id,
                mask.len()
            );
        }
        dataset.mask_safe = mask;
        dataset
    }
}

/// Reco bins whose centre maps to a true bin with invalid exposure are unsafe.
fn valid_exposure_mask(dataset: &SpectrumDatasetOnOff) -> Vec<bool> {
    (0..dataset.energy.nbin())
        .map(|r| match dataset.energy_true.bin_of(dataset.energy.center(r)) {
            Some(t) => dataset.exposure_valid[t],
            None => true,
        })
        .collect()
}

fn aeff_max_mask(
    dataset: &SpectrumDatasetOnOff,
    observation: &Observation,
    offset: f64,
    percent: f64,
) -> Vec<bool> {
    let aeff = &observation.irf.aeff;
    let peak = dataset
        .energy_true
        .centers()
        .into_iter()
        .filter_map(|e| aeff.evaluate(e, offset))
        .fold(0.0, f64::max);
    let threshold = peak * percent / 100.0;

    (0..dataset.energy.nbin())
        .map(|r| {
            aeff.evaluate(dataset.energy.center(r), offset)
                .is_some_and(|a| peak > 0.0 && a >= threshold)
        })
        .collect()
}

fn aeff_default_mask(dataset: &SpectrumDatasetOnOff, observation: &Observation) -> Vec<bool> {
    let (lo, hi) = observation.irf.aeff.thresholds();
    (0..dataset.energy.nbin())
        .map(|r| {
            let e = dataset.energy.center(r);
            lo.is_none_or(|lo| e >= lo) && hi.is_none_or(|hi| e <= hi)
        })
        .collect()
}

fn edisp_bias_mask(
    dataset: &SpectrumDatasetOnOff,
    observation: &Observation,
    offset: f64,
    percent: f64,
) -> Vec<bool> {
    let edisp = &observation.irf.edisp;
    let limit = percent / 100.0;
    let e_min = dataset
        .energy_true
        .centers()
        .into_iter()
        .find(|&e| edisp.bias(e, offset).abs() < limit);

    match e_min {
        Some(e_min) => (0..dataset.energy.nbin())
            .map(|r| dataset.energy.hi(r) > e_min)
            .collect(),
        None => vec![false; dataset.energy.nbin()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irf::{EffectiveArea2D, EnergyDispersion2D, InstrumentResponse, ResponseGrid};
    use crate::sky::{AxisKind, EnergyAxis, GeometryBuilder, SkyCoord, SkyRegion};
    use chrono::{DateTime, Utc};

    fn observation(aeff: EffectiveArea2D, edisp: EnergyDispersion2D) -> Observation {
        Observation {
            obs_id: 1,
            pointing: SkyCoord::new(0.0, 0.0),
            livetime: 100.0,
            tstart: DateTime::<Utc>::UNIX_EPOCH,
            events: Vec::new(),
            irf: InstrumentResponse::new(aeff, edisp),
        }
    }

    fn dataset() -> SpectrumDatasetOnOff {
        let region = SkyRegion::circle(SkyCoord::new(1.0, 0.0), 0.3).unwrap();
        let reco = EnergyAxis::log_spaced(0.1, 100.0, 6, AxisKind::Reco).unwrap();
        let geom = GeometryBuilder::new(region, reco).build().unwrap();
        let mut ds = SpectrumDatasetOnOff::empty("a", &geom);
        ds.meta.offset = Some(1.0);
        ds
    }

    /// Area rising from 1e3 at 0.1 TeV to 1e6 at 100 TeV.
    fn rising_aeff() -> EffectiveArea2D {
        let grid = ResponseGrid::new(vec![0.1, 100.0], vec![0.0], vec![1e3, 1e6]).unwrap();
        EffectiveArea2D::new(grid, 2.5).unwrap()
    }

    #[test]
    fn aeff_max_drops_low_area_bins() {
        let obs = observation(rising_aeff(), EnergyDispersion2D::perfect());
        let maker = SafeMaskMaker::new(SafeMaskConfig {
            methods: vec![SafeMaskMethod::AeffMax { percent: 50.0 }],
        });
        let ds = maker.run(dataset(), &obs);
        let mask = ds.mask_safe();
        assert!(!mask[0]);
        assert!(mask[5]);
        // Monotone area gives a single lower threshold.
        let first_safe = mask.iter().position(|m| *m).unwrap();
        assert!(mask[first_safe..].iter().all(|m| *m));
    }

    #[test]
    fn methods_combine_with_and_and_the_mask_is_idempotent() {
        let aeff = EffectiveArea2D::flat(1e6, 0.1, 100.0, 2.5)
            .unwrap()
            .with_thresholds(Some(1.0), Some(50.0));
        let obs = observation(aeff, EnergyDispersion2D::perfect());
        let maker = SafeMaskMaker::new(SafeMaskConfig {
            methods: vec![
                SafeMaskMethod::AeffDefault,
                SafeMaskMethod::OffsetMax { max_offset_deg: 2.0 },
            ],
        });
        let once = maker.run(dataset(), &obs);
        let twice = maker.run(once.clone(), &obs);
        assert_eq!(once.mask_safe(), twice.mask_safe());
        // Bin centres: 0.18, 0.56, 1.78, 5.6, 17.8, 56.2 TeV.
        assert_eq!(once.mask_safe(), &[false, false, true, true, true, false]);

        let strict = SafeMaskMaker::new(SafeMaskConfig {
            methods: vec![SafeMaskMethod::OffsetMax { max_offset_deg: 0.5 }],
        });
        assert_eq!(strict.run(once, &obs).n_safe_bins(), 0);
    }

    #[test]
    fn invalid_exposure_is_never_safe() {
        let obs = observation(EffectiveArea2D::flat(1e6, 0.1, 100.0, 2.5).unwrap(), EnergyDispersion2D::perfect());
        let mut ds = dataset();
        ds.exposure_valid[2] = false;
        let ds = SafeMaskMaker::new(SafeMaskConfig { methods: Vec::new() }).run(ds, &obs);
        assert_eq!(ds.mask_safe(), &[true, true, false, true, true, true]);
    }

    #[test]
    fn edisp_bias_sets_a_lower_threshold() {
        let bias = ResponseGrid::new(vec![0.1, 100.0], vec![0.0], vec![0.5, 0.0]).unwrap();
        let edisp = EnergyDispersion2D::new(bias, ResponseGrid::constant(0.1)).unwrap();
        let obs = observation(EffectiveArea2D::flat(1e6, 0.1, 100.0, 2.5).unwrap(), edisp);
        let ds = SafeMaskMaker::new(SafeMaskConfig {
            methods: vec![SafeMaskMethod::EdispBias { percent: 10.0 }],
        })
        .run(dataset(), &obs);
        let mask = ds.mask_safe();
        assert!(!mask[0]);
        assert!(mask[5]);
    }

    #[test]
    fn min_off_counts_needs_off_data() {
        let obs = observation(EffectiveArea2D::flat(1e6, 0.1, 100.0, 2.5).unwrap(), EnergyDispersion2D::perfect());
        let maker = SafeMaskMaker::new(SafeMaskConfig {
            methods: vec![SafeMaskMethod::MinOffCounts { min: 2.0 }],
        });
        assert_eq!(maker.run(dataset(), &obs).n_safe_bins(), 6);

        let mut ds = dataset();
        ds.counts_off = Some(vec![0.0, 1.0, 2.0, 3.0, 10.0, 0.0]);
        assert_eq!(maker.run(ds, &obs).mask_safe(), &[false, false, true, true, true, false]);
    }
}
