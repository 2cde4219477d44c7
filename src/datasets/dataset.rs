//! Binned on/off spectrum dataset.
//!
//! A dataset is filled by the makers (counts and response, then background,
//! then the safe mask) and is read-only afterwards. All per-bin vectors are
//! indexed by reconstructed energy, except `exposure` and `exposure_valid`,
//! which follow the true-energy axis.

use serde::{Deserialize, Serialize};

use crate::data::ObsId;
use crate::error::AnalysisError;
use crate::irf::EDispKernel;
use crate::models::SpectralModel;
use crate::sky::{EnergyAxis, RegionGeom};

/// Provenance of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    /// Observations that contributed.
    pub obs_ids: Vec<ObsId>,
    /// Distance (degrees) from the pointing to the on-region centre.
    #[serde(default)]
    pub offset: Option<f64>,
    /// Number of reflected off regions used for the background.
    #[serde(default)]
    pub n_off_regions: Option<usize>,
    /// Whether the region-averaged response met its tolerance.
    #[serde(default)]
    pub response_converged: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpectrumDatasetOnOff {
    pub(crate) name: String,
    pub(crate) energy: EnergyAxis,
    pub(crate) energy_true: EnergyAxis,
    pub(crate) counts: Vec<f64>,
    pub(crate) counts_off: Option<Vec<f64>>,
    pub(crate) background: Vec<f64>,
    pub(crate) alpha: Vec<f64>,
    pub(crate) exposure: Vec<f64>,
    pub(crate) exposure_valid: Vec<bool>,
    pub(crate) edisp: EDispKernel,
    pub(crate) mask_safe: Vec<bool>,
    /// Total livetime (s).
    pub(crate) livetime: f64,
    /// Solid angle of the on region (sr).
    pub(crate) on_solid_angle: f64,
    pub(crate) meta: DatasetMeta,
}

impl SpectrumDatasetOnOff {
    /// Zero-filled dataset with every bin safe.
    pub fn empty(name: impl Into<String>, geom: &RegionGeom) -> Self {
        let n_reco = geom.energy().nbin();
        let n_true = geom.energy_true().nbin();
        Self {
            name: name.into(),
            energy: geom.energy().clone(),
            energy_true: geom.energy_true().clone(),
            counts: vec![0.0; n_reco],
            counts_off: None,
            background: vec![0.0; n_reco],
            alpha: vec![0.0; n_reco],
            exposure: vec![0.0; n_true],
            exposure_valid: vec![true; n_true],
            edisp: EDispKernel::zeros(n_true, n_reco),
            mask_safe: vec![true; n_reco],
            livetime: 0.0,
            on_solid_angle: geom.region().solid_angle(),
            meta: DatasetMeta::default(),
        }
    }

    /// Check vector lengths against the axes. Used after deserialization.
    pub fn validate(&self) -> Result<(), AnalysisError> {
        let n_reco = self.energy.nbin();
        let n_true = self.energy_true.nbin();
        let reco_lens = [
            ("counts", self.counts.len()),
            ("background", self.background.len()),
            ("alpha", self.alpha.len()),
            ("mask_safe", self.mask_safe.len()),
        ];
        for (name, len) in reco_lens {
            if len != n_reco {
                return Err(AnalysisError::InvalidAxis(format!(
                    "{name} has {len} bins, reco axis has {n_reco}"
                )));
            }
        }
        if let Some(off) = &self.counts_off {
            if off.len() != n_reco {
                return Err(AnalysisError::InvalidAxis("counts_off length mismatch".into()));
            }
        }
        if self.exposure.len() != n_true || self.exposure_valid.len() != n_true {
            return Err(AnalysisError::InvalidAxis(format!(
                "exposure does not match the {n_true}-bin true axis"
            )));
        }
        if self.edisp.n_true() != n_true || self.edisp.n_reco() != n_reco {
            return Err(AnalysisError::InvalidAxis("dispersion kernel shape mismatch".into()));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn energy(&self) -> &EnergyAxis {
        &self.energy
    }

    pub fn energy_true(&self) -> &EnergyAxis {
        &self.energy_true
    }

    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    pub fn counts_off(&self) -> Option<&[f64]> {
        self.counts_off.as_deref()
    }

    pub fn background(&self) -> &[f64] {
        &self.background
    }

    pub fn alpha(&self) -> &[f64] {
        &self.alpha
    }

    pub fn exposure(&self) -> &[f64] {
        &self.exposure
    }

    pub fn exposure_valid(&self) -> &[bool] {
        &self.exposure_valid
    }

    pub fn edisp(&self) -> &EDispKernel {
        &self.edisp
    }

    pub fn mask_safe(&self) -> &[bool] {
        &self.mask_safe
    }

    pub fn livetime(&self) -> f64 {
        self.livetime
    }

    pub fn on_solid_angle(&self) -> f64 {
        self.on_solid_angle
    }

    pub fn meta(&self) -> &DatasetMeta {
        &self.meta
    }

    pub fn n_safe_bins(&self) -> usize {
        self.mask_safe.iter().filter(|m| **m).count()
    }

    /// Exposure folded into reco bins: `Σ_t exposure[t] K[t][r]`.
    pub fn reco_exposure(&self) -> Vec<f64> {
        self.edisp.apply(&self.exposure)
    }

    /// Expected signal counts per reco bin for `model`.
    pub fn npred_signal(&self, model: &SpectralModel) -> Vec<f64> {
        let per_true: Vec<f64> = model
            .integrate_edges(self.energy_true.edges())
            .into_iter()
            .zip(&self.exposure)
            .map(|(flux, exposure)| flux * exposure)
            .collect();
        self.edisp.apply(&per_true)
    }

    /// `counts - background` per reco bin.
    pub fn excess(&self) -> Vec<f64> {
        self.counts
            .iter()
            .zip(&self.background)
            .map(|(n, b)| n - b)
            .collect()
    }

    fn safe_sum(&self, values: &[f64]) -> f64 {
        values
            .iter()
            .zip(&self.mask_safe)
            .filter(|(_, m)| **m)
            .map(|(v, _)| v)
            .sum()
    }

    /// Counts summed over safe bins.
    pub fn total_counts(&self) -> f64 {
        self.safe_sum(&self.counts)
    }

    pub fn total_counts_off(&self) -> Option<f64> {
        self.counts_off.as_deref().map(|off| self.safe_sum(off))
    }

    pub fn total_background(&self) -> f64 {
        self.safe_sum(&self.background)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::{AxisKind, GeometryBuilder, SkyCoord, SkyRegion};
    use approx::assert_relative_eq;

    fn geom() -> RegionGeom {
        let region = SkyRegion::circle(SkyCoord::new(0.0, 0.0), 0.5).unwrap();
        let reco = EnergyAxis::log_spaced(1.0, 10.0, 2, AxisKind::Reco).unwrap();
        GeometryBuilder::new(region, reco).build().unwrap()
    }

    #[test]
    fn npred_folds_flux_through_exposure_and_kernel() {
        let mut ds = SpectrumDatasetOnOff::empty("a", &geom());
        ds.exposure = vec![1e10, 1e10];
        ds.edisp.set(0, 0, 1.0);
        ds.edisp.set(1, 1, 1.0);
        let model = SpectralModel::power_law(2.0, 1e-11, 1.0);
        let npred = ds.npred_signal(&model);
        let split = 10f64.sqrt();
        assert_relative_eq!(npred[0], 1e10 * 1e-11 * (1.0 - 1.0 / split), max_relative = 1e-12);
        assert_relative_eq!(npred[1], 1e10 * 1e-11 * (1.0 / split - 0.1), max_relative = 1e-12);
    }

    #[test]
    fn totals_respect_the_safe_mask() {
        let mut ds = SpectrumDatasetOnOff::empty("a", &geom());
        ds.counts = vec![5.0, 7.0];
        ds.background = vec![1.0, 2.0];
        ds.mask_safe = vec![false, true];
        assert_eq!(ds.total_counts(), 7.0);
        assert_eq!(ds.total_background(), 2.0);
        assert_eq!(ds.excess(), vec![4.0, 5.0]);
        assert!(ds.validate().is_ok());

        ds.alpha.pop();
        assert!(ds.validate().is_err());
    }
}
