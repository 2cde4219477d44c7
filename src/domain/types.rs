//! Run configuration.
//!
//! Everything a `gspec run` needs besides the observations themselves lives in
//! [`AnalysisConfig`]. It is plain serde data so it can be:
//!
//! - loaded from a JSON file (`--config`)
//! - printed as a template (`gspec config`)
//! - partially specified, with every missing field taking its default

use serde::{Deserialize, Serialize};

use crate::data::SelectionConfig;
use crate::error::AnalysisError;
use crate::fit::FitConfig;
use crate::makers::{ReflectedRegionsConfig, SafeMaskConfig, SpectrumMakerConfig};
use crate::models::SpectralModel;
use crate::sky::{AxisKind, EnergyAxis, GeometryBuilder, RegionGeom, SkyCoord, SkyRegion};

/// Log-spaced energy binning (TeV).
///
/// Exactly one of `nbin` and `per_decade` must be set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AxisSpec {
    pub min: f64,
    pub max: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbin: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_decade: Option<usize>,
}

impl AxisSpec {
    pub fn per_decade(min: f64, max: f64, per_decade: usize) -> Self {
        Self {
            min,
            max,
            nbin: None,
            per_decade: Some(per_decade),
        }
    }

    pub fn nbin(min: f64, max: f64, nbin: usize) -> Self {
        Self {
            min,
            max,
            nbin: Some(nbin),
            per_decade: None,
        }
    }

    pub fn to_axis(&self, kind: AxisKind) -> Result<EnergyAxis, AnalysisError> {
        match (self.nbin, self.per_decade) {
            (Some(n), None) => EnergyAxis::log_spaced(self.min, self.max, n, kind),
            (None, Some(n)) => EnergyAxis::per_decade(self.min, self.max, n, kind),
            _ => Err(AnalysisError::InvalidConfig(format!(
                "{} energy axis needs exactly one of 'nbin' or 'per_decade'",
                kind.label()
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeometryConfig {
    pub region: SkyRegion,
    /// Reconstructed energy binning.
    pub energy: AxisSpec,
    /// True energy binning; a copy of `energy` when unset.
    pub energy_true: Option<AxisSpec>,
    /// Decades the true axis must extend past the reconstructed one on each side.
    pub spillover_margin_decades: f64,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            region: SkyRegion::Circle {
                center: SkyCoord::new(83.633, 22.014),
                radius: 0.3,
            },
            energy: AxisSpec::per_decade(0.3, 30.0, 5),
            energy_true: Some(AxisSpec::per_decade(0.1, 100.0, 10)),
            spillover_margin_decades: 0.0,
        }
    }
}

impl GeometryConfig {
    pub fn build(&self) -> Result<RegionGeom, AnalysisError> {
        let mut builder = GeometryBuilder::new(self.region.clone(), self.energy.to_axis(AxisKind::Reco)?)
            .spillover_margin(self.spillover_margin_decades);
        if let Some(spec) = &self.energy_true {
            builder = builder.energy_true(spec.to_axis(AxisKind::True)?);
        }
        builder.build()
    }
}

/// Full configuration of one analysis run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub selection: SelectionConfig,
    pub geometry: GeometryConfig,
    pub spectrum: SpectrumMakerConfig,
    pub background: ReflectedRegionsConfig,
    pub safe_mask: SafeMaskConfig,
    /// Starting point of the fit; frozen parameters stay fixed.
    pub model: SpectralModel,
    pub fit: FitConfig,
    /// Fit the stacked dataset (`true`) or all datasets jointly.
    pub stack: bool,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            selection: SelectionConfig::default(),
            geometry: GeometryConfig::default(),
            spectrum: SpectrumMakerConfig::default(),
            background: ReflectedRegionsConfig::default(),
            safe_mask: SafeMaskConfig::default(),
            model: SpectralModel::power_law(2.0, 1e-12, 1.0),
            fit: FitConfig::default(),
            stack: true,
        }
    }
}

impl AnalysisConfig {
    pub fn geom(&self) -> Result<RegionGeom, AnalysisError> {
        self.geometry.build()
    }

    /// Cone-search centre for observation selection.
    pub fn selection_center(&self) -> SkyCoord {
        self.selection
            .target
            .unwrap_or_else(|| self.geometry.region.center())
    }

    pub fn validate(&self) -> Result<(), AnalysisError> {
        self.geom()?;
        self.model.validate()?;

        if !(self.selection.radius.is_finite() && self.selection.radius > 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "selection radius must be positive".into(),
            ));
        }
        if self.fit.max_iterations == 0 {
            return Err(AnalysisError::InvalidConfig(
                "fit.max_iterations must be > 0".into(),
            ));
        }
        if !(self.fit.tolerance.is_finite() && self.fit.tolerance >= 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "fit.tolerance must be non-negative".into(),
            ));
        }
        let sampling = &self.spectrum.sampling;
        if sampling.initial_points == 0 {
            return Err(AnalysisError::InvalidConfig(
                "spectrum.sampling.initial_points must be > 0".into(),
            ));
        }
        if !(sampling.tolerance.is_finite() && sampling.tolerance > 0.0) {
            return Err(AnalysisError::InvalidConfig(
                "spectrum.sampling.tolerance must be positive".into(),
            ));
        }
        Ok(())
    }
}
