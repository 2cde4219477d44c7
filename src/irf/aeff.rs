//! Effective area as a function of true energy and field-of-view offset.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::irf::grid::ResponseGrid;

/// Effective area table (cm²).
///
/// - beyond `max_offset` the response is undefined: [`EffectiveArea2D::evaluate`]
///   returns `None` and callers must not extrapolate
/// - outside the tabulated energy range the area is zero
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectiveArea2D {
    grid: ResponseGrid,
    /// Field-of-view radius (degrees) over which the table is valid.
    max_offset: f64,
    /// Declared low-energy safe threshold (TeV), if any.
    #[serde(default)]
    lo_threshold: Option<f64>,
    /// Declared high-energy safe threshold (TeV), if any.
    #[serde(default)]
    hi_threshold: Option<f64>,
}

impl EffectiveArea2D {
    pub fn new(grid: ResponseGrid, max_offset: f64) -> Result<Self, AnalysisError> {
        if !(max_offset.is_finite() && max_offset > 0.0) {
            return Err(AnalysisError::InvalidResponse(format!(
                "max offset must be > 0, got {max_offset}"
            )));
        }
        if grid.values().iter().any(|v| *v < 0.0) {
            return Err(AnalysisError::InvalidResponse("negative effective area".into()));
        }
        Ok(Self {
            grid,
            max_offset,
            lo_threshold: None,
            hi_threshold: None,
        })
    }

    /// Constant area between `e_min` and `e_max`, valid out to `max_offset`.
    pub fn flat(area_cm2: f64, e_min: f64, e_max: f64, max_offset: f64) -> Result<Self, AnalysisError> {
        let grid = ResponseGrid::new(vec![e_min, e_max], vec![0.0], vec![area_cm2, area_cm2])?;
        Self::new(grid, max_offset)
    }

    /// Area with a Gaussian radial acceptance profile of width `sigma_offset` (degrees).
    pub fn with_radial_falloff(
        area_cm2: f64,
        e_min: f64,
        e_max: f64,
        max_offset: f64,
        sigma_offset: f64,
    ) -> Result<Self, AnalysisError> {
        let n_off = ((max_offset / 0.05).ceil() as usize).max(1) + 1;
        let offsets: Vec<f64> = (0..n_off)
            .map(|j| max_offset * j as f64 / (n_off - 1) as f64)
            .collect();
        let grid = ResponseGrid::from_fn(vec![e_min, e_max], offsets, |_, o| {
            area_cm2 * (-0.5 * (o / sigma_offset).powi(2)).exp()
        })?;
        Self::new(grid, max_offset)
    }

    /// Declare the safe energy thresholds carried as table metadata.
    pub fn with_thresholds(mut self, lo: Option<f64>, hi: Option<f64>) -> Self {
        self.lo_threshold = lo;
        self.hi_threshold = hi;
        self
    }

    pub fn max_offset(&self) -> f64 {
        self.max_offset
    }

    pub fn thresholds(&self) -> (Option<f64>, Option<f64>) {
        (self.lo_threshold, self.hi_threshold)
    }

    pub fn energy_range(&self) -> (f64, f64) {
        let nodes = self.grid.energy_nodes();
        (nodes[0], nodes[nodes.len() - 1])
    }

    /// Area (cm²) at `energy` (TeV) and `offset` (degrees); `None` outside the field of view.
    pub fn evaluate(&self, energy: f64, offset: f64) -> Option<f64> {
        if !(offset >= 0.0 && offset <= self.max_offset) {
            return None;
        }
        let (e_min, e_max) = self.energy_range();
        if energy < e_min || energy > e_max {
            return Some(0.0);
        }
        Some(self.grid.interpolate(energy, offset).max(0.0))
    }

    /// Largest tabulated area at `energy` over all offsets in the field of view.
    pub fn peak_at(&self, energy: f64) -> f64 {
        self.grid
            .offset_nodes()
            .iter()
            .filter(|&&o| o <= self.max_offset)
            .filter_map(|&o| self.evaluate(energy, o))
            .fold(0.0, f64::max)
    }
}
