//! Energy axes.
//!
//! An axis is an ordered list of strictly increasing bin edges (TeV), tagged as
//! reconstructed or true energy. Bin centres are logarithmic.

use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AxisKind {
    Reco,
    True,
}

impl AxisKind {
    pub fn label(self) -> &'static str {
        match self {
            AxisKind::Reco => "energy",
            AxisKind::True => "energy_true",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyAxis {
    kind: AxisKind,
    edges: Vec<f64>,
}

/// Generate `steps` log-spaced points between `min` and `max` (inclusive).
pub fn log_space(min: f64, max: f64, steps: usize) -> Result<Vec<f64>, AnalysisError> {
    if !(min.is_finite() && max.is_finite() && min > 0.0 && max > 0.0 && max > min) {
        return Err(AnalysisError::InvalidAxis(format!(
            "invalid energy range: min={min}, max={max} (must be finite, >0, and max>min)"
        )));
    }
    if steps < 2 {
        return Err(AnalysisError::InvalidAxis("need at least 2 edges".into()));
    }

    let ln_min = min.ln();
    let ln_max = max.ln();
    let step = (ln_max - ln_min) / (steps as f64 - 1.0);

    let mut out = Vec::with_capacity(steps);
    for i in 0..steps {
        out.push((ln_min + step * i as f64).exp());
    }
    // Pin the endpoints exactly so axes built from the same bounds compare equal.
    out[0] = min;
    out[steps - 1] = max;
    Ok(out)
}

impl EnergyAxis {
    pub fn from_edges(edges: Vec<f64>, kind: AxisKind) -> Result<Self, AnalysisError> {
        if edges.len() < 2 {
            return Err(AnalysisError::InvalidAxis("need at least 2 edges".into()));
        }
        if edges.iter().any(|e| !e.is_finite() || *e <= 0.0) {
            return Err(AnalysisError::InvalidAxis("edges must be finite and > 0".into()));
        }
        if edges.windows(2).any(|w| w[1] <= w[0]) {
            return Err(AnalysisError::InvalidAxis("edges must be strictly increasing".into()));
        }
        Ok(Self { kind, edges })
    }

    /// `nbin` log-spaced bins between `min` and `max`.
    pub fn log_spaced(min: f64, max: f64, nbin: usize, kind: AxisKind) -> Result<Self, AnalysisError> {
        if nbin == 0 {
            return Err(AnalysisError::InvalidAxis("nbin must be > 0".into()));
        }
        Self::from_edges(log_space(min, max, nbin + 1)?, kind)
    }

    /// Log-spaced bins with (at least) `per_decade` bins per decade.
    pub fn per_decade(min: f64, max: f64, per_decade: usize, kind: AxisKind) -> Result<Self, AnalysisError> {
        if per_decade == 0 || !(min > 0.0 && max > min) {
            return Err(AnalysisError::InvalidAxis(format!(
                "invalid per-decade axis: min={min}, max={max}, per_decade={per_decade}"
            )));
        }
        let decades = (max / min).log10();
        let nbin = ((decades * per_decade as f64) - 1e-9).ceil().max(1.0) as usize;
        Self::log_spaced(min, max, nbin, kind)
    }

    pub fn kind(&self) -> AxisKind {
        self.kind
    }

    pub fn nbin(&self) -> usize {
        self.edges.len() - 1
    }

    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    pub fn lo(&self, i: usize) -> f64 {
        self.edges[i]
    }

    pub fn hi(&self, i: usize) -> f64 {
        self.edges[i + 1]
    }

    /// Logarithmic bin centre.
    pub fn center(&self, i: usize) -> f64 {
        (self.edges[i] * self.edges[i + 1]).sqrt()
    }

    pub fn centers(&self) -> Vec<f64> {
        (0..self.nbin()).map(|i| self.center(i)).collect()
    }

    pub fn width(&self, i: usize) -> f64 {
        self.edges[i + 1] - self.edges[i]
    }

    pub fn min(&self) -> f64 {
        self.edges[0]
    }

    pub fn max(&self) -> f64 {
        self.edges[self.edges.len() - 1]
    }

    /// Bin index containing `energy` (upper edge of the last bin included).
    pub fn bin_of(&self, energy: f64) -> Option<usize> {
        if !(energy >= self.min() && energy <= self.max()) {
            return None;
        }
        let idx = self.edges.partition_point(|&e| e <= energy);
        Some(idx.saturating_sub(1).min(self.nbin() - 1))
    }

    /// Same kind and same edges up to a relative tolerance.
    pub fn is_compatible(&self, other: &EnergyAxis) -> bool {
        self.kind == other.kind
            && self.edges.len() == other.edges.len()
            && self
                .edges
                .iter()
                .zip(other.edges.iter())
                .all(|(a, b)| ((a - b) / a).abs() <= 1e-9)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_space_includes_endpoints() {
        let v = log_space(0.1, 10.0, 5).unwrap();
        assert_eq!(v[0], 0.1);
        assert_eq!(v[v.len() - 1], 10.0);
        assert!((v[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn rejects_non_increasing_edges() {
        assert!(EnergyAxis::from_edges(vec![1.0, 1.0, 2.0], AxisKind::Reco).is_err());
        assert!(EnergyAxis::from_edges(vec![1.0], AxisKind::Reco).is_err());
        assert!(EnergyAxis::from_edges(vec![0.0, 1.0], AxisKind::Reco).is_err());
    }

    #[test]
    fn per_decade_counts_bins() {
        let axis = EnergyAxis::per_decade(0.1, 100.0, 5, AxisKind::True).unwrap();
        assert_eq!(axis.nbin(), 15);
        let axis = EnergyAxis::per_decade(0.3, 40.0, 4, AxisKind::Reco).unwrap();
        assert_eq!(axis.nbin(), 9);
    }

    #[test]
    fn bin_lookup() {
        let axis = EnergyAxis::log_spaced(1.0, 100.0, 2, AxisKind::Reco).unwrap();
        assert_eq!(axis.bin_of(1.0), Some(0));
        assert_eq!(axis.bin_of(9.99), Some(0));
        assert_eq!(axis.bin_of(10.0 + 1e-9), Some(1));
        assert_eq!(axis.bin_of(100.0), Some(1));
        assert_eq!(axis.bin_of(0.5), None);
        assert_eq!(axis.bin_of(100.5), None);
        assert!((axis.center(0) - 10f64.sqrt()).abs() < 1e-12);
    }
}
