//! Energy dispersion: probability of measuring a reconstructed energy given
//! a true energy.
//!
//! The migration `μ = E_reco / E_true` is modelled as log-normal:
//! `ln μ ~ N(ln(1 + bias), resolution)`, with bias and resolution tabulated over
//! (true energy, offset). A resolution of zero means perfect reconstruction up
//! to the bias.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::AnalysisError;
use crate::irf::grid::ResponseGrid;
use crate::sky::EnergyAxis;

/// Resolutions below this are treated as a delta migration.
const MIN_RESOLUTION: f64 = 1e-6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyDispersion2D {
    bias: ResponseGrid,
    resolution: ResponseGrid,
}

impl EnergyDispersion2D {
    pub fn new(bias: ResponseGrid, resolution: ResponseGrid) -> Result<Self, AnalysisError> {
        if bias.values().iter().any(|b| *b <= -1.0) {
            return Err(AnalysisError::InvalidResponse("bias must be > -1".into()));
        }
        if resolution.values().iter().any(|r| *r < 0.0) {
            return Err(AnalysisError::InvalidResponse("resolution must be >= 0".into()));
        }
        Ok(Self { bias, resolution })
    }

    /// Energy- and offset-independent Gaussian migration.
    pub fn gaussian(bias: f64, resolution: f64) -> Result<Self, AnalysisError> {
        if !(bias.is_finite() && resolution.is_finite()) {
            return Err(AnalysisError::InvalidResponse("non-finite dispersion parameter".into()));
        }
        Self::new(ResponseGrid::constant(bias), ResponseGrid::constant(resolution))
    }

    /// No bias, no smearing.
    pub fn perfect() -> Self {
        Self {
            bias: ResponseGrid::constant(0.0),
            resolution: ResponseGrid::constant(0.0),
        }
    }

    pub fn bias(&self, energy_true: f64, offset: f64) -> f64 {
        self.bias.interpolate(energy_true, offset)
    }

    pub fn resolution(&self, energy_true: f64, offset: f64) -> f64 {
        self.resolution.interpolate(energy_true, offset).max(0.0)
    }

    /// Migration probabilities from `energy_true` into each bin of `reco`.
    ///
    /// Probability that falls outside the reco axis is lost, so rows may sum to < 1.
    pub fn kernel_row(&self, energy_true: f64, offset: f64, reco: &EnergyAxis) -> Vec<f64> {
        let mut row = vec![0.0; reco.nbin()];
        let bias = self.bias(energy_true, offset);
        let sigma = self.resolution(energy_true, offset);
        let mean = (1.0 + bias).ln();

        if sigma < MIN_RESOLUTION {
            if let Some(idx) = reco.bin_of(energy_true * (1.0 + bias)) {
                row[idx] = 1.0;
            }
            return row;
        }

        let Ok(normal) = Normal::new(mean, sigma) else {
            return row;
        };
        let cdf: Vec<f64> = reco
            .edges()
            .iter()
            .map(|&edge| normal.cdf((edge / energy_true).ln()))
            .collect();
        for (i, p) in row.iter_mut().enumerate() {
            *p = (cdf[i + 1] - cdf[i]).max(0.0);
        }
        row
    }

    /// Sample a reconstructed energy for a photon of `energy_true`.
    pub fn migrate(&self, energy_true: f64, offset: f64, standard_normal: f64) -> f64 {
        let bias = self.bias(energy_true, offset);
        let sigma = self.resolution(energy_true, offset);
        energy_true * ((1.0 + bias).ln() + sigma * standard_normal).exp()
    }
}

/// Dense migration matrix, rows = true energy bins, columns = reco energy bins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EDispKernel {
    matrix: DMatrix<f64>,
}

impl EDispKernel {
    pub fn new(matrix: DMatrix<f64>) -> Self {
        Self { matrix }
    }

    pub fn zeros(n_true: usize, n_reco: usize) -> Self {
        Self::new(DMatrix::zeros(n_true, n_reco))
    }

    /// Kernel of `edisp` evaluated at one offset, true bins sampled at their log centre.
    pub fn from_edisp(
        edisp: &EnergyDispersion2D,
        offset: f64,
        energy_true: &EnergyAxis,
        energy: &EnergyAxis,
    ) -> Self {
        let mut kernel = Self::zeros(energy_true.nbin(), energy.nbin());
        for t in 0..energy_true.nbin() {
            let row = edisp.kernel_row(energy_true.center(t), offset, energy);
            for (r, p) in row.into_iter().enumerate() {
                kernel.matrix[(t, r)] = p;
            }
        }
        kernel
    }

    pub fn n_true(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn n_reco(&self) -> usize {
        self.matrix.ncols()
    }

    pub fn get(&self, t: usize, r: usize) -> f64 {
        self.matrix[(t, r)]
    }

    pub fn set(&mut self, t: usize, r: usize, value: f64) {
        self.matrix[(t, r)] = value;
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.matrix
    }

    /// Fold a true-energy vector through the kernel into reco bins.
    pub fn apply(&self, per_true_bin: &[f64]) -> Vec<f64> {
        let mut out = vec![0.0; self.n_reco()];
        for (t, &v) in per_true_bin.iter().enumerate().take(self.n_true()) {
            if v == 0.0 {
                continue;
            }
            for (r, o) in out.iter_mut().enumerate() {
                *o += v * self.matrix[(t, r)];
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::AxisKind;
    use approx::assert_abs_diff_eq;

    #[test]
    fn perfect_dispersion_is_diagonal() {
        let axis = EnergyAxis::log_spaced(0.3, 40.0, 6, AxisKind::Reco).unwrap();
        let etrue = EnergyAxis::from_edges(axis.edges().to_vec(), AxisKind::True).unwrap();
        let k = EDispKernel::from_edisp(&EnergyDispersion2D::perfect(), 0.5, &etrue, &axis);
        for t in 0..6 {
            for r in 0..6 {
                assert_eq!(k.get(t, r), if t == r { 1.0 } else { 0.0 });
            }
        }
    }

    #[test]
    fn gaussian_rows_are_normalised_inside_axis() {
        let reco = EnergyAxis::log_spaced(0.01, 1000.0, 50, AxisKind::Reco).unwrap();
        let edisp = EnergyDispersion2D::gaussian(0.05, 0.2).unwrap();
        let row = edisp.kernel_row(1.0, 0.5, &reco);
        assert_abs_diff_eq!(row.iter().sum::<f64>(), 1.0, epsilon = 1e-9);

        // Peak sits at the bin containing E_true * (1 + bias).
        let peak = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(Some(peak), reco.bin_of(1.05));
    }

    #[test]
    fn apply_folds_true_into_reco() {
        let mut k = EDispKernel::zeros(2, 2);
        k.set(0, 0, 0.5);
        k.set(0, 1, 0.5);
        k.set(1, 1, 1.0);
        assert_eq!(k.apply(&[2.0, 3.0]), vec![1.0, 4.0]);
    }
}
