//! Reporting utilities: per-bin residuals and formatted terminal output.

use crate::datasets::SpectrumDatasetOnOff;
use crate::error::AppError;
use crate::models::SpectralModel;

pub mod format;

pub use format::*;

/// Observed versus predicted counts in one reconstructed-energy bin.
#[derive(Debug, Clone, PartialEq)]
pub struct BinResidual {
    pub energy_lo: f64,
    pub energy_hi: f64,
    pub counts: f64,
    /// Predicted signal plus background estimate.
    pub npred: f64,
    pub residual: f64,
    pub safe: bool,
}

/// Compare the observed counts with the model prediction, bin by bin.
pub fn compute_residuals(
    dataset: &SpectrumDatasetOnOff,
    model: &SpectralModel,
) -> Result<Vec<BinResidual>, AppError> {
    let signal = dataset.npred_signal(model);
    let axis = dataset.energy();
    let mut out = Vec::with_capacity(axis.nbin());
    for r in 0..axis.nbin() {
        let npred = signal[r] + dataset.background()[r];
        if !npred.is_finite() {
            return Err(AppError::new(4, "Non-finite model prediction during residual computation."));
        }
        let counts = dataset.counts()[r];
        out.push(BinResidual {
            energy_lo: axis.lo(r),
            energy_hi: axis.hi(r),
            counts,
            npred,
            residual: counts - npred,
            safe: dataset.mask_safe()[r],
        });
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::{AxisKind, EnergyAxis, GeometryBuilder, SkyCoord, SkyRegion};

    #[test]
    fn compute_residuals_basic() {
        let region = SkyRegion::circle(SkyCoord::new(0.0, 0.0), 0.2).unwrap();
        let reco = EnergyAxis::log_spaced(1.0, 100.0, 2, AxisKind::Reco).unwrap();
        let geom = GeometryBuilder::new(region, reco).build().unwrap();
        let mut ds = SpectrumDatasetOnOff::empty("obs-1", &geom);
        ds.counts = vec![7.0, 1.0];
        ds.background = vec![2.0, 0.5];
        ds.mask_safe[1] = false;

        // Zero exposure: prediction is the background alone.
        let model = SpectralModel::power_law(2.0, 1e-12, 1.0);
        let residuals = compute_residuals(&ds, &model).unwrap();
        assert_eq!(residuals.len(), 2);
        assert!((residuals[0].residual - 5.0).abs() < 1e-12);
        assert!((residuals[1].residual - 0.5).abs() < 1e-12);
        assert!((residuals[0].energy_hi - 10.0).abs() < 1e-9);
        assert!(!residuals[1].safe);
    }
}
