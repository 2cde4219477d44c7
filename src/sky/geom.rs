//! On-region geometry: one sky region plus paired reconstructed/true energy axes.

use crate::error::AnalysisError;
use crate::sky::axis::{AxisKind, EnergyAxis};
use crate::sky::region::SkyRegion;

/// Immutable analysis geometry shared by every observation in a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionGeom {
    region: SkyRegion,
    energy: EnergyAxis,
    energy_true: EnergyAxis,
}

impl RegionGeom {
    pub fn region(&self) -> &SkyRegion {
        &self.region
    }

    pub fn energy(&self) -> &EnergyAxis {
        &self.energy
    }

    pub fn energy_true(&self) -> &EnergyAxis {
        &self.energy_true
    }
}

/// Builder validating axis kinds and the true-energy enclosure.
#[derive(Debug, Clone)]
pub struct GeometryBuilder {
    region: SkyRegion,
    energy: EnergyAxis,
    energy_true: Option<EnergyAxis>,
    margin_decades: f64,
}

impl GeometryBuilder {
    pub fn new(region: SkyRegion, energy: EnergyAxis) -> Self {
        Self {
            region,
            energy,
            energy_true: None,
            margin_decades: 0.0,
        }
    }

    /// True-energy axis. Defaults to a copy of the reconstructed binning.
    pub fn energy_true(mut self, axis: EnergyAxis) -> Self {
        self.energy_true = Some(axis);
        self
    }

    /// Extra range (decades) the true axis must extend beyond the reco range on each side.
    pub fn spillover_margin(mut self, decades: f64) -> Self {
        self.margin_decades = decades.max(0.0);
        self
    }

    pub fn build(self) -> Result<RegionGeom, AnalysisError> {
        self.region.validate()?;

        if self.energy.kind() != AxisKind::Reco {
            return Err(AnalysisError::InvalidAxisOrdering(
                "reconstructed energy axis has kind 'true'".into(),
            ));
        }

        let energy_true = match self.energy_true {
            Some(axis) => axis,
            None => EnergyAxis::from_edges(self.energy.edges().to_vec(), AxisKind::True)?,
        };
        if energy_true.kind() != AxisKind::True {
            return Err(AnalysisError::InvalidAxisOrdering(
                "true energy axis has kind 'reco'".into(),
            ));
        }

        let factor = 10f64.powf(self.margin_decades);
        let need_lo = self.energy.min() / factor;
        let need_hi = self.energy.max() * factor;
        let tol = 1e-9;
        if energy_true.min() > need_lo * (1.0 + tol) || energy_true.max() < need_hi * (1.0 - tol) {
            return Err(AnalysisError::InvalidAxisOrdering(format!(
                "true energy axis [{:.4}, {:.4}] TeV does not enclose [{:.4}, {:.4}] TeV",
                energy_true.min(),
                energy_true.max(),
                need_lo,
                need_hi
            )));
        }

        Ok(RegionGeom {
            region: self.region,
            energy: self.energy,
            energy_true,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::SkyCoord;

    fn region() -> SkyRegion {
        SkyRegion::circle(SkyCoord::new(83.63, 22.01), 0.5).unwrap()
    }

    #[test]
    fn builds_with_enclosing_true_axis() {
        let reco = EnergyAxis::log_spaced(0.5, 40.0, 10, AxisKind::Reco).unwrap();
        let etrue = EnergyAxis::log_spaced(0.1, 100.0, 30, AxisKind::True).unwrap();
        let geom = GeometryBuilder::new(region(), reco)
            .energy_true(etrue)
            .spillover_margin(0.2)
            .build()
            .unwrap();
        assert_eq!(geom.energy_true().nbin(), 30);
    }

    #[test]
    fn rejects_true_axis_not_enclosing_reco() {
        let reco = EnergyAxis::log_spaced(0.5, 40.0, 10, AxisKind::Reco).unwrap();
        let etrue = EnergyAxis::log_spaced(1.0, 100.0, 30, AxisKind::True).unwrap();
        let err = GeometryBuilder::new(region(), reco).energy_true(etrue).build().unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidAxisOrdering(_)));
    }

    #[test]
    fn margin_is_enforced() {
        let reco = EnergyAxis::log_spaced(0.5, 40.0, 10, AxisKind::Reco).unwrap();
        let etrue = EnergyAxis::log_spaced(0.5, 40.0, 10, AxisKind::True).unwrap();
        assert!(
            GeometryBuilder::new(region(), reco.clone())
                .energy_true(etrue.clone())
                .build()
                .is_ok()
        );
        assert!(
            GeometryBuilder::new(region(), reco)
                .energy_true(etrue)
                .spillover_margin(0.1)
                .build()
                .is_err()
        );
    }

    #[test]
    fn default_true_axis_mirrors_reco() {
        let reco = EnergyAxis::log_spaced(0.3, 40.0, 8, AxisKind::Reco).unwrap();
        let geom = GeometryBuilder::new(region(), reco.clone()).build().unwrap();
        assert_eq!(geom.energy_true().edges(), reco.edges());
        assert_eq!(geom.energy_true().kind(), AxisKind::True);
    }
}
