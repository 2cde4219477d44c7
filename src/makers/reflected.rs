//! Reflected-region background estimation.
//!
//! Off regions are copies of the on region rotated about the pointing
//! position, so every off region sits at the same offset and sees the same
//! radial acceptance. Candidates are tried at increasing rotation angles:
//!
//! - the first at `2 asin(ρ/r) + min_distance_input`
//! - after an accepted region, the next at `+ 2 asin(ρ/r) + min_distance`
//! - after a rejected one, the next at `+ angle_increment`
//!
//! where `r` is the pointing-to-centre distance and `ρ` the region's bounding
//! radius. A candidate is rejected when it overlaps the on region, an accepted
//! off region or an exclusion region, or leaves the field of view.

use serde::{Deserialize, Serialize};

use crate::data::Observation;
use crate::datasets::SpectrumDatasetOnOff;
use crate::error::AnalysisError;
use crate::sky::{SkyCoord, SkyRegion};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReflectedRegionsConfig {
    /// Extra rotation (degrees) between consecutive off regions.
    pub min_distance_deg: f64,
    /// Extra rotation (degrees) between the on region and the first off region.
    pub min_distance_input_deg: f64,
    /// Rotation step (degrees) after a rejected candidate.
    pub angle_increment_deg: f64,
    pub max_region_number: usize,
    /// Fewer accepted regions than this is an error.
    pub min_off_regions: usize,
    pub exclusion_regions: Vec<SkyRegion>,
    /// Field-of-view radius (degrees); defaults to the response's own.
    pub max_fov_deg: Option<f64>,
}

impl Default for ReflectedRegionsConfig {
    fn default() -> Self {
        Self {
            min_distance_deg: 0.0,
            min_distance_input_deg: 0.1f64.to_degrees(),
            angle_increment_deg: 0.1f64.to_degrees(),
            max_region_number: 10_000,
            min_off_regions: 3,
            exclusion_regions: Vec::new(),
            max_fov_deg: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReflectedRegionsFinder {
    config: ReflectedRegionsConfig,
}

impl ReflectedRegionsFinder {
    pub fn new(config: ReflectedRegionsConfig) -> Self {
        Self { config }
    }

    /// Rotation (degrees) that makes two copies of the region just touch.
    pub fn base_angle(on: &SkyRegion, pointing: &SkyCoord) -> Option<f64> {
        let r = pointing.separation(&on.center());
        let rho = on.bounding_radius();
        if !(r > rho) {
            return None;
        }
        let ratio = rho.to_radians().sin() / r.to_radians().sin();
        Some(2.0 * ratio.clamp(-1.0, 1.0).asin().to_degrees())
    }

    /// Off regions for `on` seen from `pointing`, in rotation order.
    pub fn find(
        &self,
        on: &SkyRegion,
        pointing: &SkyCoord,
        fov_radius: f64,
    ) -> Result<Vec<SkyRegion>, AnalysisError> {
        let cfg = &self.config;
        let required = cfg.min_off_regions;
        let Some(base) = Self::base_angle(on, pointing) else {
            return Err(AnalysisError::InsufficientOffRegions { found: 0, required });
        };
        let fov = cfg.max_fov_deg.unwrap_or(fov_radius);
        let first = base + cfg.min_distance_input_deg;
        let step = base + cfg.min_distance_deg;
        let increment = cfg.angle_increment_deg.max(1e-3);

        let mut regions: Vec<SkyRegion> = Vec::new();
        let mut angle = first;
        while angle <= 360.0 - first + 1e-9 && regions.len() < cfg.max_region_number {
            let candidate = on.rotated_about(pointing, angle);
            let accepted = candidate.is_within(pointing, fov)
                && !candidate.overlaps(on)
                && regions.iter().all(|off| !candidate.overlaps(off))
                && cfg.exclusion_regions.iter().all(|ex| !candidate.overlaps(ex));
            if accepted {
                regions.push(candidate);
                angle += step;
            } else {
                angle += increment;
            }
        }

        if regions.len() < required {
            return Err(AnalysisError::InsufficientOffRegions {
                found: regions.len(),
                required,
            });
        }
        Ok(regions)
    }
}

/// Fills off counts, background and alpha from reflected regions.
#[derive(Debug, Clone)]
pub struct ReflectedRegionsBackgroundMaker {
    finder: ReflectedRegionsFinder,
}

impl ReflectedRegionsBackgroundMaker {
    pub fn new(config: ReflectedRegionsConfig) -> Self {
        Self {
            finder: ReflectedRegionsFinder::new(config),
        }
    }

    pub fn finder(&self) -> &ReflectedRegionsFinder {
        &self.finder
    }

    pub fn run(
        &self,
        mut dataset: SpectrumDatasetOnOff,
        observation: &Observation,
        on: &SkyRegion,
    ) -> Result<SpectrumDatasetOnOff, AnalysisError> {
        let regions = self
            .finder
            .find(on, &observation.pointing, observation.irf.fov_radius())?;

        let mut counts_off = vec![0.0; dataset.energy.nbin()];
        for event in &observation.events {
            if !regions.iter().any(|off| off.contains(&event.coord)) {
                continue;
            }
            if let Some(r) = dataset.energy.bin_of(event.energy) {
                counts_off[r] += 1.0;
            }
        }

        let off_solid_angle: f64 = regions.iter().map(SkyRegion::solid_angle).sum();
        let alpha = if off_solid_angle > 0.0 {
            dataset.on_solid_angle / off_solid_angle
        } else {
            0.0
        };

        dataset.background = counts_off.iter().map(|n| alpha * n).collect();
        dataset.alpha = vec![alpha; counts_off.len()];
        dataset.counts_off = Some(counts_off);
        dataset.meta.n_off_regions = Some(regions.len());

        log::debug!(
            "obs {}: {} reflected regions, alpha = {alpha:.4}",
            observation.obs_id,
            regions.len()
        );
        Ok(dataset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn pointing() -> SkyCoord {
        SkyCoord::new(83.6, 22.0)
    }

    fn on_at(offset: f64, radius: f64) -> SkyRegion {
        SkyRegion::circle(pointing().offset_by(0.0, offset), radius).unwrap()
    }

    #[test]
    fn finds_non_overlapping_regions_at_equal_offset() {
        let on = on_at(1.0, 0.5);
        let finder = ReflectedRegionsFinder::new(ReflectedRegionsConfig::default());
        let regions = finder.find(&on, &pointing(), 2.5).unwrap();

        // 60° per region, 5.73° gap on each side of the on region.
        assert_eq!(regions.len(), 4);
        for (i, off) in regions.iter().enumerate() {
            assert_relative_eq!(pointing().separation(&off.center()), 1.0, epsilon = 1e-9);
            assert!(!off.overlaps(&on));
            for other in &regions[i + 1..] {
                assert!(!off.overlaps(other));
            }
        }
    }

    #[test]
    fn region_count_is_bounded_by_geometry() {
        let pointing = pointing();
        for &(offset, radius) in &[(1.0, 0.1), (1.5, 0.3), (0.7, 0.2)] {
            let on = on_at(offset, radius);
            let cfg = ReflectedRegionsConfig {
                min_distance_input_deg: 0.0,
                min_off_regions: 0,
                ..ReflectedRegionsConfig::default()
            };
            let regions = ReflectedRegionsFinder::new(cfg).find(&on, &pointing, 3.0).unwrap();
            let base = ReflectedRegionsFinder::base_angle(&on, &pointing).unwrap();
            assert!(regions.len() as f64 <= (360.0 / base).floor());
        }
    }

    #[test]
    fn too_large_region_fails() {
        let on = on_at(1.0, 0.9);
        let finder = ReflectedRegionsFinder::new(ReflectedRegionsConfig::default());
        assert!(matches!(
            finder.find(&on, &pointing(), 2.5),
            Err(AnalysisError::InsufficientOffRegions { required: 3, .. })
        ));

        let centred = on_at(0.2, 0.3);
        assert!(matches!(
            finder.find(&centred, &pointing(), 2.5),
            Err(AnalysisError::InsufficientOffRegions { found: 0, .. })
        ));
    }

    #[test]
    fn exclusions_and_cap_are_respected() {
        let on = on_at(1.0, 0.2);
        let excluded = SkyRegion::circle(pointing().offset_by(180.0, 1.0), 0.4).unwrap();
        let cfg = ReflectedRegionsConfig {
            exclusion_regions: vec![excluded.clone()],
            ..ReflectedRegionsConfig::default()
        };
        let regions = ReflectedRegionsFinder::new(cfg.clone()).find(&on, &pointing(), 2.5).unwrap();
        assert!(regions.iter().all(|r| !r.overlaps(&excluded)));

        let capped = ReflectedRegionsConfig {
            max_region_number: 3,
            ..cfg
        };
        let regions = ReflectedRegionsFinder::new(capped).find(&on, &pointing(), 2.5).unwrap();
        assert_eq!(regions.len(), 3);
    }

    #[test]
    fn regions_must_fit_in_the_field_of_view() {
        let on = on_at(1.0, 0.5);
        let finder = ReflectedRegionsFinder::new(ReflectedRegionsConfig::default());
        assert!(finder.find(&on, &pointing(), 1.4).is_err());
    }
}
