//! Region-averaged instrument response.
//!
//! An extended on-region sees a different effective area and energy
//! dispersion at every point, because both depend on the offset from the
//! pointing. We integrate over the region on a regular grid in its own tangent
//! plane, weighting each cell by its solid angle:
//!
//! ```text
//! A(E) = Σ_s w_s A(E, θ_s) / Σ_s w_s
//! K(E, E') = Σ_s w_s A(E, θ_s) K(E, E'; θ_s) / Σ_s w_s A(E, θ_s)
//! ```
//!
//! The grid is refined (points per axis doubled) until the averaged area stops
//! changing by more than `tolerance`, or the refinement budget runs out.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::data::Observation;
use crate::irf::{EDispKernel, InstrumentResponse};
use crate::sky::{EnergyAxis, SkyCoord, SkyRegion, TangentFrame};

/// Offsets closer than this (degrees) share one dispersion evaluation.
const EDISP_OFFSET_STEP: f64 = 0.02;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    /// Grid points per axis on the first pass.
    pub initial_points: usize,
    /// How many times the grid may be doubled.
    pub max_refinements: usize,
    /// Largest relative change of the averaged area accepted as converged.
    pub tolerance: f64,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            initial_points: 8,
            max_refinements: 4,
            tolerance: 1e-3,
        }
    }
}

/// One grid cell inside the region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionSample {
    pub coord: SkyCoord,
    /// Distance (degrees) from the pointing.
    pub offset: f64,
    /// Solid angle (sr) represented by the cell.
    pub weight: f64,
}

/// Response of one observation folded over one region.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionResponse {
    /// Exposure per true-energy bin (cm² s); zero where invalid.
    pub exposure: Vec<f64>,
    /// False where part of the region lies outside the response's field of view.
    pub valid: Vec<bool>,
    pub edisp: EDispKernel,
    pub n_samples: usize,
    /// Solid angle (sr) covered by the samples.
    pub solid_angle: f64,
    pub converged: bool,
}

/// How the response is evaluated over the region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ResponseMode {
    /// Evaluate once at the region centre.
    RegionCenter,
    /// Average over the region with adaptive sampling.
    RegionAverage(SamplingConfig),
}

/// Grid the region with `n_across` cells per axis of its bounding square.
///
/// Falls back to a single sample at the region centre when no cell centre
/// lands inside (regions much smaller than the cell size).
pub fn sample_region(region: &SkyRegion, pointing: &SkyCoord, n_across: usize) -> Vec<RegionSample> {
    let n = n_across.max(1);
    let center = region.center();
    let frame = TangentFrame::new(center);
    let half = region.bounding_radius().to_radians().tan().to_degrees();
    let step = 2.0 * half / n as f64;

    let mut samples = Vec::new();
    for i in 0..n {
        let x = -half + (i as f64 + 0.5) * step;
        for j in 0..n {
            let y = -half + (j as f64 + 0.5) * step;
            let coord = frame.deproject(x, y);
            if region.contains(&coord) {
                samples.push(RegionSample {
                    coord,
                    offset: pointing.separation(&coord),
                    weight: TangentFrame::cell_solid_angle(x, y, step, step),
                });
            }
        }
    }

    if samples.is_empty() {
        samples.push(RegionSample {
            coord: center,
            offset: pointing.separation(&center),
            weight: region.solid_angle(),
        });
    }
    samples
}

/// Exposure and dispersion kernel of `observation` over `region`.
pub fn region_response(
    observation: &Observation,
    region: &SkyRegion,
    energy_true: &EnergyAxis,
    energy: &EnergyAxis,
    mode: ResponseMode,
) -> RegionResponse {
    match mode {
        ResponseMode::RegionCenter => center_response(observation, region, energy_true, energy),
        ResponseMode::RegionAverage(config) => {
            averaged_response(observation, region, energy_true, energy, &config)
        }
    }
}

fn center_response(
    observation: &Observation,
    region: &SkyRegion,
    energy_true: &EnergyAxis,
    energy: &EnergyAxis,
) -> RegionResponse {
    let irf = &observation.irf;
    let offset = observation.offset_of(&region.center());
    let mut exposure = vec![0.0; energy_true.nbin()];
    let mut valid = vec![false; energy_true.nbin()];
    let mut edisp = EDispKernel::from_edisp(&irf.edisp, offset, energy_true, energy);

    for t in 0..energy_true.nbin() {
        match irf.aeff.evaluate(energy_true.center(t), offset) {
            Some(area) => {
                exposure[t] = area * observation.livetime;
                valid[t] = true;
            }
            None => zero_row(&mut edisp, t),
        }
    }

    RegionResponse {
        exposure,
        valid,
        edisp,
        n_samples: 1,
        solid_angle: region.solid_angle(),
        converged: true,
    }
}

fn averaged_response(
    observation: &Observation,
    region: &SkyRegion,
    energy_true: &EnergyAxis,
    energy: &EnergyAxis,
    config: &SamplingConfig,
) -> RegionResponse {
    let irf = &observation.irf;
    let mut n_across = config.initial_points.max(1);
    let mut samples = sample_region(region, &observation.pointing, n_across);
    let mut average = average_area(irf, &samples, energy_true);
    let mut converged = false;

    for _ in 0..config.max_refinements {
        n_across *= 2;
        let finer = sample_region(region, &observation.pointing, n_across);
        let finer_average = average_area(irf, &finer, energy_true);
        let change = max_relative_change(&average, &finer_average);
        samples = finer;
        average = finer_average;
        if change <= config.tolerance {
            converged = true;
            break;
        }
    }
    if !converged {
        log::debug!(
            "obs {}: region response not converged after {} refinements ({} samples)",
            observation.obs_id,
            config.max_refinements,
            samples.len()
        );
    }

    let edisp = average_edisp(irf, &samples, energy_true, energy, &average.valid);
    let exposure = average
        .area
        .iter()
        .zip(&average.valid)
        .map(|(a, &ok)| if ok { a * observation.livetime } else { 0.0 })
        .collect();

    RegionResponse {
        exposure,
        valid: average.valid,
        edisp,
        n_samples: samples.len(),
        solid_angle: samples.iter().map(|s| s.weight).sum(),
        converged,
    }
}

#[derive(Debug, Clone, PartialEq)]
struct AreaAverage {
    area: Vec<f64>,
    valid: Vec<bool>,
}

fn average_area(irf: &InstrumentResponse, samples: &[RegionSample], energy_true: &EnergyAxis) -> AreaAverage {
    let total_weight: f64 = samples.iter().map(|s| s.weight).sum();
    let mut area = vec![0.0; energy_true.nbin()];
    let mut valid = vec![true; energy_true.nbin()];

    for t in 0..energy_true.nbin() {
        let e = energy_true.center(t);
        let mut acc = 0.0;
        for s in samples {
            match irf.aeff.evaluate(e, s.offset) {
                Some(a) => acc += s.weight * a,
                None => {
                    valid[t] = false;
                    break;
                }
            }
        }
        area[t] = if valid[t] && total_weight > 0.0 { acc / total_weight } else { 0.0 };
    }
    AreaAverage { area, valid }
}

fn max_relative_change(coarse: &AreaAverage, fine: &AreaAverage) -> f64 {
    if coarse.valid != fine.valid {
        return f64::INFINITY;
    }
    coarse
        .area
        .iter()
        .zip(&fine.area)
        .zip(&fine.valid)
        .filter(|(_, ok)| **ok)
        .map(|((a, b), _)| {
            let scale = a.abs().max(b.abs());
            if scale == 0.0 { 0.0 } else { (a - b).abs() / scale }
        })
        .fold(0.0, f64::max)
}

/// Per-offset-group weights: `(Σ w·A per true bin, Σ w)`.
type OffsetGroups = BTreeMap<i64, (Vec<f64>, f64)>;

fn average_edisp(
    irf: &InstrumentResponse,
    samples: &[RegionSample],
    energy_true: &EnergyAxis,
    energy: &EnergyAxis,
    valid: &[bool],
) -> EDispKernel {
    let n_true = energy_true.nbin();
    let mut groups: OffsetGroups = BTreeMap::new();
    for s in samples {
        let key = (s.offset / EDISP_OFFSET_STEP).round() as i64;
        let entry = groups.entry(key).or_insert_with(|| (vec![0.0; n_true], 0.0));
        for t in 0..n_true {
            let a = irf.aeff.evaluate(energy_true.center(t), s.offset).unwrap_or(0.0);
            entry.0[t] += s.weight * a;
        }
        entry.1 += s.weight;
    }

    let mut kernel = EDispKernel::zeros(n_true, energy.nbin());
    for t in 0..n_true {
        if !valid[t] {
            continue;
        }
        let e_true = energy_true.center(t);
        let area_norm: f64 = groups.values().map(|(wa, _)| wa[t]).sum();
        let weight_norm: f64 = groups.values().map(|(_, w)| *w).sum();
        for (&key, (wa, w)) in &groups {
            let weight = if area_norm > 0.0 {
                wa[t] / area_norm
            } else if weight_norm > 0.0 {
                w / weight_norm
            } else {
                0.0
            };
            if weight == 0.0 {
                continue;
            }
            let row = irf.edisp.kernel_row(e_true, key as f64 * EDISP_OFFSET_STEP, energy);
            for (r, p) in row.into_iter().enumerate() {
                kernel.set(t, r, kernel.get(t, r) + weight * p);
            }
        }
    }
    kernel
}

fn zero_row(kernel: &mut EDispKernel, t: usize) {
    for r in 0..kernel.n_reco() {
        kernel.set(t, r, 0.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Event;
    use crate::irf::{EffectiveArea2D, EnergyDispersion2D};
    use crate::sky::AxisKind;
    use approx::assert_relative_eq;
    use chrono::{DateTime, Utc};

    fn observation(aeff: EffectiveArea2D, edisp: EnergyDispersion2D) -> Observation {
        Observation {
            obs_id: 1,
            pointing: SkyCoord::new(0.0, 0.0),
            livetime: 1000.0,
            tstart: DateTime::<Utc>::UNIX_EPOCH,
            events: Vec::<Event>::new(),
            irf: InstrumentResponse::new(aeff, edisp),
        }
    }

    fn axes() -> (EnergyAxis, EnergyAxis) {
        let reco = EnergyAxis::log_spaced(0.5, 50.0, 6, AxisKind::Reco).unwrap();
        let etrue = EnergyAxis::log_spaced(0.3, 80.0, 10, AxisKind::True).unwrap();
        (etrue, reco)
    }

    #[test]
    fn sampled_solid_angle_approaches_region_area() {
        let region = SkyRegion::circle(SkyCoord::new(1.0, 0.0), 0.5).unwrap();
        let samples = sample_region(&region, &SkyCoord::new(0.0, 0.0), 64);
        let total: f64 = samples.iter().map(|s| s.weight).sum();
        assert_relative_eq!(total, region.solid_angle(), max_relative = 0.01);
    }

    #[test]
    fn flat_response_converges_immediately() {
        let aeff = EffectiveArea2D::flat(1e6, 0.1, 100.0, 2.5).unwrap();
        let obs = observation(aeff, EnergyDispersion2D::perfect());
        let region = SkyRegion::circle(SkyCoord::new(1.0, 0.0), 0.5).unwrap();
        let (etrue, reco) = axes();
        let resp = region_response(
            &obs,
            &region,
            &etrue,
            &reco,
            ResponseMode::RegionAverage(SamplingConfig::default()),
        );
        assert!(resp.converged);
        assert!(resp.valid.iter().all(|v| *v));
        for e in &resp.exposure {
            assert_relative_eq!(*e, 1e9, max_relative = 1e-12);
        }
    }

    #[test]
    fn averaged_exposure_is_bounded_by_pointwise_extremes() {
        let aeff = EffectiveArea2D::with_radial_falloff(1e6, 0.1, 100.0, 3.0, 1.0).unwrap();
        let obs = observation(aeff.clone(), EnergyDispersion2D::perfect());
        let region = SkyRegion::circle(SkyCoord::new(1.0, 0.0), 0.5).unwrap();
        let (etrue, reco) = axes();
        let resp = region_response(
            &obs,
            &region,
            &etrue,
            &reco,
            ResponseMode::RegionAverage(SamplingConfig::default()),
        );

        for t in 0..etrue.nbin() {
            let e = etrue.center(t);
            let hi = aeff.evaluate(e, 0.5).unwrap() * obs.livetime;
            let lo = aeff.evaluate(e, 1.5).unwrap() * obs.livetime;
            assert!(resp.exposure[t] <= hi * (1.0 + 1e-12));
            assert!(resp.exposure[t] >= lo * (1.0 - 1e-12));
        }
        // Stays close to the value at the region centre.
        let center = aeff.evaluate(etrue.center(3), 1.0).unwrap() * obs.livetime;
        assert!((resp.exposure[3] - center).abs() / center < 0.05);
    }

    #[test]
    fn region_leaving_the_field_of_view_is_invalid() {
        let aeff = EffectiveArea2D::flat(1e6, 0.1, 100.0, 1.2).unwrap();
        let obs = observation(aeff, EnergyDispersion2D::perfect());
        let region = SkyRegion::circle(SkyCoord::new(1.0, 0.0), 0.5).unwrap();
        let (etrue, reco) = axes();
        let resp = region_response(
            &obs,
            &region,
            &etrue,
            &reco,
            ResponseMode::RegionAverage(SamplingConfig::default()),
        );
        assert!(resp.valid.iter().all(|v| !*v));
        assert!(resp.exposure.iter().all(|e| *e == 0.0));
        assert!(resp.edisp.matrix().iter().all(|p| *p == 0.0));

        // The centre alone is still inside the field of view.
        let center = region_response(&obs, &region, &etrue, &reco, ResponseMode::RegionCenter);
        assert!(center.valid.iter().all(|v| *v));
    }

    #[test]
    fn averaged_kernel_rows_stay_normalised() {
        let aeff = EffectiveArea2D::with_radial_falloff(1e6, 0.1, 100.0, 3.0, 1.0).unwrap();
        let edisp = EnergyDispersion2D::gaussian(0.0, 0.15).unwrap();
        let obs = observation(aeff, edisp);
        let region = SkyRegion::ellipse(SkyCoord::new(1.0, 0.0), 0.6, 0.3, 30.0).unwrap();
        let reco = EnergyAxis::log_spaced(0.01, 1000.0, 40, AxisKind::Reco).unwrap();
        let etrue = EnergyAxis::log_spaced(0.3, 80.0, 10, AxisKind::True).unwrap();
        let resp = region_response(
            &obs,
            &region,
            &etrue,
            &reco,
            ResponseMode::RegionAverage(SamplingConfig::default()),
        );
        for t in 0..etrue.nbin() {
            let sum: f64 = (0..reco.nbin()).map(|r| resp.edisp.get(t, r)).sum();
            assert_relative_eq!(sum, 1.0, max_relative = 1e-6);
        }
    }
}
