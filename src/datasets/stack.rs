//! Dataset stacking.
//!
//! Stacking sums per-bin quantities over each input's safe bins and merges the
//! response so that the stacked prediction equals the sum of the individual
//! predictions. With `w_i[r]` the reco-projected exposure of input `i` in bin
//! `r` (zero outside its safe range):
//!
//! ```text
//! exposure[t]  = Σ_i e_i[t]
//! K[t][r]      = Σ_i e_i[t] m_i[r] K_i[t][r] / exposure[t]
//! alpha[r]     = Σ_i w_i[r] / Σ_i (w_i[r] / alpha_i[r])
//! background   = alpha · counts_off   (summed when there are no off counts)
//! mask_safe[r] = OR_i m_i[r]
//! ```
//!
//! Each of these is an associative fold over the inputs, so the stacking order
//! does not matter up to rounding.

use crate::datasets::dataset::{DatasetMeta, SpectrumDatasetOnOff};
use crate::error::AnalysisError;

/// Stack two datasets sharing the same axes.
pub fn stack_pair(
    a: &SpectrumDatasetOnOff,
    b: &SpectrumDatasetOnOff,
) -> Result<SpectrumDatasetOnOff, AnalysisError> {
    check_compatible(a, b)?;
    let n_reco = a.energy.nbin();
    let n_true = a.energy_true.nbin();

    let w_a = alpha_weights(a);
    let w_b = alpha_weights(b);

    let masked = |ds: &SpectrumDatasetOnOff, v: &[f64], r: usize| if ds.mask_safe[r] { v[r] } else { 0.0 };

    let counts = (0..n_reco)
        .map(|r| masked(a, &a.counts, r) + masked(b, &b.counts, r))
        .collect();
    let counts_off: Option<Vec<f64>> = match (&a.counts_off, &b.counts_off) {
        (Some(off_a), Some(off_b)) => Some(
            (0..n_reco)
                .map(|r| masked(a, off_a, r) + masked(b, off_b, r))
                .collect(),
        ),
        (None, None) => None,
        _ => {
            return Err(AnalysisError::IncompatibleGeometry(format!(
                "{} and {} disagree on off counts",
                a.name, b.name
            )));
        }
    };

    let alpha: Vec<f64> = (0..n_reco)
        .map(|r| {
            let weight = w_a[r] + w_b[r];
            let inverse = inverse_alpha_weight(w_a[r], a.alpha[r]) + inverse_alpha_weight(w_b[r], b.alpha[r]);
            if weight > 0.0 && inverse > 0.0 { weight / inverse } else { 0.0 }
        })
        .collect();
    let background = match &counts_off {
        Some(off) => scaled_off(&alpha, off),
        None => (0..n_reco)
            .map(|r| masked(a, &a.background, r) + masked(b, &b.background, r))
            .collect(),
    };

    let mut edisp = a.edisp.clone();
    let mut exposure = vec![0.0; n_true];
    for (t, e) in exposure.iter_mut().enumerate() {
        *e = a.exposure[t] + b.exposure[t];
        for r in 0..n_reco {
            let num = masked_kernel(a, t, r) + masked_kernel(b, t, r);
            edisp.set(t, r, if *e > 0.0 { num / *e } else { 0.0 });
        }
    }

    let exposure_valid = a
        .exposure_valid
        .iter()
        .zip(&b.exposure_valid)
        .map(|(x, y)| *x || *y)
        .collect();
    let mask_safe = a
        .mask_safe
        .iter()
        .zip(&b.mask_safe)
        .map(|(x, y)| *x || *y)
        .collect();

    let mut obs_ids: Vec<_> = a.meta.obs_ids.iter().chain(&b.meta.obs_ids).copied().collect();
    obs_ids.sort_unstable();

    Ok(SpectrumDatasetOnOff {
        name: "stacked".to_string(),
        energy: a.energy.clone(),
        energy_true: a.energy_true.clone(),
        counts,
        counts_off,
        background,
        alpha,
        exposure,
        exposure_valid,
        edisp,
        mask_safe,
        livetime: a.livetime + b.livetime,
        on_solid_angle: a.on_solid_angle,
        meta: DatasetMeta {
            obs_ids,
            offset: None,
            n_off_regions: None,
            response_converged: match (a.meta.response_converged, b.meta.response_converged) {
                (Some(x), Some(y)) => Some(x && y),
                (x, y) => x.or(y),
            },
        },
    })
}

/// Stack all datasets left to right.
pub fn stack_all(datasets: &[SpectrumDatasetOnOff]) -> Result<SpectrumDatasetOnOff, AnalysisError> {
    let (first, rest) = datasets.split_first().ok_or(AnalysisError::EmptyStack)?;
    let mut acc = into_stacked_form(first);
    for ds in rest {
        acc = stack_pair(&acc, ds)?;
    }
    Ok(acc)
}

/// A single dataset as it would come out of a stack: values outside the
/// safe range are zeroed, as are the matching kernel columns.
pub fn into_stacked_form(ds: &SpectrumDatasetOnOff) -> SpectrumDatasetOnOff {
    let weights = alpha_weights(ds);
    let mask = &ds.mask_safe;
    let keep = |v: &[f64]| -> Vec<f64> {
        v.iter()
            .zip(mask)
            .map(|(x, m)| if *m { *x } else { 0.0 })
            .collect()
    };

    let mut edisp = ds.edisp.clone();
    for t in 0..edisp.n_true() {
        for (r, m) in mask.iter().enumerate() {
            if !m {
                edisp.set(t, r, 0.0);
            }
        }
    }

    let mut obs_ids = ds.meta.obs_ids.clone();
    obs_ids.sort_unstable();

    let alpha: Vec<f64> = ds
        .alpha
        .iter()
        .zip(&weights)
        .map(|(a, w)| if *w > 0.0 && *a > 0.0 { *a } else { 0.0 })
        .collect();
    let counts_off = ds.counts_off.as_deref().map(keep);
    let background = match &counts_off {
        Some(off) => scaled_off(&alpha, off),
        None => keep(&ds.background),
    };

    SpectrumDatasetOnOff {
        name: "stacked".to_string(),
        counts: keep(&ds.counts),
        counts_off,
        background,
        alpha,
        edisp,
        meta: DatasetMeta {
            obs_ids,
            offset: None,
            n_off_regions: None,
            response_converged: ds.meta.response_converged,
        },
        ..ds.clone()
    }
}

fn check_compatible(a: &SpectrumDatasetOnOff, b: &SpectrumDatasetOnOff) -> Result<(), AnalysisError> {
    if !a.energy.is_compatible(&b.energy) {
        return Err(AnalysisError::IncompatibleGeometry(format!(
            "{} and {} have different reconstructed energy axes",
            a.name, b.name
        )));
    }
    if !a.energy_true.is_compatible(&b.energy_true) {
        return Err(AnalysisError::IncompatibleGeometry(format!(
            "{} and {} have different true energy axes",
            a.name, b.name
        )));
    }
    let rel = (a.on_solid_angle - b.on_solid_angle).abs() / a.on_solid_angle.max(b.on_solid_angle).max(f64::MIN_POSITIVE);
    if rel > 1e-6 {
        return Err(AnalysisError::IncompatibleGeometry(format!(
            "{} and {} have different on regions",
            a.name, b.name
        )));
    }
    Ok(())
}

/// Reco-projected exposure inside the safe range.
fn alpha_weights(ds: &SpectrumDatasetOnOff) -> Vec<f64> {
    ds.reco_exposure()
        .into_iter()
        .zip(&ds.mask_safe)
        .map(|(w, m)| if *m { w } else { 0.0 })
        .collect()
}

fn scaled_off(alpha: &[f64], counts_off: &[f64]) -> Vec<f64> {
    alpha.iter().zip(counts_off).map(|(a, n)| a * n).collect()
}

fn inverse_alpha_weight(weight: f64, alpha: f64) -> f64 {
    if weight > 0.0 && alpha > 0.0 { weight / alpha } else { 0.0 }
}

fn masked_kernel(ds: &SpectrumDatasetOnOff, t: usize, r: usize) -> f64 {
    if ds.mask_safe[r] {
        ds.exposure[t] * ds.edisp.get(t, r)
    } else {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::{AxisKind, EnergyAxis, GeometryBuilder, RegionGeom, SkyCoord, SkyRegion};
    use approx::assert_relative_eq;

    fn geom(n: usize) -> RegionGeom {
        let region = SkyRegion::circle(SkyCoord::new(0.0, 0.0), 0.5).unwrap();
        let reco = EnergyAxis::log_spaced(1.0, 10.0, n, AxisKind::Reco).unwrap();
        GeometryBuilder::new(region, reco).build().unwrap()
    }

    fn dataset(id: u64, scale: f64, alpha: f64, mask: [bool; 3]) -> SpectrumDatasetOnOff {
        let mut ds = SpectrumDatasetOnOff::empty(format!("obs-{id}"), &geom(3));
        ds.counts = vec![10.0 * scale, 20.0 * scale, 5.0 * scale];
        ds.counts_off = Some(vec![30.0 * scale, 12.0 * scale, 6.0 * scale]);
        ds.alpha = vec![alpha; 3];
        ds.background = ds.counts_off.as_ref().unwrap().iter().map(|n| n * alpha).collect();
        ds.exposure = vec![1e9 * scale, 2e9 * scale, 3e9 * scale];
        for t in 0..3 {
            ds.edisp.set(t, t, 0.8);
            if t + 1 < 3 {
                ds.edisp.set(t, t + 1, 0.2);
            }
        }
        ds.mask_safe = mask.to_vec();
        ds.livetime = 1000.0 * scale;
        ds.meta.obs_ids = vec![id];
        ds
    }

    fn assert_close(a: &SpectrumDatasetOnOff, b: &SpectrumDatasetOnOff) {
        let pairs = [
            (a.counts(), b.counts()),
            (a.background(), b.background()),
            (a.alpha(), b.alpha()),
            (a.exposure(), b.exposure()),
            (a.counts_off().unwrap(), b.counts_off().unwrap()),
        ];
        for (x, y) in pairs {
            for (u, v) in x.iter().zip(y) {
                assert_relative_eq!(*u, *v, max_relative = 1e-12, epsilon = 1e-12);
            }
        }
        for (u, v) in a.edisp().matrix().iter().zip(b.edisp().matrix().iter()) {
            assert_relative_eq!(*u, *v, max_relative = 1e-12, epsilon = 1e-12);
        }
        assert_eq!(a.mask_safe(), b.mask_safe());
        assert_eq!(a.meta().obs_ids, b.meta().obs_ids);
        assert_relative_eq!(a.livetime(), b.livetime());
    }

    #[test]
    fn stacking_is_associative_and_commutative() {
        let a = dataset(1, 1.0, 0.2, [true, true, false]);
        let b = dataset(2, 2.0, 0.25, [false, true, true]);
        let c = dataset(3, 0.5, 0.1, [true, true, true]);

        let left = stack_pair(&stack_pair(&a, &b).unwrap(), &c).unwrap();
        let right = stack_pair(&a, &stack_pair(&b, &c).unwrap()).unwrap();
        assert_close(&left, &right);

        let swapped = stack_all(&[c.clone(), a.clone(), b.clone()]).unwrap();
        assert_close(&left, &swapped);
    }

    #[test]
    fn stacked_prediction_is_the_sum_of_safe_predictions() {
        let a = dataset(1, 1.0, 0.2, [true, true, false]);
        let b = dataset(2, 2.0, 0.25, [false, true, true]);
        let stacked = stack_all(&[a.clone(), b.clone()]).unwrap();

        let flux = [1e-9, 5e-10, 1e-10];
        let fold = |ds: &SpectrumDatasetOnOff| {
            let per_true: Vec<f64> = ds.exposure().iter().zip(&flux).map(|(e, f)| e * f).collect();
            ds.edisp().apply(&per_true)
        };
        let (pa, pb, ps) = (fold(&a), fold(&b), fold(&stacked));
        for r in 0..3 {
            let expected = if a.mask_safe()[r] { pa[r] } else { 0.0 } + if b.mask_safe()[r] { pb[r] } else { 0.0 };
            assert_relative_eq!(ps[r], expected, max_relative = 1e-12);
        }
        assert_eq!(stacked.mask_safe(), &[true, true, true]);
        assert_eq!(stacked.counts(), &[10.0, 60.0, 10.0]);
    }

    #[test]
    fn alpha_keeps_the_background_normalisation() {
        let a = dataset(1, 1.0, 0.2, [true; 3]);
        let b = dataset(2, 1.0, 0.5, [true; 3]);
        let stacked = stack_all(&[a, b]).unwrap();
        // Equal weights: harmonic mean of 0.2 and 0.5.
        for alpha in stacked.alpha() {
            assert_relative_eq!(*alpha, 2.0 / (1.0 / 0.2 + 1.0 / 0.5), max_relative = 1e-12);
        }
    }

    #[test]
    fn stacked_background_is_alpha_times_off_counts() {
        // Unequal exposures and alphas, as for a short and a long observation.
        let a = dataset(1, 1.0, 0.125, [true; 3]);
        let b = dataset(2, 10.0, 0.2, [true, true, false]);
        let stacked = stack_all(&[a, b]).unwrap();
        let off = stacked.counts_off().unwrap();
        for r in 0..3 {
            assert_relative_eq!(stacked.background()[r], stacked.alpha()[r] * off[r], max_relative = 1e-12);
        }
    }

    #[test]
    fn incompatible_or_empty_inputs_fail() {
        assert!(matches!(stack_all(&[]), Err(AnalysisError::EmptyStack)));

        let a = dataset(1, 1.0, 0.2, [true; 3]);
        let other = SpectrumDatasetOnOff::empty("x", &geom(4));
        assert!(matches!(
            stack_pair(&a, &other),
            Err(AnalysisError::IncompatibleGeometry(_))
        ));
    }
}
