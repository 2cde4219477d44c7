//! Poisson fit statistics.
//!
//! - `cash`: on counts against a known background, `2 (μ - n ln μ)`
//! - `wstat`: on and off counts with the background profiled out
//!
//! Both are `-2 ln L` up to model-independent terms; `wstat` includes the
//! saturated-model terms so a perfect fit scores zero.

use crate::datasets::SpectrumDatasetOnOff;
use crate::models::SpectralModel;

/// Predicted counts are floored here before taking logs.
const TRUNCATION: f64 = 1e-25;

pub fn cash(n_on: f64, mu_on: f64) -> f64 {
    let mu = mu_on.max(TRUNCATION);
    2.0 * (mu - n_on * mu.ln())
}

/// Profile-likelihood background estimate for [`wstat`].
pub fn wstat_mu_bkg(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    if n_on == 0.0 {
        return n_off / (1.0 + alpha);
    }
    if n_off == 0.0 {
        let threshold = n_on * alpha / (1.0 + alpha);
        return if mu_sig < threshold {
            n_on / (1.0 + alpha) - mu_sig / alpha
        } else {
            0.0
        };
    }
    let c = alpha * (n_on + n_off) - (1.0 + alpha) * mu_sig;
    let d = (c * c + 4.0 * alpha * (1.0 + alpha) * n_off * mu_sig).sqrt();
    (c + d) / (2.0 * alpha * (1.0 + alpha))
}

pub fn wstat(n_on: f64, n_off: f64, alpha: f64, mu_sig: f64) -> f64 {
    if !(alpha > 0.0) {
        return cash(n_on, mu_sig);
    }
    let mu_bkg = wstat_mu_bkg(n_on, n_off, alpha, mu_sig);
    let mu_on = (mu_sig + alpha * mu_bkg).max(TRUNCATION);
    let mu_off = mu_bkg.max(TRUNCATION);

    let mut stat = mu_on + mu_off;
    if n_on > 0.0 {
        stat += -n_on * mu_on.ln() - n_on + n_on * n_on.ln();
    }
    if n_off > 0.0 {
        stat += -n_off * mu_off.ln() - n_off + n_off * n_off.ln();
    }
    2.0 * stat
}

/// Statistic of `model` on one dataset, summed over safe bins.
pub fn dataset_stat(dataset: &SpectrumDatasetOnOff, model: &SpectralModel) -> f64 {
    let npred = dataset.npred_signal(model);
    let counts = dataset.counts();
    let mask = dataset.mask_safe();

    match dataset.counts_off() {
        Some(off) => (0..counts.len())
            .filter(|&r| mask[r])
            .map(|r| wstat(counts[r], off[r], dataset.alpha()[r], npred[r]))
            .sum(),
        None => (0..counts.len())
            .filter(|&r| mask[r])
            .map(|r| cash(counts[r], npred[r] + dataset.background()[r]))
            .sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn cash_is_minimal_at_the_counts() {
        let at = cash(10.0, 10.0);
        assert!(cash(10.0, 9.0) > at);
        assert!(cash(10.0, 11.0) > at);
        assert!(cash(0.0, 0.0).is_finite());
    }

    #[test]
    fn wstat_vanishes_for_a_perfect_fit() {
        // n_on = mu_sig + alpha * n_off exactly.
        let (n_on, n_off, alpha) = (20.0, 40.0, 0.25);
        let mu_sig = n_on - alpha * n_off;
        assert_relative_eq!(wstat_mu_bkg(n_on, n_off, alpha, mu_sig), n_off, max_relative = 1e-12);
        assert!(wstat(n_on, n_off, alpha, mu_sig).abs() < 1e-9);
        assert!(wstat(n_on, n_off, alpha, mu_sig + 5.0) > 0.0);
    }

    #[test]
    fn wstat_edge_cases_are_finite() {
        for &(n_on, n_off, mu) in &[(0.0, 5.0, 1.0), (5.0, 0.0, 1.0), (5.0, 0.0, 10.0), (0.0, 0.0, 0.0)] {
            assert!(wstat(n_on, n_off, 0.2, mu).is_finite());
        }
        assert_eq!(wstat(4.0, 3.0, 0.0, 2.0), cash(4.0, 2.0));
    }
}
