//! Summary statistics per dataset and cumulatively.

use serde::{Deserialize, Serialize};

use crate::datasets::dataset::SpectrumDatasetOnOff;
use crate::datasets::stack::stack_all;
use crate::error::AnalysisError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRow {
    pub name: String,
    pub n_obs: usize,
    pub counts: f64,
    pub counts_off: Option<f64>,
    pub background: f64,
    pub excess: f64,
    /// Signed significance of the excess.
    pub sqrt_ts: f64,
    /// Effective normalisation `background / counts_off`.
    pub alpha: Option<f64>,
    pub livetime: f64,
    pub n_safe_bins: usize,
}

impl InfoRow {
    pub fn from_dataset(ds: &SpectrumDatasetOnOff) -> Self {
        let counts = ds.total_counts();
        let background = ds.total_background();
        let counts_off = ds.total_counts_off();
        let alpha = counts_off.and_then(|n_off| (n_off > 0.0).then(|| background / n_off));
        let sqrt_ts = match (counts_off, alpha) {
            (Some(n_off), Some(alpha)) => li_ma_significance(counts, n_off, alpha),
            _ => cash_significance(counts, background),
        };
        Self {
            name: ds.name().to_string(),
            n_obs: ds.meta().obs_ids.len(),
            counts,
            counts_off,
            background,
            excess: counts - background,
            sqrt_ts,
            alpha,
            livetime: ds.livetime(),
            n_safe_bins: ds.n_safe_bins(),
        }
    }
}

/// One row per dataset.
pub fn info_table(datasets: &[SpectrumDatasetOnOff]) -> Vec<InfoRow> {
    datasets.iter().map(InfoRow::from_dataset).collect()
}

/// Row `i` summarises the stack of datasets `0..=i`.
pub fn cumulative_info_table(datasets: &[SpectrumDatasetOnOff]) -> Result<Vec<InfoRow>, AnalysisError> {
    let mut rows = Vec::with_capacity(datasets.len());
    for i in 0..datasets.len() {
        let stacked = stack_all(&datasets[..=i])?;
        let mut row = InfoRow::from_dataset(&stacked);
        row.name = format!("stacked-{}", i + 1);
        rows.push(row);
    }
    Ok(rows)
}

/// Li & Ma (1983) eq. 17, signed by the excess.
pub fn li_ma_significance(n_on: f64, n_off: f64, alpha: f64) -> f64 {
    if !(alpha > 0.0) || n_on + n_off <= 0.0 {
        return 0.0;
    }
    let total = n_on + n_off;
    let term_on = if n_on > 0.0 {
        n_on * ((1.0 + alpha) / alpha * n_on / total).ln()
    } else {
        0.0
    };
    let term_off = if n_off > 0.0 {
        n_off * ((1.0 + alpha) * n_off / total).ln()
    } else {
        0.0
    };
    let ts = (2.0 * (term_on + term_off)).max(0.0);
    (n_on - alpha * n_off).signum() * ts.sqrt()
}

/// Significance of `n_on` over a known background `mu_bkg`.
pub fn cash_significance(n_on: f64, mu_bkg: f64) -> f64 {
    if !(mu_bkg > 0.0) {
        return 0.0;
    }
    let ts = if n_on > 0.0 {
        2.0 * (n_on * (n_on / mu_bkg).ln() - (n_on - mu_bkg))
    } else {
        2.0 * mu_bkg
    };
    (n_on - mu_bkg).signum() * ts.max(0.0).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn li_ma_reference_value() {
        // n_on = 130, n_off = 500, alpha = 0.2: classic textbook example.
        let s = li_ma_significance(130.0, 500.0, 0.2);
        assert_relative_eq!(s, 2.6, epsilon = 0.05);
        assert!(li_ma_significance(80.0, 500.0, 0.2) < 0.0);
        assert_eq!(li_ma_significance(0.0, 0.0, 0.2), 0.0);
    }

    #[test]
    fn cash_significance_is_signed() {
        assert!(cash_significance(30.0, 10.0) > 4.0);
        assert!(cash_significance(5.0, 10.0) < 0.0);
        assert_eq!(cash_significance(5.0, 0.0), 0.0);
    }
}
