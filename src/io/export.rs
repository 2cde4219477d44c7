//! Export fit parameters and dataset statistics to CSV.
//!
//! The exports are meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::Path;

use crate::datasets::InfoRow;
use crate::error::AppError;
use crate::fit::FitResult;

fn csv_error(path: &Path, e: csv::Error) -> AppError {
    AppError::new(2, format!("Failed to write export CSV '{}': {e}", path.display()))
}

fn opt(v: Option<f64>) -> String {
    v.map(|x| format!("{x:.6e}")).unwrap_or_default()
}

/// Write one row per model parameter: `name,value,error,unit,frozen`.
pub fn write_params_csv(path: &Path, result: &FitResult) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record(["name", "value", "error", "unit", "frozen"])
        .map_err(|e| csv_error(path, e))?;

    for p in &result.parameters {
        wtr.write_record(&[
            p.name.clone(),
            format!("{:.6e}", p.value),
            opt(p.error),
            p.unit.clone(),
            p.frozen.to_string(),
        ])
        .map_err(|e| csv_error(path, e))?;
    }

    wtr.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV '{}': {e}", path.display())))?;
    Ok(())
}

/// Write the per-dataset (or cumulative) statistics table.
pub fn write_info_csv(path: &Path, rows: &[InfoRow]) -> Result<(), AppError> {
    let mut wtr = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    wtr.write_record([
        "name",
        "n_obs",
        "counts",
        "counts_off",
        "background",
        "excess",
        "sqrt_ts",
        "alpha",
        "livetime",
        "n_safe_bins",
    ])
    .map_err(|e| csv_error(path, e))?;

    for r in rows {
        wtr.write_record(&[
            r.name.clone(),
            r.n_obs.to_string(),
            format!("{:.1}", r.counts),
            r.counts_off.map(|v| format!("{v:.1}")).unwrap_or_default(),
            format!("{:.4}", r.background),
            format!("{:.4}", r.excess),
            format!("{:.4}", r.sqrt_ts),
            r.alpha.map(|v| format!("{v:.6}")).unwrap_or_default(),
            format!("{:.1}", r.livetime),
            r.n_safe_bins.to_string(),
        ])
        .map_err(|e| csv_error(path, e))?;
    }

    wtr.flush()
        .map_err(|e| AppError::new(2, format!("Failed to flush export CSV '{}': {e}", path.display())))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::{FitParameter, FitState};
    use crate::models::SpectralModel;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("gammaspec-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    #[test]
    fn params_csv_has_one_row_per_parameter() {
        let result = FitResult {
            parameters: vec![
                FitParameter {
                    name: "index".into(),
                    value: 2.31,
                    error: Some(0.05),
                    unit: String::new(),
                    frozen: false,
                },
                FitParameter {
                    name: "reference".into(),
                    value: 1.0,
                    error: None,
                    unit: "TeV".into(),
                    frozen: true,
                },
            ],
            free_parameters: vec!["index".into()],
            covariance: Some(vec![0.0025]),
            total_stat: 12.0,
            success: true,
            state: FitState::Converged,
            message: "optimization converged".into(),
            iterations: 10,
            evaluations: 30,
            model: SpectralModel::power_law(2.31, 1e-12, 1.0),
        };
        let path = temp_path("params.csv");
        write_params_csv(&path, &result).unwrap();

        let mut reader = csv::Reader::from_path(&path).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), ["name", "value", "error", "unit", "frozen"]);
        let rows: Vec<csv::StringRecord> = reader.records().map(|r| r.unwrap()).collect();
        assert_eq!(rows.len(), 2);
        assert_eq!(&rows[0][0], "index");
        assert!((rows[0][1].parse::<f64>().unwrap() - 2.31).abs() < 1e-9);
        assert_eq!(&rows[1][2], "");
        assert_eq!(&rows[1][4], "true");
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn info_csv_leaves_missing_off_counts_empty() {
        let rows = vec![InfoRow {
            name: "obs-1".into(),
            n_obs: 1,
            counts: 10.0,
            counts_off: None,
            background: 2.0,
            excess: 8.0,
            sqrt_ts: 3.5,
            alpha: None,
            livetime: 1800.0,
            n_safe_bins: 5,
        }];
        let path = temp_path("info.csv");
        write_info_csv(&path, &rows).unwrap();
        let mut reader = csv::Reader::from_path(&path).unwrap();
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[0], "obs-1");
        assert_eq!(&record[3], "");
        assert_eq!(&record[9], "5");
        std::fs::remove_file(&path).ok();
    }
}
