//! Read/write spectrum dataset JSON files.
//!
//! A dataset file is self-describing: besides the binned vectors it carries
//! both energy axes (edges and kind), the dispersion matrix and provenance, so
//! `gspec info` and later fits need nothing else.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::datasets::SpectrumDatasetOnOff;
use crate::error::AppError;

const FORMAT_NAME: &str = "gammaspec-dataset";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetFile {
    pub format: String,
    pub version: u32,
    pub created: DateTime<Utc>,
    pub dataset: SpectrumDatasetOnOff,
}

impl DatasetFile {
    pub fn new(dataset: SpectrumDatasetOnOff) -> Self {
        Self {
            format: FORMAT_NAME.to_string(),
            version: FORMAT_VERSION,
            created: Utc::now(),
            dataset,
        }
    }
}

pub fn write_dataset_json(path: &Path, dataset: &SpectrumDatasetOnOff) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create dataset JSON '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, &DatasetFile::new(dataset.clone()))
        .map_err(|e| AppError::new(2, format!("Failed to write dataset JSON: {e}")))?;
    Ok(())
}

pub fn read_dataset_json(path: &Path) -> Result<DatasetFile, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open dataset JSON '{}': {e}", path.display())))?;
    let parsed: DatasetFile = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid dataset JSON '{}': {e}", path.display())))?;

    if parsed.format != FORMAT_NAME {
        return Err(AppError::new(
            2,
            format!("'{}' is not a dataset file (format '{}')", path.display(), parsed.format),
        ));
    }
    if parsed.version > FORMAT_VERSION {
        return Err(AppError::new(
            2,
            format!(
                "'{}' has dataset format version {}, newest supported is {FORMAT_VERSION}",
                path.display(),
                parsed.version
            ),
        ));
    }
    parsed.dataset.validate()?;
    Ok(parsed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sky::{AxisKind, EnergyAxis, GeometryBuilder, SkyCoord, SkyRegion};

    fn temp_path(name: &str) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("gammaspec-dsfile-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir.join(name)
    }

    fn dataset() -> SpectrumDatasetOnOff {
        let region = SkyRegion::circle(SkyCoord::new(10.0, 0.0), 0.2).unwrap();
        let reco = EnergyAxis::log_spaced(1.0, 10.0, 4, AxisKind::Reco).unwrap();
        let geom = GeometryBuilder::new(region, reco).build().unwrap();
        let mut ds = SpectrumDatasetOnOff::empty("stacked", &geom);
        ds.counts = vec![5.0, 4.0, 2.0, 1.0];
        ds.counts_off = Some(vec![10.0, 8.0, 4.0, 0.0]);
        ds.mask_safe[3] = false;
        ds
    }

    #[test]
    fn dataset_file_keeps_axes_and_mask() {
        let path = temp_path("ds.json");
        let ds = dataset();
        write_dataset_json(&path, &ds).unwrap();
        let back = read_dataset_json(&path).unwrap();
        assert_eq!(back.version, FORMAT_VERSION);
        assert_eq!(back.dataset.energy().kind(), AxisKind::Reco);
        assert_eq!(back.dataset.energy().nbin(), 4);
        assert_eq!(back.dataset.counts(), ds.counts());
        assert_eq!(back.dataset.mask_safe(), ds.mask_safe());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_foreign_json() {
        let path = temp_path("other.json");
        let mut value = serde_json::to_value(DatasetFile::new(dataset())).unwrap();
        value["format"] = serde_json::Value::from("something-else");
        std::fs::write(&path, value.to_string()).unwrap();
        let err = read_dataset_json(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn rejects_inconsistent_vectors() {
        let path = temp_path("broken.json");
        let mut value = serde_json::to_value(DatasetFile::new(dataset())).unwrap();
        value["dataset"]["counts"] = serde_json::json!([1.0, 2.0]);
        std::fs::write(&path, value.to_string()).unwrap();
        assert!(read_dataset_json(&path).is_err());
        std::fs::remove_file(&path).ok();
    }
}
