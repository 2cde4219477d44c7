//! Read/write analysis configuration JSON.

use std::fs::File;
use std::path::Path;

use crate::domain::AnalysisConfig;
use crate::error::AppError;

/// Read and validate a configuration file. Missing fields take their defaults.
pub fn read_config_json(path: &Path) -> Result<AnalysisConfig, AppError> {
    let file = File::open(path)
        .map_err(|e| AppError::new(2, format!("Failed to open config '{}': {e}", path.display())))?;
    let config: AnalysisConfig = serde_json::from_reader(file)
        .map_err(|e| AppError::new(2, format!("Invalid config JSON '{}': {e}", path.display())))?;
    config.validate()?;
    Ok(config)
}

pub fn write_config_json(path: &Path, config: &AnalysisConfig) -> Result<(), AppError> {
    let file = File::create(path)
        .map_err(|e| AppError::new(2, format!("Failed to create config '{}': {e}", path.display())))?;
    serde_json::to_writer_pretty(file, config)
        .map_err(|e| AppError::new(2, format!("Failed to write config JSON: {e}")))?;
    Ok(())
}
