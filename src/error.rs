//! Error types.
//!
//! Two layers:
//!
//! - [`AnalysisError`]: the library taxonomy. Per-observation failures
//!   (`InsufficientOffRegions`, ...) are caught at the reduction loop and
//!   recorded against the observation id rather than aborting the run.
//! - [`AppError`]: what the `gspec` binary reports, carrying a process exit code.

use thiserror::Error;

use crate::data::ObsId;

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid axis ordering: {0}")]
    InvalidAxisOrdering(String),

    #[error("Invalid energy axis: {0}")]
    InvalidAxis(String),

    #[error("Invalid region: {0}")]
    InvalidRegion(String),

    #[error("Only {found} reflected off regions found (minimum {required})")]
    InsufficientOffRegions { found: usize, required: usize },

    #[error("Incompatible dataset geometry: {0}")]
    IncompatibleGeometry(String),

    #[error("Cannot stack an empty list of datasets")]
    EmptyStack,

    #[error("Fit did not converge: {0}")]
    FitNonConvergence(String),

    #[error("Observation not found: {0}")]
    ObservationNotFound(ObsId),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid instrument response: {0}")]
    InvalidResponse(String),

    #[error("Unable to perform file operation: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl AnalysisError {
    /// Exit code used when this error reaches the binary.
    pub fn exit_code(&self) -> u8 {
        match self {
            AnalysisError::InvalidConfig(_)
            | AnalysisError::InvalidAxis(_)
            | AnalysisError::InvalidAxisOrdering(_)
            | AnalysisError::InvalidRegion(_)
            | AnalysisError::Io(_)
            | AnalysisError::Json(_)
            | AnalysisError::Csv(_)
            | AnalysisError::ObservationNotFound(_) => 2,
            AnalysisError::InsufficientOffRegions { .. } | AnalysisError::EmptyStack => 3,
            AnalysisError::IncompatibleGeometry(_)
            | AnalysisError::FitNonConvergence(_)
            | AnalysisError::InvalidResponse(_) => 4,
        }
    }
}

#[derive(Clone)]
pub struct AppError {
    exit_code: u8,
    message: String,
}

impl AppError {
    pub fn new(exit_code: u8, message: impl Into<String>) -> Self {
        Self {
            exit_code,
            message: message.into(),
        }
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<AnalysisError> for AppError {
    fn from(err: AnalysisError) -> Self {
        AppError::new(err.exit_code(), err.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::fmt::Debug for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppError")
            .field("exit_code", &self.exit_code)
            .field("message", &self.message)
            .finish()
    }
}

impl std::error::Error for AppError {}
