//! Run-level configuration types.
//!
//! This module defines:
//!
//! - energy binning specs (`AxisSpec`)
//! - the on-region geometry config (`GeometryConfig`)
//! - the full analysis configuration (`AnalysisConfig`)

pub mod types;

pub use types::*;
