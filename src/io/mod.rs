//! Input/output helpers.
//!
//! - analysis configuration JSON (`config_file`)
//! - spectrum dataset JSON (`dataset_file`)
//! - parameter and statistics CSV exports (`export`)

pub mod config_file;
pub mod dataset_file;
pub mod export;

pub use config_file::*;
pub use dataset_file::*;
pub use export::*;
