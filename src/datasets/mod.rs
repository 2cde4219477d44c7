//! Binned spectrum datasets, stacking and summary tables.

pub mod dataset;
pub mod info;
pub mod stack;

pub use dataset::*;
pub use info::*;
pub use stack::*;
