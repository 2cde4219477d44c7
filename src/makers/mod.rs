//! Per-observation reduction steps.
//!
//! Each maker takes a dataset by value and returns the filled dataset, so a
//! reduction is a straight chain:
//!
//! ```text
//! spectrum maker -> reflected-region background -> safe mask
//! ```

pub mod reflected;
pub mod response;
pub mod safe;
pub mod spectrum;

pub use reflected::*;
pub use response::*;
pub use safe::*;
pub use spectrum::*;
