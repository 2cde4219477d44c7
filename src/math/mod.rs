//! Mathematical utilities: log-space integration and Hessian inversion.

pub mod integrate;
pub mod linalg;

pub use integrate::*;
pub use linalg::*;
