//! Spectral fitting.
//!
//! Responsibilities:
//!
//! - Poisson fit statistics (`cash`, `wstat`)
//! - derivative-free minimisation with an observable state machine
//! - covariance estimation and the fit result record

pub mod fitter;
pub mod optimizer;
pub mod stat;

pub use fitter::*;
pub use optimizer::{FailureReason, FitState, Minimum, OptimizerOptions, minimize};
pub use stat::*;
