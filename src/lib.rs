//! `gammaspec` library crate.
//!
//! The binary (`gspec`) is a thin wrapper around this library so that:
//!
//! - the reduction and fitting chain is testable without spawning processes
//! - the makers can be driven from other front-ends (notebooks, batch jobs)
//! - code stays easy to navigate as the project grows
//!
//! Data flow of one run:
//!
//! ```text
//! ObservationSource -> makers (per observation, parallel) -> stack -> fit -> report
//! ```

pub mod app;
pub mod cli;
pub mod data;
pub mod datasets;
pub mod domain;
pub mod error;
pub mod fit;
pub mod io;
pub mod irf;
pub mod makers;
pub mod math;
pub mod models;
pub mod report;
pub mod sky;
