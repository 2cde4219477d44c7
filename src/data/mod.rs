//! Observation data: records, storage, selection and simulation.

pub mod observation;
pub mod selection;
pub mod simulate;
pub mod store;

pub use observation::*;
pub use selection::*;
pub use simulate::{SimulationConfig, simulate_observations};
pub use store::*;
