//! Instrument response functions of a single observation.
//!
//! Responses are functions of true energy and offset from the pointing
//! position; they are owned by the observation that produced them and never
//! mutated afterwards.

pub mod aeff;
pub mod edisp;
pub mod grid;

pub use aeff::*;
pub use edisp::*;
pub use grid::*;

use serde::{Deserialize, Serialize};

/// Response snapshot attached to an observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentResponse {
    pub aeff: EffectiveArea2D,
    pub edisp: EnergyDispersion2D,
}

impl InstrumentResponse {
    pub fn new(aeff: EffectiveArea2D, edisp: EnergyDispersion2D) -> Self {
        Self { aeff, edisp }
    }

    /// Field-of-view radius (degrees) over which the response is defined.
    pub fn fov_radius(&self) -> f64 {
        self.aeff.max_offset()
    }
}
