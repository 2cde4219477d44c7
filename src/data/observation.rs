//! Observation records: pointing, livetime, event list and response.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AnalysisError;
use crate::irf::InstrumentResponse;
use crate::sky::{SkyCoord, SkyRegion};

/// Observation identifier.
pub type ObsId = u64;

/// One reconstructed gamma-like event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Reconstructed energy (TeV).
    pub energy: f64,
    pub coord: SkyCoord,
}

/// Lightweight description of an observation, enough for selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationSummary {
    pub obs_id: ObsId,
    pub pointing: SkyCoord,
    pub livetime: f64,
    pub tstart: DateTime<Utc>,
    pub n_events: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub obs_id: ObsId,
    pub pointing: SkyCoord,
    /// Dead-time corrected observing time (s).
    pub livetime: f64,
    pub tstart: DateTime<Utc>,
    pub events: Vec<Event>,
    pub irf: InstrumentResponse,
}

impl Observation {
    pub fn validate(&self) -> Result<(), AnalysisError> {
        if !(self.livetime.is_finite() && self.livetime > 0.0) {
            return Err(AnalysisError::InvalidConfig(format!(
                "observation {}: livetime must be > 0",
                self.obs_id
            )));
        }
        if self.events.iter().any(|e| !(e.energy.is_finite() && e.energy > 0.0)) {
            return Err(AnalysisError::InvalidConfig(format!(
                "observation {}: event energies must be > 0",
                self.obs_id
            )));
        }
        Ok(())
    }

    pub fn summary(&self) -> ObservationSummary {
        ObservationSummary {
            obs_id: self.obs_id,
            pointing: self.pointing,
            livetime: self.livetime,
            tstart: self.tstart,
            n_events: self.events.len(),
        }
    }

    /// Angular distance (degrees) from the pointing to `coord`.
    pub fn offset_of(&self, coord: &SkyCoord) -> f64 {
        self.pointing.separation(coord)
    }

    /// Events whose position falls inside `region`.
    pub fn events_in<'a>(&'a self, region: &'a SkyRegion) -> impl Iterator<Item = &'a Event> + 'a {
        self.events.iter().filter(move |e| region.contains(&e.coord))
    }
}
