//! Observation selection by pointing position.

use serde::{Deserialize, Serialize};

use crate::data::observation::{ObsId, ObservationSummary};
use crate::sky::SkyCoord;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Explicit observation ids; when empty every available observation is considered.
    #[serde(default)]
    pub obs_ids: Vec<ObsId>,
    /// Cone-search centre. Defaults to the on-region centre when unset.
    #[serde(default)]
    pub target: Option<SkyCoord>,
    /// Maximum pointing distance (degrees) from the cone centre.
    #[serde(default = "default_cone_radius")]
    pub radius: f64,
    /// Cap on the number of selected observations (lowest ids first).
    #[serde(default)]
    pub max_observations: Option<usize>,
}

fn default_cone_radius() -> f64 {
    2.5
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            obs_ids: Vec::new(),
            target: None,
            radius: default_cone_radius(),
            max_observations: None,
        }
    }
}

/// Ids of observations pointed within `config.radius` of `center`, ascending.
pub fn select_observations(
    summaries: &[ObservationSummary],
    center: &SkyCoord,
    config: &SelectionConfig,
) -> Vec<ObsId> {
    let mut ids: Vec<ObsId> = summaries
        .iter()
        .filter(|s| config.obs_ids.is_empty() || config.obs_ids.contains(&s.obs_id))
        .filter(|s| s.pointing.separation(center) <= config.radius)
        .map(|s| s.obs_id)
        .collect();
    ids.sort_unstable();
    ids.dedup();
    if let Some(max) = config.max_observations {
        ids.truncate(max);
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Utc};

    fn summary(obs_id: ObsId, lon: f64) -> ObservationSummary {
        ObservationSummary {
            obs_id,
            pointing: SkyCoord::new(lon, 0.0),
            livetime: 1800.0,
            tstart: DateTime::<Utc>::UNIX_EPOCH,
            n_events: 0,
        }
    }

    #[test]
    fn cone_search_filters_by_distance() {
        let s = vec![summary(3, 1.0), summary(1, 0.5), summary(2, 4.0)];
        let cfg = SelectionConfig::default();
        assert_eq!(select_observations(&s, &SkyCoord::new(0.0, 0.0), &cfg), vec![1, 3]);
    }

    #[test]
    fn explicit_ids_and_cap() {
        let s = vec![summary(3, 1.0), summary(1, 0.5), summary(5, 0.2)];
        let cfg = SelectionConfig {
            obs_ids: vec![3, 5],
            max_observations: Some(1),
            ..SelectionConfig::default()
        };
        assert_eq!(select_observations(&s, &SkyCoord::new(0.0, 0.0), &cfg), vec![3]);
    }
}
