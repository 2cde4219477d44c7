//! Observation sources.
//!
//! The reduction pipeline only needs two things from storage: the list of
//! available observation ids and a way to load one observation by id. Both the
//! on-disk store and the in-memory store implement [`ObservationSource`], so
//! tests and the simulator can skip the filesystem entirely.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::data::observation::{ObsId, Observation, ObservationSummary};
use crate::error::AnalysisError;

/// Environment variable naming the default data directory.
pub const DATA_DIR_ENV: &str = "GAMMASPEC_DATA";

const INDEX_FILE: &str = "obs-index.json";

/// Anything the pipeline can load observations from.
///
/// Implementations must be shareable across worker threads.
pub trait ObservationSource: Sync {
    /// Available observation ids, ascending.
    fn obs_ids(&self) -> Result<Vec<ObsId>, AnalysisError>;

    fn load(&self, obs_id: ObsId) -> Result<Observation, AnalysisError>;

    /// Summaries used for selection. The default loads every observation.
    fn summaries(&self) -> Result<Vec<ObservationSummary>, AnalysisError> {
        self.obs_ids()?
            .into_iter()
            .map(|id| self.load(id).map(|o| o.summary()))
            .collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    observations: BTreeMap<ObsId, Observation>,
}

impl InMemoryStore {
    pub fn new(observations: impl IntoIterator<Item = Observation>) -> Self {
        Self {
            observations: observations.into_iter().map(|o| (o.obs_id, o)).collect(),
        }
    }

    pub fn insert(&mut self, observation: Observation) {
        self.observations.insert(observation.obs_id, observation);
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }
}

impl ObservationSource for InMemoryStore {
    fn obs_ids(&self) -> Result<Vec<ObsId>, AnalysisError> {
        Ok(self.observations.keys().copied().collect())
    }

    fn load(&self, obs_id: ObsId) -> Result<Observation, AnalysisError> {
        self.observations
            .get(&obs_id)
            .cloned()
            .ok_or(AnalysisError::ObservationNotFound(obs_id))
    }

    fn summaries(&self) -> Result<Vec<ObservationSummary>, AnalysisError> {
        Ok(self.observations.values().map(Observation::summary).collect())
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct IndexFile {
    observations: Vec<ObservationSummary>,
}

/// Directory of `obs-<id>.json` files plus an optional `obs-index.json`.
#[derive(Debug, Clone)]
pub struct DataStore {
    dir: PathBuf,
}

impl DataStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, AnalysisError> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(AnalysisError::InvalidConfig(format!(
                "data directory {} does not exist",
                dir.display()
            )));
        }
        Ok(Self { dir })
    }

    /// Open the directory named by `GAMMASPEC_DATA` (a `.env` file is honoured).
    pub fn from_env() -> Result<Self, AnalysisError> {
        dotenvy::dotenv().ok();
        let dir = std::env::var(DATA_DIR_ENV).map_err(|_| {
            AnalysisError::InvalidConfig(format!(
                "no data directory given and {DATA_DIR_ENV} is not set"
            ))
        })?;
        Self::open(dir)
    }

    /// Create the directory if needed and return a store over it.
    pub fn create(dir: impl Into<PathBuf>) -> Result<Self, AnalysisError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, obs_id: ObsId) -> PathBuf {
        self.dir.join(format!("obs-{obs_id:06}.json"))
    }

    pub fn write(&self, observation: &Observation) -> Result<PathBuf, AnalysisError> {
        let path = self.path_for(observation.obs_id);
        let json = serde_json::to_string(observation)?;
        fs::write(&path, json)?;
        Ok(path)
    }

    /// Write (or rewrite) the index from the observations currently on disk.
    pub fn write_index(&self, summaries: &[ObservationSummary]) -> Result<(), AnalysisError> {
        let mut observations = summaries.to_vec();
        observations.sort_by_key(|s| s.obs_id);
        let json = serde_json::to_string_pretty(&IndexFile { observations })?;
        fs::write(self.dir.join(INDEX_FILE), json)?;
        Ok(())
    }

    fn read_index(&self) -> Result<Option<Vec<ObservationSummary>>, AnalysisError> {
        let path = self.dir.join(INDEX_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let text = fs::read_to_string(path)?;
        let index: IndexFile = serde_json::from_str(&text)?;
        Ok(Some(index.observations))
    }
}

fn parse_obs_file_name(name: &str) -> Option<ObsId> {
    name.strip_prefix("obs-")?
        .strip_suffix(".json")?
        .parse()
        .ok()
}

impl ObservationSource for DataStore {
    fn obs_ids(&self) -> Result<Vec<ObsId>, AnalysisError> {
        let mut ids = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if let Some(id) = entry.file_name().to_str().and_then(parse_obs_file_name) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        Ok(ids)
    }

    fn load(&self, obs_id: ObsId) -> Result<Observation, AnalysisError> {
        let path = self.path_for(obs_id);
        if !path.exists() {
            return Err(AnalysisError::ObservationNotFound(obs_id));
        }
        let text = fs::read_to_string(&path)?;
        let observation: Observation = serde_json::from_str(&text)?;
        if observation.obs_id != obs_id {
            return Err(AnalysisError::InvalidConfig(format!(
                "{} holds observation {}",
                path.display(),
                observation.obs_id
            )));
        }
        observation.validate()?;
        Ok(observation)
    }

    fn summaries(&self) -> Result<Vec<ObservationSummary>, AnalysisError> {
        match self.read_index()? {
            Some(index) => Ok(index),
            None => {
                log::debug!("no {INDEX_FILE} in {}, loading observations", self.dir.display());
                self.obs_ids()?
                    .into_iter()
                    .map(|id| self.load(id).map(|o| o.summary()))
                    .collect()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_observation_file_names() {
        assert_eq!(parse_obs_file_name("obs-000042.json"), Some(42));
        assert_eq!(parse_obs_file_name("obs-index.json"), None);
        assert_eq!(parse_obs_file_name("notes.txt"), None);
    }

    #[test]
    fn in_memory_store_reports_missing_ids() {
        let store = InMemoryStore::default();
        assert!(store.is_empty());
        assert!(matches!(store.load(3), Err(AnalysisError::ObservationNotFound(3))));
    }
}
