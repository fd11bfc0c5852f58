//! Runtime configuration
//!
//! Defaults cover a local SQLite file; every field can be overridden from
//! the environment:
//!
//! | variable               | values                        | default              |
//! |------------------------|-------------------------------|----------------------|
//! | `MUTANT_BACKEND`       | `memory`, `json`, `sqlite`    | `sqlite`             |
//! | `MUTANT_STORE_PATH`    | file path                     | per backend          |
//! | `MUTANT_MAX_DIMENSION` | integer ≥ 4                   | `1000`               |
//! | `MUTANT_RUN_COUNTING`  | `maximal`, `overlapping`      | `maximal`            |

use crate::classify::ClassificationStore;
use crate::error::DetectorError;
use crate::grid::{GridLimits, GridScanner, RunCounting, DEFAULT_MAX_DIMENSION, RUN_LENGTH};
use crate::stats::StatsAggregator;
use crate::storage::{open_backend, BackendKind, RecordBackend};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;

pub const ENV_BACKEND: &str = "MUTANT_BACKEND";
pub const ENV_STORE_PATH: &str = "MUTANT_STORE_PATH";
pub const ENV_MAX_DIMENSION: &str = "MUTANT_MAX_DIMENSION";
pub const ENV_RUN_COUNTING: &str = "MUTANT_RUN_COUNTING";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub backend: BackendKind,
    pub store_path: PathBuf,
    pub max_dimension: usize,
    pub run_counting: RunCounting,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendKind::Sqlite,
            store_path: PathBuf::from(BackendKind::Sqlite.default_path()),
            max_dimension: DEFAULT_MAX_DIMENSION,
            run_counting: RunCounting::MaximalRuns,
        }
    }
}

impl Config {
    /// Defaults overridden by any `MUTANT_*` variables that are set
    pub fn from_env() -> Result<Self, DetectorError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DetectorError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(kind) = lookup(ENV_BACKEND) {
            config.backend = kind.parse()?;
            config.store_path = PathBuf::from(config.backend.default_path());
        }
        if let Some(path) = lookup(ENV_STORE_PATH).filter(|p| !p.trim().is_empty()) {
            config.store_path = PathBuf::from(path);
        }
        if let Some(max) = lookup(ENV_MAX_DIMENSION) {
            config.max_dimension = max.trim().parse::<usize>().map_err(|e| {
                DetectorError::Config(format!("{}='{}': {}", ENV_MAX_DIMENSION, max, e))
            })?;
        }
        if let Some(counting) = lookup(ENV_RUN_COUNTING) {
            config.run_counting = parse_run_counting(&counting)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.max_dimension < RUN_LENGTH {
            return Err(DetectorError::Config(format!(
                "max dimension {} is below the minimum grid size {}",
                self.max_dimension, RUN_LENGTH
            )));
        }
        Ok(())
    }

    pub fn grid_limits(&self) -> GridLimits {
        GridLimits {
            max_dimension: self.max_dimension,
        }
    }

    pub fn scanner(&self) -> GridScanner {
        GridScanner::with_counting(self.run_counting)
    }

    pub fn open_backend(&self) -> Result<Arc<dyn RecordBackend>, DetectorError> {
        open_backend(self.backend, &self.store_path)
    }

    /// Open the backend once and wire both components to it
    pub fn build(&self) -> Result<(ClassificationStore, StatsAggregator), DetectorError> {
        let backend = self.open_backend()?;
        let store = ClassificationStore::with_classifier(backend.clone(), Arc::new(self.scanner()))
            .with_limits(self.grid_limits());
        Ok((store, StatsAggregator::new(backend)))
    }
}

fn parse_run_counting(value: &str) -> Result<RunCounting, DetectorError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "maximal" | "maximal_runs" => Ok(RunCounting::MaximalRuns),
        "overlapping" | "overlapping_windows" => Ok(RunCounting::OverlappingWindows),
        other => Err(DetectorError::Config(format!(
            "{}='{}', expected maximal|overlapping",
            ENV_RUN_COUNTING, other
        ))),
    }
}
