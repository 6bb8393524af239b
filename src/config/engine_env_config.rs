//! Engine configuration parsing from environment variables.
//!
//! Every variable is optional; unset or unparsable values fall back to the
//! defaults below.

use std::env;
use std::path::PathBuf;

/// Core engine settings
#[derive(Debug, Clone, PartialEq)]
pub struct EngineEnvConfig {
    /// Entities are numbered `1..=domain_size`.
    pub domain_size: usize,
    pub seed: u64,
    /// Candidates returned per prediction step.
    pub top_n: usize,
    /// Wall-clock budget for long-running operations.
    pub time_budget_secs: Option<u64>,
    pub artifact_dir: PathBuf,
    /// When set, artifacts go to SQLite instead of JSON files.
    pub database_url: Option<String>,
}

impl Default for EngineEnvConfig {
    fn default() -> Self {
        Self {
            domain_size: 90,
            seed: 42,
            top_n: 5,
            time_budget_secs: None,
            artifact_dir: PathBuf::from("artifacts"),
            database_url: None,
        }
    }
}

impl EngineEnvConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            domain_size: env::var("DRAWCAST_DOMAIN_SIZE")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.domain_size),
            seed: env::var("DRAWCAST_SEED")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(defaults.seed),
            top_n: env::var("DRAWCAST_TOP_N")
                .ok()
                .and_then(|v| v.parse::<usize>().ok())
                .filter(|v| *v > 0)
                .unwrap_or(defaults.top_n),
            time_budget_secs: env::var("DRAWCAST_TIME_BUDGET_SECS")
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0),
            artifact_dir: env::var("DRAWCAST_ARTIFACT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.artifact_dir),
            database_url: env::var("DRAWCAST_DATABASE_URL")
                .ok()
                .filter(|v| !v.trim().is_empty()),
        }
    }
}
