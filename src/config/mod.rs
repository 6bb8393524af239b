//! Configuration module for drawcast.
//!
//! Engine and observability settings come from `DRAWCAST_*` environment
//! variables; the model roster and search settings come from a TOML run file.

mod engine_env_config;
pub mod model_config;
mod observability_config;
pub mod run_config;

pub use engine_env_config::EngineEnvConfig;
pub use model_config::{BaggedConfig, BoostedConfig, ModelSpec, NamedModelSpec};
pub use observability_config::ObservabilityEnvConfig;
pub use run_config::{
    AdaptiveMix, BacktestConfig, RunConfig, SearchConfig, WeightConfig, WeightStrategy,
};

use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineConfig {
    pub engine: EngineEnvConfig,
    pub observability: ObservabilityEnvConfig,
}

impl EngineConfig {
    /// Load configuration from the environment, after reading `.env` if present.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self {
            engine: EngineEnvConfig::from_env(),
            observability: ObservabilityEnvConfig::from_env(),
        }
    }

    pub fn time_budget(&self) -> Option<Duration> {
        self.engine.time_budget_secs.map(Duration::from_secs)
    }
}
