//! Observability configuration parsing from environment variables.

use std::env;
use std::path::PathBuf;

/// Observability environment configuration
#[derive(Debug, Clone, PartialEq)]
pub struct ObservabilityEnvConfig {
    pub metrics_enabled: bool,
    /// Prometheus text dump written when a command finishes.
    pub metrics_path: Option<PathBuf>,
}

impl Default for ObservabilityEnvConfig {
    fn default() -> Self {
        Self {
            metrics_enabled: true,
            metrics_path: None,
        }
    }
}

impl ObservabilityEnvConfig {
    pub fn from_env() -> Self {
        Self {
            metrics_enabled: env::var("DRAWCAST_METRICS_ENABLED")
                .unwrap_or_else(|_| "true".to_string())
                .parse::<bool>()
                .unwrap_or(true),
            metrics_path: env::var("DRAWCAST_METRICS_PATH").ok().map(PathBuf::from),
        }
    }
}
