use crate::domain::optimization::search_space::ParamSet;
use crate::domain::performance::metrics::PredictionMetrics;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Score assigned to a trial whose evaluation failed.
pub const FAILED_TRIAL_SCORE: f64 = -1.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationTrial {
    pub iteration: usize,
    pub config: ParamSet,
    pub score: f64,
    pub metrics: Option<PredictionMetrics>,
    pub error: Option<String>,
}

impl OptimizationTrial {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    Completed,
    Cancelled,
    DeadlineExceeded,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    pub run_id: Uuid,
    pub model_kind: String,
    /// Best successful trial; failed trials are never selected.
    pub best: Option<OptimizationTrial>,
    pub history: Vec<OptimizationTrial>,
    /// Best score seen after each iteration (`FAILED_TRIAL_SCORE` until the
    /// first success).
    pub convergence: Vec<f64>,
    pub stop_reason: StopReason,
    pub elapsed_ms: u64,
}

impl OptimizationResult {
    /// Successful trials sorted by descending score.
    pub fn ranked(&self) -> Vec<&OptimizationTrial> {
        let mut ranked: Vec<&OptimizationTrial> =
            self.history.iter().filter(|t| t.succeeded()).collect();
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        ranked
    }
}
