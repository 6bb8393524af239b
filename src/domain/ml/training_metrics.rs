use serde::{Deserialize, Serialize};

/// Summary returned by every `train` call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingMetrics {
    pub model: String,
    pub samples: usize,
    pub trees: usize,
    /// Fraction of samples classified correctly at the model's decision threshold.
    pub training_accuracy: Option<f64>,
    pub mean_squared_error: Option<f64>,
    /// (feature name, accumulated gain), descending.
    pub feature_importance: Vec<(String, f64)>,
    pub duration_ms: u64,
}
