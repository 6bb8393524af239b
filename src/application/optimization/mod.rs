// Ensemble weighting, hyperparameter search and result reporting
pub mod ensemble_weights;
pub mod hyperparameter_search;
pub mod reporting;

pub use ensemble_weights::{EnsembleWeightOptimizer, ModelOutputs, StepPrediction, WeightReport};
pub use hyperparameter_search::HyperparameterSearch;
pub use reporting::OptimizeReporter;
