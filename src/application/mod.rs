// Walk-forward simulation
pub mod backtest;

// Seedable RNG, cancellation and time budget
pub mod context;

// Engine facade over the operations below
pub mod engine;

// Feature extraction and training sets
pub mod features;

// Tree ensembles and the sequence model adapter
pub mod ml;

// Ensemble weighting, hyperparameter search and reporting
pub mod optimization;

// Time-series cross-validation
pub mod validation;
