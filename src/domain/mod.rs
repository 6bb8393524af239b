// Domain-specific error types
pub mod errors;

// Outcome events and validated history
pub mod events;

// Tree learners and feature layout
pub mod ml;

// Search spaces, trials and ensemble weights
pub mod optimization;

// Evaluation metrics and backtest statistics
pub mod performance;

// Port interfaces
pub mod ports;

// Scored candidates
pub mod prediction;

// Walk-forward fold layout
pub mod validation;
