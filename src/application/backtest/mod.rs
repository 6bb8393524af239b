// Walk-forward simulation over the configured models
pub mod engine;

pub use engine::{BacktestEngine, BacktestReport};
