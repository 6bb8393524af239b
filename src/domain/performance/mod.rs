// Evaluation and trading-style statistics
pub mod backtest_summary;
pub mod metrics;
pub mod stats;
