pub mod cross_validator;

pub use cross_validator::{CrossValidationReport, FoldOutcome, MetricSummary, TimeSeriesCrossValidator};
