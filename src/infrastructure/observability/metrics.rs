//! Prometheus metrics definitions for drawcast
//!
//! All metrics use the `drawcast_` prefix and are read-only.

use prometheus::{CounterVec, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use std::sync::Arc;
use std::time::Duration;

/// Prometheus metrics for training, validation, search and backtests
#[derive(Clone)]
pub struct EngineMetrics {
    registry: Arc<Registry>,
    /// Trees grown per model
    pub trees_trained_total: CounterVec,
    /// Cross-validation folds by outcome
    pub folds_total: CounterVec,
    /// Hyperparameter trials by outcome
    pub trials_total: CounterVec,
    /// Backtest predictions by outcome
    pub backtest_steps_total: CounterVec,
    /// Wall-clock duration of one training run
    pub training_duration_seconds: HistogramVec,
}

impl EngineMetrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let trees_trained_total = CounterVec::new(
            Opts::new("drawcast_trees_trained_total", "Total trees trained by model"),
            &["model"],
        )?;
        registry.register(Box::new(trees_trained_total.clone()))?;

        let folds_total = CounterVec::new(
            Opts::new(
                "drawcast_folds_total",
                "Cross-validation folds evaluated by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(folds_total.clone()))?;

        let trials_total = CounterVec::new(
            Opts::new(
                "drawcast_trials_total",
                "Hyperparameter search trials by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(trials_total.clone()))?;

        let backtest_steps_total = CounterVec::new(
            Opts::new(
                "drawcast_backtest_steps_total",
                "Backtest predictions by outcome",
            ),
            &["outcome"],
        )?;
        registry.register(Box::new(backtest_steps_total.clone()))?;

        let training_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                "drawcast_training_duration_seconds",
                "Model training duration in seconds",
            )
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
            &["model"],
        )?;
        registry.register(Box::new(training_duration_seconds.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            trees_trained_total,
            folds_total,
            trials_total,
            backtest_steps_total,
            training_duration_seconds,
        })
    }

    /// Render all metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        encoder
            .encode_to_string(&metric_families)
            .unwrap_or_default()
    }

    pub fn record_training(&self, model: &str, trees: usize, duration: Duration) {
        self.trees_trained_total
            .with_label_values(&[model])
            .inc_by(trees as f64);
        self.training_duration_seconds
            .with_label_values(&[model])
            .observe(duration.as_secs_f64());
    }

    pub fn record_fold(&self, completed: bool) {
        self.folds_total
            .with_label_values(&[outcome(completed)])
            .inc();
    }

    pub fn record_trial(&self, succeeded: bool) {
        self.trials_total
            .with_label_values(&[outcome(succeeded)])
            .inc();
    }

    pub fn record_backtest_step(&self, predicted: bool) {
        self.backtest_steps_total
            .with_label_values(&[if predicted { "predicted" } else { "skipped" }])
            .inc();
    }
}

fn outcome(ok: bool) -> &'static str {
    if ok { "ok" } else { "failed" }
}
