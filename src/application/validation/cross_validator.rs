//! Walk-forward cross-validation with purge gaps between train and test.

use crate::application::context::{EngineContext, RunClock};
use crate::application::ml::{ModelFactory, Predictable, Trainable};
use crate::config::NamedModelSpec;
use crate::domain::errors::EngineError;
use crate::domain::events::History;
use crate::domain::ml::training_metrics::TrainingMetrics;
use crate::domain::performance::metrics::{
    CompositeWeights, PredictionMetrics, ProfitModel, StepOutcome,
};
use crate::domain::performance::stats::Stats;
use crate::domain::validation::folds::{Fold, FoldConfig};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Slope magnitude of fold composites under which the model counts as converged.
const CONVERGENCE_SLOPE: f64 = 0.01;
/// Std dev of fold composites under which a converged model counts as stable.
const STABLE_VOLATILITY: f64 = 0.05;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FoldOutcome {
    Completed {
        fold: Fold,
        metrics: PredictionMetrics,
        training: TrainingMetrics,
    },
    Failed {
        fold: Fold,
        error: String,
    },
}

impl FoldOutcome {
    pub fn fold(&self) -> &Fold {
        match self {
            FoldOutcome::Completed { fold, .. } | FoldOutcome::Failed { fold, .. } => fold,
        }
    }

    pub fn metrics(&self) -> Option<&PredictionMetrics> {
        match self {
            FoldOutcome::Completed { metrics, .. } => Some(metrics),
            FoldOutcome::Failed { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricSummary {
    pub mean: f64,
    pub std_dev: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossValidationReport {
    pub model: String,
    pub folds: Vec<FoldOutcome>,
    pub valid_folds: usize,
    pub failed_folds: usize,
    /// Mean and std dev of every metric over completed folds.
    pub summary: BTreeMap<String, MetricSummary>,
    pub mean_composite: f64,
    pub stability_score: f64,
    /// Least-squares slope of fold composites in fold order.
    pub convergence_slope: f64,
    pub converged: bool,
    /// Std dev of fold composites.
    pub volatility: f64,
    pub stable: bool,
}

pub struct TimeSeriesCrossValidator {
    config: FoldConfig,
    top_n: usize,
    profit: ProfitModel,
    weights: CompositeWeights,
}

impl TimeSeriesCrossValidator {
    pub fn new(config: FoldConfig, top_n: usize) -> Self {
        Self {
            config,
            top_n,
            profit: ProfitModel::default(),
            weights: CompositeWeights::default(),
        }
    }

    pub fn with_scoring(mut self, profit: ProfitModel, weights: CompositeWeights) -> Self {
        self.profit = profit;
        self.weights = weights;
        self
    }

    pub fn config(&self) -> &FoldConfig {
        &self.config
    }

    fn insufficient(&self, history: &History) -> EngineError {
        EngineError::InsufficientData {
            operation: "cross validation",
            required: self.config.min_events().unwrap_or(usize::MAX),
            available: history.len(),
        }
    }

    /// Trains a fresh model per fold and scores its walk over the test range.
    ///
    /// A fold that fails is recorded and the remaining folds still run;
    /// cancellation and deadline errors abort the whole run.
    pub async fn validate(
        &self,
        spec: &NamedModelSpec,
        history: &History,
        factory: &ModelFactory,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<CrossValidationReport, EngineError> {
        let folds = self.config.folds(history.len());
        if folds.is_empty() {
            return Err(self.insufficient(history));
        }
        info!(
            "{}: cross-validating over {} folds ({} events)",
            spec.name,
            folds.len(),
            history.len()
        );

        let mut outcomes = Vec::with_capacity(folds.len());
        for fold in folds {
            ctx.checkpoint(clock)?;
            match self.run_fold(spec, history, &fold, factory, ctx, clock).await {
                Ok((metrics, training)) => {
                    debug!(
                        "{}: fold {} composite {:.4} (hit rate {:.3})",
                        spec.name, fold.index, metrics.composite, metrics.hit_rate
                    );
                    if let Some(m) = ctx.metrics() {
                        m.record_fold(true);
                    }
                    outcomes.push(FoldOutcome::Completed {
                        fold,
                        metrics,
                        training,
                    });
                }
                Err(e) if e.is_interruption() => return Err(e),
                Err(e) => {
                    warn!("{}: fold {} failed: {}", spec.name, fold.index, e);
                    if let Some(m) = ctx.metrics() {
                        m.record_fold(false);
                    }
                    outcomes.push(FoldOutcome::Failed {
                        fold,
                        error: e.to_string(),
                    });
                }
            }
        }

        let completed: Vec<PredictionMetrics> =
            outcomes.iter().filter_map(|o| o.metrics().copied()).collect();
        if completed.is_empty() {
            return Err(self.insufficient(history));
        }
        Ok(aggregate(&spec.name, outcomes, &completed))
    }

    async fn run_fold(
        &self,
        spec: &NamedModelSpec,
        history: &History,
        fold: &Fold,
        factory: &ModelFactory,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<(PredictionMetrics, TrainingMetrics), EngineError> {
        let mut model = factory.build(spec)?;
        let training = model
            .train(&history.prefix(fold.train.end), ctx, clock)
            .await?;

        let mut steps = Vec::with_capacity(fold.test.len());
        for t in fold.test.clone() {
            let Some(actual) = history.get(t) else {
                break;
            };
            let predicted = model.predict(&history.prefix(t), self.top_n).await?;
            steps.push(StepOutcome {
                step: t,
                predicted,
                actual: actual.outcome_set.clone(),
            });
        }
        if let Err(e) = model.dispose().await {
            warn!("{}: dispose after fold {} failed: {}", spec.name, fold.index, e);
        }
        Ok((
            PredictionMetrics::evaluate(&steps, &self.profit, &self.weights),
            training,
        ))
    }
}

fn metric_columns(m: &PredictionMetrics) -> [(&'static str, f64); 11] {
    [
        ("hit_rate", m.hit_rate),
        ("coverage_rate", m.coverage_rate),
        ("precision", m.precision),
        ("recall", m.recall),
        ("f1", m.f1),
        ("expected_value", m.expected_value),
        ("consistency", m.consistency),
        ("diversity", m.diversity),
        ("temporal_stability", m.temporal_stability),
        ("uncertainty_calibration", m.uncertainty_calibration),
        ("composite", m.composite),
    ]
}

fn aggregate(
    model: &str,
    outcomes: Vec<FoldOutcome>,
    completed: &[PredictionMetrics],
) -> CrossValidationReport {
    let mut columns: BTreeMap<String, Vec<f64>> = BTreeMap::new();
    for m in completed {
        for (name, value) in metric_columns(m) {
            columns.entry(name.to_string()).or_default().push(value);
        }
    }
    let summary: BTreeMap<String, MetricSummary> = columns
        .iter()
        .map(|(name, values)| {
            (
                name.clone(),
                MetricSummary {
                    mean: Stats::mean(values),
                    std_dev: Stats::std_dev(values),
                },
            )
        })
        .collect();

    let stability_score = Stats::mean(
        &["hit_rate", "coverage_rate", "f1", "composite"]
            .iter()
            .map(|key| {
                let values = columns.get(*key).map(Vec::as_slice).unwrap_or(&[]);
                (1.0 - Stats::coefficient_of_variation(values)).max(0.0)
            })
            .collect::<Vec<_>>(),
    );

    let composites: Vec<f64> = completed.iter().map(|m| m.composite).collect();
    let convergence_slope = Stats::slope(&composites);
    let volatility = Stats::std_dev(&composites);
    let converged = convergence_slope.abs() < CONVERGENCE_SLOPE;
    let failed_folds = outcomes.len() - completed.len();

    CrossValidationReport {
        model: model.to_string(),
        valid_folds: completed.len(),
        failed_folds,
        folds: outcomes,
        summary,
        mean_composite: Stats::mean(&composites),
        stability_score,
        convergence_slope,
        converged,
        volatility,
        stable: converged && volatility < STABLE_VOLATILITY,
    }
}
