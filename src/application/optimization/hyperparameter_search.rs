//! Discrete hyperparameter search: uniform sampling for the first
//! iterations, then local perturbation around the best trials. Every
//! candidate is scored by a short cross-validation run.

use crate::application::context::{EngineContext, RunClock};
use crate::application::ml::ModelFactory;
use crate::application::validation::TimeSeriesCrossValidator;
use crate::config::{ModelSpec, NamedModelSpec, SearchConfig};
use crate::domain::errors::EngineError;
use crate::domain::events::History;
use crate::domain::optimization::search_space::{ParamSet, SearchSpace, param_set_key};
use crate::domain::optimization::trial::{
    FAILED_TRIAL_SCORE, OptimizationResult, OptimizationTrial, StopReason,
};
use crate::domain::performance::metrics::{CompositeWeights, PredictionMetrics, ProfitModel};
use crate::domain::validation::folds::FoldConfig;
use rand::Rng;
use rand::rngs::StdRng;
use std::collections::HashSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Trials considered as perturbation seeds, best first.
const PERTURBATION_SEEDS: usize = 3;

pub struct HyperparameterSearch {
    space: SearchSpace,
    config: SearchConfig,
    folds: FoldConfig,
    top_n: usize,
    profit: ProfitModel,
    composite: CompositeWeights,
}

impl HyperparameterSearch {
    pub fn new(space: SearchSpace, config: SearchConfig, folds: FoldConfig, top_n: usize) -> Self {
        Self {
            space,
            config,
            folds,
            top_n,
            profit: ProfitModel::default(),
            composite: CompositeWeights::default(),
        }
    }

    pub fn with_scoring(mut self, profit: ProfitModel, composite: CompositeWeights) -> Self {
        self.profit = profit;
        self.composite = composite;
        self
    }

    fn validator(&self) -> TimeSeriesCrossValidator {
        let folds = FoldConfig {
            n_folds: self.config.cv_folds,
            ..self.folds
        };
        TimeSeriesCrossValidator::new(folds, self.top_n).with_scoring(self.profit, self.composite)
    }

    /// Runs up to `max_iterations` trials against `base`.
    ///
    /// Failed trials score `FAILED_TRIAL_SCORE` and stay in the history.
    /// Cancellation or an exhausted budget ends the loop early with the
    /// trials run so far.
    pub async fn run(
        &self,
        base: &NamedModelSpec,
        history: &History,
        factory: &ModelFactory,
        ctx: &EngineContext,
    ) -> Result<OptimizationResult, EngineError> {
        if matches!(base.spec, ModelSpec::SequenceModel) {
            return Err(EngineError::Unsupported {
                reason: format!(
                    "model '{}' is a sequence model and exposes no hyperparameters",
                    base.name
                ),
            });
        }
        self.space.validate()?;
        let validator = self.validator();
        if validator.config().folds(history.len()).is_empty() {
            return Err(EngineError::InsufficientData {
                operation: "hyperparameter search",
                required: validator.config().min_events().unwrap_or(usize::MAX),
                available: history.len(),
            });
        }

        let clock = ctx.clock();
        let mut rng = ctx.fork_rng();
        let mut history_trials: Vec<OptimizationTrial> = Vec::new();
        let mut convergence = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut stop_reason = StopReason::Completed;

        info!(
            "{}: searching {} configurations for up to {} iterations",
            base.name,
            self.space.cardinality(),
            self.config.max_iterations
        );

        for iteration in 0..self.config.max_iterations {
            if let Err(e) = ctx.checkpoint(&clock) {
                stop_reason = stop_reason_for(&e);
                break;
            }

            let config = self.propose(iteration, &history_trials, &seen, &mut rng);
            seen.insert(param_set_key(&config));

            let trial = match self.evaluate(base, &config, history, factory, ctx, &clock).await {
                Ok(metrics) => OptimizationTrial {
                    iteration,
                    config,
                    score: metrics.composite,
                    metrics: Some(metrics),
                    error: None,
                },
                Err(e) if e.is_interruption() => {
                    stop_reason = stop_reason_for(&e);
                    break;
                }
                Err(e) => {
                    warn!("{}: trial {} failed: {}", base.name, iteration, e);
                    OptimizationTrial {
                        iteration,
                        config,
                        score: FAILED_TRIAL_SCORE,
                        metrics: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            if let Some(m) = ctx.metrics() {
                m.record_trial(trial.succeeded());
            }
            debug!(
                "{}: trial {} [{}] scored {:.4}",
                base.name,
                iteration,
                param_set_key(&trial.config),
                trial.score
            );
            history_trials.push(trial);
            convergence.push(best_score(&history_trials));
        }

        let best = history_trials
            .iter()
            .filter(|t| t.succeeded())
            .max_by(|a, b| a.score.total_cmp(&b.score))
            .cloned();
        if let Some(best) = &best {
            info!(
                "{}: best score {:.4} with [{}] after {} trials",
                base.name,
                best.score,
                param_set_key(&best.config),
                history_trials.len()
            );
        }

        Ok(OptimizationResult {
            run_id: Uuid::new_v4(),
            model_kind: base.spec.kind().to_string(),
            best,
            history: history_trials,
            convergence,
            stop_reason,
            elapsed_ms: clock.elapsed_ms(),
        })
    }

    async fn evaluate(
        &self,
        base: &NamedModelSpec,
        params: &ParamSet,
        history: &History,
        factory: &ModelFactory,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<PredictionMetrics, EngineError> {
        let spec = NamedModelSpec::new(base.name.clone(), base.spec.apply(params)?);
        let report = self
            .validator()
            .validate(&spec, history, factory, ctx, clock)
            .await?;
        let mut metrics = report
            .folds
            .iter()
            .filter_map(|f| f.metrics().copied())
            .fold(PredictionMetrics::default(), |acc, m| add(acc, m, report.valid_folds));
        metrics.composite = report.mean_composite;
        Ok(metrics)
    }

    fn propose(
        &self,
        iteration: usize,
        trials: &[OptimizationTrial],
        seen: &HashSet<String>,
        rng: &mut StdRng,
    ) -> ParamSet {
        let mut ranked: Vec<&OptimizationTrial> = trials.iter().filter(|t| t.succeeded()).collect();
        if iteration < self.config.random_iterations || ranked.is_empty() {
            return self.sample(rng);
        }
        ranked.sort_by(|a, b| b.score.total_cmp(&a.score));
        for seed in ranked.iter().take(PERTURBATION_SEEDS) {
            let candidate = self.perturb(&seed.config, rng);
            if !seen.contains(&param_set_key(&candidate)) {
                return candidate;
            }
        }
        self.sample(rng)
    }

    /// Uniform choice per parameter.
    fn sample(&self, rng: &mut StdRng) -> ParamSet {
        self.space
            .iter()
            .filter(|(_, candidates)| !candidates.is_empty())
            .map(|(name, candidates)| {
                let pick = rng.random_range(0..candidates.len());
                (name.clone(), candidates[pick].clone())
            })
            .collect()
    }

    /// Moves every parameter one candidate position up or down, clamped to
    /// the ends of its list.
    fn perturb(&self, config: &ParamSet, rng: &mut StdRng) -> ParamSet {
        self.space
            .iter()
            .filter(|(_, candidates)| !candidates.is_empty())
            .map(|(name, candidates)| {
                let current = config
                    .get(name)
                    .and_then(|value| self.space.position(name, value))
                    .unwrap_or(0);
                let last = candidates.len() - 1;
                let next = if rng.random_bool(0.5) {
                    (current + 1).min(last)
                } else {
                    current.saturating_sub(1)
                };
                (name.clone(), candidates[next].clone())
            })
            .collect()
    }
}

fn stop_reason_for(err: &EngineError) -> StopReason {
    match err {
        EngineError::DeadlineExceeded { .. } => StopReason::DeadlineExceeded,
        _ => StopReason::Cancelled,
    }
}

fn best_score(trials: &[OptimizationTrial]) -> f64 {
    trials
        .iter()
        .filter(|t| t.succeeded())
        .map(|t| t.score)
        .fold(FAILED_TRIAL_SCORE, f64::max)
}

/// Running mean of fold metrics.
fn add(acc: PredictionMetrics, m: PredictionMetrics, n: usize) -> PredictionMetrics {
    let w = 1.0 / n.max(1) as f64;
    PredictionMetrics {
        steps: acc.steps + m.steps,
        hit_rate: acc.hit_rate + w * m.hit_rate,
        coverage_rate: acc.coverage_rate + w * m.coverage_rate,
        precision: acc.precision + w * m.precision,
        recall: acc.recall + w * m.recall,
        f1: acc.f1 + w * m.f1,
        expected_value: acc.expected_value + w * m.expected_value,
        consistency: acc.consistency + w * m.consistency,
        diversity: acc.diversity + w * m.diversity,
        temporal_stability: acc.temporal_stability + w * m.temporal_stability,
        uncertainty_calibration: acc.uncertainty_calibration + w * m.uncertainty_calibration,
        composite: acc.composite + w * m.composite,
    }
}
