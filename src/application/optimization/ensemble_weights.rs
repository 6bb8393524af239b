//! Weight optimization over recorded per-model predictions.

use crate::config::{WeightConfig, WeightStrategy};
use crate::domain::errors::EngineError;
use crate::domain::events::{EntityId, History};
use crate::domain::optimization::ensemble_weights::EnsembleWeights;
use crate::domain::performance::stats::Stats;
use crate::domain::prediction::{PredictionCandidate, top_entities};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Candidates used by the diversity term.
const DIVERSITY_TOP: usize = 5;
/// Candidates used by the bayesian likelihood.
const LIKELIHOOD_TOP: usize = 3;

/// Predictions a model made for the event at history index `step`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepPrediction {
    pub step: usize,
    pub candidates: Vec<PredictionCandidate>,
}

/// Model name -> predictions in ascending step order.
pub type ModelOutputs = BTreeMap<String, Vec<StepPrediction>>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightReport {
    pub strategy: WeightStrategy,
    pub weights: EnsembleWeights,
    /// Raw per-model scores before normalization.
    pub scores: BTreeMap<String, f64>,
}

pub struct EnsembleWeightOptimizer {
    config: WeightConfig,
}

impl EnsembleWeightOptimizer {
    pub fn new(config: WeightConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &WeightConfig {
        &self.config
    }

    pub fn optimize(
        &self,
        outputs: &ModelOutputs,
        history: &History,
    ) -> Result<WeightReport, EngineError> {
        self.optimize_with(self.config.strategy, outputs, history)
    }

    pub fn optimize_with(
        &self,
        strategy: WeightStrategy,
        outputs: &ModelOutputs,
        history: &History,
    ) -> Result<WeightReport, EngineError> {
        if outputs.is_empty() {
            return Err(EngineError::invalid_config(
                "weight optimization needs at least one model",
            ));
        }

        let scores = match strategy {
            WeightStrategy::Static => outputs.keys().map(|m| (m.clone(), 1.0)).collect(),
            WeightStrategy::Dynamic => self.dynamic_scores(outputs, history),
            WeightStrategy::Adaptive => self.adaptive_scores(outputs, history),
            WeightStrategy::Bayesian => self.bayesian_scores(outputs, history),
        };
        let weights = EnsembleWeights::from_scores(scores.clone());

        info!(
            "Ensemble weights ({:?}) over {} models: {}",
            strategy,
            weights.len(),
            weights
                .iter()
                .map(|(m, w)| format!("{}={:.3}", m, w))
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(WeightReport {
            strategy,
            weights,
            scores,
        })
    }

    fn window<'a>(&self, steps: &'a [StepPrediction]) -> &'a [StepPrediction] {
        &steps[steps.len().saturating_sub(self.config.window)..]
    }

    /// Sum of `probability * confidence` over top-k hits in the window.
    fn dynamic_scores(&self, outputs: &ModelOutputs, history: &History) -> BTreeMap<String, f64> {
        outputs
            .iter()
            .map(|(model, steps)| {
                let score: f64 = self
                    .window(steps)
                    .iter()
                    .map(|s| {
                        hits(s, history, self.config.top_k)
                            .map(|c| c.probability * c.confidence)
                            .sum::<f64>()
                    })
                    .sum();
                (model.clone(), score)
            })
            .collect()
    }

    fn adaptive_scores(&self, outputs: &ModelOutputs, history: &History) -> BTreeMap<String, f64> {
        let performance = normalize(self.dynamic_scores(outputs, history));
        let diversity = self.diversity_scores(outputs);
        let stability = self.stability_scores(outputs, history);
        let mix = self.config.mix;

        outputs
            .keys()
            .map(|model| {
                let p = performance.get(model).copied().unwrap_or(0.0);
                let d = diversity.get(model).copied().unwrap_or(0.0);
                let s = stability.get(model).copied().unwrap_or(0.0);
                debug!(
                    "{}: performance {:.3}, diversity {:.3}, stability {:.3}",
                    model, p, d, s
                );
                (
                    model.clone(),
                    mix.performance * p + mix.diversity * d + mix.stability * s,
                )
            })
            .collect()
    }

    /// Mean `1 - jaccard(top-5)` against every other model at shared steps.
    fn diversity_scores(&self, outputs: &ModelOutputs) -> BTreeMap<String, f64> {
        let tops: BTreeMap<&String, BTreeMap<usize, Vec<EntityId>>> = outputs
            .iter()
            .map(|(model, steps)| {
                let by_step = self
                    .window(steps)
                    .iter()
                    .map(|s| (s.step, top_entities(&s.candidates, DIVERSITY_TOP)))
                    .collect();
                (model, by_step)
            })
            .collect();

        tops.iter()
            .map(|(model, mine)| {
                let mut distances = Vec::new();
                for (other, theirs) in &tops {
                    if other == model {
                        continue;
                    }
                    for (step, a) in mine {
                        if let Some(b) = theirs.get(step) {
                            distances.push(1.0 - Stats::jaccard(a, b));
                        }
                    }
                }
                ((*model).clone(), Stats::mean(&distances))
            })
            .collect()
    }

    /// `1 - var / max var` of the per-step hit ratio.
    fn stability_scores(&self, outputs: &ModelOutputs, history: &History) -> BTreeMap<String, f64> {
        let k = self.config.top_k.max(1);
        let variances: BTreeMap<&String, f64> = outputs
            .iter()
            .map(|(model, steps)| {
                let ratios: Vec<f64> = self
                    .window(steps)
                    .iter()
                    .map(|s| hits(s, history, k).count() as f64 / k as f64)
                    .collect();
                (model, Stats::variance(&ratios))
            })
            .collect();
        let max_var = variances.values().copied().fold(0.0, f64::max);

        variances
            .into_iter()
            .map(|(model, var)| {
                let stability = if max_var > 0.0 { 1.0 - var / max_var } else { 1.0 };
                (model.clone(), stability)
            })
            .collect()
    }

    /// Posterior under a uniform prior, evaluated in log space.
    fn bayesian_scores(&self, outputs: &ModelOutputs, history: &History) -> BTreeMap<String, f64> {
        let epsilon = self.config.epsilon.max(f64::MIN_POSITIVE);
        let log_posteriors: BTreeMap<String, f64> = outputs
            .iter()
            .map(|(model, steps)| {
                let lp: f64 = self
                    .window(steps)
                    .iter()
                    .map(|s| {
                        let likelihood: f64 =
                            hits(s, history, LIKELIHOOD_TOP).map(|c| c.probability).sum();
                        (epsilon + likelihood).ln()
                    })
                    .sum();
                (model.clone(), lp)
            })
            .collect();

        let max = log_posteriors
            .values()
            .copied()
            .fold(f64::NEG_INFINITY, f64::max);
        log_posteriors
            .into_iter()
            .map(|(model, lp)| (model, (lp - max).exp()))
            .collect()
    }
}

/// Top-k candidates of `prediction` that occurred in the event at its step.
fn hits<'a>(
    prediction: &'a StepPrediction,
    history: &'a History,
    k: usize,
) -> impl Iterator<Item = &'a PredictionCandidate> + 'a {
    let actual = history.get(prediction.step);
    prediction
        .candidates
        .iter()
        .take(k)
        .filter(move |c| actual.is_some_and(|e| e.contains(c.entity)))
}

fn normalize(scores: BTreeMap<String, f64>) -> BTreeMap<String, f64> {
    let total: f64 = scores.values().filter(|v| v.is_finite()).sum();
    scores
        .into_iter()
        .map(|(m, v)| (m, if total > 0.0 && v.is_finite() { v / total } else { 0.0 }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OutcomeEvent;
    use chrono::{Duration, TimeZone, Utc};

    fn history(sets: &[&[EntityId]]) -> History {
        let base = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let events = sets
            .iter()
            .enumerate()
            .map(|(i, s)| OutcomeEvent::new(base + Duration::days(i as i64), s.to_vec()))
            .collect();
        History::new(events, 10).unwrap()
    }

    fn steps(picks: &[&[EntityId]]) -> Vec<StepPrediction> {
        picks
            .iter()
            .enumerate()
            .map(|(step, ids)| StepPrediction {
                step,
                candidates: ids
                    .iter()
                    .map(|&e| PredictionCandidate::with_uncertainty(e, 0.8, 0.2))
                    .collect(),
            })
            .collect()
    }

    fn outputs() -> (ModelOutputs, History) {
        let h = history(&[&[1, 2], &[1, 3], &[1, 4], &[1, 5]]);
        let mut outputs = ModelOutputs::new();
        outputs.insert("good".to_string(), steps(&[&[1], &[1], &[1], &[1]]));
        outputs.insert("bad".to_string(), steps(&[&[9], &[9], &[9], &[9]]));
        outputs.insert("mixed".to_string(), steps(&[&[1], &[9], &[1], &[9]]));
        (outputs, h)
    }

    #[test]
    fn test_static_weights_are_equal() {
        let (outputs, h) = outputs();
        let report = EnsembleWeightOptimizer::new(WeightConfig::default())
            .optimize_with(WeightStrategy::Static, &outputs, &h)
            .unwrap();
        for model in ["good", "bad", "mixed"] {
            assert!((report.weights.get(model) - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_every_strategy_yields_a_distribution() {
        let (outputs, h) = outputs();
        let optimizer = EnsembleWeightOptimizer::new(WeightConfig::default());
        for strategy in [
            WeightStrategy::Static,
            WeightStrategy::Dynamic,
            WeightStrategy::Adaptive,
            WeightStrategy::Bayesian,
        ] {
            let report = optimizer.optimize_with(strategy, &outputs, &h).unwrap();
            assert!((report.weights.total() - 1.0).abs() < 1e-9, "{:?}", strategy);
            assert!(report.weights.iter().all(|(_, w)| *w >= 0.0));
        }
    }

    #[test]
    fn test_dynamic_favours_the_accurate_model() {
        let (outputs, h) = outputs();
        let report = EnsembleWeightOptimizer::new(WeightConfig::default())
            .optimize_with(WeightStrategy::Dynamic, &outputs, &h)
            .unwrap();
        assert!((report.weights.get("good") - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(report.weights.get("bad"), 0.0);

        let bayes = EnsembleWeightOptimizer::new(WeightConfig::default())
            .optimize_with(WeightStrategy::Bayesian, &outputs, &h)
            .unwrap();
        assert!(bayes.weights.get("good") > bayes.weights.get("mixed"));
        assert!(bayes.weights.get("mixed") > bayes.weights.get("bad"));
    }

    #[test]
    fn test_no_hits_falls_back_to_equal() {
        let h = history(&[&[1], &[1]]);
        let mut outputs = ModelOutputs::new();
        outputs.insert("a".to_string(), steps(&[&[7], &[7]]));
        outputs.insert("b".to_string(), steps(&[&[8], &[8]]));
        let report = EnsembleWeightOptimizer::new(WeightConfig::default())
            .optimize_with(WeightStrategy::Dynamic, &outputs, &h)
            .unwrap();
        assert!((report.weights.get("a") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_empty_outputs_rejected() {
        let h = history(&[&[1]]);
        assert!(matches!(
            EnsembleWeightOptimizer::new(WeightConfig::default()).optimize(&ModelOutputs::new(), &h),
            Err(EngineError::InvalidConfig { .. })
        ));
    }
}
