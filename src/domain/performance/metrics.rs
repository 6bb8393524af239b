use crate::domain::events::EntityId;
use crate::domain::performance::stats::Stats;
use crate::domain::prediction::PredictionCandidate;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Payout model for one prediction step: `hits * reward - misses * penalty`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfitModel {
    pub hit_reward: f64,
    pub miss_penalty: f64,
}

impl Default for ProfitModel {
    fn default() -> Self {
        Self {
            hit_reward: 1.0,
            miss_penalty: 0.2,
        }
    }
}

impl ProfitModel {
    pub fn profit(&self, hits: usize, predicted: usize) -> f64 {
        let misses = predicted.saturating_sub(hits);
        hits as f64 * self.hit_reward - misses as f64 * self.miss_penalty
    }

    /// Maps a per-step expected value for `n` picks onto [0, 1].
    pub fn normalize(&self, expected_value: f64, n: usize) -> f64 {
        if n == 0 {
            return 0.0;
        }
        let worst = -(n as f64) * self.miss_penalty;
        let best = n as f64 * self.hit_reward;
        if best - worst <= 0.0 {
            return 0.0;
        }
        ((expected_value - worst) / (best - worst)).clamp(0.0, 1.0)
    }
}

/// Weights of the composite score used to rank configurations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositeWeights {
    pub hit_rate: f64,
    pub coverage_rate: f64,
    pub f1: f64,
    pub expected_value: f64,
    pub consistency: f64,
    pub diversity: f64,
    pub temporal_stability: f64,
    pub uncertainty_calibration: f64,
}

impl Default for CompositeWeights {
    fn default() -> Self {
        Self {
            hit_rate: 0.30,
            coverage_rate: 0.20,
            f1: 0.15,
            expected_value: 0.10,
            consistency: 0.10,
            diversity: 0.05,
            temporal_stability: 0.05,
            uncertainty_calibration: 0.05,
        }
    }
}

/// Predictions made at one step and the outcome that followed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepOutcome {
    pub step: usize,
    pub predicted: Vec<PredictionCandidate>,
    pub actual: Vec<EntityId>,
}

impl StepOutcome {
    pub fn hits(&self) -> usize {
        self.predicted
            .iter()
            .filter(|c| self.actual.contains(&c.entity))
            .count()
    }
}

/// Evaluation of a sequence of prediction steps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionMetrics {
    pub steps: usize,
    pub hit_rate: f64,
    pub coverage_rate: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    /// Mean profit per step under the profit model.
    pub expected_value: f64,
    pub consistency: f64,
    pub diversity: f64,
    pub temporal_stability: f64,
    pub uncertainty_calibration: f64,
    pub composite: f64,
}

impl PredictionMetrics {
    pub fn evaluate(
        outcomes: &[StepOutcome],
        profit: &ProfitModel,
        weights: &CompositeWeights,
    ) -> Self {
        if outcomes.is_empty() {
            return Self::default();
        }
        let steps = outcomes.len();

        let mut total_hits = 0usize;
        let mut total_predicted = 0usize;
        let mut total_actual = 0usize;
        let mut covered = 0usize;
        let mut profits = Vec::with_capacity(steps);
        let mut step_hit_ratios = Vec::with_capacity(steps);
        let mut distinct: HashSet<EntityId> = HashSet::new();
        let mut brier_sum = 0.0;

        for outcome in outcomes {
            let hits = outcome.hits();
            let n = outcome.predicted.len();
            total_hits += hits;
            total_predicted += n;
            total_actual += outcome.actual.len();
            if hits > 0 {
                covered += 1;
            }
            profits.push(profit.profit(hits, n));
            step_hit_ratios.push(if n > 0 { hits as f64 / n as f64 } else { 0.0 });
            for candidate in &outcome.predicted {
                distinct.insert(candidate.entity);
                let hit = if outcome.actual.contains(&candidate.entity) {
                    1.0
                } else {
                    0.0
                };
                brier_sum += (candidate.probability - hit).powi(2);
            }
        }

        let precision = ratio(total_hits, total_predicted);
        let recall = ratio(total_hits, total_actual);
        let f1 = if precision + recall > 0.0 {
            2.0 * precision * recall / (precision + recall)
        } else {
            0.0
        };
        let expected_value = Stats::mean(&profits);

        let consistency = if Stats::mean(&step_hit_ratios) > 0.0 {
            (1.0 - Stats::coefficient_of_variation(&step_hit_ratios)).max(0.0)
        } else {
            0.0
        };
        let diversity = ratio(distinct.len(), total_predicted);
        let drift = Stats::slope(&step_hit_ratios).abs() * steps.saturating_sub(1) as f64;
        let temporal_stability = (1.0 - drift).clamp(0.0, 1.0);
        let uncertainty_calibration = if total_predicted > 0 {
            (1.0 - brier_sum / total_predicted as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let picks = total_predicted / steps;
        let mut metrics = Self {
            steps,
            hit_rate: precision,
            coverage_rate: ratio(covered, steps),
            precision,
            recall,
            f1,
            expected_value,
            consistency,
            diversity,
            temporal_stability,
            uncertainty_calibration,
            composite: 0.0,
        };
        metrics.composite = metrics.composite_score(weights, profit.normalize(expected_value, picks));
        metrics
    }

    fn composite_score(&self, w: &CompositeWeights, normalized_ev: f64) -> f64 {
        w.hit_rate * self.hit_rate
            + w.coverage_rate * self.coverage_rate
            + w.f1 * self.f1
            + w.expected_value * normalized_ev
            + w.consistency * self.consistency
            + w.diversity * self.diversity
            + w.temporal_stability * self.temporal_stability
            + w.uncertainty_calibration * self.uncertainty_calibration
    }
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
