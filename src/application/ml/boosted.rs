//! Gradient-style boosting: each round fits a variance-reduction tree on the
//! residual left by the previous rounds.

use crate::application::context::{EngineContext, RunClock};
use crate::application::features::{FeatureExtractor, TrainingSet};
use crate::application::ml::dispersion;
use crate::config::BoostedConfig;
use crate::domain::errors::EngineError;
use crate::domain::events::{EntityId, History};
use crate::domain::ml::forest::TreeModel;
use crate::domain::ml::training_metrics::TrainingMetrics;
use crate::domain::ml::tree::{DecisionTree, SplitPolicy};
use crate::domain::performance::stats::Stats;
use crate::domain::prediction::{PredictionCandidate, rank_candidates};
use rayon::prelude::*;
use std::time::Instant;
use tracing::{debug, info};

/// Raw boosted score at or above which a sample counts as positive.
pub const DECISION_THRESHOLD: f64 = 0.5;

const CONTRIBUTING_FEATURES: usize = 3;

#[derive(Debug, Clone)]
pub struct BoostedTreeEnsemble {
    config: BoostedConfig,
    model: TreeModel,
    extractor: FeatureExtractor,
}

impl BoostedTreeEnsemble {
    pub fn new(name: impl Into<String>, config: BoostedConfig, domain_size: usize) -> Self {
        let model = TreeModel::new(name, config.tree_params(), SplitPolicy::VarianceReduction);
        Self {
            config,
            model,
            extractor: FeatureExtractor::new(domain_size),
        }
    }

    /// Rebuilds an ensemble around an already trained forest.
    pub fn from_parts(config: BoostedConfig, model: TreeModel, domain_size: usize) -> Self {
        Self {
            config,
            model,
            extractor: FeatureExtractor::new(domain_size),
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn config(&self) -> &BoostedConfig {
        &self.config
    }

    pub fn model(&self) -> &TreeModel {
        &self.model
    }

    pub fn domain_size(&self) -> usize {
        self.extractor.domain_size()
    }

    pub fn dispose(&mut self) {
        self.model.dispose();
    }

    pub fn train(
        &mut self,
        history: &History,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<TrainingMetrics, EngineError> {
        let started = Instant::now();
        let set = TrainingSet::build(
            &self.extractor,
            history,
            self.config.window,
            self.config.max_training_steps,
        );
        if set.is_empty() {
            return Err(EngineError::InsufficientData {
                operation: "boosted training",
                required: 2,
                available: history.len(),
            });
        }

        let rows = set.rows();
        let labels = set.labels();
        let lr = self.config.learning_rate;
        let params = self.config.tree_params();
        let mut rng = ctx.fork_rng();
        let mut residual = labels.to_vec();
        let mut score = vec![0.0; rows.len()];
        let mut trees = Vec::with_capacity(self.config.rounds);

        for round in 0..self.config.rounds {
            ctx.checkpoint(clock)?;
            let tree = DecisionTree::fit_all(
                rows,
                &residual,
                &params,
                SplitPolicy::VarianceReduction,
                &mut rng,
            );
            for ((row, s), r) in rows.iter().zip(score.iter_mut()).zip(residual.iter_mut()) {
                let step = lr * tree.predict(row.as_ref());
                *s += step;
                *r -= step;
            }
            debug!(
                "{}: round {} fitted ({} leaves, depth {})",
                self.model.name(),
                round,
                tree.leaf_count(),
                tree.depth()
            );
            trees.push(tree);
        }

        let correct = score
            .iter()
            .zip(labels)
            .filter(|(s, y)| (**s >= DECISION_THRESHOLD) == (**y >= 0.5))
            .count();
        let accuracy = correct as f64 / labels.len() as f64;
        let mse = Stats::mean(&residual.iter().map(|r| r * r).collect::<Vec<_>>());

        self.model.install(trees);
        let duration = started.elapsed();
        if let Some(metrics) = ctx.metrics() {
            metrics.record_training(self.model.name(), self.model.trees().len(), duration);
        }
        info!(
            "{}: trained {} rounds on {} samples (accuracy {:.3}, mse {:.4})",
            self.model.name(),
            self.config.rounds,
            set.len(),
            accuracy,
            mse
        );

        Ok(TrainingMetrics {
            model: self.model.name().to_string(),
            samples: set.len(),
            trees: self.model.trees().len(),
            training_accuracy: Some(accuracy),
            mean_squared_error: Some(mse),
            feature_importance: self.model.ranked_importance(),
            duration_ms: duration.as_millis() as u64,
        })
    }

    /// Learning-rate scaled contribution of each tree.
    pub fn contributions(&self, features: &[f64]) -> Vec<f64> {
        self.model
            .tree_outputs(features)
            .into_iter()
            .map(|o| o * self.config.learning_rate)
            .collect()
    }

    /// Top `top_n` candidates for the event following `history`.
    pub fn predict(
        &self,
        history: &History,
        top_n: usize,
    ) -> Result<Vec<PredictionCandidate>, EngineError> {
        self.model.ensure_trained()?;
        let rows = self.extractor.extract(history.tail(self.config.window));
        let mut candidates: Vec<PredictionCandidate> = rows
            .par_iter()
            .enumerate()
            .map(|(i, row)| {
                let outputs = self.contributions(row.as_ref());
                let score: f64 = outputs.iter().sum();
                let (confidence, uncertainty) = dispersion(&outputs);
                PredictionCandidate::new(
                    (i + 1) as EntityId,
                    Stats::sigmoid(score),
                    confidence,
                    uncertainty,
                    self.model
                        .contributing_features(row.as_ref(), CONTRIBUTING_FEATURES),
                )
            })
            .collect();
        rank_candidates(&mut candidates);
        candidates.truncate(top_n);
        Ok(candidates)
    }
}
