//! Bootstrap aggregation of fully-randomized trees with a co-occurrence
//! re-scoring pass over the leading candidates.

use crate::application::context::{EngineContext, RunClock};
use crate::application::features::{FeatureExtractor, TrainingSet};
use crate::application::ml::dispersion;
use crate::config::BaggedConfig;
use crate::domain::errors::EngineError;
use crate::domain::events::{EntityId, History, OutcomeEvent};
use crate::domain::ml::feature_registry::INTERACTION;
use crate::domain::ml::forest::TreeModel;
use crate::domain::ml::training_metrics::TrainingMetrics;
use crate::domain::ml::tree::{DecisionTree, SplitPolicy};
use crate::domain::performance::stats::Stats;
use crate::domain::prediction::{PredictionCandidate, rank_candidates};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

/// Steepness of the logistic map from averaged tree output to probability.
const SHARPNESS: f64 = 5.0;

const CONTRIBUTING_FEATURES: usize = 3;

#[derive(Debug, Clone)]
pub struct BaggedTreeEnsemble {
    config: BaggedConfig,
    model: TreeModel,
    extractor: FeatureExtractor,
}

impl BaggedTreeEnsemble {
    pub fn new(name: impl Into<String>, config: BaggedConfig, domain_size: usize) -> Self {
        let model = TreeModel::new(name, config.tree_params(), SplitPolicy::FullyRandomized);
        Self {
            config,
            model,
            extractor: FeatureExtractor::new(domain_size),
        }
    }

    pub fn from_parts(config: BaggedConfig, model: TreeModel, domain_size: usize) -> Self {
        Self {
            config,
            model,
            extractor: FeatureExtractor::new(domain_size),
        }
    }

    pub fn name(&self) -> &str {
        self.model.name()
    }

    pub fn config(&self) -> &BaggedConfig {
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

    /// Builds every tree in parallel. Seeds are drawn from the context RNG
    /// before any tree starts, so the forest does not depend on scheduling.
    pub fn train(
        &mut self,
        history: &History,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<TrainingMetrics, EngineError> {
        let started = Instant::now();
        ctx.checkpoint(clock)?;
        let set = TrainingSet::build(
            &self.extractor,
            history,
            self.config.window,
            self.config.max_training_steps,
        );
        if set.is_empty() {
            return Err(EngineError::InsufficientData {
                operation: "bagged training",
                required: 2,
                available: history.len(),
            });
        }

        let rows = set.rows();
        let labels = set.labels();
        let n = rows.len();
        let params = self.config.tree_params();
        let seeds = ctx.seeds(self.config.n_trees);

        let trees: Vec<DecisionTree> = seeds
            .into_par_iter()
            .map(|seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let bootstrap: Vec<usize> = (0..n).map(|_| rng.random_range(0..n)).collect();
                DecisionTree::fit(
                    rows,
                    labels,
                    &bootstrap,
                    &params,
                    SplitPolicy::FullyRandomized,
                    &mut rng,
                )
            })
            .collect();
        ctx.checkpoint(clock)?;
        self.model.install(trees);

        let means: Vec<f64> = rows
            .par_iter()
            .map(|row| Stats::mean(&self.model.tree_outputs(row.as_ref())))
            .collect();
        let correct = means
            .iter()
            .zip(labels)
            .filter(|(m, y)| (**m >= 0.5) == (**y >= 0.5))
            .count();
        let accuracy = correct as f64 / n as f64;
        let mse = Stats::mean(
            &means
                .iter()
                .zip(labels)
                .map(|(m, y)| (m - y).powi(2))
                .collect::<Vec<_>>(),
        );

        let duration = started.elapsed();
        if let Some(metrics) = ctx.metrics() {
            metrics.record_training(self.model.name(), self.model.trees().len(), duration);
        }
        info!(
            "{}: bagged {} trees over {} samples in {}ms",
            self.model.name(),
            self.config.n_trees,
            n,
            duration.as_millis()
        );

        Ok(TrainingMetrics {
            model: self.model.name().to_string(),
            samples: n,
            trees: self.model.trees().len(),
            training_accuracy: Some(accuracy),
            mean_squared_error: Some(mse),
            feature_importance: self.model.ranked_importance(),
            duration_ms: duration.as_millis() as u64,
        })
    }

    fn probability_from(&self, outputs: &[f64], features: &[f64]) -> f64 {
        let beta = self.config.interaction_weight;
        let interaction = features.get(INTERACTION).copied().unwrap_or(0.0);
        let weighted = (1.0 - beta) * Stats::mean(outputs) + beta * interaction;
        Stats::sigmoid(SHARPNESS * (weighted - 0.5))
    }

    pub fn predict(
        &self,
        history: &History,
        top_n: usize,
    ) -> Result<Vec<PredictionCandidate>, EngineError> {
        self.model.ensure_trained()?;
        let window = history.tail(self.config.window);
        let rows = self.extractor.extract(window);
        let mut candidates: Vec<PredictionCandidate> = rows
            .par_iter()
            .enumerate()
            .map(|(i, row)| {
                let outputs = self.model.tree_outputs(row.as_ref());
                let (confidence, uncertainty) = dispersion(&outputs);
                PredictionCandidate::new(
                    (i + 1) as EntityId,
                    self.probability_from(&outputs, row.as_ref()),
                    confidence,
                    uncertainty,
                    self.model
                        .contributing_features(row.as_ref(), CONTRIBUTING_FEATURES),
                )
            })
            .collect();
        rank_candidates(&mut candidates);
        self.rescore_top(&mut candidates, window);
        candidates.truncate(top_n);
        Ok(candidates)
    }

    /// Blends the leading candidates with how often they were drawn together,
    /// then re-sorts the whole list.
    fn rescore_top(
        &self,
        candidates: &mut [PredictionCandidate],
        window: &[OutcomeEvent],
    ) {
        let k = self.config.rescore_top_k.min(candidates.len());
        let gamma = self.config.cooccurrence_boost;
        if k < 2 || gamma <= 0.0 {
            return;
        }
        let cooc = self.extractor.cooccurrence(window);
        let top: Vec<EntityId> = candidates[..k].iter().map(|c| c.entity).collect();
        let affinity: Vec<f64> = top
            .iter()
            .map(|&e| {
                let total: u32 = top.iter().filter(|&&o| o != e).map(|&o| cooc.pair(e, o)).sum();
                total as f64 / (k - 1) as f64
            })
            .collect();
        let max_affinity = affinity.iter().copied().fold(0.0, f64::max);
        if max_affinity <= 0.0 {
            return;
        }
        for (candidate, a) in candidates[..k].iter_mut().zip(&affinity) {
            let s = a / max_affinity;
            candidate.probability = ((1.0 - gamma) * candidate.probability + gamma * s).clamp(0.0, 1.0);
        }
        rank_candidates(candidates);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    /// Entities 1 and 2 always drawn together; 3..=6 rotate as a third pick.
    fn paired_history(n: usize) -> History {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let events = (0..n)
            .map(|i| {
                OutcomeEvent::new(
                    base + Duration::days(i as i64),
                    vec![1, 2, (i % 4 + 3) as EntityId],
                )
            })
            .collect();
        History::new(events, 12).unwrap()
    }

    fn small_config() -> BaggedConfig {
        BaggedConfig {
            n_trees: 12,
            window: 12,
            max_training_steps: 20,
            rescore_top_k: 4,
            ..BaggedConfig::default()
        }
    }

    #[test]
    fn test_same_seed_same_forest() {
        let history = paired_history(40);
        let mut a = BaggedTreeEnsemble::new("bagged", small_config(), 12);
        let mut b = BaggedTreeEnsemble::new("bagged", small_config(), 12);
        let ctx_a = EngineContext::new(9);
        let ctx_b = EngineContext::new(9);
        a.train(&history, &ctx_a, &ctx_a.clock()).unwrap();
        b.train(&history, &ctx_b, &ctx_b.clock()).unwrap();

        assert_eq!(a.model().importance(), b.model().importance());
        assert_eq!(a.predict(&history, 5).unwrap(), b.predict(&history, 5).unwrap());
    }

    #[test]
    fn test_always_drawn_pair_leads() {
        let history = paired_history(40);
        let ctx = EngineContext::new(3);
        let mut model = BaggedTreeEnsemble::new("bagged", small_config(), 12);
        let metrics = model.train(&history, &ctx, &ctx.clock()).unwrap();
        assert_eq!(metrics.trees, 12);

        let top = model.predict(&history, 2).unwrap();
        let mut entities: Vec<EntityId> = top.iter().map(|c| c.entity).collect();
        entities.sort();
        assert_eq!(entities, vec![1, 2]);
        for candidate in &top {
            assert!((0.0..=1.0).contains(&candidate.probability));
        }
    }

    #[test]
    fn test_disposed_model_rejects_predictions() {
        let history = paired_history(20);
        let ctx = EngineContext::new(3);
        let mut model = BaggedTreeEnsemble::new("bagged", small_config(), 12);
        model.train(&history, &ctx, &ctx.clock()).unwrap();
        model.dispose();
        assert!(matches!(
            model.predict(&history, 3),
            Err(EngineError::ModelDisposed { .. })
        ));
    }
}
