//! Engine facade: owns the model roster, the execution context and the
//! optional artifact store, and exposes the train / predict / evaluate /
//! optimize operations over a validated `History`.

use crate::application::backtest::{BacktestEngine, BacktestReport};
use crate::application::context::{CancellationToken, EngineContext};
use crate::application::features::FeatureExtractor;
use crate::application::ml::{Model, ModelFactory, ModelSlot, PersistedModel};
use crate::application::optimization::{
    EnsembleWeightOptimizer, HyperparameterSearch, ModelOutputs, WeightReport,
};
use crate::application::validation::{CrossValidationReport, TimeSeriesCrossValidator};
use crate::config::{BacktestConfig, EngineConfig, NamedModelSpec, RunConfig, WeightStrategy};
use crate::domain::errors::EngineError;
use crate::domain::events::{EntityId, History};
use crate::domain::ml::feature_registry::FeatureVector;
use crate::domain::ml::training_metrics::TrainingMetrics;
use crate::domain::optimization::ensemble_weights::EnsembleWeights;
use crate::domain::optimization::trial::OptimizationResult;
use crate::domain::ports::{ArtifactStore, HistoryProvider, SequenceModel};
use crate::domain::prediction::PredictionCandidate;
use crate::infrastructure::observability::EngineMetrics;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{OnceCell, RwLock};
use tracing::{info, warn};

const WEIGHTS_KEY: &str = "ensemble/weights";
const MANIFEST_KEY: &str = "ensemble/manifest";

fn model_key(name: &str) -> String {
    format!("model/{}", name)
}

/// Per-model candidates plus their weighted combination.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsemblePrediction {
    pub generated_at: DateTime<Utc>,
    pub per_model: BTreeMap<String, Vec<PredictionCandidate>>,
    pub weights: EnsembleWeights,
    pub combined: Vec<PredictionCandidate>,
}

/// Index entry written next to persisted models.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArtifactManifest {
    pub saved_at: DateTime<Utc>,
    pub seed: u64,
    pub domain_size: usize,
    /// (model name, kind) of every persisted tree model.
    pub models: Vec<(String, String)>,
    pub has_weights: bool,
}

pub struct Engine {
    config: EngineConfig,
    run: RunConfig,
    ctx: EngineContext,
    factory: ModelFactory,
    slots: OnceCell<Vec<Arc<ModelSlot>>>,
    weights: RwLock<Option<EnsembleWeights>>,
    store: Option<Arc<dyn ArtifactStore>>,
}

impl Engine {
    pub fn new(config: EngineConfig, run: RunConfig) -> Result<Self, EngineError> {
        run.validate()?;
        let ctx = EngineContext::new(config.engine.seed).with_time_budget(config.time_budget());
        let factory = ModelFactory::new(config.engine.domain_size);
        Ok(Self {
            config,
            run,
            ctx,
            factory,
            slots: OnceCell::new(),
            weights: RwLock::new(None),
            store: None,
        })
    }

    pub fn with_sequence_model(mut self, service: Arc<dyn SequenceModel>) -> Self {
        self.factory = self.factory.with_sequence_model(service);
        self
    }

    pub fn with_store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_metrics(mut self, metrics: EngineMetrics) -> Self {
        self.ctx = self.ctx.with_metrics(metrics);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn run_config(&self) -> &RunConfig {
        &self.run
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn metrics(&self) -> Option<&EngineMetrics> {
        self.ctx.metrics()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.ctx.cancellation_token()
    }

    fn domain_size(&self) -> usize {
        self.config.engine.domain_size
    }

    fn top_n(&self) -> usize {
        self.config.engine.top_n
    }

    /// Builds the slots on first use so a sequence model attached after
    /// construction is seen by the factory.
    async fn slots(&self) -> Result<&Vec<Arc<ModelSlot>>, EngineError> {
        self.slots
            .get_or_try_init(|| async {
                self.run
                    .models
                    .iter()
                    .map(|spec| {
                        let model = self.factory.build_owned(spec)?;
                        Ok(Arc::new(ModelSlot::new(spec.name.clone(), model)))
                    })
                    .collect::<Result<Vec<_>, EngineError>>()
            })
            .await
    }

    async fn slot(&self, name: &str) -> Result<Arc<ModelSlot>, EngineError> {
        self.slots()
            .await?
            .iter()
            .find(|s| s.name() == name)
            .cloned()
            .ok_or_else(|| EngineError::invalid_config(format!("unknown model '{}'", name)))
    }

    fn spec(&self, name: &str) -> Result<&NamedModelSpec, EngineError> {
        self.run
            .model(name)
            .ok_or_else(|| EngineError::invalid_config(format!("unknown model '{}'", name)))
    }

    fn store(&self) -> Result<&Arc<dyn ArtifactStore>, EngineError> {
        self.store
            .as_ref()
            .ok_or_else(|| EngineError::invalid_config("no artifact store configured"))
    }

    /// Fetches and validates events from `provider`.
    pub async fn load_history(&self, provider: &dyn HistoryProvider) -> Result<History, EngineError> {
        let events = provider
            .ordered_events()
            .await
            .map_err(EngineError::history_provider)?;
        let history = History::new(events, self.domain_size())?;
        info!("Loaded history of {} events", history.len());
        Ok(history)
    }

    /// Feature rows of every entity over the most recent `window` events.
    pub fn extract_features(&self, history: &History, window: usize) -> Vec<FeatureVector> {
        FeatureExtractor::new(self.domain_size()).extract(history.tail(window))
    }

    /// Same as `extract_features`, keyed by entity id.
    pub fn extract_features_by_entity(
        &self,
        history: &History,
        window: usize,
    ) -> BTreeMap<EntityId, FeatureVector> {
        self.extract_features(history, window)
            .into_iter()
            .enumerate()
            .map(|(i, row)| ((i + 1) as EntityId, row))
            .collect()
    }

    /// Trains every configured model on the full history.
    pub async fn train_ensemble(
        &self,
        history: &History,
    ) -> Result<BTreeMap<String, TrainingMetrics>, EngineError> {
        let clock = self.ctx.clock();
        let mut results = BTreeMap::new();
        for slot in self.slots().await? {
            self.ctx.checkpoint(&clock)?;
            let metrics = slot.train(history, &self.ctx, &clock).await?;
            info!(
                "{}: trained {} trees on {} samples in {}ms",
                slot.name(),
                metrics.trees,
                metrics.samples,
                metrics.duration_ms
            );
            results.insert(slot.name().to_string(), metrics);
        }
        Ok(results)
    }

    pub async fn train_model(
        &self,
        history: &History,
        name: &str,
    ) -> Result<TrainingMetrics, EngineError> {
        let slot = self.slot(name).await?;
        let clock = self.ctx.clock();
        slot.train(history, &self.ctx, &clock).await
    }

    /// Ranked candidates for the event after `history`, combined with the
    /// stored weights (equal weights if none have been optimized).
    pub async fn predict(
        &self,
        history: &History,
        top_n: Option<usize>,
    ) -> Result<EnsemblePrediction, EngineError> {
        let top_n = top_n.unwrap_or(self.top_n());
        let mut per_model = BTreeMap::new();
        for slot in self.slots().await? {
            let candidates = slot.predict(history, top_n).await?;
            per_model.insert(slot.name().to_string(), candidates);
        }

        let weights = match self.weights.read().await.clone() {
            Some(w) => w,
            None => EnsembleWeights::equal(&per_model.keys().collect::<Vec<_>>()),
        };
        let combined = weights.combine(&per_model, top_n);
        Ok(EnsemblePrediction {
            generated_at: Utc::now(),
            per_model,
            weights,
            combined,
        })
    }

    /// Walk-forward cross-validation of one model, or of every model.
    pub async fn cross_validate(
        &self,
        history: &History,
        model: Option<&str>,
    ) -> Result<Vec<CrossValidationReport>, EngineError> {
        let specs: Vec<&NamedModelSpec> = match model {
            Some(name) => vec![self.spec(name)?],
            None => self.run.models.iter().collect(),
        };
        let validator = TimeSeriesCrossValidator::new(self.run.validation, self.top_n())
            .with_scoring(self.run.profit, self.run.composite);
        let clock = self.ctx.clock();

        let mut reports = Vec::with_capacity(specs.len());
        for spec in specs {
            reports.push(
                validator
                    .validate(spec, history, &self.factory, &self.ctx, &clock)
                    .await?,
            );
        }
        Ok(reports)
    }

    /// Tunes one model over the configured search space. The result is also
    /// written to the store under `optimization/<run id>` when one is set.
    pub async fn optimize_hyperparameters(
        &self,
        history: &History,
        model: &str,
    ) -> Result<OptimizationResult, EngineError> {
        let spec = self.spec(model)?;
        let search = HyperparameterSearch::new(
            self.run.search_space.clone(),
            self.run.search,
            self.run.validation,
            self.top_n(),
        )
        .with_scoring(self.run.profit, self.run.composite);
        let result = search.run(spec, history, &self.factory, &self.ctx).await?;

        if let Some(store) = &self.store {
            store
                .put(
                    &format!("optimization/{}", result.run_id),
                    &serde_json::to_value(&result)?,
                )
                .await
                .map_err(EngineError::persistence)?;
        }
        Ok(result)
    }

    /// Records every model's predictions over the last `weights.window`
    /// events, retraining once at the start of that range.
    pub async fn collect_model_outputs(&self, history: &History) -> Result<ModelOutputs, EngineError> {
        let window = self.run.weights.window.max(1);
        let config = BacktestConfig {
            min_training_size: history.len().saturating_sub(window),
            rebalance_frequency: window,
            rolling_window: self.run.backtest.rolling_window,
        };
        let report = BacktestEngine::new(config, self.top_n())
            .with_profit(self.run.profit)
            .run(&self.run.models, history, &self.factory, &self.ctx)
            .await?;
        Ok(report.outputs)
    }

    /// Derives ensemble weights from recorded outputs and keeps them for
    /// later predictions.
    pub async fn optimize_ensemble_weights(
        &self,
        history: &History,
        outputs: &ModelOutputs,
        strategy: Option<WeightStrategy>,
    ) -> Result<WeightReport, EngineError> {
        let optimizer = EnsembleWeightOptimizer::new(self.run.weights);
        let report = optimizer.optimize_with(
            strategy.unwrap_or(self.run.weights.strategy),
            outputs,
            history,
        )?;
        *self.weights.write().await = Some(report.weights.clone());
        Ok(report)
    }

    pub async fn run_backtest(&self, history: &History) -> Result<BacktestReport, EngineError> {
        BacktestEngine::new(self.run.backtest, self.top_n())
            .with_profit(self.run.profit)
            .run(&self.run.models, history, &self.factory, &self.ctx)
            .await
    }

    pub async fn weights(&self) -> Option<EnsembleWeights> {
        self.weights.read().await.clone()
    }

    /// Writes trained tree models, the current weights and a manifest.
    pub async fn persist(&self) -> Result<ArtifactManifest, EngineError> {
        let store = self.store()?;
        let mut models = Vec::new();
        for slot in self.slots().await? {
            let Some(persisted) = slot.persisted().await else {
                continue;
            };
            let kind = match &persisted {
                PersistedModel::BoostedTree { .. } => "boosted_tree",
                PersistedModel::BaggedTree { .. } => "bagged_tree",
            };
            store
                .put(&model_key(slot.name()), &serde_json::to_value(&persisted)?)
                .await
                .map_err(EngineError::persistence)?;
            models.push((slot.name().to_string(), kind.to_string()));
        }

        let weights = self.weights.read().await.clone();
        if let Some(weights) = &weights {
            store
                .put(WEIGHTS_KEY, &serde_json::to_value(weights)?)
                .await
                .map_err(EngineError::persistence)?;
        }

        let manifest = ArtifactManifest {
            saved_at: Utc::now(),
            seed: self.ctx.seed(),
            domain_size: self.domain_size(),
            models,
            has_weights: weights.is_some(),
        };
        store
            .put(MANIFEST_KEY, &serde_json::to_value(&manifest)?)
            .await
            .map_err(EngineError::persistence)?;
        info!(
            "Persisted {} models (weights: {})",
            manifest.models.len(),
            manifest.has_weights
        );
        Ok(manifest)
    }

    /// Loads every persisted model that matches a configured slot, plus the
    /// weights. Returns the names of the restored models.
    pub async fn restore(&self) -> Result<Vec<String>, EngineError> {
        let store = self.store()?;
        let mut restored = Vec::new();
        for slot in self.slots().await? {
            let Some(value) = store
                .get(&model_key(slot.name()))
                .await
                .map_err(EngineError::persistence)?
            else {
                continue;
            };
            let persisted: PersistedModel = serde_json::from_value(value)?;
            let domain_size = persisted.domain_size();
            if domain_size != self.domain_size() {
                warn!(
                    "{}: persisted model has domain size {}, engine uses {}; skipped",
                    slot.name(),
                    domain_size,
                    self.domain_size()
                );
                continue;
            }
            if !persisted.model().is_well_formed() {
                warn!("{}: persisted trees are malformed; skipped", slot.name());
                continue;
            }
            slot.replace(Model::from_persisted(persisted)).await?;
            restored.push(slot.name().to_string());
        }

        if let Some(value) = store.get(WEIGHTS_KEY).await.map_err(EngineError::persistence)? {
            *self.weights.write().await = Some(serde_json::from_value(value)?);
        }
        info!("Restored {} models", restored.len());
        Ok(restored)
    }

    /// Releases every model; later predictions fail until retrained.
    pub async fn dispose(&self) -> Result<(), EngineError> {
        for slot in self.slots().await? {
            slot.dispose().await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{BoostedConfig, ModelSpec};
    use crate::domain::events::OutcomeEvent;
    use crate::infrastructure::history::InMemoryHistoryProvider;
    use crate::infrastructure::persistence::InMemoryArtifactStore;
    use chrono::{Duration, TimeZone};

    fn events(n: usize) -> Vec<OutcomeEvent> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| OutcomeEvent::new(base + Duration::days(i as i64), vec![1, 2 + (i % 5) as u16]))
            .collect()
    }

    fn engine() -> Engine {
        let mut config = EngineConfig::default();
        config.engine.domain_size = 10;
        config.engine.top_n = 3;
        let run = RunConfig {
            models: vec![NamedModelSpec::new(
                "boosted",
                ModelSpec::BoostedTree(BoostedConfig {
                    rounds: 3,
                    window: 10,
                    max_training_steps: 20,
                    min_samples_split: 2,
                    ..BoostedConfig::default()
                }),
            )],
            ..RunConfig::default()
        };
        Engine::new(config, run).unwrap()
    }

    #[tokio::test]
    async fn test_load_history_validates_order() {
        let engine = engine();
        let mut unordered = events(5);
        unordered.swap(1, 3);
        let err = engine
            .load_history(&InMemoryHistoryProvider::new(unordered))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::UnorderedHistory { .. }));
    }

    #[tokio::test]
    async fn test_predict_before_training_fails_fast() {
        let engine = engine();
        let history = History::new(events(30), 10).unwrap();
        assert!(matches!(
            engine.predict(&history, None).await,
            Err(EngineError::UntrainedModel { .. })
        ));
    }

    #[tokio::test]
    async fn test_train_predict_persist_restore() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let engine = engine().with_store(store.clone());
        let history = History::new(events(40), 10).unwrap();

        let trained = engine.train_ensemble(&history).await.unwrap();
        assert_eq!(trained["boosted"].trees, 3);
        let prediction = engine.predict(&history, None).await.unwrap();
        assert_eq!(prediction.combined.len(), 3);
        assert!(prediction.combined.iter().any(|c| c.entity == 1));
        assert!((prediction.weights.get("boosted") - 1.0).abs() < 1e-12);

        let manifest = engine.persist().await.unwrap();
        assert_eq!(manifest.models, vec![("boosted".to_string(), "boosted_tree".to_string())]);

        let fresh = self::engine().with_store(store);
        assert_eq!(fresh.restore().await.unwrap(), vec!["boosted".to_string()]);
        let again = fresh.predict(&history, None).await.unwrap();
        assert_eq!(again.per_model, prediction.per_model);
    }

    #[tokio::test]
    async fn test_persist_without_store_is_rejected() {
        assert!(matches!(
            engine().persist().await,
            Err(EngineError::InvalidConfig { .. })
        ));
    }

    #[tokio::test]
    async fn test_restore_skips_malformed_trees() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let engine = engine().with_store(store.clone());
        let history = History::new(events(40), 10).unwrap();
        engine.train_ensemble(&history).await.unwrap();
        engine.persist().await.unwrap();

        let key = model_key("boosted");
        let mut value = store.get(&key).await.unwrap().unwrap();
        value["model"]["trees"][0]["nodes"] = serde_json::json!([
            { "Internal": { "feature": 0, "threshold": 0.5, "left": 0, "right": 0 } }
        ]);
        store.put(&key, &value).await.unwrap();

        let fresh = self::engine().with_store(store);
        assert!(fresh.restore().await.unwrap().is_empty());
    }
}
