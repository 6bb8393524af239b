use crate::application::context::{EngineContext, RunClock};
use crate::application::ml::bagged::BaggedTreeEnsemble;
use crate::application::ml::boosted::BoostedTreeEnsemble;
use crate::config::{BaggedConfig, BoostedConfig, ModelSpec, NamedModelSpec};
use crate::domain::errors::EngineError;
use crate::domain::events::History;
use crate::domain::ml::forest::{ModelState, TreeModel};
use crate::domain::ml::training_metrics::TrainingMetrics;
use crate::domain::ports::SequenceModel;
use crate::domain::prediction::{PredictionCandidate, rank_candidates};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tokio::sync::RwLock;
use tracing::{debug, warn};

#[async_trait]
pub trait Trainable: Send + Sync {
    async fn train(
        &mut self,
        history: &History,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<TrainingMetrics, EngineError>;
}

#[async_trait]
pub trait Predictable: Send + Sync {
    /// Ranked candidates for the event following `history`.
    async fn predict(
        &self,
        history: &History,
        top_n: usize,
    ) -> Result<Vec<PredictionCandidate>, EngineError>;

    fn name(&self) -> &str;
}

/// Engine-side view of the external sequence model.
///
/// Several adapters may share one service. Each train through any of them
/// bumps the shared `lease`; an adapter whose own fit is no longer the latest
/// refits on its remembered history before predicting. Only the owning
/// adapter releases the service on dispose.
pub struct SequenceAdapter {
    name: String,
    domain_size: usize,
    service: Arc<dyn SequenceModel>,
    state: ModelState,
    owner: bool,
    lease: Arc<AtomicU64>,
    fitted_lease: AtomicU64,
    trained_on: Option<History>,
}

impl SequenceAdapter {
    pub fn new(name: impl Into<String>, domain_size: usize, service: Arc<dyn SequenceModel>) -> Self {
        Self::with_lease(name, domain_size, service, Arc::new(AtomicU64::new(0)), true)
    }

    fn with_lease(
        name: impl Into<String>,
        domain_size: usize,
        service: Arc<dyn SequenceModel>,
        lease: Arc<AtomicU64>,
        owner: bool,
    ) -> Self {
        Self {
            name: name.into(),
            domain_size,
            service,
            state: ModelState::Untrained,
            owner,
            lease,
            fitted_lease: AtomicU64::new(0),
            trained_on: None,
        }
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    async fn fit(&self, history: &History) -> Result<TrainingMetrics, EngineError> {
        let metrics = self
            .service
            .train(history.events())
            .await
            .map_err(EngineError::sequence_model)?;
        let lease = self.lease.fetch_add(1, Ordering::AcqRel) + 1;
        self.fitted_lease.store(lease, Ordering::Release);
        Ok(metrics)
    }

    async fn dispose(&mut self) -> Result<(), EngineError> {
        if self.owner {
            self.service
                .dispose()
                .await
                .map_err(EngineError::sequence_model)?;
            self.lease.fetch_add(1, Ordering::AcqRel);
        }
        self.trained_on = None;
        self.state = ModelState::Disposed;
        Ok(())
    }
}

#[async_trait]
impl Trainable for SequenceAdapter {
    async fn train(
        &mut self,
        history: &History,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<TrainingMetrics, EngineError> {
        ctx.checkpoint(clock)?;
        let started = Instant::now();
        let mut metrics = self.fit(history).await?;
        self.trained_on = Some(history.clone());
        self.state = ModelState::Trained;
        metrics.model = self.name.clone();
        if metrics.duration_ms == 0 {
            metrics.duration_ms = started.elapsed().as_millis() as u64;
        }
        Ok(metrics)
    }
}

#[async_trait]
impl Predictable for SequenceAdapter {
    async fn predict(
        &self,
        history: &History,
        top_n: usize,
    ) -> Result<Vec<PredictionCandidate>, EngineError> {
        match self.state {
            ModelState::Trained => {}
            ModelState::Untrained => {
                return Err(EngineError::UntrainedModel {
                    model: self.name.clone(),
                });
            }
            ModelState::Disposed => {
                return Err(EngineError::ModelDisposed {
                    model: self.name.clone(),
                });
            }
        }
        if self.lease.load(Ordering::Acquire) != self.fitted_lease.load(Ordering::Acquire)
            && let Some(trained_on) = &self.trained_on
        {
            debug!("{}: service was refitted elsewhere, restoring own fit", self.name);
            self.fit(trained_on).await?;
        }
        let raw = self
            .service
            .predict(history.events())
            .await
            .map_err(EngineError::sequence_model)?;
        // Re-clamp and drop ids outside the domain; the service is untrusted.
        let mut candidates: Vec<PredictionCandidate> = raw
            .into_iter()
            .filter(|c| c.entity >= 1 && (c.entity as usize) <= self.domain_size)
            .map(|c| {
                PredictionCandidate::new(
                    c.entity,
                    c.probability,
                    c.confidence,
                    c.uncertainty,
                    c.contributing_features,
                )
            })
            .collect();
        rank_candidates(&mut candidates);
        candidates.truncate(top_n);
        Ok(candidates)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Serialized form of a trained tree model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PersistedModel {
    BoostedTree {
        config: BoostedConfig,
        domain_size: usize,
        model: TreeModel,
    },
    BaggedTree {
        config: BaggedConfig,
        domain_size: usize,
        model: TreeModel,
    },
}

impl PersistedModel {
    pub fn domain_size(&self) -> usize {
        match self {
            PersistedModel::BoostedTree { domain_size, .. }
            | PersistedModel::BaggedTree { domain_size, .. } => *domain_size,
        }
    }

    pub fn model(&self) -> &TreeModel {
        match self {
            PersistedModel::BoostedTree { model, .. } | PersistedModel::BaggedTree { model, .. } => {
                model
            }
        }
    }
}

pub enum Model {
    Boosted(BoostedTreeEnsemble),
    Bagged(BaggedTreeEnsemble),
    Sequence(SequenceAdapter),
}

impl Model {
    pub fn kind(&self) -> &'static str {
        match self {
            Model::Boosted(_) => "boosted_tree",
            Model::Bagged(_) => "bagged_tree",
            Model::Sequence(_) => "sequence_model",
        }
    }

    pub fn is_trained(&self) -> bool {
        match self {
            Model::Boosted(m) => m.model().state() == ModelState::Trained,
            Model::Bagged(m) => m.model().state() == ModelState::Trained,
            Model::Sequence(m) => m.state() == ModelState::Trained,
        }
    }

    pub async fn dispose(&mut self) -> Result<(), EngineError> {
        match self {
            Model::Boosted(m) => {
                m.dispose();
                Ok(())
            }
            Model::Bagged(m) => {
                m.dispose();
                Ok(())
            }
            Model::Sequence(m) => m.dispose().await,
        }
    }

    /// Snapshot of a trained tree model; `None` for anything else.
    pub fn persisted(&self) -> Option<PersistedModel> {
        if !self.is_trained() {
            return None;
        }
        match self {
            Model::Boosted(m) => Some(PersistedModel::BoostedTree {
                config: m.config().clone(),
                domain_size: m.domain_size(),
                model: m.model().clone(),
            }),
            Model::Bagged(m) => Some(PersistedModel::BaggedTree {
                config: m.config().clone(),
                domain_size: m.domain_size(),
                model: m.model().clone(),
            }),
            Model::Sequence(_) => None,
        }
    }

    pub fn from_persisted(persisted: PersistedModel) -> Self {
        match persisted {
            PersistedModel::BoostedTree {
                config,
                domain_size,
                model,
            } => Model::Boosted(BoostedTreeEnsemble::from_parts(config, model, domain_size)),
            PersistedModel::BaggedTree {
                config,
                domain_size,
                model,
            } => Model::Bagged(BaggedTreeEnsemble::from_parts(config, model, domain_size)),
        }
    }
}

#[async_trait]
impl Trainable for Model {
    async fn train(
        &mut self,
        history: &History,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<TrainingMetrics, EngineError> {
        match self {
            Model::Boosted(m) => m.train(history, ctx, clock),
            Model::Bagged(m) => m.train(history, ctx, clock),
            Model::Sequence(m) => m.train(history, ctx, clock).await,
        }
    }
}

#[async_trait]
impl Predictable for Model {
    async fn predict(
        &self,
        history: &History,
        top_n: usize,
    ) -> Result<Vec<PredictionCandidate>, EngineError> {
        match self {
            Model::Boosted(m) => m.predict(history, top_n),
            Model::Bagged(m) => m.predict(history, top_n),
            Model::Sequence(m) => m.predict(history, top_n).await,
        }
    }

    fn name(&self) -> &str {
        match self {
            Model::Boosted(m) => m.name(),
            Model::Bagged(m) => m.name(),
            Model::Sequence(m) => Predictable::name(m),
        }
    }
}

/// Builds fresh, untrained models from their specs.
#[derive(Clone)]
pub struct ModelFactory {
    domain_size: usize,
    sequence: Option<Arc<dyn SequenceModel>>,
    lease: Arc<AtomicU64>,
}

impl ModelFactory {
    pub fn new(domain_size: usize) -> Self {
        Self {
            domain_size,
            sequence: None,
            lease: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn with_sequence_model(mut self, service: Arc<dyn SequenceModel>) -> Self {
        self.sequence = Some(service);
        self
    }

    pub fn domain_size(&self) -> usize {
        self.domain_size
    }

    /// Temporary model for a fold, trial or backtest. Disposing it never
    /// releases the shared sequence service.
    pub fn build(&self, named: &NamedModelSpec) -> Result<Model, EngineError> {
        self.build_model(named, false)
    }

    /// Long-lived model owned by an engine slot.
    pub fn build_owned(&self, named: &NamedModelSpec) -> Result<Model, EngineError> {
        self.build_model(named, true)
    }

    fn build_model(&self, named: &NamedModelSpec, owner: bool) -> Result<Model, EngineError> {
        named.spec.validate()?;
        match &named.spec {
            ModelSpec::BoostedTree(config) => Ok(Model::Boosted(BoostedTreeEnsemble::new(
                named.name.clone(),
                config.clone(),
                self.domain_size,
            ))),
            ModelSpec::BaggedTree(config) => Ok(Model::Bagged(BaggedTreeEnsemble::new(
                named.name.clone(),
                config.clone(),
                self.domain_size,
            ))),
            ModelSpec::SequenceModel => {
                let service = self.sequence.clone().ok_or_else(|| {
                    EngineError::invalid_config(format!(
                        "model '{}' needs a sequence model but none is configured",
                        named.name
                    ))
                })?;
                Ok(Model::Sequence(SequenceAdapter::with_lease(
                    named.name.clone(),
                    self.domain_size,
                    service,
                    Arc::clone(&self.lease),
                    owner,
                )))
            }
        }
    }
}

/// Resets the slot's training flag when dropped.
struct TrainingGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> TrainingGuard<'a> {
    fn acquire(flag: &'a AtomicBool, model: &str) -> Result<Self, EngineError> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| EngineError::TrainingInProgress {
                model: model.to_string(),
            })?;
        Ok(Self { flag })
    }
}

impl Drop for TrainingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// One named model plus its "training in progress" flag.
///
/// While a `train` call runs, every other `train`, `predict`, `dispose` or
/// `replace` on the slot fails with `TrainingInProgress` instead of waiting.
pub struct ModelSlot {
    name: String,
    training: AtomicBool,
    model: RwLock<Model>,
}

impl ModelSlot {
    pub fn new(name: impl Into<String>, model: Model) -> Self {
        Self {
            name: name.into(),
            training: AtomicBool::new(false),
            model: RwLock::new(model),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_training(&self) -> bool {
        self.training.load(Ordering::Acquire)
    }

    fn ensure_idle(&self) -> Result<(), EngineError> {
        if self.is_training() {
            return Err(EngineError::TrainingInProgress {
                model: self.name.clone(),
            });
        }
        Ok(())
    }

    pub async fn train(
        &self,
        history: &History,
        ctx: &EngineContext,
        clock: &RunClock,
    ) -> Result<TrainingMetrics, EngineError> {
        let _guard = TrainingGuard::acquire(&self.training, &self.name)?;
        let mut model = self.model.write().await;
        model.train(history, ctx, clock).await
    }

    pub async fn predict(
        &self,
        history: &History,
        top_n: usize,
    ) -> Result<Vec<PredictionCandidate>, EngineError> {
        self.ensure_idle()?;
        let model = self.model.read().await;
        model.predict(history, top_n).await
    }

    pub async fn dispose(&self) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let mut model = self.model.write().await;
        model.dispose().await
    }

    pub async fn is_trained(&self) -> bool {
        self.model.read().await.is_trained()
    }

    pub async fn persisted(&self) -> Option<PersistedModel> {
        self.model.read().await.persisted()
    }

    /// Swaps in a restored model.
    pub async fn replace(&self, model: Model) -> Result<(), EngineError> {
        self.ensure_idle()?;
        let mut slot = self.model.write().await;
        if slot.kind() != model.kind() {
            warn!(
                "{}: replacing {} model with {}",
                self.name,
                slot.kind(),
                model.kind()
            );
        }
        *slot = model;
        Ok(())
    }
}
