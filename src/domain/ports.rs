use crate::domain::events::OutcomeEvent;
use crate::domain::ml::training_metrics::TrainingMetrics;
use crate::domain::prediction::PredictionCandidate;
use anyhow::Result;
use async_trait::async_trait;

/// Source of historical outcome events.
///
/// Implementations return events oldest-first; the engine validates the
/// order when building a `History` and rejects anything else.
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    async fn ordered_events(&self) -> Result<Vec<OutcomeEvent>>;
}

/// External sequence-model service (e.g. a recurrent network host).
#[async_trait]
pub trait SequenceModel: Send + Sync {
    async fn train(&self, events: &[OutcomeEvent]) -> Result<TrainingMetrics>;
    async fn predict(&self, events: &[OutcomeEvent]) -> Result<Vec<PredictionCandidate>>;
    async fn dispose(&self) -> Result<()>;

    fn name(&self) -> &str;
}

/// Key/value persistence for cached artifacts (models, weights, results).
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    async fn put(&self, key: &str, value: &serde_json::Value) -> Result<()>;
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    async fn delete(&self, key: &str) -> Result<bool>;
    async fn keys(&self, prefix: &str) -> Result<Vec<String>>;
}
