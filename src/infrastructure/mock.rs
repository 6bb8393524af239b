use crate::domain::events::{EntityId, OutcomeEvent};
use crate::domain::ml::training_metrics::TrainingMetrics;
use crate::domain::ports::SequenceModel;
use crate::domain::prediction::PredictionCandidate;
use anyhow::{Result, bail};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tracing::debug;

/// Weight of the recency term against the frequency term.
const RECENCY_WEIGHT: f64 = 0.3;

/// Reference sequence model: scores each entity by how often and how
/// recently it appeared in the last `window` events.
///
/// `score = (1 - a) * count / W + a / (1 + gap)`. It must be trained before
/// predicting; disposing resets it to untrained.
pub struct RecencyFrequencyModel {
    domain_size: usize,
    window: usize,
    trained: AtomicBool,
    train_calls: AtomicUsize,
}

impl RecencyFrequencyModel {
    pub fn new(domain_size: usize, window: usize) -> Self {
        Self {
            domain_size,
            window: window.max(1),
            trained: AtomicBool::new(false),
            train_calls: AtomicUsize::new(0),
        }
    }

    pub fn is_trained(&self) -> bool {
        self.trained.load(Ordering::SeqCst)
    }

    pub fn train_calls(&self) -> usize {
        self.train_calls.load(Ordering::SeqCst)
    }

    fn score(&self, window: &[OutcomeEvent], entity: EntityId) -> (f64, usize) {
        let w = window.len();
        let count = window.iter().filter(|e| e.contains(entity)).count();
        let gap = window
            .iter()
            .rposition(|e| e.contains(entity))
            .map(|pos| w - 1 - pos)
            .unwrap_or(w);
        let frequency = if w > 0 { count as f64 / w as f64 } else { 0.0 };
        let recency = if count > 0 { 1.0 / (1.0 + gap as f64) } else { 0.0 };
        (
            (1.0 - RECENCY_WEIGHT) * frequency + RECENCY_WEIGHT * recency,
            count,
        )
    }
}

#[async_trait]
impl SequenceModel for RecencyFrequencyModel {
    async fn train(&self, events: &[OutcomeEvent]) -> Result<TrainingMetrics> {
        if events.is_empty() {
            bail!("no events to train on");
        }
        self.trained.store(true, Ordering::SeqCst);
        self.train_calls.fetch_add(1, Ordering::SeqCst);
        debug!("Recency-frequency model fitted on {} events", events.len());
        Ok(TrainingMetrics {
            model: self.name().to_string(),
            samples: events.len(),
            ..TrainingMetrics::default()
        })
    }

    async fn predict(&self, events: &[OutcomeEvent]) -> Result<Vec<PredictionCandidate>> {
        if !self.is_trained() {
            bail!("recency-frequency model has not been trained");
        }
        let window = &events[events.len().saturating_sub(self.window)..];
        Ok((1..=self.domain_size as EntityId)
            .map(|entity| {
                let (score, count) = self.score(window, entity);
                PredictionCandidate::with_uncertainty(entity, score, 1.0 / (1.0 + count as f64))
            })
            .collect())
    }

    async fn dispose(&self) -> Result<()> {
        self.trained.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "recency_frequency"
    }
}
