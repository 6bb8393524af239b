//! Learners behind the engine: two tree ensembles and an adapter over the
//! external sequence model, unified by the `Model` enum.

pub mod bagged;
pub mod boosted;
pub mod model;

pub use bagged::BaggedTreeEnsemble;
pub use boosted::BoostedTreeEnsemble;
pub use model::{Model, ModelFactory, ModelSlot, PersistedModel, Predictable, SequenceAdapter, Trainable};

use crate::domain::performance::stats::Stats;

/// (confidence, uncertainty) from the spread of per-tree outputs.
pub(crate) fn dispersion(outputs: &[f64]) -> (f64, f64) {
    let variance = Stats::variance(outputs);
    ((1.0 - variance).clamp(0.0, 1.0), (variance + 0.1).min(0.9))
}
