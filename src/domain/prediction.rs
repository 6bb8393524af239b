use crate::domain::events::EntityId;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Scored entity produced by a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionCandidate {
    pub entity: EntityId,
    pub probability: f64,
    pub confidence: f64,
    pub uncertainty: f64,
    pub contributing_features: Vec<String>,
}

impl PredictionCandidate {
    /// Clamps every score into [0, 1]; non-finite values become 0.
    pub fn new(
        entity: EntityId,
        probability: f64,
        confidence: f64,
        uncertainty: f64,
        contributing_features: Vec<String>,
    ) -> Self {
        Self {
            entity,
            probability: unit(probability),
            confidence: unit(confidence),
            uncertainty: unit(uncertainty),
            contributing_features,
        }
    }

    /// Candidate following the `confidence = 1 - uncertainty` convention.
    pub fn with_uncertainty(entity: EntityId, probability: f64, uncertainty: f64) -> Self {
        let uncertainty = unit(uncertainty);
        Self::new(entity, probability, 1.0 - uncertainty, uncertainty, Vec::new())
    }
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Sorts by descending probability, ties by ascending entity id.
pub fn rank_candidates(candidates: &mut [PredictionCandidate]) {
    candidates.sort_by(|a, b| {
        b.probability
            .partial_cmp(&a.probability)
            .unwrap_or(Ordering::Equal)
            .then(a.entity.cmp(&b.entity))
    });
}

/// Entity ids of the first `k` candidates.
pub fn top_entities(candidates: &[PredictionCandidate], k: usize) -> Vec<EntityId> {
    candidates.iter().take(k).map(|c| c.entity).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_clamping() {
        let c = PredictionCandidate::new(3, 1.4, -0.2, f64::NAN, vec![]);
        assert_eq!(c.probability, 1.0);
        assert_eq!(c.confidence, 0.0);
        assert_eq!(c.uncertainty, 0.0);
    }

    #[test]
    fn test_rank_is_stable_on_ties() {
        let mut candidates = vec![
            PredictionCandidate::with_uncertainty(5, 0.4, 0.1),
            PredictionCandidate::with_uncertainty(2, 0.4, 0.1),
            PredictionCandidate::with_uncertainty(9, 0.8, 0.1),
        ];
        rank_candidates(&mut candidates);
        assert_eq!(top_entities(&candidates, 3), vec![9, 2, 5]);
    }
}
