use crate::domain::events::EntityId;
use crate::domain::prediction::{PredictionCandidate, rank_candidates};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Per-model combination weights; always non-negative and summing to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnsembleWeights {
    weights: BTreeMap<String, f64>,
}

impl EnsembleWeights {
    /// Equal weight for every model.
    pub fn equal<S: AsRef<str>>(models: &[S]) -> Self {
        let n = models.len();
        let weights = models
            .iter()
            .map(|m| (m.as_ref().to_string(), 1.0 / n as f64))
            .collect();
        Self { weights }
    }

    /// Sanitizes raw scores (non-finite or negative become 0) and normalizes.
    /// Falls back to equal weights when nothing positive remains.
    pub fn from_scores(scores: BTreeMap<String, f64>) -> Self {
        let cleaned: BTreeMap<String, f64> = scores
            .into_iter()
            .map(|(k, v)| (k, if v.is_finite() && v > 0.0 { v } else { 0.0 }))
            .collect();
        let total: f64 = cleaned.values().sum();
        if total <= 0.0 || !total.is_finite() {
            let names: Vec<&String> = cleaned.keys().collect();
            return Self::equal(&names);
        }
        Self {
            weights: cleaned.into_iter().map(|(k, v)| (k, v / total)).collect(),
        }
    }

    pub fn get(&self, model: &str) -> f64 {
        self.weights.get(model).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.weights.iter()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Weighted average of per-model candidate lists.
    ///
    /// Entities missing from a model's list contribute probability 0 and
    /// uncertainty 1 for that model; confidence is `1 - uncertainty`.
    /// Contributing features come from the highest-weighted model that scored
    /// the entity.
    pub fn combine(
        &self,
        outputs: &BTreeMap<String, Vec<PredictionCandidate>>,
        top_n: usize,
    ) -> Vec<PredictionCandidate> {
        struct Acc {
            probability: f64,
            listed_weight: f64,
            uncertainty: f64,
            features: Vec<String>,
            feature_weight: f64,
        }

        let mut acc: BTreeMap<EntityId, Acc> = BTreeMap::new();
        let mut active_weight = 0.0;
        for (model, candidates) in outputs {
            let w = self.get(model);
            if w <= 0.0 {
                continue;
            }
            active_weight += w;
            for c in candidates {
                let entry = acc.entry(c.entity).or_insert(Acc {
                    probability: 0.0,
                    listed_weight: 0.0,
                    uncertainty: 0.0,
                    features: Vec::new(),
                    feature_weight: -1.0,
                });
                entry.probability += w * c.probability;
                entry.listed_weight += w;
                entry.uncertainty += w * c.uncertainty;
                if w > entry.feature_weight {
                    entry.feature_weight = w;
                    entry.features = c.contributing_features.clone();
                }
            }
        }

        let mut combined: Vec<PredictionCandidate> = acc
            .into_iter()
            .map(|(entity, a)| {
                let missing = (active_weight - a.listed_weight).max(0.0);
                let uncertainty = if active_weight > 0.0 {
                    (a.uncertainty + missing) / active_weight
                } else {
                    1.0
                };
                let mut candidate =
                    PredictionCandidate::with_uncertainty(entity, a.probability, uncertainty);
                candidate.contributing_features = a.features;
                candidate
            })
            .collect();
        rank_candidates(&mut combined);
        combined.truncate(top_n);
        combined
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equal_weights() {
        let w = EnsembleWeights::equal(&["m1", "m2", "m3"]);
        assert_eq!(w.len(), 3);
        for (_, v) in w.iter() {
            assert!((v - 1.0 / 3.0).abs() < 1e-12);
        }
        assert!((w.total() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_from_scores_sanitizes_and_falls_back() {
        let mut scores = BTreeMap::new();
        scores.insert("a".to_string(), 3.0);
        scores.insert("b".to_string(), f64::NAN);
        scores.insert("c".to_string(), 1.0);
        let w = EnsembleWeights::from_scores(scores);
        assert!((w.get("a") - 0.75).abs() < 1e-12);
        assert_eq!(w.get("b"), 0.0);

        let mut zero = BTreeMap::new();
        zero.insert("a".to_string(), 0.0);
        zero.insert("b".to_string(), -2.0);
        let w = EnsembleWeights::from_scores(zero);
        assert!((w.get("a") - 0.5).abs() < 1e-12);
        assert!((w.get("b") - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_combine_weighted_average() {
        let mut scores = BTreeMap::new();
        scores.insert("a".to_string(), 3.0);
        scores.insert("b".to_string(), 1.0);
        let w = EnsembleWeights::from_scores(scores);

        let mut outputs = BTreeMap::new();
        outputs.insert(
            "a".to_string(),
            vec![
                PredictionCandidate::with_uncertainty(1, 0.8, 0.2),
                PredictionCandidate::with_uncertainty(2, 0.2, 0.2),
            ],
        );
        outputs.insert(
            "b".to_string(),
            vec![PredictionCandidate::with_uncertainty(2, 1.0, 0.2)],
        );

        let combined = w.combine(&outputs, 2);
        assert_eq!(combined[0].entity, 1);
        assert!((combined[0].probability - 0.6).abs() < 1e-12);
        assert!((combined[1].probability - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_combine_partial_lists_keep_confidence_complementary() {
        let w = EnsembleWeights::equal(&["a", "b"]);
        let mut outputs = BTreeMap::new();
        outputs.insert(
            "a".to_string(),
            vec![
                PredictionCandidate::with_uncertainty(1, 0.6, 0.2),
                PredictionCandidate::with_uncertainty(3, 0.5, 0.2),
            ],
        );
        outputs.insert(
            "b".to_string(),
            vec![
                PredictionCandidate::with_uncertainty(2, 0.6, 0.2),
                PredictionCandidate::with_uncertainty(3, 0.5, 0.2),
            ],
        );

        let combined = w.combine(&outputs, 3);
        assert_eq!(combined[0].entity, 3);
        for c in &combined {
            assert!((c.confidence + c.uncertainty - 1.0).abs() < 1e-12);
        }
        let uncertainty = |e: EntityId| combined.iter().find(|c| c.entity == e).unwrap().uncertainty;
        assert!((uncertainty(3) - 0.2).abs() < 1e-12);
        assert!((uncertainty(1) - 0.6).abs() < 1e-12);
        assert!(uncertainty(2) > uncertainty(3));
    }
}
