use crate::application::features::feature_extractor::FeatureExtractor;
use crate::domain::events::{EntityId, History};
use crate::domain::ml::feature_registry::FeatureVector;
use std::ops::Range;

/// Supervised samples: features from the window before step `t`, labelled
/// with membership in event `t`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainingSet {
    rows: Vec<FeatureVector>,
    labels: Vec<f64>,
    steps: Vec<usize>,
}

impl TrainingSet {
    /// Samples for the most recent `max_steps` target steps of `history`.
    pub fn build(
        extractor: &FeatureExtractor,
        history: &History,
        window: usize,
        max_steps: usize,
    ) -> Self {
        let end = history.len();
        let start = end.saturating_sub(max_steps).max(1);
        Self::from_steps(extractor, history, window, start..end)
    }

    /// Samples for the target steps in `steps`; step 0 has no past and is skipped.
    pub fn from_steps(
        extractor: &FeatureExtractor,
        history: &History,
        window: usize,
        steps: Range<usize>,
    ) -> Self {
        let mut set = Self::default();
        let end = steps.end.min(history.len());
        for t in steps.start.max(1)..end {
            let Some(target) = history.get(t) else {
                continue;
            };
            let rows = extractor.extract(history.window_before(t, window));
            for (i, row) in rows.into_iter().enumerate() {
                let entity = (i + 1) as EntityId;
                set.labels.push(if target.contains(entity) { 1.0 } else { 0.0 });
                set.rows.push(row);
                set.steps.push(t);
            }
        }
        set
    }

    pub fn rows(&self) -> &[FeatureVector] {
        &self.rows
    }

    pub fn labels(&self) -> &[f64] {
        &self.labels
    }

    /// Target step of each sample.
    pub fn steps(&self) -> &[usize] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn positive_rate(&self) -> f64 {
        if self.labels.is_empty() {
            return 0.0;
        }
        self.labels.iter().sum::<f64>() / self.labels.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::OutcomeEvent;
    use chrono::{Duration, TimeZone, Utc};

    fn history(n: usize) -> History {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let events = (0..n)
            .map(|i| OutcomeEvent::new(base + Duration::days(i as i64), vec![(i % 4 + 1) as u16]))
            .collect();
        History::new(events, 4).unwrap()
    }

    #[test]
    fn test_one_sample_per_entity_and_step() {
        let h = history(10);
        let set = TrainingSet::build(&FeatureExtractor::new(4), &h, 3, 100);
        // Steps 1..10, four entities each.
        assert_eq!(set.len(), 9 * 4);
        assert_eq!(set.steps()[0], 1);
        assert!((set.positive_rate() - 0.25).abs() < 1e-12);
        // Event 1 contains entity 2.
        assert_eq!(&set.labels()[0..4], &[0.0, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_max_steps_keeps_most_recent() {
        let h = history(10);
        let set = TrainingSet::build(&FeatureExtractor::new(4), &h, 3, 2);
        assert_eq!(set.len(), 8);
        assert_eq!(set.steps().first(), Some(&8));
        assert_eq!(set.steps().last(), Some(&9));
    }

    #[test]
    fn test_single_event_history_is_empty() {
        let set = TrainingSet::build(&FeatureExtractor::new(4), &history(1), 3, 10);
        assert!(set.is_empty());
        assert_eq!(set.positive_rate(), 0.0);
    }
}
