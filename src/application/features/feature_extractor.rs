use crate::domain::events::{EntityId, OutcomeEvent};
use crate::domain::ml::feature_registry::{
    CO_OCCURRENCE, DAY_OF_WEEK_SIN, FEATURE_COUNT, FREQUENCY, FeatureVector, GAP, INTERACTION,
    MOMENTUM, QUARTER_SIN, TREND, VOLATILITY,
};
use crate::domain::performance::stats::Stats;
use chrono::Datelike;
use rayon::prelude::*;
use std::f64::consts::PI;

/// Decay per event of the momentum feature.
const MOMENTUM_DECAY: f64 = 0.1;

/// Pairwise co-occurrence counts over one window.
#[derive(Debug, Clone, PartialEq)]
pub struct CoOccurrence {
    domain_size: usize,
    pairs: Vec<u32>,
    occurrences: Vec<u32>,
}

impl CoOccurrence {
    pub fn from_window(window: &[OutcomeEvent], domain_size: usize) -> Self {
        let mut pairs = vec![0u32; domain_size * domain_size];
        let mut occurrences = vec![0u32; domain_size];
        for event in window {
            let ids: Vec<usize> = event
                .outcome_set
                .iter()
                .map(|&e| e as usize)
                .filter(|&e| e >= 1 && e <= domain_size)
                .collect();
            for (k, &a) in ids.iter().enumerate() {
                occurrences[a - 1] += 1;
                for &b in &ids[k + 1..] {
                    pairs[(a - 1) * domain_size + (b - 1)] += 1;
                    pairs[(b - 1) * domain_size + (a - 1)] += 1;
                }
            }
        }
        Self {
            domain_size,
            pairs,
            occurrences,
        }
    }

    /// Number of events containing both `a` and `b` (0 for `a == b`).
    pub fn pair(&self, a: EntityId, b: EntityId) -> u32 {
        match (self.slot(a), self.slot(b)) {
            (Some(i), Some(j)) if i != j => self.pairs[i * self.domain_size + j],
            _ => 0,
        }
    }

    pub fn occurrences(&self, entity: EntityId) -> u32 {
        self.slot(entity).map(|i| self.occurrences[i]).unwrap_or(0)
    }

    pub fn domain_size(&self) -> usize {
        self.domain_size
    }

    fn slot(&self, entity: EntityId) -> Option<usize> {
        let e = entity as usize;
        (e >= 1 && e <= self.domain_size).then(|| e - 1)
    }
}

/// Un-normalized per-entity statistics of one window.
struct RawFeatures {
    count: f64,
    gap: f64,
    momentum: f64,
    volatility: f64,
    trend: f64,
    co_occurrence: f64,
    interaction: f64,
}

/// Turns a look-back window (oldest first) into one `FeatureVector` per
/// entity of the domain. Pure: the same window always yields the same rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FeatureExtractor {
    domain_size: usize,
}

impl FeatureExtractor {
    pub fn new(domain_size: usize) -> Self {
        Self { domain_size }
    }

    pub fn domain_size(&self) -> usize {
        self.domain_size
    }

    pub fn cooccurrence(&self, window: &[OutcomeEvent]) -> CoOccurrence {
        CoOccurrence::from_window(window, self.domain_size)
    }

    /// Row `i` belongs to entity `i + 1`.
    pub fn extract(&self, window: &[OutcomeEvent]) -> Vec<FeatureVector> {
        let cooc = self.cooccurrence(window);
        let raw: Vec<RawFeatures> = (1..=self.domain_size)
            .into_par_iter()
            .map(|e| raw_features(window, &cooc, e as EntityId))
            .collect();

        let max_count = max_of(raw.iter().map(|r| r.count));
        let max_gap = max_of(raw.iter().map(|r| r.gap));
        let max_momentum = max_of(raw.iter().map(|r| r.momentum));
        let max_cooc = max_of(raw.iter().map(|r| r.co_occurrence));
        let cyclical = cyclical_features(window);

        raw.iter()
            .map(|r| {
                let mut values = [0.0; FEATURE_COUNT];
                values[FREQUENCY] = normalized(r.count, max_count);
                values[GAP] = normalized(r.gap, max_gap);
                values[MOMENTUM] = normalized(r.momentum, max_momentum);
                values[VOLATILITY] = r.volatility;
                values[TREND] = r.trend;
                values[DAY_OF_WEEK_SIN..=QUARTER_SIN].copy_from_slice(&cyclical);
                values[CO_OCCURRENCE] = normalized(r.co_occurrence, max_cooc);
                values[INTERACTION] = r.interaction;
                FeatureVector::new(values)
            })
            .collect()
    }

    /// Features of a single entity; `None` outside the domain.
    pub fn extract_entity(&self, window: &[OutcomeEvent], entity: EntityId) -> Option<FeatureVector> {
        let index = (entity as usize).checked_sub(1)?;
        self.extract(window).get(index).copied()
    }
}

fn raw_features(window: &[OutcomeEvent], cooc: &CoOccurrence, entity: EntityId) -> RawFeatures {
    let w = window.len();
    let indicator: Vec<f64> = window
        .iter()
        .map(|event| if event.contains(entity) { 1.0 } else { 0.0 })
        .collect();

    let count: f64 = indicator.iter().sum();
    let gap = indicator
        .iter()
        .rposition(|&x| x > 0.0)
        .map(|pos| (w - 1 - pos) as f64)
        .unwrap_or(w as f64);
    let momentum: f64 = indicator
        .iter()
        .enumerate()
        .map(|(pos, x)| (-MOMENTUM_DECAY * (w - 1 - pos) as f64).exp() * x)
        .sum();
    let p = if w > 0 { count / w as f64 } else { 0.0 };

    let mut co_occurrence = 0.0;
    let mut ratio_sum = 0.0;
    let mut partners = 0usize;
    for other in 1..=cooc.domain_size() as EntityId {
        let pair = cooc.pair(entity, other);
        if pair == 0 {
            continue;
        }
        co_occurrence += pair as f64;
        let occ = cooc.occurrences(other);
        if occ > 0 {
            ratio_sum += pair as f64 / occ as f64;
            partners += 1;
        }
    }

    RawFeatures {
        count,
        gap,
        momentum,
        volatility: p * (1.0 - p),
        trend: Stats::slope(&indicator),
        co_occurrence,
        interaction: if partners > 0 {
            ratio_sum / partners as f64
        } else {
            0.0
        },
    }
}

/// Day-of-week, month and quarter of the most recent event.
fn cyclical_features(window: &[OutcomeEvent]) -> [f64; 3] {
    let Some(last) = window.last() else {
        return [0.0; 3];
    };
    let ts = last.timestamp;
    let weekday = ts.weekday().num_days_from_monday() as f64;
    let month = ts.month0() as f64;
    let quarter = (ts.month0() / 3) as f64;
    [
        (2.0 * PI * weekday / 7.0).sin(),
        (2.0 * PI * month / 12.0).sin(),
        (2.0 * PI * quarter / 4.0).sin(),
    ]
}

fn max_of(values: impl Iterator<Item = f64>) -> f64 {
    values.fold(0.0, f64::max)
}

fn normalized(value: f64, max: f64) -> f64 {
    if max > 0.0 { value / max } else { 0.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn window(sets: &[&[EntityId]]) -> Vec<OutcomeEvent> {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        sets.iter()
            .enumerate()
            .map(|(i, set)| OutcomeEvent::new(base + Duration::days(i as i64), set.to_vec()))
            .collect()
    }

    #[test]
    fn test_frequency_gap_and_momentum() {
        let events = window(&[&[1, 2], &[1, 3], &[2, 3], &[1, 4]]);
        let rows = FeatureExtractor::new(6).extract(&events);
        assert_eq!(rows.len(), 6);

        // Entity 1 occurs 3 times, the maximum.
        assert_eq!(rows[0].get(FREQUENCY), 1.0);
        assert!((rows[1].get(FREQUENCY) - 2.0 / 3.0).abs() < 1e-12);
        // Never-seen entities have gap = W, which is the max gap.
        assert_eq!(rows[5].get(GAP), 1.0);
        assert_eq!(rows[0].get(GAP), 0.0);
        // Entity 1 appears in the most recent event and leads momentum.
        assert_eq!(rows[0].get(MOMENTUM), 1.0);
        assert_eq!(rows[5].get(MOMENTUM), 0.0);
        assert!((rows[0].get(VOLATILITY) - 0.75 * 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_trend_sign_follows_recency() {
        let events = window(&[&[1], &[1], &[2], &[2]]);
        let rows = FeatureExtractor::new(2).extract(&events);
        assert!(rows[0].get(TREND) < 0.0);
        assert!(rows[1].get(TREND) > 0.0);
    }

    #[test]
    fn test_cooccurrence_and_interaction() {
        let events = window(&[&[1, 2], &[1, 2], &[1, 3]]);
        let extractor = FeatureExtractor::new(3);
        let cooc = extractor.cooccurrence(&events);
        assert_eq!(cooc.pair(1, 2), 2);
        assert_eq!(cooc.pair(2, 1), 2);
        assert_eq!(cooc.pair(1, 1), 0);
        assert_eq!(cooc.occurrences(1), 3);

        let rows = extractor.extract(&events);
        assert_eq!(rows[0].get(CO_OCCURRENCE), 1.0);
        assert!((rows[1].get(CO_OCCURRENCE) - 2.0 / 3.0).abs() < 1e-12);
        // Entity 1 co-occurs with every occurrence of 2 and of 3.
        assert_eq!(rows[0].get(INTERACTION), 1.0);
        // Entity 2 appears in 2 of the 3 events containing 1.
        assert!((rows[1].get(INTERACTION) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_window_is_all_zero() {
        let rows = FeatureExtractor::new(4).extract(&[]);
        for row in rows {
            for (name, value) in row.named() {
                assert_eq!(value, 0.0, "feature {} not zero", name);
            }
        }
    }

    #[test]
    fn test_extraction_is_deterministic() {
        let events = window(&[&[1, 5, 9], &[2, 5], &[5, 9, 10], &[3, 4]]);
        let extractor = FeatureExtractor::new(10);
        assert_eq!(extractor.extract(&events), extractor.extract(&events));
        assert_eq!(
            extractor.extract_entity(&events, 5),
            Some(extractor.extract(&events)[4])
        );
        assert_eq!(extractor.extract_entity(&events, 0), None);
    }
}
