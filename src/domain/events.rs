use crate::domain::errors::EngineError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Member of the fixed candidate domain, `1..=domain_size`.
pub type EntityId = u16;

/// One historical observation of the outcome set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeEvent {
    pub timestamp: DateTime<Utc>,
    pub outcome_set: Vec<EntityId>,
}

impl OutcomeEvent {
    /// Builds an event, sorting and deduplicating the outcome ids.
    pub fn new(timestamp: DateTime<Utc>, mut outcome_set: Vec<EntityId>) -> Self {
        outcome_set.sort_unstable();
        outcome_set.dedup();
        Self {
            timestamp,
            outcome_set,
        }
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.outcome_set.binary_search(&entity).is_ok()
    }
}

/// Validated event sequence in canonical order: index 0 is the oldest event.
///
/// Every component indexes history chronologically; "most recent" always
/// means the highest index. Cloning shares the underlying buffer.
#[derive(Debug, Clone)]
pub struct History {
    events: Arc<[OutcomeEvent]>,
    len: usize,
    domain_size: usize,
}

impl History {
    /// Validates ordering and entity ids at ingestion.
    pub fn new(events: Vec<OutcomeEvent>, domain_size: usize) -> Result<Self, EngineError> {
        if domain_size == 0 || domain_size > EntityId::MAX as usize {
            return Err(EngineError::invalid_config(format!(
                "domain size {} out of range",
                domain_size
            )));
        }

        for (index, event) in events.iter().enumerate() {
            if event.outcome_set.is_empty() {
                return Err(EngineError::InvalidEvent {
                    index,
                    reason: "empty outcome set".to_string(),
                });
            }
            if event.outcome_set.windows(2).any(|w| w[0] >= w[1]) {
                return Err(EngineError::InvalidEvent {
                    index,
                    reason: "outcome ids must be sorted and unique".to_string(),
                });
            }
            if let Some(bad) = event
                .outcome_set
                .iter()
                .find(|&&id| id == 0 || id as usize > domain_size)
            {
                return Err(EngineError::InvalidEvent {
                    index,
                    reason: format!("entity {} outside 1..={}", bad, domain_size),
                });
            }
            if index > 0 && events[index - 1].timestamp >= event.timestamp {
                return Err(EngineError::UnorderedHistory { index });
            }
        }

        let len = events.len();
        Ok(Self {
            events: events.into(),
            len,
            domain_size,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn domain_size(&self) -> usize {
        self.domain_size
    }

    pub fn events(&self) -> &[OutcomeEvent] {
        &self.events[..self.len]
    }

    pub fn get(&self, index: usize) -> Option<&OutcomeEvent> {
        self.events().get(index)
    }

    pub fn last(&self) -> Option<&OutcomeEvent> {
        self.events().last()
    }

    /// The first `len` events, sharing storage with `self`.
    pub fn prefix(&self, len: usize) -> History {
        History {
            events: Arc::clone(&self.events),
            len: len.min(self.len),
            domain_size: self.domain_size,
        }
    }

    /// Up to `window` events strictly before index `t`.
    pub fn window_before(&self, t: usize, window: usize) -> &[OutcomeEvent] {
        let end = t.min(self.len);
        &self.events[end.saturating_sub(window)..end]
    }

    /// The most recent `window` events.
    pub fn tail(&self, window: usize) -> &[OutcomeEvent] {
        self.window_before(self.len, window)
    }

    /// All entity ids of the domain, ascending.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        (1..=self.domain_size).map(|id| id as EntityId)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn event(day: i64, ids: &[EntityId]) -> OutcomeEvent {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 20, 0, 0).unwrap();
        OutcomeEvent::new(base + Duration::days(day), ids.to_vec())
    }

    #[test]
    fn test_history_rejects_descending_order() {
        let events = vec![event(2, &[1, 2]), event(1, &[3, 4])];
        let err = History::new(events, 90).unwrap_err();
        assert!(matches!(err, EngineError::UnorderedHistory { index: 1 }));
    }

    #[test]
    fn test_history_rejects_out_of_domain_entity() {
        let events = vec![event(0, &[1, 91])];
        let err = History::new(events, 90).unwrap_err();
        assert!(matches!(err, EngineError::InvalidEvent { index: 0, .. }));
    }

    #[test]
    fn test_event_constructor_normalizes_ids() {
        let e = event(0, &[9, 3, 3, 1]);
        assert_eq!(e.outcome_set, vec![1, 3, 9]);
        assert!(e.contains(3));
        assert!(!e.contains(4));
    }

    #[test]
    fn test_prefix_and_windows() {
        let events = (0..10).map(|d| event(d, &[(d + 1) as EntityId])).collect();
        let history = History::new(events, 90).unwrap();

        let prefix = history.prefix(4);
        assert_eq!(prefix.len(), 4);
        assert_eq!(prefix.last().unwrap().outcome_set, vec![4]);

        let window = history.window_before(6, 3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].outcome_set, vec![4]);
        assert_eq!(window[2].outcome_set, vec![6]);

        assert_eq!(history.window_before(2, 5).len(), 2);
        assert_eq!(history.tail(2)[1].outcome_set, vec![10]);
        assert!(history.window_before(0, 5).is_empty());
    }
}
