use crate::domain::events::OutcomeEvent;
use crate::domain::ports::HistoryProvider;
use anyhow::Result;
use async_trait::async_trait;

/// Serves a fixed event list, oldest first.
#[derive(Debug, Clone, Default)]
pub struct InMemoryHistoryProvider {
    events: Vec<OutcomeEvent>,
}

impl InMemoryHistoryProvider {
    pub fn new(events: Vec<OutcomeEvent>) -> Self {
        Self { events }
    }
}

#[async_trait]
impl HistoryProvider for InMemoryHistoryProvider {
    async fn ordered_events(&self) -> Result<Vec<OutcomeEvent>> {
        Ok(self.events.clone())
    }
}
