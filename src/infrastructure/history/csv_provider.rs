use crate::domain::events::{EntityId, OutcomeEvent};
use crate::domain::ports::HistoryProvider;
use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::path::{Path, PathBuf};
use tracing::info;

/// Row order of the source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SourceOrder {
    #[default]
    OldestFirst,
    NewestFirst,
}

/// Reads `timestamp,n1,n2,...` rows. Rows may have different lengths; empty
/// cells are ignored. Timestamps are RFC 3339, `YYYY-MM-DD HH:MM:SS` or
/// `YYYY-MM-DD` (midnight UTC).
pub struct CsvHistoryProvider {
    path: PathBuf,
    has_headers: bool,
    order: SourceOrder,
}

impl CsvHistoryProvider {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            has_headers: true,
            order: SourceOrder::OldestFirst,
        }
    }

    pub fn with_headers(mut self, has_headers: bool) -> Self {
        self.has_headers = has_headers;
        self
    }

    pub fn with_order(mut self, order: SourceOrder) -> Self {
        self.order = order;
        self
    }

    /// Parses CSV text into events in ascending order.
    pub fn parse(&self, content: &str) -> Result<Vec<OutcomeEvent>> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(self.has_headers)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(content.as_bytes());

        let mut events = Vec::new();
        for (row, record) in reader.records().enumerate() {
            let record = record.context(format!("Failed to read CSV row {}", row + 1))?;
            let Some(raw_ts) = record.get(0) else {
                continue;
            };
            if raw_ts.is_empty() {
                continue;
            }
            let timestamp =
                parse_timestamp(raw_ts).context(format!("Invalid timestamp in row {}", row + 1))?;
            let ids = record
                .iter()
                .skip(1)
                .filter(|cell| !cell.is_empty())
                .map(|cell| {
                    cell.parse::<EntityId>()
                        .context(format!("Invalid entity id '{}' in row {}", cell, row + 1))
                })
                .collect::<Result<Vec<_>>>()?;
            events.push(OutcomeEvent::new(timestamp, ids));
        }

        if self.order == SourceOrder::NewestFirst {
            events.reverse();
        }
        Ok(events)
    }
}

#[async_trait]
impl HistoryProvider for CsvHistoryProvider {
    async fn ordered_events(&self) -> Result<Vec<OutcomeEvent>> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .context(format!("Failed to read history file: {:?}", self.path))?;
        let events = self.parse(&content)?;
        info!("Loaded {} events from {:?}", events.len(), self.path);
        Ok(events)
    }
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S") {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        && let Some(naive) = date.and_hms_opt(0, 0, 0)
    {
        return Ok(Utc.from_utc_datetime(&naive));
    }
    bail!("unrecognized timestamp '{}'", raw)
}
