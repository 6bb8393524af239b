//! Shared fixtures for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use drawcast::config::{BoostedConfig, EngineConfig, ModelSpec, NamedModelSpec};
use drawcast::domain::events::{EntityId, History, OutcomeEvent};

pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

/// One event per day, starting at `base_time()`.
pub fn events_from_sets(sets: Vec<Vec<EntityId>>) -> Vec<OutcomeEvent> {
    sets.into_iter()
        .enumerate()
        .map(|(i, set)| OutcomeEvent::new(base_time() + Duration::days(i as i64), set))
        .collect()
}

/// `n` events of `per_event` ids that rotate evenly through `1..=domain_size`.
pub fn rotating_history(n: usize, domain_size: usize, per_event: usize) -> History {
    let sets = (0..n)
        .map(|i| {
            (0..per_event)
                .map(|k| ((i * per_event + k) % domain_size + 1) as EntityId)
                .collect()
        })
        .collect();
    History::new(events_from_sets(sets), domain_size).unwrap()
}

pub fn engine_config(domain_size: usize, top_n: usize) -> EngineConfig {
    let mut config = EngineConfig::default();
    config.engine.domain_size = domain_size;
    config.engine.top_n = top_n;
    config
}

pub fn small_boosted(name: &str) -> NamedModelSpec {
    NamedModelSpec::new(
        name,
        ModelSpec::BoostedTree(BoostedConfig {
            rounds: 3,
            window: 10,
            max_training_steps: 20,
            min_samples_split: 2,
            ..BoostedConfig::default()
        }),
    )
}

pub fn temp_dir(tag: &str) -> std::path::PathBuf {
    std::env::temp_dir().join(format!(
        "drawcast_it_{}_{}_{}",
        tag,
        std::process::id(),
        Utc::now().timestamp_nanos_opt().unwrap_or_default()
    ))
}
