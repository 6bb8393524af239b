mod common;

use common::{engine_config, small_boosted, temp_dir};
use drawcast::application::engine::Engine;
use drawcast::config::RunConfig;
use drawcast::domain::errors::EngineError;
use drawcast::infrastructure::history::{CsvHistoryProvider, SourceOrder};

fn csv_rows(n: usize, newest_first: bool) -> String {
    let mut rows: Vec<String> = (0..n)
        .map(|i| {
            let day = chrono::NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64);
            format!("{},{},{},{}", day, 1 + i % 10, 1 + (i + 3) % 10, 1 + (i + 6) % 10)
        })
        .collect();
    if newest_first {
        rows.reverse();
    }
    format!("date,a,b,c\n{}\n", rows.join("\n"))
}

fn engine() -> Engine {
    let run = RunConfig {
        models: vec![small_boosted("boosted")],
        ..RunConfig::default()
    };
    Engine::new(engine_config(10, 3), run).unwrap()
}

#[tokio::test]
async fn test_csv_history_trains_and_predicts() {
    let dir = temp_dir("csv");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("history.csv");
    std::fs::write(&path, csv_rows(40, false)).unwrap();

    let engine = engine();
    let history = engine
        .load_history(&CsvHistoryProvider::new(&path))
        .await
        .unwrap();
    assert_eq!(history.len(), 40);

    engine.train_ensemble(&history).await.unwrap();
    let prediction = engine.predict(&history, None).await.unwrap();
    assert_eq!(prediction.combined.len(), 3);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_newest_first_csv_needs_declared_order() {
    let dir = temp_dir("csv_desc");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("history.csv");
    std::fs::write(&path, csv_rows(20, true)).unwrap();

    let engine = engine();
    let err = engine
        .load_history(&CsvHistoryProvider::new(&path))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnorderedHistory { .. }));

    let history = engine
        .load_history(&CsvHistoryProvider::new(&path).with_order(SourceOrder::NewestFirst))
        .await
        .unwrap();
    assert_eq!(history.len(), 20);

    std::fs::remove_dir_all(&dir).ok();
}

#[tokio::test]
async fn test_out_of_domain_ids_are_rejected() {
    let dir = temp_dir("csv_domain");
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("history.csv");
    std::fs::write(&path, "date,a\n2024-01-01,3\n2024-01-02,11\n").unwrap();

    let err = engine()
        .load_history(&CsvHistoryProvider::new(&path))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidEvent { index: 1, .. }));

    std::fs::remove_dir_all(&dir).ok();
}
