mod common;

use common::{engine_config, rotating_history, small_boosted};
use drawcast::application::engine::Engine;
use drawcast::config::{ModelSpec, NamedModelSpec, RunConfig};
use drawcast::domain::errors::EngineError;
use drawcast::domain::validation::folds::FoldConfig;
use drawcast::infrastructure::RecencyFrequencyModel;
use std::sync::Arc;

fn reference_folds() -> FoldConfig {
    FoldConfig {
        n_folds: 5,
        test_fraction: 0.2,
        min_train_size: 50,
        step_size: 10,
        purge_gap: 5,
    }
}

#[test]
fn test_folds_advance_and_respect_purge_gap() {
    // Fold 0 would leave only 45 training events and is dropped.
    let folds = reference_folds().folds(200);
    let indices: Vec<usize> = folds.iter().map(|f| f.index).collect();
    assert_eq!(indices, vec![1, 2, 3, 4]);

    for fold in &folds {
        assert_eq!(fold.train.start, 0);
        assert!(fold.train.end <= fold.test.start);
        assert!(fold.test.start - fold.train.end >= 5);
        assert!(fold.train.len() >= 50);
        assert_eq!(fold.test.len(), 40);
        assert!(fold.test.end <= 200);
    }
    for pair in folds.windows(2) {
        assert!(pair[1].train.end > pair[0].train.end);
        assert!(pair[1].test.start > pair[0].test.start);
    }
}

#[tokio::test]
async fn test_engine_cross_validation_scores_every_fold() {
    let history = rotating_history(200, 10, 3);
    let run = RunConfig {
        models: vec![small_boosted("boosted")],
        validation: reference_folds(),
        ..RunConfig::default()
    };
    let engine = Engine::new(engine_config(10, 3), run).unwrap();

    let reports = engine.cross_validate(&history, None).await.unwrap();
    assert_eq!(reports.len(), 1);
    let report = &reports[0];
    assert_eq!(report.model, "boosted");
    assert_eq!(report.folds.len(), 4);
    assert_eq!(report.valid_folds + report.failed_folds, 4);
    assert!(report.valid_folds > 0);
    assert!(report.folds.iter().all(|f| f.fold().gap() >= 5));
    assert!(report.mean_composite.is_finite());
    assert!(report.volatility >= 0.0);
}

#[tokio::test]
async fn test_cross_validation_needs_enough_history() {
    let history = rotating_history(40, 10, 3);
    let run = RunConfig {
        models: vec![small_boosted("boosted")],
        validation: reference_folds(),
        ..RunConfig::default()
    };
    let engine = Engine::new(engine_config(10, 3), run).unwrap();

    let err = engine.cross_validate(&history, Some("boosted")).await.unwrap_err();
    assert!(matches!(err, EngineError::InsufficientData { .. }));
}

#[tokio::test]
async fn test_cross_validation_unknown_model() {
    let history = rotating_history(200, 10, 3);
    let engine = Engine::new(engine_config(10, 3), RunConfig::default()).unwrap();
    let err = engine.cross_validate(&history, Some("missing")).await.unwrap_err();
    assert!(matches!(err, EngineError::InvalidConfig { .. }));
}

#[tokio::test]
async fn test_sequence_model_survives_validation_and_backtest() {
    let history = rotating_history(200, 10, 3);
    let run = RunConfig {
        models: vec![NamedModelSpec::new("seq", ModelSpec::SequenceModel)],
        validation: reference_folds(),
        ..RunConfig::default()
    };
    let service = Arc::new(RecencyFrequencyModel::new(10, 30));
    let engine = Engine::new(engine_config(10, 3), run)
        .unwrap()
        .with_sequence_model(service.clone());

    engine.train_ensemble(&history).await.unwrap();
    assert_eq!(engine.predict(&history, None).await.unwrap().combined.len(), 3);

    engine.cross_validate(&history, None).await.unwrap();
    assert!(service.is_trained());
    assert_eq!(engine.predict(&history, None).await.unwrap().combined.len(), 3);

    engine.run_backtest(&history).await.unwrap();
    assert_eq!(engine.predict(&history, None).await.unwrap().combined.len(), 3);
}
