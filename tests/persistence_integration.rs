mod common;

use common::{engine_config, rotating_history, small_boosted, temp_dir};
use drawcast::application::engine::Engine;
use drawcast::config::{BaggedConfig, ModelSpec, NamedModelSpec, RunConfig, WeightStrategy};
use drawcast::domain::ports::ArtifactStore;
use drawcast::domain::prediction::PredictionCandidate;
use drawcast::infrastructure::{JsonFileStore, SqliteArtifactStore};
use std::sync::Arc;

fn roster() -> RunConfig {
    RunConfig {
        models: vec![
            small_boosted("boosted"),
            NamedModelSpec::new(
                "bagged",
                ModelSpec::BaggedTree(BaggedConfig {
                    n_trees: 4,
                    max_depth: 3,
                    min_samples_split: 2,
                    window: 10,
                    max_training_steps: 20,
                    ..BaggedConfig::default()
                }),
            ),
        ],
        ..RunConfig::default()
    }
}

async fn round_trip(store: Arc<dyn ArtifactStore>) {
    let history = rotating_history(60, 10, 3);
    let engine = Engine::new(engine_config(10, 3), roster())
        .unwrap()
        .with_store(store.clone());

    engine.train_ensemble(&history).await.unwrap();
    let outputs = engine.collect_model_outputs(&history).await.unwrap();
    engine
        .optimize_ensemble_weights(&history, &outputs, Some(WeightStrategy::Bayesian))
        .await
        .unwrap();
    let before = engine.predict(&history, None).await.unwrap();

    let manifest = engine.persist().await.unwrap();
    assert_eq!(manifest.models.len(), 2);
    assert!(manifest.has_weights);
    assert_eq!(manifest.domain_size, 10);

    let keys = store.keys("model/").await.unwrap();
    assert_eq!(keys, vec!["model/bagged".to_string(), "model/boosted".to_string()]);

    let restored = Engine::new(engine_config(10, 3), roster())
        .unwrap()
        .with_store(store);
    let names = restored.restore().await.unwrap();
    assert_eq!(names, vec!["boosted".to_string(), "bagged".to_string()]);
    let (saved, loaded) = (engine.weights().await.unwrap(), restored.weights().await.unwrap());
    for (name, w) in saved.iter() {
        assert!((loaded.get(name) - w).abs() < 1e-12);
    }

    let after = restored.predict(&history, None).await.unwrap();
    for (name, candidates) in &before.per_model {
        assert_same_ranking(candidates, &after.per_model[name]);
    }
    assert_same_ranking(&before.combined, &after.combined);
}

fn assert_same_ranking(a: &[PredictionCandidate], b: &[PredictionCandidate]) {
    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b) {
        assert_eq!(x.entity, y.entity);
        assert!((x.probability - y.probability).abs() < 1e-9);
    }
}

#[tokio::test]
async fn test_file_store_round_trip_through_engine() {
    let root = temp_dir("file_store");
    let store = JsonFileStore::new(&root).await.unwrap();
    round_trip(Arc::new(store)).await;
    std::fs::remove_dir_all(&root).ok();
}

#[tokio::test]
async fn test_sqlite_store_round_trip_through_engine() {
    let store = SqliteArtifactStore::new("sqlite::memory:").await.unwrap();
    round_trip(Arc::new(store)).await;
}

#[tokio::test]
async fn test_restore_skips_models_of_another_domain() {
    let root = temp_dir("domain_mismatch");
    let store: Arc<dyn ArtifactStore> = Arc::new(JsonFileStore::new(&root).await.unwrap());

    let history = rotating_history(40, 10, 3);
    let engine = Engine::new(engine_config(10, 3), roster())
        .unwrap()
        .with_store(store.clone());
    engine.train_ensemble(&history).await.unwrap();
    engine.persist().await.unwrap();

    let wider = Engine::new(engine_config(20, 3), roster())
        .unwrap()
        .with_store(store);
    assert!(wider.restore().await.unwrap().is_empty());

    std::fs::remove_dir_all(&root).ok();
}
