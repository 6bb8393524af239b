mod common;

use common::{engine_config, events_from_sets};
use drawcast::application::context::EngineContext;
use drawcast::application::engine::Engine;
use drawcast::application::ml::BoostedTreeEnsemble;
use drawcast::config::{BaggedConfig, BoostedConfig, ModelSpec, NamedModelSpec, RunConfig};
use drawcast::domain::errors::EngineError;
use drawcast::domain::events::{EntityId, History};
use drawcast::infrastructure::RecencyFrequencyModel;
use std::sync::Arc;

const DOMAIN: usize = 30;
const FAVOURITE: EntityId = 7;

/// Entity 7 is drawn every third event (including the last one); four other
/// ids rotate evenly through the rest of the domain.
fn periodic_history(n: usize) -> History {
    let others: Vec<EntityId> = (1..=DOMAIN as EntityId).filter(|&e| e != FAVOURITE).collect();
    let sets = (0..n)
        .map(|i| {
            let mut set: Vec<EntityId> = (0..4).map(|k| others[(i * 4 + k) % others.len()]).collect();
            if i % 3 == 2 {
                set.push(FAVOURITE);
            }
            set
        })
        .collect();
    History::new(events_from_sets(sets), DOMAIN).unwrap()
}

#[tokio::test]
async fn test_periodic_entity_outranks_uniform_entities() {
    let history = periodic_history(60);
    let run = RunConfig {
        models: vec![NamedModelSpec::new("recency", ModelSpec::SequenceModel)],
        ..RunConfig::default()
    };
    let engine = Engine::new(engine_config(DOMAIN, 5), run)
        .unwrap()
        .with_sequence_model(Arc::new(RecencyFrequencyModel::new(DOMAIN, 60)));

    engine.train_ensemble(&history).await.unwrap();
    let prediction = engine.predict(&history, Some(DOMAIN)).await.unwrap();

    assert_eq!(prediction.combined.len(), DOMAIN);
    assert_eq!(prediction.combined[0].entity, FAVOURITE);
    let favourite = prediction.combined[0].probability;
    assert!(prediction.combined[1..].iter().all(|c| c.probability < favourite));
}

#[tokio::test]
async fn test_tree_ensembles_favour_the_periodic_entity_when_due() {
    // The last draw of entity 7 was two events ago; it is due next.
    let history = periodic_history(59);
    let run = RunConfig {
        models: vec![
            NamedModelSpec::new("boosted", ModelSpec::BoostedTree(BoostedConfig::default())),
            NamedModelSpec::new("bagged", ModelSpec::BaggedTree(BaggedConfig::default())),
        ],
        ..RunConfig::default()
    };
    let engine = Engine::new(engine_config(DOMAIN, 5), run).unwrap();

    engine.train_ensemble(&history).await.unwrap();
    let prediction = engine.predict(&history, Some(DOMAIN)).await.unwrap();

    for (model, candidates) in &prediction.per_model {
        assert_eq!(candidates.len(), DOMAIN, "{}", model);
        let rank = candidates
            .iter()
            .position(|c| c.entity == FAVOURITE)
            .unwrap();
        assert!(rank < DOMAIN / 2, "{} ranked entity 7 at {}", model, rank);
    }
    let rank = prediction
        .combined
        .iter()
        .position(|c| c.entity == FAVOURITE)
        .unwrap();
    assert!(rank < DOMAIN / 2);
}

#[test]
fn test_boosted_ensemble_fits_separable_labels() {
    // Entities 1..=3 appear in every event, the rest never do.
    let sets = (0..40).map(|_| vec![1, 2, 3]).collect();
    let history = History::new(events_from_sets(sets), 12).unwrap();
    let config = BoostedConfig {
        rounds: 20,
        window: 10,
        max_training_steps: 30,
        ..BoostedConfig::default()
    };
    let ctx = EngineContext::new(7);
    let mut model = BoostedTreeEnsemble::new("boosted", config, 12);

    let metrics = model.train(&history, &ctx, &ctx.clock()).unwrap();
    assert_eq!(metrics.trees, 20);
    assert!(metrics.training_accuracy.unwrap() > 0.95);

    let top = model.predict(&history, 3).unwrap();
    let mut entities: Vec<EntityId> = top.iter().map(|c| c.entity).collect();
    entities.sort_unstable();
    assert_eq!(entities, vec![1, 2, 3]);
}

#[tokio::test]
async fn test_predictions_are_ranked_and_bounded() {
    let history = periodic_history(45);
    let run = RunConfig {
        models: vec![common::small_boosted("boosted")],
        ..RunConfig::default()
    };
    let engine = Engine::new(engine_config(DOMAIN, 4), run).unwrap();
    engine.train_ensemble(&history).await.unwrap();

    let prediction = engine.predict(&history, None).await.unwrap();
    assert_eq!(prediction.combined.len(), 4);
    for pair in prediction.combined.windows(2) {
        assert!(pair[0].probability >= pair[1].probability);
    }
    for c in &prediction.combined {
        assert!((0.0..=1.0).contains(&c.probability));
        assert!((0.0..=1.0).contains(&c.confidence));
        assert!((0.0..=1.0).contains(&c.uncertainty));
        assert!(c.entity >= 1 && c.entity as usize <= DOMAIN);
    }
}

#[tokio::test]
async fn test_disposed_engine_refuses_to_predict() {
    let history = periodic_history(45);
    let run = RunConfig {
        models: vec![common::small_boosted("boosted")],
        ..RunConfig::default()
    };
    let engine = Engine::new(engine_config(DOMAIN, 4), run).unwrap();
    engine.train_ensemble(&history).await.unwrap();
    engine.dispose().await.unwrap();

    let err = engine.predict(&history, None).await.unwrap_err();
    assert!(matches!(err, EngineError::ModelDisposed { .. }));
}
