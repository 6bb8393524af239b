mod common;

use common::{engine_config, rotating_history, small_boosted};
use drawcast::application::engine::Engine;
use drawcast::application::optimization::{EnsembleWeightOptimizer, ModelOutputs, StepPrediction};
use drawcast::config::{RunConfig, WeightConfig, WeightStrategy};
use drawcast::domain::prediction::PredictionCandidate;

const STRATEGIES: [WeightStrategy; 4] = [
    WeightStrategy::Static,
    WeightStrategy::Dynamic,
    WeightStrategy::Adaptive,
    WeightStrategy::Bayesian,
];

fn three_model_outputs(steps: std::ops::Range<usize>) -> ModelOutputs {
    ["m1", "m2", "m3"]
        .iter()
        .enumerate()
        .map(|(offset, name)| {
            let predictions = steps
                .clone()
                .map(|step| StepPrediction {
                    step,
                    candidates: (1..=4)
                        .map(|e| PredictionCandidate::with_uncertainty(e + offset as u16, 0.5, 0.3))
                        .collect(),
                })
                .collect();
            (name.to_string(), predictions)
        })
        .collect()
}

#[test]
fn test_static_strategy_splits_weight_equally() {
    let history = rotating_history(40, 10, 3);
    let outputs = three_model_outputs(20..40);
    let report = EnsembleWeightOptimizer::new(WeightConfig::default())
        .optimize_with(WeightStrategy::Static, &outputs, &history)
        .unwrap();

    assert_eq!(report.strategy, WeightStrategy::Static);
    assert_eq!(report.weights.len(), 3);
    for name in ["m1", "m2", "m3"] {
        assert!((report.weights.get(name) - 1.0 / 3.0).abs() < 1e-12);
    }
}

#[test]
fn test_every_strategy_returns_a_distribution() {
    let history = rotating_history(40, 10, 3);
    let outputs = three_model_outputs(20..40);
    let optimizer = EnsembleWeightOptimizer::new(WeightConfig::default());

    for strategy in STRATEGIES {
        let report = optimizer.optimize_with(strategy, &outputs, &history).unwrap();
        assert!((report.weights.total() - 1.0).abs() < 1e-9, "{:?}", strategy);
        assert!(report.weights.iter().all(|(_, w)| *w >= 0.0), "{:?}", strategy);
    }
}

#[tokio::test]
async fn test_engine_weights_flow_into_predictions() {
    let history = rotating_history(60, 10, 3);
    let run = RunConfig {
        models: vec![small_boosted("m1"), small_boosted("m2"), small_boosted("m3")],
        ..RunConfig::default()
    };
    let engine = Engine::new(engine_config(10, 3), run).unwrap();

    let outputs = engine.collect_model_outputs(&history).await.unwrap();
    assert_eq!(outputs.len(), 3);
    assert!(outputs.values().all(|steps| steps.len() == 20));

    for strategy in STRATEGIES {
        let report = engine
            .optimize_ensemble_weights(&history, &outputs, Some(strategy))
            .await
            .unwrap();
        assert!((report.weights.total() - 1.0).abs() < 1e-9);
    }

    let report = engine
        .optimize_ensemble_weights(&history, &outputs, Some(WeightStrategy::Static))
        .await
        .unwrap();
    assert_eq!(engine.weights().await, Some(report.weights.clone()));

    engine.train_ensemble(&history).await.unwrap();
    let prediction = engine.predict(&history, None).await.unwrap();
    assert_eq!(prediction.weights, report.weights);
    assert_eq!(prediction.per_model.len(), 3);
    assert_eq!(prediction.combined.len(), 3);
}
