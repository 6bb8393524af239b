//! Run configuration: the model roster plus validation, weighting, search
//! and backtest settings, loadable from a single TOML file.

use crate::config::model_config::{BaggedConfig, BoostedConfig, ModelSpec, NamedModelSpec};
use crate::domain::errors::EngineError;
use crate::domain::optimization::search_space::{ParamValue, SearchSpace};
use crate::domain::performance::metrics::{CompositeWeights, ProfitModel};
use crate::domain::validation::folds::FoldConfig;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightStrategy {
    Static,
    Dynamic,
    Adaptive,
    Bayesian,
}

impl std::str::FromStr for WeightStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(WeightStrategy::Static),
            "dynamic" => Ok(WeightStrategy::Dynamic),
            "adaptive" => Ok(WeightStrategy::Adaptive),
            "bayesian" => Ok(WeightStrategy::Bayesian),
            _ => anyhow::bail!(
                "Invalid weight strategy: {}. Must be 'static', 'dynamic', 'adaptive' or 'bayesian'",
                s
            ),
        }
    }
}

/// Mix of the adaptive strategy: `dynamic * a + diversity * b + stability * c`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptiveMix {
    pub performance: f64,
    pub diversity: f64,
    pub stability: f64,
}

impl Default for AdaptiveMix {
    fn default() -> Self {
        Self {
            performance: 0.5,
            diversity: 0.25,
            stability: 0.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WeightConfig {
    pub strategy: WeightStrategy,
    /// Trailing steps considered by the dynamic, adaptive and bayesian strategies.
    pub window: usize,
    pub top_k: usize,
    pub mix: AdaptiveMix,
    /// Likelihood floor of the bayesian strategy.
    pub epsilon: f64,
}

impl Default for WeightConfig {
    fn default() -> Self {
        Self {
            strategy: WeightStrategy::Adaptive,
            window: 20,
            top_k: 5,
            mix: AdaptiveMix::default(),
            epsilon: 1e-3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub max_iterations: usize,
    /// Iterations sampled uniformly before local perturbation starts.
    pub random_iterations: usize,
    /// Fold count used to score each candidate.
    pub cv_folds: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            max_iterations: 20,
            random_iterations: 5,
            cv_folds: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub min_training_size: usize,
    /// Models are retrained every this many steps.
    pub rebalance_frequency: usize,
    pub rolling_window: usize,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            min_training_size: 100,
            rebalance_frequency: 10,
            rolling_window: 30,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub models: Vec<NamedModelSpec>,
    pub validation: FoldConfig,
    pub weights: WeightConfig,
    pub search: SearchConfig,
    pub search_space: SearchSpace,
    pub backtest: BacktestConfig,
    pub profit: ProfitModel,
    pub composite: CompositeWeights,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            models: vec![
                NamedModelSpec::new("boosted", ModelSpec::BoostedTree(BoostedConfig::default())),
                NamedModelSpec::new("bagged", ModelSpec::BaggedTree(BaggedConfig::default())),
            ],
            validation: FoldConfig::default(),
            weights: WeightConfig::default(),
            search: SearchConfig::default(),
            search_space: default_search_space(),
            backtest: BacktestConfig::default(),
            profit: ProfitModel::default(),
            composite: CompositeWeights::default(),
        }
    }
}

impl RunConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .context(format!("Failed to read run config file: {}", path.display()))?;
        let config: RunConfig = toml::from_str(&content)
            .context(format!("Failed to parse run config TOML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.models.is_empty() {
            return Err(EngineError::invalid_config("at least one model is required"));
        }
        for (i, model) in self.models.iter().enumerate() {
            if self.models[..i].iter().any(|m| m.name == model.name) {
                return Err(EngineError::invalid_config(format!(
                    "duplicate model name '{}'",
                    model.name
                )));
            }
            model.spec.validate()?;
        }
        if self.backtest.rebalance_frequency == 0 {
            return Err(EngineError::invalid_config(
                "rebalance_frequency must be positive",
            ));
        }
        Ok(())
    }

    pub fn model(&self, name: &str) -> Option<&NamedModelSpec> {
        self.models.iter().find(|m| m.name == name)
    }
}

/// Small grid over the boosted learner's main knobs.
pub fn default_search_space() -> SearchSpace {
    SearchSpace::new()
        .with(
            "rounds",
            vec![ParamValue::Int(10), ParamValue::Int(20), ParamValue::Int(30)],
        )
        .with(
            "learning_rate",
            vec![
                ParamValue::Float(0.05),
                ParamValue::Float(0.1),
                ParamValue::Float(0.2),
            ],
        )
        .with(
            "max_depth",
            vec![ParamValue::Int(3), ParamValue::Int(4), ParamValue::Int(5)],
        )
}
