//! Model hyperparameters, loadable from TOML and patchable from a search
//! configuration.

use crate::domain::errors::EngineError;
use crate::domain::ml::tree::TreeParams;
use crate::domain::optimization::search_space::{ParamSet, ParamValue};
use serde::{Deserialize, Serialize};

/// Sequential residual boosting over variance-reduction trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostedConfig {
    pub rounds: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    /// Events of history fed to the feature extractor.
    pub window: usize,
    /// Most recent target steps kept for training.
    pub max_training_steps: usize,
}

impl Default for BoostedConfig {
    fn default() -> Self {
        Self {
            rounds: 30,
            learning_rate: 0.1,
            max_depth: 4,
            min_samples_split: 10,
            window: 50,
            max_training_steps: 100,
        }
    }
}

impl BoostedConfig {
    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.rounds == 0 {
            return Err(EngineError::invalid_config("rounds must be positive"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(EngineError::invalid_config(format!(
                "learning_rate must be in (0, 1], got {}",
                self.learning_rate
            )));
        }
        check_common(self.max_depth, self.window, self.max_training_steps)
    }

    /// Copy of `self` with the given parameters overridden.
    pub fn apply(&self, params: &ParamSet) -> Result<Self, EngineError> {
        let mut config = self.clone();
        for (key, value) in params {
            match key.as_str() {
                "rounds" => config.rounds = usize_param(key, value)?,
                "learning_rate" => config.learning_rate = f64_param(key, value)?,
                "max_depth" => config.max_depth = usize_param(key, value)?,
                "min_samples_split" => config.min_samples_split = usize_param(key, value)?,
                "window" => config.window = usize_param(key, value)?,
                "max_training_steps" => config.max_training_steps = usize_param(key, value)?,
                other => return Err(unknown_param("boosted_tree", other)),
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// Bootstrap aggregation of fully-randomized trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaggedConfig {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub window: usize,
    /// Blend factor of the interaction feature into the averaged tree output.
    pub interaction_weight: f64,
    /// Blend factor of the co-occurrence score during top-K re-scoring.
    pub cooccurrence_boost: f64,
    pub rescore_top_k: usize,
    pub max_training_steps: usize,
}

impl Default for BaggedConfig {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 6,
            min_samples_split: 10,
            window: 50,
            interaction_weight: 0.2,
            cooccurrence_boost: 0.1,
            rescore_top_k: 10,
            max_training_steps: 100,
        }
    }
}

impl BaggedConfig {
    pub fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.n_trees == 0 {
            return Err(EngineError::invalid_config("n_trees must be positive"));
        }
        for (name, value) in [
            ("interaction_weight", self.interaction_weight),
            ("cooccurrence_boost", self.cooccurrence_boost),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(EngineError::invalid_config(format!(
                    "{} must be in [0, 1], got {}",
                    name, value
                )));
            }
        }
        check_common(self.max_depth, self.window, self.max_training_steps)
    }

    pub fn apply(&self, params: &ParamSet) -> Result<Self, EngineError> {
        let mut config = self.clone();
        for (key, value) in params {
            match key.as_str() {
                "n_trees" => config.n_trees = usize_param(key, value)?,
                "max_depth" => config.max_depth = usize_param(key, value)?,
                "min_samples_split" => config.min_samples_split = usize_param(key, value)?,
                "window" => config.window = usize_param(key, value)?,
                "interaction_weight" => config.interaction_weight = f64_param(key, value)?,
                "cooccurrence_boost" => config.cooccurrence_boost = f64_param(key, value)?,
                "rescore_top_k" => config.rescore_top_k = usize_param(key, value)?,
                "max_training_steps" => config.max_training_steps = usize_param(key, value)?,
                other => return Err(unknown_param("bagged_tree", other)),
            }
        }
        config.validate()?;
        Ok(config)
    }
}

/// Which learner a model slot holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelSpec {
    BoostedTree(BoostedConfig),
    BaggedTree(BaggedConfig),
    /// Delegates to the engine's external sequence model.
    SequenceModel,
}

impl ModelSpec {
    pub fn kind(&self) -> &'static str {
        match self {
            ModelSpec::BoostedTree(_) => "boosted_tree",
            ModelSpec::BaggedTree(_) => "bagged_tree",
            ModelSpec::SequenceModel => "sequence_model",
        }
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        match self {
            ModelSpec::BoostedTree(c) => c.validate(),
            ModelSpec::BaggedTree(c) => c.validate(),
            ModelSpec::SequenceModel => Ok(()),
        }
    }

    /// Patches hyperparameters; the sequence model exposes none.
    pub fn apply(&self, params: &ParamSet) -> Result<Self, EngineError> {
        match self {
            ModelSpec::BoostedTree(c) => Ok(ModelSpec::BoostedTree(c.apply(params)?)),
            ModelSpec::BaggedTree(c) => Ok(ModelSpec::BaggedTree(c.apply(params)?)),
            ModelSpec::SequenceModel => Err(EngineError::Unsupported {
                reason: "the sequence model has no tunable hyperparameters".to_string(),
            }),
        }
    }

    /// Events of history needed before the model can produce any sample.
    pub fn window(&self) -> usize {
        match self {
            ModelSpec::BoostedTree(c) => c.window,
            ModelSpec::BaggedTree(c) => c.window,
            ModelSpec::SequenceModel => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedModelSpec {
    pub name: String,
    #[serde(flatten)]
    pub spec: ModelSpec,
}

impl NamedModelSpec {
    pub fn new(name: impl Into<String>, spec: ModelSpec) -> Self {
        Self {
            name: name.into(),
            spec,
        }
    }
}

fn check_common(max_depth: usize, window: usize, max_training_steps: usize) -> Result<(), EngineError> {
    if max_depth == 0 {
        return Err(EngineError::invalid_config("max_depth must be positive"));
    }
    if window == 0 {
        return Err(EngineError::invalid_config("window must be positive"));
    }
    if max_training_steps == 0 {
        return Err(EngineError::invalid_config(
            "max_training_steps must be positive",
        ));
    }
    Ok(())
}

fn usize_param(key: &str, value: &ParamValue) -> Result<usize, EngineError> {
    value.as_usize().ok_or_else(|| {
        EngineError::invalid_config(format!("'{}' expects a non-negative integer, got {}", key, value))
    })
}

fn f64_param(key: &str, value: &ParamValue) -> Result<f64, EngineError> {
    value
        .as_f64()
        .ok_or_else(|| EngineError::invalid_config(format!("'{}' expects a number, got {}", key, value)))
}

fn unknown_param(kind: &str, key: &str) -> EngineError {
    EngineError::invalid_config(format!("unknown {} parameter '{}'", kind, key))
}
