use crate::domain::errors::EngineError;
use crate::domain::ml::feature_registry::{FEATURE_COUNT, feature_name};
use crate::domain::ml::tree::{DecisionTree, SplitPolicy, TreeParams};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelState {
    Untrained,
    Trained,
    Disposed,
}

/// Forest of trees sharing hyperparameters and one importance accumulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeModel {
    name: String,
    params: TreeParams,
    policy: SplitPolicy,
    trees: Vec<DecisionTree>,
    importance: Vec<f64>,
    state: ModelState,
}

impl TreeModel {
    pub fn new(name: impl Into<String>, params: TreeParams, policy: SplitPolicy) -> Self {
        Self {
            name: name.into(),
            params,
            policy,
            trees: Vec::new(),
            importance: vec![0.0; FEATURE_COUNT],
            state: ModelState::Untrained,
        }
    }

    /// Replaces the forest and marks the model trained.
    ///
    /// Importance is the element-wise sum over trees, so the result does not
    /// depend on the order trees were built in.
    pub fn install(&mut self, trees: Vec<DecisionTree>) {
        let importance = trees.iter().fold(vec![0.0; FEATURE_COUNT], |mut acc, t| {
            for (slot, gain) in acc.iter_mut().zip(t.importance()) {
                *slot += gain;
            }
            acc
        });
        self.trees = trees;
        self.importance = importance;
        self.state = ModelState::Trained;
    }

    pub fn ensure_trained(&self) -> Result<(), EngineError> {
        match self.state {
            ModelState::Trained => Ok(()),
            ModelState::Untrained => Err(EngineError::UntrainedModel {
                model: self.name.clone(),
            }),
            ModelState::Disposed => Err(EngineError::ModelDisposed {
                model: self.name.clone(),
            }),
        }
    }

    /// Drops every tree arena at once.
    pub fn dispose(&mut self) {
        self.trees = Vec::new();
        self.importance = vec![0.0; FEATURE_COUNT];
        self.state = ModelState::Disposed;
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> ModelState {
        self.state
    }

    pub fn params(&self) -> &TreeParams {
        &self.params
    }

    pub fn policy(&self) -> SplitPolicy {
        self.policy
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    /// (name, gain) pairs sorted by descending gain.
    pub fn ranked_importance(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .importance
            .iter()
            .enumerate()
            .map(|(i, g)| (feature_name(i).to_string(), *g))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranked
    }

    pub fn is_well_formed(&self) -> bool {
        self.trees.iter().all(DecisionTree::is_well_formed)
    }

    /// Per-tree raw outputs for one feature vector.
    pub fn tree_outputs(&self, features: &[f64]) -> Vec<f64> {
        self.trees.iter().map(|t| t.predict(features)).collect()
    }

    /// Names of the features with the largest `importance * |value|`.
    pub fn contributing_features(&self, features: &[f64], k: usize) -> Vec<String> {
        let mut scored: Vec<(usize, f64)> = self
            .importance
            .iter()
            .zip(features)
            .enumerate()
            .map(|(i, (g, x))| (i, g * x.abs()))
            .filter(|(_, s)| *s > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored
            .into_iter()
            .take(k)
            .map(|(i, _)| feature_name(i).to_string())
            .collect()
    }
}
