use crate::domain::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// One candidate value of a hyperparameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl ParamValue {
    pub fn as_usize(&self) -> Option<usize> {
        match self {
            ParamValue::Int(v) if *v >= 0 => Some(*v as usize),
            ParamValue::Float(v) if *v >= 0.0 && v.fract() == 0.0 => Some(*v as usize),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Text(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Text(v) => write!(f, "{}", v),
        }
    }
}

/// A concrete configuration: parameter name -> chosen value.
pub type ParamSet = BTreeMap<String, ParamValue>;

/// Stable textual key of a configuration, used to detect repeats.
pub fn param_set_key(params: &ParamSet) -> String {
    params
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(";")
}

/// Discrete search space: parameter name -> ordered candidate list.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SearchSpace {
    params: BTreeMap<String, Vec<ParamValue>>,
}

impl SearchSpace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, candidates: Vec<ParamValue>) -> Self {
        self.params.insert(name.to_string(), candidates);
        self
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.params.is_empty() {
            return Err(EngineError::invalid_config("search space is empty"));
        }
        if let Some((name, _)) = self.params.iter().find(|(_, c)| c.is_empty()) {
            return Err(EngineError::invalid_config(format!(
                "parameter '{}' has no candidates",
                name
            )));
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<ParamValue>)> {
        self.params.iter()
    }

    pub fn candidates(&self, name: &str) -> Option<&[ParamValue]> {
        self.params.get(name).map(|c| c.as_slice())
    }

    /// Position of `value` in the candidate list of `name`.
    pub fn position(&self, name: &str, value: &ParamValue) -> Option<usize> {
        self.params.get(name)?.iter().position(|c| c == value)
    }

    /// Number of distinct configurations.
    pub fn cardinality(&self) -> usize {
        self.params
            .values()
            .map(|c| c.len())
            .fold(1usize, |acc, n| acc.saturating_mul(n))
    }
}
