use thiserror::Error;

/// Errors surfaced by the engine's train/predict/validate/backtest operations
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Insufficient data for {operation}: need {required} events, have {available}")]
    InsufficientData {
        operation: &'static str,
        required: usize,
        available: usize,
    },

    #[error("History is not in ascending timestamp order at index {index}")]
    UnorderedHistory { index: usize },

    #[error("Invalid event at index {index}: {reason}")]
    InvalidEvent { index: usize, reason: String },

    #[error("Model '{model}' has not been trained")]
    UntrainedModel { model: String },

    #[error("Model '{model}' has been disposed")]
    ModelDisposed { model: String },

    #[error("Model '{model}' is already training")]
    TrainingInProgress { model: String },

    #[error("Invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("Unsupported operation: {reason}")]
    Unsupported { reason: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Time budget of {budget_ms}ms exceeded")]
    DeadlineExceeded { budget_ms: u64 },

    #[error("{collaborator} failed: {reason}")]
    Collaborator {
        collaborator: &'static str,
        reason: String,
    },

    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl EngineError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        EngineError::InvalidConfig {
            reason: reason.into(),
        }
    }

    pub fn sequence_model(err: anyhow::Error) -> Self {
        EngineError::Collaborator {
            collaborator: "Sequence model",
            reason: format!("{:#}", err),
        }
    }

    pub fn history_provider(err: anyhow::Error) -> Self {
        EngineError::Collaborator {
            collaborator: "History provider",
            reason: format!("{:#}", err),
        }
    }

    pub fn persistence(err: anyhow::Error) -> Self {
        EngineError::Collaborator {
            collaborator: "Artifact store",
            reason: format!("{:#}", err),
        }
    }

    /// True for errors raised by a cooperative stop rather than a failure.
    pub fn is_interruption(&self) -> bool {
        matches!(
            self,
            EngineError::Cancelled | EngineError::DeadlineExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insufficient_data_formatting() {
        let err = EngineError::InsufficientData {
            operation: "backtest",
            required: 101,
            available: 40,
        };

        let msg = err.to_string();
        assert!(msg.contains("backtest"));
        assert!(msg.contains("101"));
        assert!(msg.contains("40"));
    }

    #[test]
    fn test_interruption_classification() {
        assert!(EngineError::Cancelled.is_interruption());
        assert!(EngineError::DeadlineExceeded { budget_ms: 10 }.is_interruption());
        assert!(!EngineError::invalid_config("bad").is_interruption());
    }
}
