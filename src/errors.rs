// src/errors.rs
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the learning-path engine.
#[derive(Error, Debug)]
pub enum PlpError {
    /// The intervention is not in the catalogue or is masked from the current state.
    /// Recoverable: the caller should re-sample an action.
    #[error("Invalid action {action}: {reason}")]
    InvalidAction { action: u16, reason: String },

    /// Hyperparameters or state-space settings that must stop training before it starts.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Persistence failure ({path:?}): {message}")]
    Persistence {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Episode has not been started; call reset first")]
    EpisodeNotStarted,

    #[error("Episode already finished after {steps} steps")]
    EpisodeFinished { steps: usize },

    #[error("No interventions are available from the current state")]
    NoAvailableActions,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PlpError {
    pub fn invalid_action(action: u16, reason: impl Into<String>) -> Self {
        Self::InvalidAction {
            action,
            reason: reason.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn persistence(message: impl Into<String>, path: Option<PathBuf>) -> Self {
        Self::Persistence {
            message: message.into(),
            path,
            source: None,
        }
    }

    pub fn persistence_io(message: impl Into<String>, path: PathBuf, err: std::io::Error) -> Self {
        Self::Persistence {
            message: message.into(),
            path: Some(path),
            source: Some(Box::new(err)),
        }
    }

    /// Whether a training loop can continue after this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Configuration { .. })
    }
}

pub type PlpResult<T> = std::result::Result<T, PlpError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_only_configuration_errors_are_fatal() {
        assert!(!PlpError::configuration("bad learning rate").is_recoverable());
        assert!(PlpError::invalid_action(3, "masked").is_recoverable());
        assert!(PlpError::persistence("missing", None).is_recoverable());
        assert!(PlpError::NoAvailableActions.is_recoverable());
    }

    #[test]
    fn test_persistence_io_keeps_path_and_source() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err = PlpError::persistence_io("failed to read table", PathBuf::from("q.json"), io);
        assert!(err.to_string().contains("q.json"));
        assert!(err.source().is_some());
    }
}
