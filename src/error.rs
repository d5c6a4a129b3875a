//! Error types for the weave orchestration core.

use crate::request::{FailureClassifier, FailureEnvelope, FailureKind, StatusClassifier};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum WeaveError {
    #[error("Transport failure: {0}")]
    Transport(FailureEnvelope),
    #[error("Authorization failure: {0}")]
    Authorization(FailureEnvelope),
    #[error("API failure: {0}")]
    Api(FailureEnvelope),
    #[error("GraphQL errors: {}", .0.join("; "))]
    GraphQl(Vec<String>),
    #[error("Response contained no data")]
    MissingData,
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Request callback dropped before it was resolved")]
    Abandoned,
    #[error("Deferred call did not succeed: {0}")]
    Unsuccessful(Box<WeaveError>),
    #[error("Task panicked: {0}")]
    Panicked(String),
    #[error("Dispatcher error: {0}")]
    Dispatcher(String),
}

impl WeaveError {
    /// Classify a failure envelope with the given policy
    pub fn classify<C>(envelope: FailureEnvelope, classifier: &C) -> Self
    where
        C: FailureClassifier + ?Sized,
    {
        match classifier.classify(&envelope) {
            FailureKind::Transport => WeaveError::Transport(envelope),
            FailureKind::Authorization => WeaveError::Authorization(envelope),
            FailureKind::Api => WeaveError::Api(envelope),
        }
    }

    /// True for the cancellation signal, which is expected rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self, WeaveError::Cancelled)
    }

    /// Envelope of a transport-level failure, if this is one
    pub fn envelope(&self) -> Option<&FailureEnvelope> {
        match self {
            WeaveError::Transport(envelope)
            | WeaveError::Authorization(envelope)
            | WeaveError::Api(envelope) => Some(envelope),
            WeaveError::Unsuccessful(inner) => inner.envelope(),
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<FailureKind> {
        match self {
            WeaveError::Transport(_) => Some(FailureKind::Transport),
            WeaveError::Authorization(_) => Some(FailureKind::Authorization),
            WeaveError::Api(_) => Some(FailureKind::Api),
            WeaveError::Unsuccessful(inner) => inner.kind(),
            _ => None,
        }
    }
}

impl From<FailureEnvelope> for WeaveError {
    fn from(envelope: FailureEnvelope) -> Self {
        WeaveError::classify(envelope, &StatusClassifier::default())
    }
}

impl From<::config::ConfigError> for WeaveError {
    fn from(error: ::config::ConfigError) -> Self {
        WeaveError::Configuration(error.to_string())
    }
}

pub type WeaveResult<T> = std::result::Result<T, WeaveError>;

/// True when an `anyhow` error chain carries the cancellation signal
pub fn is_cancellation(error: &anyhow::Error) -> bool {
    error
        .chain()
        .any(|cause| matches!(cause.downcast_ref::<WeaveError>(), Some(WeaveError::Cancelled)))
}
