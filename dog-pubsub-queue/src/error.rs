use thiserror::Error;

use crate::types::JobState;

/// Result type for queue operations
pub type QueueResult<T> = Result<T, QueueError>;

/// Infrastructure errors for queue operations
#[derive(Error, Debug, Clone)]
pub enum QueueError {
    #[error("cannot add job before init")]
    NotInitialized,

    #[error("no topic configured for queue \"{0}\"")]
    NoTopicConfigured(String),

    #[error("no subscription configured for queue \"{0}\"")]
    NoSubscriptionConfigured(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid job state transition: {from} -> {to}")]
    InvalidTransition { from: JobState, to: JobState },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl QueueError {
    /// Configuration and init-order errors cannot be fixed by redelivery
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NotInitialized
                | Self::NoTopicConfigured(_)
                | Self::NoSubscriptionConfigured(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Failure reported by a consumer callback. Every variant leads to a nack.
#[derive(Error, Debug, Clone)]
pub enum JobError {
    /// The callback returned an error
    #[error("{0}")]
    Failed(String),

    /// The callback panicked while processing
    #[error("job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    /// Create a failure from any message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Failed(msg.into())
    }

    /// Get the error message
    pub fn message(&self) -> &str {
        match self {
            Self::Failed(msg) | Self::Panicked(msg) => msg,
        }
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        Self::Failed(format!("{:#}", err))
    }
}

impl From<QueueError> for JobError {
    fn from(err: QueueError) -> Self {
        Self::Failed(err.to_string())
    }
}

impl From<serde_json::Error> for QueueError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}
