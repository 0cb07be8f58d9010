//! Error types for the setup orchestrator.

use thiserror::Error;

/// The main error type for setup pipeline operations.
#[derive(Debug, Clone, Error)]
pub enum SetupError {
    /// The requested operation type is not in the catalog.
    #[error("Unknown operation type: '{0}'")]
    UnknownOperation(String),

    /// A stage name did not match any registered stage.
    #[error("Unknown stage: '{0}'")]
    UnknownStage(String),

    /// Another pipeline execution is already in flight on this engine.
    #[error("A pipeline execution is already running on this engine")]
    AlreadyRunning,

    /// The selected stages contain a dependency cycle.
    #[error("Circular dependency detected among stages: {}", remaining.join(", "))]
    CircularDependency {
        /// Stages that could never become ready.
        remaining: Vec<String>,
    },

    /// A stage body failed.
    #[error("Stage '{stage}' failed: {message}")]
    StageFailed {
        /// The stage that failed.
        stage: String,
        /// The underlying error message.
        message: String,
    },

    /// A collaborator service could not be reached.
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// A collaborator call exceeded its time budget.
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// The host ran out of a resource (memory, file handles).
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// A collaborator rejected the call for lack of permissions.
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    /// Data returned by a collaborator was malformed.
    #[error("Data corruption: {0}")]
    DataCorruption(String),

    /// A validation check failed.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SetupError {
    /// Wraps an error raised inside a stage body, keeping the original
    /// message available for classification.
    #[must_use]
    pub fn stage_failed(stage: impl Into<String>, source: &Self) -> Self {
        Self::StageFailed {
            stage: stage.into(),
            message: source.to_string(),
        }
    }
}

impl From<serde_json::Error> for SetupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}
