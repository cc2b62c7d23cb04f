//! Error types for the evaluation engine
//!
//! Every variant is cheap to clone: chained causes are reference-counted so
//! a single failure can be observed by all awaiters of a deduplicated
//! evaluation.

use std::sync::Arc;

use quern_cas::{CasError, DataId};
use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while evaluating keys
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A requested dependency edge would close a cycle. Carries the key
    /// renderings along the offending path, starting and ending at the
    /// origin.
    #[error("Dependency cycle detected: {}", .0.join(" -> "))]
    CycleDetected(Vec<String>),

    /// A `request` targeted a key type the origin never declared.
    #[error("Undeclared key dependency from '{from}' to '{to}'")]
    UnexpressedKeyDependency { from: String, to: String },

    /// A required cache hit was missing.
    #[error("No cache entry for required path '{0}'")]
    MissingRequiredCacheEntry(String),

    /// An entrypoint or decoder was handed a key name it does not know.
    #[error("Unexpected key type: {0}")]
    UnexpectedKeyType(String),

    /// A deduplicated result could not be downcast to the requested value
    /// type.
    #[error("Invalid value type for key '{0}'")]
    InvalidValueType(String),

    /// A value failed its own validation.
    #[error("Inconsistent value: {0}")]
    InconsistentValue(String),

    /// A user `compute` failed. Wraps the underlying error at every layer
    /// of the request chain.
    #[error("Computing '{key_prefix}' failed: {underlying}")]
    ValueComputationError {
        key_prefix: String,
        key: String,
        underlying: Arc<EngineError>,
        requested_cache_key_paths: Vec<String>,
    },

    /// The offending key could not even be encoded while reporting a
    /// compute failure.
    #[error("Encoding key '{key_prefix}' failed ({encoding}) while reporting: {underlying}")]
    KeyEncodingError {
        key_prefix: String,
        encoding: String,
        underlying: Arc<EngineError>,
    },

    /// The action executor cannot satisfy the action's requirements.
    #[error("Executor cannot satisfy action requirements")]
    CannotSatisfyRequirements,

    /// The action's executable could not be resolved.
    #[error("No executable found for '{0}'")]
    NoExecutable(String),

    /// An action failed; whatever output it produced was still uploaded.
    #[error("Action failed: {underlying}")]
    ActionFailure {
        tree_id: Option<DataId>,
        underlying: Arc<EngineError>,
    },

    /// An action failed and uploading its partial output failed too.
    #[error("Action failed ({original}) and recovery upload also failed ({upload})")]
    RecoveryUploadFailure {
        upload: Arc<EngineError>,
        original: Arc<EngineError>,
    },

    /// A resource lookup failed (unregistered or unentitled).
    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    /// A resource was registered twice under one name.
    #[error("Duplicate resource: {0}")]
    DuplicateResource(String),

    /// The evaluation was cancelled.
    #[error("Evaluation cancelled")]
    Cancelled,

    /// The context deadline fired.
    #[error("Deadline exceeded")]
    DeadlineExceeded,

    /// Content store failure.
    #[error("Store error: {0}")]
    Cas(String),

    /// Encoding or decoding failure.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic failure raised from user compute code.
    #[error("Execution failed: {0}")]
    ExecutionFailed(String),
}

impl EngineError {
    /// Create an execution failed error with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::ExecutionFailed(msg.into())
    }

    /// Walk wrapper chains back to the originating error.
    pub fn root_cause(&self) -> &EngineError {
        match self {
            Self::ValueComputationError { underlying, .. }
            | Self::KeyEncodingError { underlying, .. }
            | Self::ActionFailure { underlying, .. } => underlying.root_cause(),
            Self::RecoveryUploadFailure { original, .. } => original.root_cause(),
            other => other,
        }
    }
}

impl From<CasError> for EngineError {
    fn from(err: CasError) -> Self {
        match err {
            CasError::Storage(msg) => Self::Cas(msg),
            CasError::Serialization(msg) => Self::Serialization(msg),
        }
    }
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
