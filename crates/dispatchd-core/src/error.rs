//! Central error type for the dispatch and job-lifecycle engine.

use thiserror::Error;

/// Result alias used throughout `dispatchd-core`.
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy for the engine. Variant names are surfaced verbatim
/// (or with an `Error` suffix) to HTTP callers, so keep them stable.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown model, or an A/B route with no identity key supplied.
    #[error("routing error: {0}")]
    Routing(String),

    /// `(name, version)` not present in the model registry.
    #[error("model not found: {name} version {version}")]
    ModelNotFound { name: String, version: String },

    /// Pool-level per-attempt timeout. The only retry-eligible error.
    #[error("execution timed out after {0:?}")]
    ExecutionTimeout(std::time::Duration),

    /// Pool cannot accept more work.
    #[error("executor saturated for device {0}")]
    ExecutorSaturated(String),

    /// Error raised inside a pipeline's `run`/`run_batch`. Not retried.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// The job was cancelled.
    #[error("job cancelled{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    JobCancelled(Option<String>),

    /// Store lookup miss.
    #[error("job not found: {0}")]
    JobNotFound(String),

    /// `(model, version)` resolves to a pool name with no registered pool.
    #[error("unknown pool: {0}")]
    PoolUnknown(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(String),
}

impl Error {
    /// Stable machine-readable error type, mirrored in HTTP error bodies.
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::Routing(_) => "RoutingError",
            Error::ModelNotFound { .. } => "ModelNotFoundError",
            Error::ExecutionTimeout(_) => "ExecutionTimeoutError",
            Error::ExecutorSaturated(_) => "ExecutorSaturatedError",
            Error::Pipeline(_) => "InferenceExecutionError",
            Error::JobCancelled(_) => "JobCancelled",
            Error::JobNotFound(_) => "JobNotFoundError",
            Error::PoolUnknown(_) => "PoolUnknownError",
            Error::Database(_) => "StoreError",
            Error::Serialization(_) => "SerializationError",
            Error::Config(_) => "ConfigError",
        }
    }

    /// Whether this error class is eligible for a retry attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::ExecutionTimeout(_))
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
