use thiserror::Error;

use crate::agent::AgentId;

/// Errors from repository operations (used by trait definitions in murmur-core).
#[derive(Debug, Clone, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors reported by a social platform client.
#[derive(Debug, Clone, Error)]
pub enum PlatformError {
    /// Credentials missing, invalid or revoked.
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited by platform")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("network error: {0}")]
    Network(String),

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("platform error: {0}")]
    Unknown(String),
}

impl PlatformError {
    /// Fatal errors will not go away by retrying.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PlatformError::Auth(_))
    }
}

/// Content generation failed.
#[derive(Debug, Clone, Error)]
#[error("generation failed: {0}")]
pub struct GenerationError(pub String);

/// Errors surfaced by the behavior engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// Setup problem such as missing credentials. Not retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("agent {0} not found")]
    NotFound(AgentId),

    /// External call failed during a running tick.
    #[error("transient error: {0}")]
    Transient(String),

    #[error("{operation} timed out after {after_secs}s")]
    Timeout {
        operation: &'static str,
        after_secs: u64,
    },

    /// Content gate or rate limit denied the action.
    #[error("policy rejection: {0}")]
    Policy(String),

    #[error("persistence error: {0}")]
    Persistence(String),

    /// The call was cut off and may or may not have taken effect.
    #[error("outcome unknown: {0}")]
    OutcomeUnknown(String),
}

impl EngineError {
    /// Fatal errors stop the loop instead of being retried next tick.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::Configuration(_) | EngineError::NotFound(_))
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        EngineError::Persistence(err.to_string())
    }
}

impl From<PlatformError> for EngineError {
    fn from(err: PlatformError) -> Self {
        if err.is_fatal() {
            EngineError::Configuration(err.to_string())
        } else {
            EngineError::Transient(err.to_string())
        }
    }
}

impl From<GenerationError> for EngineError {
    fn from(err: GenerationError) -> Self {
        EngineError::Transient(err.to_string())
    }
}
