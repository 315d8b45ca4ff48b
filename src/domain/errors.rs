//! Domain errors for the causeway workbench.

use thiserror::Error;
use uuid::Uuid;

/// Domain-level errors raised by run bookkeeping and persistence.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Run not found: {0}")]
    RunNotFound(Uuid),

    #[error("Run number not found: {0}")]
    RunNumberNotFound(u32),

    #[error("No active run")]
    NoActiveRun,

    #[error("Specification not found: {0}")]
    SpecificationNotFound(String),

    #[error("Significance test not found for run {0}")]
    SignificanceTestNotFound(Uuid),

    #[error("Run {0} has no job handle to poll or cancel")]
    MissingJobHandle(Uuid),

    #[error("Run {0} has no results yet")]
    MissingResults(Uuid),

    #[error("Run #{0} is still processing")]
    RunStillProcessing(u32),

    #[error("Run #{0} is not the active run")]
    RunNotActive(u32),

    #[error("Significance test for run {0} is still in flight")]
    SignificanceTestInFlight(Uuid),

    #[error("Significance test for run {0} has no job handle to poll or cancel")]
    SignificanceJobMissing(Uuid),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Unknown runtime status: {0}")]
    UnknownStatus(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::DatabaseError(err.to_string())
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

/// Errors returned by the estimation backend or the transport in front of it.
#[derive(Debug, Error)]
pub enum BackendError {
    /// Malformed request (HTTP 400, 422)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Missing or wrong function key (HTTP 401, 403)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Unknown endpoint or orchestration instance (HTTP 404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Too many requests (HTTP 429)
    #[error("Rate limit exceeded - too many requests")]
    RateLimitExceeded,

    /// Backend failure (HTTP 5xx)
    #[error("Server error ({0}): {1}")]
    ServerError(u16, String),

    /// Network or connection error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Request timeout
    #[error("Request timeout")]
    Timeout,

    /// Response body did not have the expected shape
    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl BackendError {
    /// Returns true if this error is transient and should be retried
    pub fn is_transient(&self) -> bool {
        match self {
            BackendError::RateLimitExceeded
            | BackendError::ServerError(_, _)
            | BackendError::Timeout => true,
            BackendError::NetworkError(err) => !err.is_decode() && !err.is_builder(),
            _ => false,
        }
    }

    /// Returns true if this is a permanent error that should not be retried
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            BackendError::InvalidRequest(_)
                | BackendError::Unauthorized(_)
                | BackendError::NotFound(_)
                | BackendError::UnexpectedResponse(_)
                | BackendError::JsonError(_)
        )
    }

    /// Map an HTTP status and response body to an error
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 | 422 => BackendError::InvalidRequest(body),
            401 | 403 => BackendError::Unauthorized(body),
            404 => BackendError::NotFound(body),
            408 => BackendError::Timeout,
            429 => BackendError::RateLimitExceeded,
            500..=599 => BackendError::ServerError(status, body),
            _ => BackendError::UnexpectedResponse(format!("status {status}: {body}")),
        }
    }

    /// Message the backend attached to a rejected request, when there is one.
    pub fn backend_message(&self) -> Option<&str> {
        match self {
            BackendError::InvalidRequest(msg)
            | BackendError::Unauthorized(msg)
            | BackendError::ServerError(_, msg) => {
                let msg = msg.trim();
                (!msg.is_empty()).then_some(msg)
            }
            _ => None,
        }
    }
}

pub type BackendResult<T> = Result<T, BackendError>;
