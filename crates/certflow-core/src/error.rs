//! Error types for the certificate lifecycle orchestrator
//!
//! This module defines all error types used throughout the crate, plus the
//! small outcome enums used where "already absent" is an expected answer
//! rather than a failure.

use thiserror::Error;

/// Result type alias for certflow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the certificate lifecycle orchestrator
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or missing resource properties
    #[error("Validation error: {0}")]
    Validation(String),

    /// A collaborator call failed (certificate authority, DNS, store, driver)
    #[error("{operation} failed: {message}")]
    ExternalService {
        /// What was being attempted, e.g. "describe certificate arn:..."
        operation: String,
        /// Error reported by the collaborator
        message: String,
    },

    /// The addressed resource does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// A bounded poll exhausted its round budget
    #[error("Timed out after {rounds} rounds: {what}")]
    Timeout {
        /// What was being waited for
        what: String,
        /// Rounds consumed
        rounds: u32,
    },

    /// An atomic DNS change batch was rejected as a whole
    #[error("DNS change batch rejected: {0}")]
    BatchRejected(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Parameter store errors
    #[error("State store error: {0}")]
    StateStore(String),

    /// Local I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// HTTP errors (completion delivery)
    #[error("HTTP error: {0}")]
    Http(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create an external service error with operation context
    pub fn external(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ExternalService {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(what: impl Into<String>, rounds: u32) -> Self {
        Self::Timeout {
            what: what.into(),
            rounds,
        }
    }

    /// Create a batch rejection error
    pub fn batch_rejected(msg: impl Into<String>) -> Self {
        Self::BatchRejected(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a state store error
    pub fn state_store(msg: impl Into<String>) -> Self {
        Self::StateStore(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Whether this error means "the thing is already gone"
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

/// Outcome of a best-effort removal
///
/// Delete paths must be idempotent: a resource that is already gone is an
/// expected answer, not an error. Anything else still travels as `Err`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    /// The resource existed and was removed
    Removed,
    /// The resource did not exist
    AlreadyAbsent,
}

/// Absorb a `NotFound` error into `Ok(None)`, keeping every other error
pub fn tolerate_not_found<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}
