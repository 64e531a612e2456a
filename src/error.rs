//! Error types for the quarry engine.
//!
//! Every failure that can cross the command boundary carries a numeric code
//! alongside its message, mirroring the envelope the control plane speaks:
//! 400 invalid value, 404 missing context, 409 conflict, 410 unknown context
//! type, 501 capability not available. Internal and I/O failures map to 500,
//! cancelled queries to 499.

use thiserror::Error;

/// A specialized `Result` type for quarry operations.
pub type Result<T> = std::result::Result<T, QuarryError>;

/// Errors that can occur while executing commands against the engine.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// A user-supplied value was rejected (malformed term, failed validator).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A named entity (context, document) does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The operation conflicts with existing state (duplicate URI, existing
    /// context, missing document on update).
    #[error("conflict: {0}")]
    Conflict(String),

    /// A schema references a context type that is not registered.
    #[error("unknown context type: {0}")]
    UnknownType(String),

    /// The requested capability is not available on this index.
    #[error("capability not available: {0}")]
    Unsupported(String),

    /// Persistence I/O failed.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// An internal invariant was violated. Never silently converted into an
    /// empty result.
    #[error("internal error: {0}")]
    Internal(String),

    /// The query was cancelled via its cancellation token.
    #[error("query cancelled")]
    Cancelled,
}

impl QuarryError {
    /// Create an invalid input error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        QuarryError::InvalidInput(msg.into())
    }

    /// Create a not found error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        QuarryError::NotFound(msg.into())
    }

    /// Create a conflict error.
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        QuarryError::Conflict(msg.into())
    }

    /// Create an unknown context type error.
    pub fn unknown_type<S: Into<String>>(msg: S) -> Self {
        QuarryError::UnknownType(msg.into())
    }

    /// Create a capability-not-available error.
    pub fn unsupported<S: Into<String>>(msg: S) -> Self {
        QuarryError::Unsupported(msg.into())
    }

    /// Create an internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        QuarryError::Internal(msg.into())
    }

    /// The numeric code of the error envelope.
    pub fn code(&self) -> u16 {
        match self {
            QuarryError::InvalidInput(_) => 400,
            QuarryError::NotFound(_) => 404,
            QuarryError::Conflict(_) => 409,
            QuarryError::UnknownType(_) => 410,
            QuarryError::Cancelled => 499,
            QuarryError::Io(_) | QuarryError::Internal(_) => 500,
            QuarryError::Unsupported(_) => 501,
        }
    }
}
