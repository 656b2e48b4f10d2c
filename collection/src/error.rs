//! Error types for collection operations.

use common::{EncodingError, KeyStoreError};

/// Error type for collection operations.
///
/// Every failure is a distinct variant so callers can pattern-match and
/// decide between retrying and surfacing. [`Conflict`](Error::Conflict) is
/// expected under write contention and should be retried with fresh reads;
/// [`Unavailable`](Error::Unavailable) is retried with backoff by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The requested key is absent from the collection.
    NotFound(String),

    /// The key was rejected, either structurally or by the collection's
    /// key validator.
    InvalidKey(String),

    /// Stored bytes do not decode as the collection's record type.
    Decode(String),

    /// The named index was not declared on the collection.
    IndexNotFound(String),

    /// A transaction precondition failed at commit.
    Conflict,

    /// The underlying store could not be reached.
    Unavailable(String),

    /// Internal errors indicating bugs or invariant violations.
    Internal(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::NotFound(key) => write!(f, "Key not found: {}", key),
            Error::InvalidKey(msg) => write!(f, "Invalid key: {}", msg),
            Error::Decode(msg) => write!(f, "Decode error: {}", msg),
            Error::IndexNotFound(name) => write!(f, "Index not declared: {}", name),
            Error::Conflict => write!(f, "Transaction conflict: a precondition failed"),
            Error::Unavailable(msg) => write!(f, "Store unavailable: {}", msg),
            Error::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl From<KeyStoreError> for Error {
    fn from(err: KeyStoreError) -> Self {
        match err {
            KeyStoreError::Conflict => Error::Conflict,
            KeyStoreError::Unavailable(msg) => Error::Unavailable(msg),
            KeyStoreError::Internal(msg) => Error::Internal(msg),
        }
    }
}

impl From<EncodingError> for Error {
    fn from(err: EncodingError) -> Self {
        Error::Decode(err.message)
    }
}

/// Result type alias for collection operations.
pub type Result<T> = std::result::Result<T, Error>;
