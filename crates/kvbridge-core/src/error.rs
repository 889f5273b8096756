//! Cache error types.

use thiserror::Error;

/// Boxed error from the underlying client library.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors surfaced by cache construction and cache operations.
///
/// Operation failures reported by the client library are carried in
/// [`CacheError::Operation`] untouched, so callers can downcast to the
/// library's own error type.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Configuration invalid: {0}")]
    Config(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Key not found")]
    NotFound,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Cache closed")]
    Closed,

    #[error("Operation failed: {0}")]
    Operation(#[source] BoxError),
}

impl CacheError {
    /// Wrap a client library error.
    pub fn operation<E>(err: E) -> Self
    where
        E: Into<BoxError>,
    {
        Self::Operation(err.into())
    }

    /// True for a `get` on an absent key.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// True when the request context ended the operation.
    pub fn is_context_error(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}
