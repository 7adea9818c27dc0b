//! Error types for mutex operations.

use thiserror::Error;

/// Errors that can occur while configuring or driving a mutex.
///
/// A contested lock is not an error: `acquire` reports it as `Ok(false)`.
#[derive(Error, Debug)]
pub enum MutexError {
    /// The backend handle does not match the adapter (wrong driver, missing
    /// connection). Raised before any lock operation is attempted.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The lock name violates backend constraints (empty, too long).
    #[error("invalid lock name: {0}")]
    Validation(String),

    /// Transport or protocol failure while talking to the backend.
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl MutexError {
    /// Wraps a driver error as a [`MutexError::Backend`].
    pub fn backend<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Backend(Box::new(error))
    }

    /// Returns true for transport/protocol failures.
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}

/// Result type for mutex operations.
pub type MutexResult<T> = Result<T, MutexError>;
