//! The capability set a backend must provide to drive a [`DbMutex`].
//!
//! [`DbMutex`]: crate::mutex::DbMutex

use std::future::Future;

use crate::error::MutexResult;
use crate::timeout::TimeoutValue;

// ============================================================================
// Acquisition Outcome
// ============================================================================

/// Outcome of a single backend acquire round trip that did not fail.
///
/// Together with `Err(MutexError::Backend)` this forms the tri-state
/// Acquired / TimedOut / Failed result every adapter reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquisition {
    /// The backend granted the lock to this session.
    Acquired,
    /// The backend understood the request but did not grant the lock within
    /// the requested wait. Also used for backend-native "unknown" results
    /// such as SQL `NULL`.
    TimedOut,
}

impl Acquisition {
    /// Maps a primitive's boolean-or-null result. Anything but `Some(true)`
    /// is a failed attempt.
    pub fn from_flag(flag: Option<bool>) -> Self {
        match flag {
            Some(true) => Self::Acquired,
            _ => Self::TimedOut,
        }
    }

    pub fn is_acquired(&self) -> bool {
        matches!(self, Self::Acquired)
    }
}

// ============================================================================
// Backend Adapter Trait
// ============================================================================

/// Translates abstract acquire/release requests into one backend primitive.
///
/// Implementations must:
///
/// * route both operations to the primary/writable node of the store;
/// * return `Ok(Acquisition::TimedOut)` / `Ok(false)` for a normal contested
///   or unknown outcome, never an error;
/// * return `Err(MutexError::Backend)` for transport or protocol failures;
/// * treat a zero timeout as a single non-blocking attempt.
///
/// The waiting for a positive timeout happens inside `acquire_lock`, so from
/// the caller's point of view each call is one suspension point.
///
/// # Example
///
/// ```rust,ignore
/// let backend = MySqlMutexBackend::new("mysql://root@localhost/app").await?;
/// let mutex = DbMutex::new(backend);
/// if mutex.acquire_timeout("nightly-report", Duration::from_secs(5)).await? {
///     build_report().await;
///     mutex.release("nightly-report").await?;
/// }
/// ```
pub trait MutexBackend: Send + Sync {
    /// Short backend identifier used in logs.
    fn backend_name(&self) -> &'static str;

    /// Maximum lock name length in characters, or `None` if unbounded.
    fn max_name_length(&self) -> Option<usize> {
        None
    }

    /// Attempts to acquire `name`, waiting up to `timeout`.
    fn acquire_lock(
        &self,
        name: &str,
        timeout: TimeoutValue,
    ) -> impl Future<Output = MutexResult<Acquisition>> + Send;

    /// Releases `name`. Returns the backend's own verdict: `false` when the
    /// store reports the lock was not held by this session.
    fn release_lock(&self, name: &str) -> impl Future<Output = MutexResult<bool>> + Send;
}
