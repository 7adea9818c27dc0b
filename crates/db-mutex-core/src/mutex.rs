//! The backend-agnostic mutex state machine.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{Span, debug, field, instrument, warn};

use crate::error::MutexResult;
use crate::name::validate_lock_name;
use crate::timeout::TimeoutValue;
use crate::traits::MutexBackend;

/// Builder for [`DbMutex`] configuration.
pub struct DbMutexBuilder<B> {
    backend: B,
    default_timeout: TimeoutValue,
    auto_release: bool,
}

impl<B: MutexBackend + 'static> DbMutexBuilder<B> {
    /// Creates a new builder around an adapter.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            default_timeout: TimeoutValue::ZERO,
            auto_release: true,
        }
    }

    /// Sets the wait used by [`DbMutex::acquire`]. Defaults to zero (no wait).
    pub fn default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = TimeoutValue::from(timeout);
        self
    }

    /// Sets whether locks still held when the mutex is dropped are released
    /// in a background task. Enabled by default.
    pub fn auto_release(mut self, enabled: bool) -> Self {
        self.auto_release = enabled;
        self
    }

    /// Builds the mutex.
    pub fn build(self) -> DbMutex<B> {
        DbMutex {
            backend: Arc::new(self.backend),
            held: Mutex::new(BTreeSet::new()),
            default_timeout: self.default_timeout,
            auto_release: self.auto_release,
        }
    }
}

/// A named mutex whose lock state lives in an external store.
///
/// One `DbMutex` is one client of the store: it is bound to a single adapter
/// (and that adapter's dedicated session) for its whole lifetime and keeps
/// the set of names it currently holds. Exclusion across instances is the
/// backend's job; the held-set only adds reentrancy and keeps this instance
/// from releasing locks it never acquired.
///
/// Every operation on one instance is serialized, the read-only accessors
/// included: while an acquire is waiting on the backend,
/// [`is_acquired`](Self::is_acquired) and [`held_locks`](Self::held_locks)
/// wait with it, for up to the full timeout.
///
/// # Example
///
/// ```rust,ignore
/// let mutex = DbMutex::new(backend);
///
/// if mutex.acquire_timeout("job-42", Duration::from_secs(10)).await? {
///     run_job().await;
///     mutex.release("job-42").await?;
/// } else {
///     // Another process is running the job.
/// }
/// ```
pub struct DbMutex<B: MutexBackend + 'static> {
    backend: Arc<B>,
    held: Mutex<BTreeSet<String>>,
    default_timeout: TimeoutValue,
    auto_release: bool,
}

impl<B: MutexBackend + 'static> DbMutex<B> {
    /// Creates a mutex with default settings.
    pub fn new(backend: B) -> Self {
        DbMutexBuilder::new(backend).build()
    }

    /// Returns a new builder for configuring the mutex.
    pub fn builder(backend: B) -> DbMutexBuilder<B> {
        DbMutexBuilder::new(backend)
    }

    /// Returns the underlying adapter.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the wait used by [`acquire`](Self::acquire).
    pub fn default_timeout(&self) -> Duration {
        self.default_timeout.as_duration()
    }

    /// Acquires `name` using the configured default timeout.
    pub async fn acquire(&self, name: &str) -> MutexResult<bool> {
        self.acquire_timeout(name, self.default_timeout.as_duration())
            .await
    }

    /// Acquires `name`, letting the backend wait up to `timeout`.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - the lock is held by this instance (possibly already was)
    /// * `Ok(false)` - the backend did not grant the lock within `timeout`
    /// * `Err(MutexError::Validation)` - the name is empty or too long
    /// * `Err(MutexError::Backend)` - the backend could not be reached; nothing
    ///   is recorded as held
    ///
    /// # Cancellation
    ///
    /// A grant is recorded only once the backend call returns. Dropping this
    /// future mid-call (for example under `tokio::time::timeout`) records
    /// nothing, but the server may already have granted the lock to the
    /// session. Such a lock stays held on the server until the session ends
    /// or, for Redis, the key expires; a later acquire and release of the same
    /// name through this instance does not clear it on MySQL, which counts
    /// grants per session. Prefer a bounded `timeout` over cancelling.
    #[instrument(
        skip(self),
        fields(
            lock.name = %name,
            backend = self.backend.backend_name(),
            acquired = field::Empty,
            reentrant = field::Empty,
        )
    )]
    pub async fn acquire_timeout(&self, name: &str, timeout: Duration) -> MutexResult<bool> {
        validate_lock_name(name, self.backend.max_name_length())?;

        let mut held = self.held.lock().await;
        if held.contains(name) {
            Span::current().record("reentrant", true);
            Span::current().record("acquired", true);
            return Ok(true);
        }

        let acquisition = self
            .backend
            .acquire_lock(name, TimeoutValue::from(timeout))
            .await
            .inspect_err(|e| debug!(error = %e, "backend acquire failed"))?;

        let acquired = acquisition.is_acquired();
        if acquired {
            held.insert(name.to_owned());
        }
        Span::current().record("acquired", acquired);
        Ok(acquired)
    }

    /// Releases `name`.
    ///
    /// Names this instance does not hold are never sent to the backend; the
    /// call returns `Ok(false)`. Otherwise the backend's verdict is returned
    /// and the name is dropped from the held-set, even when the backend says
    /// the lock was already gone. On a backend failure the name stays held so
    /// the release can be retried.
    #[instrument(
        skip(self),
        fields(
            lock.name = %name,
            backend = self.backend.backend_name(),
            released = field::Empty,
        )
    )]
    pub async fn release(&self, name: &str) -> MutexResult<bool> {
        let mut held = self.held.lock().await;
        if !held.contains(name) {
            Span::current().record("released", false);
            return Ok(false);
        }

        let released = self.backend.release_lock(name).await?;
        held.remove(name);

        if !released {
            warn!("backend reported the lock was no longer held");
        }
        Span::current().record("released", released);
        Ok(released)
    }

    /// Returns true if this instance currently holds `name`.
    pub async fn is_acquired(&self, name: &str) -> bool {
        self.held.lock().await.contains(name)
    }

    /// Names currently held by this instance, sorted.
    pub async fn held_locks(&self) -> Vec<String> {
        self.held.lock().await.iter().cloned().collect()
    }

    /// Releases every held name.
    ///
    /// Stops at the first backend failure; that name and any not yet visited
    /// remain held.
    #[instrument(skip(self), fields(backend = self.backend.backend_name()))]
    pub async fn release_all(&self) -> MutexResult<()> {
        let mut held = self.held.lock().await;
        let names: Vec<String> = held.iter().cloned().collect();

        for name in names {
            let released = self.backend.release_lock(&name).await?;
            held.remove(&name);
            if !released {
                warn!(lock.name = %name, "backend reported the lock was no longer held");
            }
        }

        Ok(())
    }

    /// Releases every held name and tears the instance down.
    pub async fn shutdown(self) -> MutexResult<()> {
        self.release_all().await
    }
}

impl<B: MutexBackend + 'static> Drop for DbMutex<B> {
    fn drop(&mut self) {
        let held = std::mem::take(self.held.get_mut());
        if held.is_empty() {
            return;
        }

        if !self.auto_release {
            warn!(
                count = held.len(),
                "mutex dropped while holding locks, auto-release disabled"
            );
            return;
        }

        // Drop is synchronous, so hand the releases to the runtime.
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(
                count = held.len(),
                "mutex dropped outside a tokio runtime, locks not released"
            );
            return;
        };

        let backend = Arc::clone(&self.backend);
        runtime.spawn(async move {
            for name in held {
                match backend.release_lock(&name).await {
                    Ok(true) => debug!(lock.name = %name, "auto-released lock"),
                    Ok(false) => {
                        warn!(lock.name = %name, "auto-release found the lock no longer held")
                    }
                    Err(e) => warn!(lock.name = %name, error = %e, "auto-release failed"),
                }
            }
        });
    }
}
