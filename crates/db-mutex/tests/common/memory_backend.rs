//! In-memory backend for testing the mutex without a database.

use db_mutex_core::error::{MutexError, MutexResult};
use db_mutex_core::timeout::TimeoutValue;
use db_mutex_core::traits::{Acquisition, MutexBackend};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// How often a waiting acquire re-checks the lock table.
const POLL_INTERVAL: Duration = Duration::from_millis(5);

/// Stands in for a database server: one lock table shared by every session.
#[derive(Clone, Default)]
pub struct MemoryServer {
    locks: Arc<Mutex<HashMap<String, u64>>>,
    next_session: Arc<AtomicU64>,
}

impl MemoryServer {
    /// Creates an empty server.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a new session, as one `DbMutex` would.
    pub fn session(&self) -> MemoryBackend {
        self.session_with_limit(None)
    }

    /// Opens a session that declares a maximum name length.
    pub fn session_with_limit(&self, max_name_length: Option<usize>) -> MemoryBackend {
        MemoryBackend {
            server: self.clone(),
            session: self.next_session.fetch_add(1, Ordering::Relaxed),
            max_name_length,
            acquire_calls: AtomicUsize::new(0),
            release_calls: AtomicUsize::new(0),
            fail_acquire: AtomicBool::new(false),
            fail_release: AtomicBool::new(false),
        }
    }

    /// Session currently holding `name`, if any.
    pub fn holder(&self, name: &str) -> Option<u64> {
        self.locks.lock().unwrap().get(name).copied()
    }

    /// Drops `name` behind everyone's back, like an external TTL expiring.
    pub fn expire(&self, name: &str) {
        self.locks.lock().unwrap().remove(name);
    }

    fn try_take(&self, name: &str, session: u64) -> bool {
        let mut locks = self.locks.lock().unwrap();
        match locks.get(name) {
            Some(&holder) => holder == session,
            None => {
                locks.insert(name.to_string(), session);
                true
            }
        }
    }

    fn give_back(&self, name: &str, session: u64) -> bool {
        let mut locks = self.locks.lock().unwrap();
        if locks.get(name) == Some(&session) {
            locks.remove(name);
            true
        } else {
            false
        }
    }
}

/// One session on a [`MemoryServer`], with call counters and fault switches.
pub struct MemoryBackend {
    server: MemoryServer,
    session: u64,
    max_name_length: Option<usize>,
    acquire_calls: AtomicUsize,
    release_calls: AtomicUsize,
    fail_acquire: AtomicBool,
    fail_release: AtomicBool,
}

impl MemoryBackend {
    pub fn session_id(&self) -> u64 {
        self.session
    }

    pub fn acquire_calls(&self) -> usize {
        self.acquire_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.release_calls.load(Ordering::SeqCst)
    }

    /// Makes acquire calls fail as if the connection dropped.
    pub fn fail_acquire(&self, fail: bool) {
        self.fail_acquire.store(fail, Ordering::SeqCst);
    }

    /// Makes release calls fail as if the connection dropped.
    pub fn fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }
}

fn connection_lost() -> MutexError {
    MutexError::backend(std::io::Error::new(
        std::io::ErrorKind::ConnectionAborted,
        "connection lost",
    ))
}

impl MutexBackend for MemoryBackend {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn max_name_length(&self) -> Option<usize> {
        self.max_name_length
    }

    async fn acquire_lock(&self, name: &str, timeout: TimeoutValue) -> MutexResult<Acquisition> {
        self.acquire_calls.fetch_add(1, Ordering::SeqCst);
        // Too large to represent: wait without a deadline.
        let deadline = Instant::now().checked_add(timeout.as_duration());

        loop {
            if self.fail_acquire.load(Ordering::SeqCst) {
                return Err(connection_lost());
            }
            if self.server.try_take(name, self.session) {
                return Ok(Acquisition::Acquired);
            }

            let pause = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(Acquisition::TimedOut);
                    }
                    POLL_INTERVAL.min(deadline - now)
                }
                None => POLL_INTERVAL,
            };
            tokio::time::sleep(pause).await;
        }
    }

    async fn release_lock(&self, name: &str) -> MutexResult<bool> {
        self.release_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(connection_lost());
        }
        Ok(self.server.give_back(name, self.session))
    }
}
