//! Backend-agnostic checks shared by the in-memory and live-server tests.

use db_mutex_core::mutex::DbMutex;
use db_mutex_core::traits::MutexBackend;
use std::time::Duration;

/// A holds `name`, B is refused until A lets go, then B gets it.
pub async fn assert_mutual_exclusion<B: MutexBackend + 'static>(
    a: &DbMutex<B>,
    b: &DbMutex<B>,
    name: &str,
) {
    assert!(a.acquire_timeout(name, Duration::ZERO).await.unwrap());
    assert!(!b.acquire_timeout(name, Duration::ZERO).await.unwrap());
    assert!(!b.is_acquired(name).await);

    assert!(a.release(name).await.unwrap());

    assert!(b.acquire_timeout(name, Duration::ZERO).await.unwrap());
    assert!(b.release(name).await.unwrap());
}

/// Acquire, re-acquire, release, release again.
pub async fn assert_reentrant_round_trip<B: MutexBackend + 'static>(mutex: &DbMutex<B>, name: &str) {
    assert!(mutex.acquire_timeout(name, Duration::ZERO).await.unwrap());
    assert!(mutex.acquire_timeout(name, Duration::ZERO).await.unwrap());
    assert_eq!(mutex.held_locks().await, vec![name.to_string()]);

    assert!(mutex.release(name).await.unwrap());
    assert!(!mutex.release(name).await.unwrap());
    assert!(mutex.held_locks().await.is_empty());
}
