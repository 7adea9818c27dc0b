//! Redis backend for database-backed mutexes.
//!
//! Locks are keys written with `SET NX PX` and carrying a per-backend owner
//! token; release is an atomic compare-and-delete.

pub mod backend;
pub mod token;

pub use backend::{RedisMutex, RedisMutexBackend, RedisMutexBackendBuilder};
