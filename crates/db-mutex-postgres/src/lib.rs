//! PostgreSQL backend for database-backed mutexes.
//!
//! Uses session-level advisory locks on a dedicated connection.

pub mod backend;
pub mod connection;
pub mod key;

pub use backend::{PostgresMutex, PostgresMutexBackend, PostgresMutexBackendBuilder};
pub use connection::PostgresConnectionSource;
pub use key::PostgresAdvisoryLockKey;
