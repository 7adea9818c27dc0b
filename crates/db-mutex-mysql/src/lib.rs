//! MySQL backend for database-backed mutexes.
//!
//! Uses MySQL's GET_LOCK and RELEASE_LOCK functions on a dedicated session,
//! so the server releases every lock automatically if that session dies.

pub mod backend;
pub mod connection;
pub mod name;

pub use backend::{MySqlMutex, MySqlMutexBackend, MySqlMutexBackendBuilder};
pub use connection::MySqlConnectionSource;
