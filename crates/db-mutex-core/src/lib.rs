//! Core traits and types for database-backed mutexes.

pub mod error;
pub mod mutex;
pub mod name;
pub mod prelude;
pub mod timeout;
pub mod traits;

pub use error::{MutexError, MutexResult};
pub use prelude::*;
