//! Convenience prelude for mutex types.

pub use crate::error::{MutexError, MutexResult};
pub use crate::mutex::{DbMutex, DbMutexBuilder};
pub use crate::timeout::TimeoutValue;
pub use crate::traits::{Acquisition, MutexBackend};
