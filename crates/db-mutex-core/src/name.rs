//! Lock name validation shared by every backend.

use crate::error::{MutexError, MutexResult};

/// Checks `name` against the universal and backend-declared constraints.
///
/// Length is measured in characters, which is how MySQL bounds `GET_LOCK`
/// names.
pub fn validate_lock_name(name: &str, max_length: Option<usize>) -> MutexResult<()> {
    if name.is_empty() {
        return Err(MutexError::Validation(
            "lock name cannot be empty".to_string(),
        ));
    }

    if let Some(max) = max_length {
        let length = name.chars().count();
        if length > max {
            return Err(MutexError::Validation(format!(
                "lock name is {length} characters long, backend allows at most {max}"
            )));
        }
    }

    Ok(())
}
