//! Owner tokens stored as Redis lock values.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};

use rand::Rng;

/// Generates a token unique to one backend instance.
///
/// Format: `{process_id}_{counter}_{random}`
pub fn create_owner_token() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let counter = COUNTER.fetch_add(1, Ordering::Relaxed);

    let random: u64 = rand::thread_rng().r#gen();

    format!("{}_{}_{:016x}", process::id(), counter, random)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_are_unique() {
        let a = create_owner_token();
        let b = create_owner_token();
        assert_ne!(a, b);
    }

    #[test]
    fn test_token_starts_with_pid() {
        let token = create_owner_token();
        assert!(token.starts_with(&format!("{}_", process::id())));
    }
}
