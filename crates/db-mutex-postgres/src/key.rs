//! PostgreSQL advisory lock key encoding.

use db_mutex_core::error::{MutexError, MutexResult};
use sha2::{Digest, Sha256};

/// Key for PostgreSQL advisory locks.
///
/// Advisory locks use either a single 64-bit key or a pair of 32-bit keys.
/// These represent different key spaces and do not overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PostgresAdvisoryLockKey {
    /// Single 64-bit key.
    Single(i64),
    /// Pair of 32-bit keys.
    Pair(i32, i32),
}

impl PostgresAdvisoryLockKey {
    /// Maximum length for ASCII encoding (9 characters).
    const MAX_ASCII_LENGTH: usize = 9;
    /// Bits per ASCII character (7 bits).
    const ASCII_CHAR_BITS: u32 = 7;
    /// Maximum ASCII value (127).
    const MAX_ASCII_VALUE: u32 = (1 << Self::ASCII_CHAR_BITS) - 1;
    /// Hex string length (16 hex chars for i64).
    const HEX_STRING_LENGTH: usize = 16;
    /// Hex part length (8 hex chars for i32).
    const HEX_PART_LENGTH: usize = 8;
    const PAIR_SEPARATOR: char = ',';

    /// Maps a lock name onto an advisory lock key.
    ///
    /// - ASCII strings up to 9 chars are encoded directly (collision-free)
    /// - 16-char hex strings are parsed as i64
    /// - "XXXXXXXX,XXXXXXXX" is parsed as (i32, i32)
    /// - anything else is hashed to i64 when `allow_hashing` is set
    pub fn from_name(name: &str, allow_hashing: bool) -> MutexResult<Self> {
        if name.is_empty() {
            return Err(MutexError::Validation(
                "lock name cannot be empty".to_string(),
            ));
        }

        if let Some(key) = Self::try_encode_ascii(name) {
            return Ok(Self::Single(key));
        }

        if let Some(key) = Self::try_parse_hex_string(name) {
            return Ok(key);
        }

        if let Some(key) = Self::try_parse_pair_string(name) {
            return Ok(key);
        }

        if allow_hashing {
            return Ok(Self::Single(Self::hash_string(name)));
        }

        Err(MutexError::Validation(format!(
            "'{}' is not an advisory lock key: use (1) at most {} ASCII characters, (2) {} hex characters, or (3) XXXXXXXX{}XXXXXXXX, or enable hashing",
            name,
            Self::MAX_ASCII_LENGTH,
            Self::HEX_STRING_LENGTH,
            Self::PAIR_SEPARATOR
        )))
    }

    fn try_encode_ascii(name: &str) -> Option<i64> {
        if name.len() > Self::MAX_ASCII_LENGTH {
            return None;
        }

        let mut result = 0i64;
        for ch in name.chars() {
            let ch_val = ch as u32;
            if ch_val > Self::MAX_ASCII_VALUE {
                return None;
            }
            result = (result << Self::ASCII_CHAR_BITS) | i64::from(ch_val);
        }

        // Zero bit marks the end of the name, ones pad the remaining slots.
        result <<= 1;
        for _ in name.len()..Self::MAX_ASCII_LENGTH {
            result = (result << Self::ASCII_CHAR_BITS) | i64::from(Self::MAX_ASCII_VALUE);
        }

        Some(result)
    }

    fn try_parse_hex_string(name: &str) -> Option<Self> {
        if name.len() != Self::HEX_STRING_LENGTH {
            return None;
        }

        u64::from_str_radix(name, 16)
            .ok()
            .map(|bits| Self::Single(bits as i64))
    }

    fn try_parse_pair_string(name: &str) -> Option<Self> {
        let (first, second) = name.split_once(Self::PAIR_SEPARATOR)?;
        if first.len() != Self::HEX_PART_LENGTH || second.len() != Self::HEX_PART_LENGTH {
            return None;
        }

        let key1 = u32::from_str_radix(first, 16).ok()?;
        let key2 = u32::from_str_radix(second, 16).ok()?;

        Some(Self::Pair(key1 as i32, key2 as i32))
    }

    /// First 8 bytes of SHA-256, little-endian.
    fn hash_string(name: &str) -> i64 {
        let digest = Sha256::digest(name.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        i64::from_le_bytes(bytes)
    }

    /// Returns the key as the pair of 32-bit halves Postgres reports in
    /// `pg_locks` (`classid`, `objid`).
    pub fn keys(&self) -> (i32, i32) {
        match self {
            Self::Single(k) => ((*k >> 32) as i32, (*k & 0xFFFF_FFFF) as i32),
            Self::Pair(k1, k2) => (*k1, *k2),
        }
    }
}
