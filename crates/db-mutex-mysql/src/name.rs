//! MySQL lock name limits and encoding.
//!
//! `GET_LOCK` rejects names longer than 64 characters. By default the backend
//! declares that limit and the mutex refuses longer names up front; with
//! hashing enabled, long names are shortened to a prefix plus a digest.

use std::borrow::Cow;

use sha2::{Digest, Sha512};

/// Maximum length for MySQL lock names, in characters.
pub const MAX_NAME_LENGTH: usize = 64;

/// Base32 digest length: SHA-512 truncated to 160 bits, 5 bits per char.
const HASH_LENGTH_IN_CHARS: usize = 160 / 5;

const BASE32_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz234567";

/// Returns a name `GET_LOCK` accepts.
///
/// Names within the limit pass through untouched. Longer names keep as much
/// of their beginning as fits in front of a base32 digest of the full name,
/// so distinct long names with a shared prefix still map to distinct locks.
pub fn encode_lock_name(name: &str) -> Cow<'_, str> {
    if name.chars().count() <= MAX_NAME_LENGTH {
        return Cow::Borrowed(name);
    }

    let prefix: String = name
        .chars()
        .take(MAX_NAME_LENGTH - HASH_LENGTH_IN_CHARS)
        .collect();
    Cow::Owned(format!("{prefix}{}", compute_hash(name.as_bytes())))
}

fn compute_hash(bytes: &[u8]) -> String {
    let digest = Sha512::digest(bytes);

    let mut chars = String::with_capacity(HASH_LENGTH_IN_CHARS);
    let mut bit_buffer = 0u32;
    let mut bits_remaining = 0;
    let mut bytes = digest.iter();

    for _ in 0..HASH_LENGTH_IN_CHARS {
        if bits_remaining < 5 {
            if let Some(&byte) = bytes.next() {
                bit_buffer |= u32::from(byte) << bits_remaining;
                bits_remaining += 8;
            }
        }

        chars.push(BASE32_ALPHABET[(bit_buffer & 31) as usize] as char);
        bit_buffer >>= 5;
        bits_remaining -= 5;
    }

    chars
}
