//! Key normalization and warming signatures

use sha2::{Digest, Sha256};

/// Keys longer than this (in characters) are replaced by their digest
pub const MAX_KEY_LEN: usize = 200;

/// Canonical form of a caller-supplied key
///
/// Long keys become a hex SHA-256 digest of the original; everything else is
/// lower-cased with spaces replaced by underscores.
pub fn normalize_key(key: &str) -> String {
    if key.chars().count() > MAX_KEY_LEN {
        return hex::encode(Sha256::digest(key.as_bytes()));
    }
    key.to_lowercase().replace(' ', "_")
}

/// Coarse pattern of a normalized key: its first and last `_` tokens
///
/// `book_42_details` → `book_details`. Keys with a single token (including
/// digests) have no signature.
pub fn warming_signature(normalized: &str) -> Option<String> {
    let mut tokens = normalized.split('_').filter(|token| !token.is_empty());
    let first = tokens.next()?;
    let last = tokens.last()?;
    Some(format!("{first}_{last}"))
}
