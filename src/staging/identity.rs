//! Content identity: SHA-256 over the exact uploaded bytes

use sha2::{Digest, Sha256};

use crate::cache::cache_key;

/// Hex length of the hash prefix used in staged file names
pub const SHORT_HASH_LEN: usize = 16;

/// Lower-case hex SHA-256 of `bytes`
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Cache key for raw image content
pub fn cache_key_for_bytes(bytes: &[u8]) -> String {
    cache_key(&content_hash(bytes))
}

pub fn short_hash(hash: &str) -> &str {
    &hash[..hash.len().min(SHORT_HASH_LEN)]
}
