//! Cache key helpers.
//!
//! Extensions key derived data by file path plus a hash of the file's
//! content, so an edit to the file naturally misses the cache.

use codeloom_core::sha256_hex;

/// Separator between path and content hash
pub const KEY_SEPARATOR: &str = "::";

/// Build a cache key from a path and content hash: `"{path}::{hash}"`
pub fn generate_key(path: &str, content_hash: &str) -> String {
    format!("{}{}{}", path, KEY_SEPARATOR, content_hash)
}

/// Hex SHA-256 of `content`
pub fn hash_content(content: &[u8]) -> String {
    sha256_hex(content)
}

/// Cache key for a file with the given content
pub fn key_for_content(path: &str, content: &[u8]) -> String {
    generate_key(path, &hash_content(content))
}

/// Digest used to address a key on disk
pub(crate) fn key_digest(key: &str) -> String {
    sha256_hex(key.as_bytes())
}
