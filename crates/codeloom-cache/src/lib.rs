//! codeloom Cache - Two-level cache for derived per-file data
//!
//! Extensions use this crate to avoid recomputing expensive derivations
//! for files whose content has not changed:
//! - `MemoryCache`: LRU bounded by entry count and bytes, with TTL
//! - `FileCache`: content-addressed JSON store on disk with a size budget
//! - `MultiLevelCache`: memory-then-disk facade with background disk writes
//!
//! Keys are usually built with [`key_for_content`], so edited files miss.

pub mod config;
pub mod error;
pub mod file;
pub mod key;
pub mod memory;
pub mod multi;

pub use config::{CacheConfig, FileCacheConfig, MemoryCacheConfig};
pub use error::{CacheError, Result};
pub use file::{EntryMeta, FileCache, FileCacheStats, CACHE_FORMAT_VERSION};
pub use key::{generate_key, hash_content, key_for_content, KEY_SEPARATOR};
pub use memory::{CacheMetrics, MemoryCache};
pub use multi::{CacheStats, MultiLevelCache};
