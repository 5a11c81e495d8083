//! Cache configuration.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default in-memory budget (64 MB)
pub const DEFAULT_MEMORY_MAX_SIZE: usize = 64 * 1024 * 1024;

/// Default in-memory entry ceiling
pub const DEFAULT_MEMORY_MAX_ITEMS: usize = 10_000;

/// Default in-memory time-to-live (1 hour)
pub const DEFAULT_MEMORY_TTL_SECS: u64 = 60 * 60;

/// Default on-disk budget (512 MB)
pub const DEFAULT_FILE_MAX_SIZE: u64 = 512 * 1024 * 1024;

/// Default cache directory, relative to the workspace
pub const DEFAULT_CACHE_DIR: &str = ".codeloom/cache";

/// Default capacity of the background write queue
pub const DEFAULT_WRITE_QUEUE_CAPACITY: usize = 1024;

/// L1 (memory) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryCacheConfig {
    /// Total byte budget
    pub max_size: usize,

    /// Entry ceiling
    pub max_items: usize,

    /// Time-to-live from insertion, in seconds. `None` disables expiry.
    pub ttl_secs: Option<u64>,
}

impl MemoryCacheConfig {
    /// TTL as a duration
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

impl Default for MemoryCacheConfig {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MEMORY_MAX_SIZE,
            max_items: DEFAULT_MEMORY_MAX_ITEMS,
            ttl_secs: Some(DEFAULT_MEMORY_TTL_SECS),
        }
    }
}

/// L2 (disk) settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileCacheConfig {
    /// Root directory of the store
    pub directory: PathBuf,

    /// Total byte budget for stored values
    pub max_size: u64,
}

impl Default for FileCacheConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from(DEFAULT_CACHE_DIR),
            max_size: DEFAULT_FILE_MAX_SIZE,
        }
    }
}

/// Settings for [`MultiLevelCache`](crate::MultiLevelCache).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// L1 settings
    pub memory: MemoryCacheConfig,

    /// L2 settings
    pub file: FileCacheConfig,

    /// Whether L2 is used at all
    pub enable_file_cache: bool,

    /// Pending L2 writes before new ones are dropped
    pub write_queue_capacity: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory: MemoryCacheConfig::default(),
            file: FileCacheConfig::default(),
            enable_file_cache: true,
            write_queue_capacity: DEFAULT_WRITE_QUEUE_CAPACITY,
        }
    }
}

impl CacheConfig {
    /// Memory-only configuration
    pub fn memory_only() -> Self {
        Self {
            enable_file_cache: false,
            ..Self::default()
        }
    }

    /// Set the L2 directory
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.file.directory = directory.into();
        self
    }
}
