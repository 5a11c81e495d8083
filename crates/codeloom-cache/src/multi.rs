//! Multi-Level Cache Facade
//!
//! Reads go L1 (memory) then L2 (disk), promoting disk hits into memory.
//! Writes land in L1 immediately and are queued to a background writer
//! task for L2. The writer owns the only mutable access to the disk
//! store, so L2 writes are applied in submission order.
//!
//! Disk failures never reach the caller: they are logged and the lookup
//! degrades to a miss, or the write is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use codeloom_core::{system_clock, Clock};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::file::{FileCache, FileCacheStats};
use crate::memory::MemoryCache;

/// Hit/miss counters for the facade.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Lookups served from memory
    pub l1_hits: u64,
    /// Lookups served from disk
    pub l2_hits: u64,
    /// Lookups served by neither layer
    pub misses: u64,
    /// `(l1_hits + l2_hits) / lookups`, 0 before any lookup
    pub hit_rate: f64,
    /// Entries currently in memory
    pub l1_entries: usize,
    /// Bytes currently accounted for in memory
    pub l1_size: usize,
}

enum WriteCommand {
    Put { key: String, bytes: Vec<u8> },
    Flush(oneshot::Sender<()>),
}

#[derive(Debug, Default)]
struct Counters {
    l1_hits: AtomicU64,
    l2_hits: AtomicU64,
    misses: AtomicU64,
}

/// Two-level cache for serializable values.
///
/// Must be created inside a tokio runtime when the disk layer is enabled,
/// since construction spawns the writer task.
pub struct MultiLevelCache<V> {
    memory: MemoryCache<V>,
    file: Option<Arc<FileCache>>,
    writer: Option<mpsc::Sender<WriteCommand>>,
    counters: Counters,
}

impl<V> MultiLevelCache<V>
where
    V: Serialize + DeserializeOwned + Clone + Send + Sync + 'static,
{
    /// Create a cache using the wall clock
    pub fn new(config: &CacheConfig) -> Result<Self> {
        Self::with_clock(config, system_clock())
    }

    /// Create a cache driven by `clock`.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::NoRuntime`] if the disk layer is enabled and
    /// no tokio runtime is running.
    pub fn with_clock(config: &CacheConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let memory = MemoryCache::with_clock(&config.memory, clock.clone());

        if !config.enable_file_cache {
            debug!("Disk cache disabled, using memory only");
            return Ok(Self {
                memory,
                file: None,
                writer: None,
                counters: Counters::default(),
            });
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| CacheError::NoRuntime)?;
        let file = Arc::new(FileCache::with_clock(&config.file, clock));
        let (tx, rx) = mpsc::channel(config.write_queue_capacity.max(1));
        runtime.spawn(run_writer(file.clone(), rx));

        debug!(
            "Multi-level cache ready (disk at {})",
            config.file.directory.display()
        );
        Ok(Self {
            memory,
            file: Some(file),
            writer: Some(tx),
            counters: Counters::default(),
        })
    }

    /// Look up `key` in memory, then on disk.
    pub async fn get(&self, key: &str) -> Option<V> {
        if let Some(value) = self.memory.get(key) {
            self.counters.l1_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        if let Some(value) = self.get_from_disk(key).await {
            self.counters.l2_hits.fetch_add(1, Ordering::Relaxed);
            return Some(value);
        }

        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    async fn get_from_disk(&self, key: &str) -> Option<V> {
        let file = self.file.as_ref()?;
        let bytes = match file.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return None,
            Err(e) => {
                warn!("Disk cache read failed for {}: {}", key, e);
                return None;
            }
        };

        match serde_json::from_slice::<V>(&bytes) {
            Ok(value) => {
                self.memory.set(key, value.clone(), bytes.len());
                Some(value)
            }
            Err(e) => {
                warn!("Disk cache entry for {} could not be decoded: {}", key, e);
                None
            }
        }
    }

    /// Store `value` in memory and queue it for disk.
    ///
    /// Returns immediately; the disk write happens in the background and
    /// a full queue drops it with a warning.
    pub fn set(&self, key: impl Into<String>, value: V) {
        let key = key.into();
        let bytes = match serde_json::to_vec(&value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cache value for {} could not be encoded: {}", key, e);
                return;
            }
        };

        self.memory.set(key.clone(), value, bytes.len());

        if let Some(writer) = &self.writer {
            if let Err(e) = writer.try_send(WriteCommand::Put { key, bytes }) {
                match e {
                    mpsc::error::TrySendError::Full(WriteCommand::Put { key, .. }) => {
                        warn!("Disk cache write queue full, dropping write for {}", key)
                    }
                    _ => warn!("Disk cache writer stopped, write dropped"),
                }
            }
        }
    }

    /// Wait until every write queued so far has been applied to disk
    pub async fn flush(&self) {
        let Some(writer) = &self.writer else {
            return;
        };
        let (tx, rx) = oneshot::channel();
        if writer.send(WriteCommand::Flush(tx)).await.is_err() || rx.await.is_err() {
            warn!("Disk cache writer stopped before flush completed");
        }
    }

    /// Empty both layers.
    ///
    /// Pending disk writes are flushed first so they cannot resurrect
    /// cleared entries.
    pub async fn clear(&self) -> Result<()> {
        self.memory.clear();
        if let Some(file) = &self.file {
            self.flush().await;
            file.clear().await?;
        }
        Ok(())
    }

    /// Facade counters plus memory occupancy
    pub fn stats(&self) -> CacheStats {
        let l1_hits = self.counters.l1_hits.load(Ordering::Relaxed);
        let l2_hits = self.counters.l2_hits.load(Ordering::Relaxed);
        let misses = self.counters.misses.load(Ordering::Relaxed);
        let lookups = l1_hits + l2_hits + misses;
        CacheStats {
            l1_hits,
            l2_hits,
            misses,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                (l1_hits + l2_hits) as f64 / lookups as f64
            },
            l1_entries: self.memory.len(),
            l1_size: self.memory.current_size(),
        }
    }

    /// Disk usage, if the disk layer is enabled
    pub async fn disk_stats(&self) -> Result<Option<FileCacheStats>> {
        match &self.file {
            Some(file) => Ok(Some(file.stats().await?)),
            None => Ok(None),
        }
    }

    /// The memory layer
    pub fn memory(&self) -> &MemoryCache<V> {
        &self.memory
    }

    /// Whether the disk layer is enabled
    pub fn has_file_cache(&self) -> bool {
        self.file.is_some()
    }
}

impl<V> std::fmt::Debug for MultiLevelCache<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiLevelCache")
            .field("memory", &self.memory)
            .field("file", &self.file)
            .finish_non_exhaustive()
    }
}

/// Background task applying queued disk writes in order
async fn run_writer(file: Arc<FileCache>, mut rx: mpsc::Receiver<WriteCommand>) {
    while let Some(command) = rx.recv().await {
        match command {
            WriteCommand::Put { key, bytes } => {
                if let Err(e) = file.set(&key, &bytes).await {
                    warn!("Disk cache write failed for {}: {}", key, e);
                }
            }
            WriteCommand::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
    debug!("Disk cache writer stopped");
}
