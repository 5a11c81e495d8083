//! L2 File Cache
//!
//! Content-addressed store on disk. For key `K` with `H = sha256(K)`:
//!
//! ```text
//! <dir>/<H[0:2]>/<H>.json       value
//! <dir>/<H[0:2]>/<H>.meta.json  {key, timestamp, size, version}
//! ```
//!
//! Entries never expire. An entry written by a different format version is
//! treated as a miss and deleted on read. When a write would push the total
//! stored size past the budget, the oldest entries (by write timestamp) are
//! evicted first.
//!
//! Sizes and write times are tracked in an in-memory index, seeded by one
//! scan of the directory on first use. That scan also removes files that
//! fall outside the budget accounting: corrupt or stale sidecars, value
//! files without a sidecar, and leftover temp files. The directory is
//! assumed to have a single writing process at a time.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeloom_core::{system_clock, Clock};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::config::FileCacheConfig;
use crate::error::{CacheError, Result};
use crate::key::key_digest;

/// On-disk format version. Bump when the value or sidecar layout changes.
pub const CACHE_FORMAT_VERSION: u32 = 1;

const VALUE_EXT: &str = ".json";
const META_EXT: &str = ".meta.json";
const TMP_EXT: &str = ".tmp";

/// Sidecar metadata stored next to every value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Original cache key
    pub key: String,
    /// Write time in epoch millis
    pub timestamp: u64,
    /// Value size in bytes
    pub size: u64,
    /// Format version the entry was written with
    pub version: u32,
}

/// Disk usage summary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileCacheStats {
    /// Number of stored entries
    pub entries: usize,
    /// Sum of stored value sizes in bytes
    pub total_size: u64,
    /// Configured budget in bytes
    pub max_size: u64,
}

/// A stored entry found while scanning the directory
#[derive(Debug)]
struct StoredEntry {
    digest: String,
    meta: EntryMeta,
}

/// Size and age of every stored entry, keyed by digest
#[derive(Debug, Default)]
struct DiskIndex {
    entries: HashMap<String, IndexedEntry>,
    by_age: BTreeSet<(u64, String)>,
    total_size: u64,
}

#[derive(Debug, Clone)]
struct IndexedEntry {
    key: String,
    timestamp: u64,
    size: u64,
}

impl DiskIndex {
    fn from_entries(entries: Vec<StoredEntry>) -> Self {
        let mut index = Self::default();
        for entry in entries {
            index.insert(
                entry.digest,
                IndexedEntry {
                    key: entry.meta.key,
                    timestamp: entry.meta.timestamp,
                    size: entry.meta.size,
                },
            );
        }
        index
    }

    fn insert(&mut self, digest: String, entry: IndexedEntry) {
        self.remove(&digest);
        self.total_size += entry.size;
        self.by_age.insert((entry.timestamp, digest.clone()));
        self.entries.insert(digest, entry);
    }

    fn remove(&mut self, digest: &str) -> Option<IndexedEntry> {
        let entry = self.entries.remove(digest)?;
        self.total_size -= entry.size;
        self.by_age.remove(&(entry.timestamp, digest.to_string()));
        Some(entry)
    }

    /// Reserve `size` bytes for `digest`, dropping the oldest other entries
    /// from the index until the total fits `max_size`.
    ///
    /// Returns the evicted entries; their files still have to be removed.
    fn reserve(
        &mut self,
        digest: &str,
        entry: IndexedEntry,
        max_size: u64,
    ) -> Vec<(String, IndexedEntry)> {
        // The entry being replaced frees its own space
        self.remove(digest);

        let mut victims = Vec::new();
        while self.total_size + entry.size > max_size {
            let Some((_, oldest)) = self.by_age.iter().next().cloned() else {
                break;
            };
            if let Some(evicted) = self.remove(&oldest) {
                victims.push((oldest, evicted));
            }
        }
        self.insert(digest.to_string(), entry);
        victims
    }
}

/// Persistent content-addressed cache.
#[derive(Debug)]
pub struct FileCache {
    directory: PathBuf,
    max_size: u64,
    clock: Arc<dyn Clock>,
    index: Mutex<DiskIndex>,
    seeded: OnceCell<()>,
}

impl FileCache {
    /// Create a cache using the wall clock. Nothing is touched on disk yet.
    pub fn new(config: &FileCacheConfig) -> Self {
        Self::with_clock(config, system_clock())
    }

    /// Create a cache that timestamps entries with `clock`
    pub fn with_clock(config: &FileCacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            directory: config.directory.clone(),
            max_size: config.max_size,
            clock,
            index: Mutex::new(DiskIndex::default()),
            seeded: OnceCell::new(),
        }
    }

    /// Root directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// Path of the value file for `key`
    pub fn value_path(&self, key: &str) -> PathBuf {
        self.entry_path(&key_digest(key), VALUE_EXT)
    }

    /// Path of the sidecar metadata for `key`
    pub fn meta_path(&self, key: &str) -> PathBuf {
        self.entry_path(&key_digest(key), META_EXT)
    }

    fn shard_dir(&self, digest: &str) -> PathBuf {
        self.directory.join(&digest[..2])
    }

    fn entry_path(&self, digest: &str, ext: &str) -> PathBuf {
        self.shard_dir(digest).join(format!("{}{}", digest, ext))
    }

    // ========================================================================
    // Read
    // ========================================================================

    /// Read the raw value for `key`.
    ///
    /// Returns `Ok(None)` for absent, stale-format or corrupt entries.
    pub async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let digest = key_digest(key);
        let meta_path = self.entry_path(&digest, META_EXT);

        let meta = match read_meta(&meta_path).await? {
            MetaRead::Missing => return Ok(None),
            MetaRead::Corrupt => {
                warn!("Corrupt cache metadata at {}, removing", meta_path.display());
                self.remove_digest(&digest).await?;
                return Ok(None);
            }
            MetaRead::Found(meta) => meta,
        };

        if meta.version != CACHE_FORMAT_VERSION {
            debug!(
                "Stale cache entry for {} (version {} != {}), removing",
                key, meta.version, CACHE_FORMAT_VERSION
            );
            self.remove_digest(&digest).await?;
            return Ok(None);
        }

        if meta.key != key {
            // Digest collision or foreign file: leave it alone
            debug!("Cache key mismatch at {}", meta_path.display());
            return Ok(None);
        }

        let value_path = self.entry_path(&digest, VALUE_EXT);
        match fs::read(&value_path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.remove_digest(&digest).await?;
                Ok(None)
            }
            Err(e) => Err(CacheError::io(value_path, e)),
        }
    }

    /// Read and decode a JSON value
    pub async fn get_json<V: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<V>> {
        match self.get(key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    // ========================================================================
    // Write
    // ========================================================================

    /// Store `value` under `key`, evicting older entries if the budget
    /// requires it.
    ///
    /// Returns `Ok(false)` when the value alone exceeds the budget and was
    /// not written.
    pub async fn set(&self, key: &str, value: &[u8]) -> Result<bool> {
        let size = value.len() as u64;
        if size > self.max_size {
            debug!(
                "Value for {} ({} bytes) exceeds disk cache budget, skipping",
                key, size
            );
            return Ok(false);
        }

        self.ensure_index().await?;

        let digest = key_digest(key);
        let timestamp = self.clock.now_millis();
        let victims = self.index.lock().reserve(
            &digest,
            IndexedEntry {
                key: key.to_string(),
                timestamp,
                size,
            },
            self.max_size,
        );

        for (victim, entry) in victims {
            debug!("Evicting disk cache entry {}", entry.key);
            self.remove_files(&victim).await?;
        }

        let meta = EntryMeta {
            key: key.to_string(),
            timestamp,
            size,
            version: CACHE_FORMAT_VERSION,
        };
        if let Err(e) = self.write_entry(&digest, value, &meta).await {
            self.index.lock().remove(&digest);
            return Err(e);
        }

        trace!("Wrote cache entry {} ({} bytes)", key, size);
        Ok(true)
    }

    async fn write_entry(&self, digest: &str, value: &[u8], meta: &EntryMeta) -> Result<()> {
        let shard = self.shard_dir(digest);
        fs::create_dir_all(&shard)
            .await
            .map_err(|e| CacheError::io(&shard, e))?;

        write_atomic(&self.entry_path(digest, VALUE_EXT), value).await?;
        write_atomic(
            &self.entry_path(digest, META_EXT),
            &serde_json::to_vec(meta)?,
        )
        .await
    }

    /// Encode `value` as JSON and store it
    pub async fn set_json<V: Serialize>(&self, key: &str, value: &V) -> Result<bool> {
        let bytes = serde_json::to_vec(value)?;
        self.set(key, &bytes).await
    }

    /// Remove the entry for `key`
    pub async fn remove(&self, key: &str) -> Result<()> {
        self.remove_digest(&key_digest(key)).await
    }

    /// Remove every file under the cache directory
    pub async fn clear(&self) -> Result<()> {
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(CacheError::io(&self.directory, e)),
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.directory, e))?
        {
            let path = entry.path();
            let file_type = entry
                .file_type()
                .await
                .map_err(|e| CacheError::io(&path, e))?;
            let removed = if file_type.is_dir() {
                fs::remove_dir_all(&path).await
            } else {
                fs::remove_file(&path).await
            };
            removed.map_err(|e| CacheError::io(&path, e))?;
        }

        *self.index.lock() = DiskIndex::default();
        debug!("Cleared disk cache at {}", self.directory.display());
        Ok(())
    }

    /// Entry count and stored bytes
    pub async fn stats(&self) -> Result<FileCacheStats> {
        self.ensure_index().await?;
        let index = self.index.lock();
        Ok(FileCacheStats {
            entries: index.entries.len(),
            total_size: index.total_size,
            max_size: self.max_size,
        })
    }

    // ========================================================================
    // Internals
    // ========================================================================

    /// Build the index from disk once, before the first write or stats call
    async fn ensure_index(&self) -> Result<()> {
        self.seeded
            .get_or_try_init(|| async {
                let entries = self.scan().await?;
                let index = DiskIndex::from_entries(entries);
                debug!(
                    "Indexed disk cache at {}: {} entries, {} bytes",
                    self.directory.display(),
                    index.entries.len(),
                    index.total_size
                );
                *self.index.lock() = index;
                Ok::<(), CacheError>(())
            })
            .await?;
        Ok(())
    }

    /// Every valid entry under the directory.
    ///
    /// Files that cannot belong to a valid entry are deleted on the way.
    async fn scan(&self) -> Result<Vec<StoredEntry>> {
        let mut found = Vec::new();
        let mut shards = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(CacheError::io(&self.directory, e)),
        };

        while let Some(shard) = shards
            .next_entry()
            .await
            .map_err(|e| CacheError::io(&self.directory, e))?
        {
            let shard_path = shard.path();
            let is_dir = shard
                .file_type()
                .await
                .map_err(|e| CacheError::io(&shard_path, e))?
                .is_dir();
            if is_dir {
                found.extend(self.scan_shard(&shard_path).await?);
            }
        }
        Ok(found)
    }

    async fn scan_shard(&self, shard_path: &Path) -> Result<Vec<StoredEntry>> {
        let mut names = Vec::new();
        let mut files = fs::read_dir(shard_path)
            .await
            .map_err(|e| CacheError::io(shard_path, e))?;
        while let Some(file) = files
            .next_entry()
            .await
            .map_err(|e| CacheError::io(shard_path, e))?
        {
            if let Some(name) = file.file_name().to_str() {
                names.push(name.to_string());
            }
        }

        let sidecars: HashSet<&str> = names
            .iter()
            .filter_map(|n| n.strip_suffix(META_EXT))
            .collect();

        let mut found = Vec::new();
        for name in &names {
            if name.ends_with(TMP_EXT) {
                debug!("Removing interrupted cache write {}", name);
                remove_if_present(&shard_path.join(name)).await?;
            } else if let Some(digest) = name.strip_suffix(META_EXT) {
                match read_meta(&shard_path.join(name)).await? {
                    MetaRead::Found(meta) if meta.version == CACHE_FORMAT_VERSION => {
                        found.push(StoredEntry {
                            digest: digest.to_string(),
                            meta,
                        });
                    }
                    MetaRead::Missing => {}
                    MetaRead::Found(_) | MetaRead::Corrupt => {
                        warn!("Removing unreadable or stale cache entry {}", digest);
                        self.remove_files(digest).await?;
                    }
                }
            } else if let Some(digest) = name.strip_suffix(VALUE_EXT) {
                if !sidecars.contains(digest) {
                    warn!("Removing cache value without metadata {}", digest);
                    remove_if_present(&shard_path.join(name)).await?;
                }
            }
        }
        Ok(found)
    }

    /// Delete an entry's files and forget it
    async fn remove_digest(&self, digest: &str) -> Result<()> {
        self.index.lock().remove(digest);
        self.remove_files(digest).await
    }

    async fn remove_files(&self, digest: &str) -> Result<()> {
        for ext in [VALUE_EXT, META_EXT] {
            remove_if_present(&self.entry_path(digest, ext)).await?;
        }
        Ok(())
    }
}

async fn remove_if_present(path: &Path) -> Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(CacheError::io(path, e)),
    }
}

enum MetaRead {
    Missing,
    Corrupt,
    Found(EntryMeta),
}

async fn read_meta(path: &Path) -> Result<MetaRead> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(MetaRead::Missing),
        Err(e) => return Err(CacheError::io(path, e)),
    };
    Ok(match serde_json::from_slice(&bytes) {
        Ok(meta) => MetaRead::Found(meta),
        Err(_) => MetaRead::Corrupt,
    })
}

/// Write through a temp file so readers never observe a partial value
async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(TMP_EXT);
    let tmp = PathBuf::from(tmp);

    fs::write(&tmp, bytes)
        .await
        .map_err(|e| CacheError::io(&tmp, e))?;
    fs::rename(&tmp, path)
        .await
        .map_err(|e| CacheError::io(path, e))
}
