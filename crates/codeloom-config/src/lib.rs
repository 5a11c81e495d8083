//! codeloom Configuration Management
//!
//! Provides configuration loading with support for:
//! - Global config: `~/.codeloom/config.toml`
//! - Local config: `.codeloom/config.toml` (in workspace)
//! - CLI overrides via `ConfigOverrides`
//!
//! Configuration is merged in order: global → local → CLI overrides.

mod error;
mod loader;

pub use error::ConfigError;
pub use loader::ConfigLoader;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

/// Root configuration for codeloom.
///
/// Represents the fully merged configuration from all sources.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(default)]
pub struct LoomConfig {
    /// Storage configuration
    pub storage: StorageConfig,

    /// Extension pipeline configuration
    pub pipeline: PipelineConfig,

    /// Result cache configuration
    pub cache: CacheSettings,

    /// Per-extension configuration tables, keyed by extension name
    ///
    /// ```toml
    /// [extensions.filesystem]
    /// exclude = ["target/**", "*.lock"]
    /// ```
    pub extensions: BTreeMap<String, toml::Table>,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// Storage configuration for graphs and cache data.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory for codeloom data (default: `.codeloom`)
    pub loom_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            loom_dir: PathBuf::from(".codeloom"),
        }
    }
}

/// Which extensions run, and how.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Extension names in run order
    pub extensions: Vec<String>,

    /// Run parse calls concurrently (merge order is unchanged)
    pub concurrent_parse: bool,

    /// How extensions generate node and edge ids
    pub id_strategy: IdStrategy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            extensions: vec!["filesystem".to_string(), "test-files".to_string()],
            concurrent_parse: false,
            id_strategy: IdStrategy::default(),
        }
    }
}

/// Id generation strategy.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum IdStrategy {
    /// `node_<n>` / `edge_<n>` counters, unique per run
    #[default]
    Sequential,
    /// Hash of the identifying fields; stable across runs
    ContentHash,
}

impl std::fmt::Display for IdStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sequential => write!(f, "sequential"),
            Self::ContentHash => write!(f, "content-hash"),
        }
    }
}

impl std::str::FromStr for IdStrategy {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "sequential" => Ok(Self::Sequential),
            "content-hash" | "content_hash" => Ok(Self::ContentHash),
            other => Err(ConfigError::invalid_value(
                "pipeline.id_strategy",
                format!("unknown strategy '{}'", other),
            )),
        }
    }
}

/// Cache configuration, in file-friendly units.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CacheSettings {
    /// Persist results to disk in addition to memory
    pub enable_file_cache: bool,

    /// In-memory layer
    pub memory: MemoryCacheSettings,

    /// On-disk layer
    pub file: FileCacheSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enable_file_cache: true,
            memory: MemoryCacheSettings::default(),
            file: FileCacheSettings::default(),
        }
    }
}

/// In-memory cache limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MemoryCacheSettings {
    /// Byte budget in MB
    pub max_size_mb: u64,

    /// Maximum number of entries
    pub max_items: usize,

    /// Entry lifetime in seconds; 0 disables expiry
    pub ttl_secs: u64,
}

impl Default for MemoryCacheSettings {
    fn default() -> Self {
        Self {
            max_size_mb: 64,
            max_items: 10_000,
            ttl_secs: 3600,
        }
    }
}

/// On-disk cache limits.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct FileCacheSettings {
    /// Cache directory; defaults to `<loom_dir>/cache`
    pub directory: Option<PathBuf>,

    /// Byte budget in MB
    pub max_size_mb: u64,
}

impl Default for FileCacheSettings {
    fn default() -> Self {
        Self {
            directory: None,
            max_size_mb: 512,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// CLI overrides for configuration values.
///
/// Used to apply command-line arguments over file-based config.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// Override codeloom data directory
    pub loom_dir: Option<PathBuf>,

    /// Override the extension list
    pub extensions: Option<Vec<String>>,

    /// Force the file cache on or off
    pub enable_file_cache: Option<bool>,

    /// Override concurrent parsing
    pub concurrent_parse: Option<bool>,

    /// Override log level
    pub log_level: Option<String>,
}

impl LoomConfig {
    /// Apply CLI overrides to this configuration.
    pub fn apply_overrides(&mut self, overrides: &ConfigOverrides) {
        if let Some(ref dir) = overrides.loom_dir {
            self.storage.loom_dir = dir.clone();
        }

        if let Some(ref extensions) = overrides.extensions {
            self.pipeline.extensions = extensions.clone();
        }

        if let Some(enabled) = overrides.enable_file_cache {
            self.cache.enable_file_cache = enabled;
        }

        if let Some(concurrent) = overrides.concurrent_parse {
            self.pipeline.concurrent_parse = concurrent;
        }

        if let Some(ref level) = overrides.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for name in &self.pipeline.extensions {
            if name.trim().is_empty() {
                return Err(ConfigError::invalid_value(
                    "pipeline.extensions",
                    "extension names must not be empty",
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::invalid_value(
                    "pipeline.extensions",
                    format!("duplicate '{}'", name),
                ));
            }
        }
        if self.cache.memory.max_items == 0 {
            return Err(ConfigError::invalid_value(
                "cache.memory.max_items",
                "must be at least 1",
            ));
        }
        Ok(())
    }

    /// Get the effective codeloom directory for a workspace.
    pub fn loom_dir(&self, workspace_root: &Path) -> PathBuf {
        if self.storage.loom_dir.is_absolute() {
            self.storage.loom_dir.clone()
        } else {
            workspace_root.join(&self.storage.loom_dir)
        }
    }

    /// Directory holding persisted graphs.
    pub fn graph_dir(&self, workspace_root: &Path) -> PathBuf {
        self.loom_dir(workspace_root).join("graphs")
    }

    /// Directory of the on-disk cache layer.
    pub fn cache_dir(&self, workspace_root: &Path) -> PathBuf {
        match self.cache.file.directory {
            Some(ref dir) if dir.is_absolute() => dir.clone(),
            Some(ref dir) => workspace_root.join(dir),
            None => self.loom_dir(workspace_root).join("cache"),
        }
    }

    /// Render as pretty TOML, the format of the config files.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Configuration table for one extension, as JSON.
    ///
    /// Extensions without a table get an empty object.
    pub fn extension_config(&self, name: &str) -> Result<serde_json::Value, ConfigError> {
        match self.extensions.get(name) {
            Some(table) => serde_json::to_value(table).map_err(|e| {
                ConfigError::invalid_value(format!("extensions.{}", name), e.to_string())
            }),
            None => Ok(serde_json::Value::Object(serde_json::Map::new())),
        }
    }
}
