//! CLI command implementations

pub mod build;
pub mod cache;
pub mod config;
pub mod graph;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use codeloom_cache::{CacheConfig, FileCacheConfig, MemoryCacheConfig};
use codeloom_config::{ConfigLoader, LoomConfig};

use crate::GlobalOptions;

const MB: u64 = 1024 * 1024;

/// Resolve the workspace path from options or current directory.
pub fn resolve_workspace(global: &GlobalOptions) -> Result<PathBuf> {
    if let Some(ref ws) = global.workspace {
        if !ws.is_dir() {
            anyhow::bail!("Workspace '{}' is not a directory", ws.display());
        }
        return ws
            .canonicalize()
            .with_context(|| format!("Failed to resolve workspace '{}'", ws.display()));
    }

    std::env::current_dir().context("Failed to get current directory")
}

/// Load configuration, honouring `--config` and global flag overrides.
pub fn load_config(global: &GlobalOptions, workspace: &Path) -> Result<LoomConfig> {
    let mut loader = ConfigLoader::new();
    let overrides = global.to_config_overrides();

    // An explicit file replaces the global/local merge
    if let Some(ref config_path) = global.config {
        return loader
            .load_file(config_path, Some(&overrides))
            .with_context(|| format!("Failed to load config file {}", config_path.display()));
    }

    loader
        .load(workspace, Some(&overrides))
        .context("Failed to load configuration")
}

/// Translate file-level cache settings into the cache crate's config.
pub fn cache_config(config: &LoomConfig, workspace: &Path) -> CacheConfig {
    let memory = &config.cache.memory;
    CacheConfig {
        memory: MemoryCacheConfig {
            max_size: usize::try_from(memory.max_size_mb.saturating_mul(MB)).unwrap_or(usize::MAX),
            max_items: memory.max_items,
            ttl_secs: (memory.ttl_secs > 0).then_some(memory.ttl_secs),
        },
        file: FileCacheConfig {
            directory: config.cache_dir(workspace),
            max_size: config.cache.file.max_size_mb.saturating_mul(MB),
        },
        enable_file_cache: config.cache.enable_file_cache,
        ..CacheConfig::default()
    }
}

/// Print an info message (respects quiet flag).
pub fn print_info(message: &str, quiet: bool) {
    if !quiet {
        eprintln!("{}", message);
    }
}
