//! Cache command - Inspect or clear the on-disk result cache

use anyhow::{Context, Result};
use clap::Subcommand;
use codeloom_cache::{FileCache, FileCacheStats};
use serde::Serialize;

use super::{cache_config, load_config, print_info, resolve_workspace};
use crate::progress;
use crate::GlobalOptions;

/// Cache management commands
#[derive(Subcommand, Debug)]
pub enum CacheCommand {
    /// Show entry count and disk usage
    Stats {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Remove every cached entry
    Clear,
}

#[derive(Debug, Serialize)]
struct StatsOutput {
    directory: String,
    enabled: bool,
    #[serde(flatten)]
    stats: FileCacheStats,
}

/// Execute the cache command
pub async fn execute(cmd: CacheCommand, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;
    let config = load_config(&global, &workspace)?;
    let cache_config = cache_config(&config, &workspace);
    let cache = FileCache::new(&cache_config.file);

    match cmd {
        CacheCommand::Stats { json } => {
            let stats = cache.stats().await.context("Failed to read cache")?;
            let output = StatsOutput {
                directory: cache.directory().display().to_string(),
                enabled: cache_config.enable_file_cache,
                stats,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                println!("Cache:   {}", output.directory);
                if !output.enabled {
                    println!("         (disabled by cache.enable_file_cache)");
                }
                println!("Entries: {}", output.stats.entries);
                println!(
                    "Size:    {} / {}",
                    human_bytes(output.stats.total_size),
                    human_bytes(output.stats.max_size)
                );
            }
        }
        CacheCommand::Clear => {
            let spinner = progress::spinner("Clearing cache...", global.quiet);
            let before = cache.stats().await.context("Failed to read cache")?;
            cache.clear().await.context("Failed to clear cache")?;
            progress::finish_spinner(
                spinner,
                &format!("Removed {} cached entries", before.entries),
            );
            print_info(&format!("Cleared {}", cache.directory().display()), global.quiet);
        }
    }

    Ok(())
}

fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}
