//! Configuration loader with inheritance support.
//!
//! Loads configuration from multiple sources and merges them:
//! 1. Global config: `~/.codeloom/config.toml`
//! 2. Local config: `.codeloom/config.toml` (in workspace)
//! 3. CLI overrides
//!
//! Later sources override earlier ones. Files are merged key by key before
//! being interpreted, so a local file only needs the keys it changes.
//! Arrays are replaced, not concatenated.

use crate::error::ConfigError;
use crate::{ConfigOverrides, LoomConfig};
use std::path::{Path, PathBuf};
use toml::{Table, Value};
use tracing::{debug, trace};

/// Configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Global configuration directory name.
const GLOBAL_CONFIG_DIR: &str = ".codeloom";

/// Local configuration directory name.
const LOCAL_CONFIG_DIR: &str = ".codeloom";

/// Configuration loader with caching and inheritance support.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Global config directory (e.g., `~/.codeloom`)
    global_config_dir: Option<PathBuf>,

    /// Cached raw global config
    global_table: Option<Table>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    /// Create a new configuration loader.
    ///
    /// Automatically detects the global config directory (`~/.codeloom`).
    pub fn new() -> Self {
        let global_config_dir = dirs::home_dir().map(|h| h.join(GLOBAL_CONFIG_DIR));

        Self {
            global_config_dir,
            global_table: None,
        }
    }

    /// Create a loader with a custom global config directory.
    ///
    /// Useful for testing.
    pub fn with_global_dir(global_dir: impl Into<PathBuf>) -> Self {
        Self {
            global_config_dir: Some(global_dir.into()),
            global_table: None,
        }
    }

    /// Get the global config file path.
    pub fn global_config_path(&self) -> Option<PathBuf> {
        self.global_config_dir
            .as_ref()
            .map(|d| d.join(CONFIG_FILE_NAME))
    }

    /// Get the local config file path for a workspace.
    pub fn local_config_path(&self, workspace_root: &Path) -> PathBuf {
        workspace_root.join(LOCAL_CONFIG_DIR).join(CONFIG_FILE_NAME)
    }

    /// Load configuration for a workspace with optional CLI overrides.
    ///
    /// Merges config in order: defaults → global → local → overrides.
    pub fn load(
        &mut self,
        workspace_root: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<LoomConfig, ConfigError> {
        let mut merged = Table::new();

        if let Some(global) = self.global_table()? {
            deep_merge(&mut merged, global);
        }

        if let Some(local) = self.local_table(workspace_root)? {
            deep_merge(&mut merged, local);
        }

        let mut config = interpret(merged)?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a single configuration file, bypassing the global/local merge.
    pub fn load_file(
        &self,
        path: &Path,
        overrides: Option<&ConfigOverrides>,
    ) -> Result<LoomConfig, ConfigError> {
        debug!("Loading config from {:?}", path);
        let mut config = interpret(read_table(path)?)?;

        if let Some(ovr) = overrides {
            config.apply_overrides(ovr);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load only the global configuration.
    pub fn load_global(&mut self) -> Result<Option<LoomConfig>, ConfigError> {
        self.global_table()?.map(interpret).transpose()
    }

    /// Load only the local configuration for a workspace.
    pub fn load_local(&self, workspace_root: &Path) -> Result<Option<LoomConfig>, ConfigError> {
        self.local_table(workspace_root)?.map(interpret).transpose()
    }

    fn global_table(&mut self) -> Result<Option<Table>, ConfigError> {
        if let Some(ref table) = self.global_table {
            return Ok(Some(table.clone()));
        }

        let Some(global_path) = self.global_config_path() else {
            debug!("No home directory found, skipping global config");
            return Ok(None);
        };

        if !global_path.exists() {
            trace!("Global config not found at {:?}", global_path);
            return Ok(None);
        }

        debug!("Loading global config from {:?}", global_path);
        let table = read_table(&global_path)?;
        self.global_table = Some(table.clone());

        Ok(Some(table))
    }

    fn local_table(&self, workspace_root: &Path) -> Result<Option<Table>, ConfigError> {
        let local_path = self.local_config_path(workspace_root);

        if !local_path.exists() {
            trace!("Local config not found at {:?}", local_path);
            return Ok(None);
        }

        debug!("Loading local config from {:?}", local_path);
        read_table(&local_path).map(Some)
    }

    /// Save configuration to the global config file.
    pub fn save_global(&self, config: &LoomConfig) -> Result<(), ConfigError> {
        let Some(ref global_dir) = self.global_config_dir else {
            return Err(ConfigError::NoHomeDir);
        };

        save_config_file(&global_dir.join(CONFIG_FILE_NAME), config)
    }

    /// Save configuration to the local config file for a workspace.
    pub fn save_local(&self, workspace_root: &Path, config: &LoomConfig) -> Result<(), ConfigError> {
        save_config_file(&self.local_config_path(workspace_root), config)
    }

    /// Initialize local configuration for a workspace.
    ///
    /// Creates `.codeloom/config.toml` with default configuration. An
    /// existing file is left untouched.
    pub fn init_local(&self, workspace_root: &Path) -> Result<PathBuf, ConfigError> {
        let config_path = self.local_config_path(workspace_root);
        if !config_path.exists() {
            save_config_file(&config_path, &LoomConfig::default())?;
        }

        Ok(config_path)
    }

    /// Clear cached global configuration.
    ///
    /// Forces reload on next `load()` call.
    pub fn clear_cache(&mut self) {
        self.global_table = None;
    }
}

/// Read a configuration file as a raw TOML table.
fn read_table(path: &Path) -> Result<Table, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::read_file(path, e))?;

    content
        .parse::<Table>()
        .map_err(|e| ConfigError::parse_toml(path, e))
}

fn interpret(table: Table) -> Result<LoomConfig, ConfigError> {
    Value::Table(table)
        .try_into::<LoomConfig>()
        .map_err(ConfigError::Merge)
}

/// Save a configuration file to disk.
fn save_config_file(path: &Path, config: &LoomConfig) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::create_dir(parent, e))?;
        }
    }

    let content = config.to_toml()?;
    std::fs::write(path, content).map_err(|e| ConfigError::write_file(path, e))
}

/// Merge `overlay` into `base`. Nested tables merge recursively; any other
/// value in `overlay` replaces the one in `base`.
fn deep_merge(base: &mut Table, overlay: Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(Value::Table(existing)), Value::Table(incoming)) => {
                deep_merge(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
