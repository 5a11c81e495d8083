//! Config command - View and initialize configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use codeloom_config::ConfigLoader;
use serde::Serialize;

use super::{load_config, resolve_workspace};
use crate::GlobalOptions;

/// Config management commands
#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the merged configuration
    Show {
        /// Output as JSON instead of TOML
        #[arg(long)]
        json: bool,
    },

    /// Show configuration file paths
    Path {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Write a default `.codeloom/config.toml` into the workspace
    Init,
}

/// Configuration paths
#[derive(Debug, Clone, Serialize)]
pub struct ConfigPaths {
    /// Global config file path
    pub global: Option<PathBuf>,
    /// Local config file path
    pub local: PathBuf,
    /// Whether global config exists
    pub global_exists: bool,
    /// Whether local config exists
    pub local_exists: bool,
}

/// Execute the config command
pub async fn execute(cmd: ConfigCommand, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;

    match cmd {
        ConfigCommand::Show { json } => {
            let config = load_config(&global, &workspace)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&config)?);
            } else {
                print!("{}", config.to_toml()?);
            }
        }
        ConfigCommand::Path { json } => {
            let loader = ConfigLoader::new();
            let global_path = loader.global_config_path();
            let local_path = loader.local_config_path(&workspace);

            let paths = ConfigPaths {
                global_exists: global_path.as_ref().is_some_and(|p| p.exists()),
                global: global_path,
                local_exists: local_path.exists(),
                local: local_path,
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&paths)?);
            } else {
                print_paths(&paths);
            }
        }
        ConfigCommand::Init => {
            let loader = ConfigLoader::new();
            let path = loader
                .init_local(&workspace)
                .context("Failed to initialize configuration")?;
            println!("Configuration at {}", path.display());
        }
    }

    Ok(())
}

fn print_paths(paths: &ConfigPaths) {
    println!("Configuration Paths");
    println!("===================\n");

    let status = |exists: bool| if exists { "exists" } else { "not found" };
    match paths.global {
        Some(ref gp) => println!("Global: {} ({})", gp.display(), status(paths.global_exists)),
        None => println!("Global: not available (no home directory)"),
    }
    println!(
        "Local:  {} ({})",
        paths.local.display(),
        status(paths.local_exists)
    );
}
