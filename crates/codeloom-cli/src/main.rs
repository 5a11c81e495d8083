//! codeloom CLI - Property graph construction over pluggable extensions
//!
//! Runs the configured extensions over a workspace, persists the merged
//! graph, and lets you inspect graphs, the result cache and configuration.
//!
//! # Usage
//!
//! ```bash
//! # Build a graph for the current directory
//! codeloom build
//!
//! # Only the filesystem walker, without touching the cache
//! codeloom build --extensions filesystem --no-cache
//!
//! # List files in the latest graph
//! codeloom graph --type fs_file
//! ```

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod commands;
mod extensions;
mod progress;

/// codeloom - Unified property graph over codebase extensions
#[derive(Parser, Debug)]
#[command(name = "codeloom")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOptions,
}

/// Global options available to all commands
#[derive(Args, Debug, Clone)]
struct GlobalOptions {
    /// Workspace root to operate on
    #[arg(long, short = 'w', global = true, env = "CODELOOM_WORKSPACE")]
    workspace: Option<PathBuf>,

    /// Path to a configuration file, used instead of the global/local merge
    #[arg(long, short = 'c', global = true, env = "CODELOOM_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,
}

impl GlobalOptions {
    /// Convert global options to config overrides
    pub fn to_config_overrides(&self) -> codeloom_config::ConfigOverrides {
        let log_level = if self.quiet {
            Some("error".to_string())
        } else if self.verbose {
            Some("debug".to_string())
        } else {
            None
        };
        codeloom_config::ConfigOverrides {
            log_level,
            ..Default::default()
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the extension pipeline and persist the graph
    Build(commands::build::BuildArgs),

    /// Query the latest graph of the workspace
    Graph(commands::graph::GraphArgs),

    /// Inspect or clear the on-disk result cache
    #[command(subcommand)]
    Cache(commands::cache::CacheCommand),

    /// View and initialize configuration
    #[command(subcommand)]
    Config(commands::config::ConfigCommand),
}

/// Pick the log level: flags first, then `logging.level` from config.
fn log_level(global: &GlobalOptions) -> Level {
    if global.quiet {
        return Level::ERROR;
    }
    if global.verbose {
        return Level::DEBUG;
    }

    let configured = commands::resolve_workspace(global)
        .ok()
        .and_then(|ws| commands::load_config(global, &ws).ok())
        .map(|config| config.logging.level);
    configured
        .and_then(|level| level.parse().ok())
        .unwrap_or(Level::INFO)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level(&cli.global))
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Commands::Build(args) => commands::build::execute(args, cli.global).await,
        Commands::Graph(args) => commands::graph::execute(args, cli.global).await,
        Commands::Cache(cmd) => commands::cache::execute(cmd, cli.global).await,
        Commands::Config(cmd) => commands::config::execute(cmd, cli.global).await,
    }
}
