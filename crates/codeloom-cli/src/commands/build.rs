//! Build command - Run the extension pipeline over the workspace

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use codeloom_cache::{CacheStats, MultiLevelCache};
use codeloom_core::GraphStats;
use codeloom_engine::{
    ExtensionContribution, ExtensionFailure, JsonFileGraphRepository, ParseOptions,
    ParsingService,
};
use serde::Serialize;
use tracing::{info, warn};

use super::{cache_config, load_config, print_info, resolve_workspace};
use crate::extensions::{self, Resources};
use crate::progress;
use crate::GlobalOptions;

/// Arguments for the build command
#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Extensions to run, in order (overrides `pipeline.extensions`)
    #[arg(long, short = 'e', value_delimiter = ',')]
    extensions: Option<Vec<String>>,

    /// Derive everything from scratch and leave the cache untouched
    #[arg(long)]
    no_cache: bool,

    /// Run parse calls concurrently
    #[arg(long)]
    concurrent: bool,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

/// Machine-readable build summary
#[derive(Debug, Serialize)]
struct BuildSummary {
    graph_id: String,
    codebase_id: String,
    stats: GraphStats,
    domains: Vec<String>,
    contributions: Vec<ExtensionContribution>,
    failures: Vec<ExtensionFailure>,
    cache: Option<CacheStats>,
}

/// Execute the build command
pub async fn execute(args: BuildArgs, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;
    let mut config = load_config(&global, &workspace)?;
    if let Some(extensions) = args.extensions {
        config.pipeline.extensions = extensions;
        config.validate()?;
    }
    if args.concurrent {
        config.pipeline.concurrent_parse = true;
    }

    let file_facts = if args.no_cache {
        None
    } else {
        let cache = MultiLevelCache::new(&cache_config(&config, &workspace))
            .context("Failed to open result cache")?;
        Some(Arc::new(cache))
    };
    let resources = Resources {
        file_facts: file_facts.clone(),
    };
    let extensions = extensions::resolve(&config.pipeline.extensions, &resources)?;

    let repository = Arc::new(JsonFileGraphRepository::new(config.graph_dir(&workspace)));
    let mut service = ParsingService::new(extensions.clone(), repository)
        .with_id_generator(extensions::id_generator(config.pipeline.id_strategy))
        .with_concurrent_parse(config.pipeline.concurrent_parse);
    for name in &config.pipeline.extensions {
        service = service.with_extension_config(name.as_str(), config.extension_config(name)?);
    }

    let quiet = global.quiet || args.json;
    print_info(
        &format!(
            "Building graph for {} with [{}]",
            workspace.display(),
            config.pipeline.extensions.join(", ")
        ),
        quiet,
    );

    let bar = progress::phase_bar("Running extensions", quiet);
    let callback_bar = bar.clone();
    let options = ParseOptions::new().with_progress(move |current, total| {
        progress::update(&callback_bar, current, total);
    });
    let run = service.parse_with_report(&workspace, options).await;

    for extension in &extensions {
        if let Err(e) = extension.dispose().await {
            warn!("Failed to dispose {}: {:#}", extension.metadata().name, e);
        }
    }

    let run = match run {
        Ok(run) => run,
        Err(e) => {
            progress::finish_spinner_warn(bar, "Build failed");
            return Err(e).context("Failed to build graph");
        }
    };

    let graph = &run.graph;
    let summary = BuildSummary {
        graph_id: graph.id().to_string(),
        codebase_id: graph.metadata().codebase_id.clone(),
        stats: graph.stats(),
        domains: graph.all_domains().into_iter().collect(),
        contributions: run.report.contributions.clone(),
        failures: run.report.failures.clone(),
        cache: file_facts.as_ref().map(|c| c.stats()),
    };
    info!(
        "Built graph {} ({} nodes, {} edges)",
        summary.graph_id, summary.stats.node_count, summary.stats.edge_count
    );

    if run.report.is_clean() {
        progress::finish_spinner(bar, "Extensions finished");
    } else {
        progress::finish_spinner_warn(
            bar,
            &format!("{} extension failure(s)", run.report.failures.len()),
        );
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &BuildSummary) {
    println!("Graph:   {}", summary.graph_id);
    println!(
        "Nodes:   {}  Edges: {}  Avg degree: {:.2}",
        summary.stats.node_count, summary.stats.edge_count, summary.stats.average_degree
    );
    if !summary.domains.is_empty() {
        println!("Domains: {}", summary.domains.join(", "));
    }

    println!();
    for c in &summary.contributions {
        println!(
            "  {:<14} {:>6} nodes {:>6} parse edges {:>6} link edges",
            c.extension, c.nodes, c.parse_edges, c.link_edges
        );
    }

    for f in &summary.failures {
        println!("  ! {} failed during {}: {}", f.extension, f.phase, f.message);
    }

    if let Some(ref cache) = summary.cache {
        println!();
        println!(
            "Cache:   {} memory hits, {} disk hits, {} misses ({:.0}% hit rate)",
            cache.l1_hits,
            cache.l2_hits,
            cache.misses,
            cache.hit_rate * 100.0
        );
    }
}
