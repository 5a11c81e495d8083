//! Graph command - Query the latest graph of the workspace

use anyhow::{Context, Result};
use clap::Args;
use codeloom_core::{Edge, Node, NodeType, PropertyGraph};
use codeloom_engine::{GraphQuery, GraphRepository, JsonFileGraphRepository, QueryCriteria};
use serde::Serialize;

use super::{load_config, resolve_workspace};
use crate::GlobalOptions;

/// Arguments for the graph command
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Filter nodes by type (e.g. fs_file, class)
    #[arg(long = "type", short = 't', value_parser = parse_node_type)]
    node_type: Option<NodeType>,

    /// Filter nodes by label (repeat to require several)
    #[arg(long, short = 'l')]
    label: Vec<String>,

    /// Filter nodes by provenance domain
    #[arg(long, short = 'd')]
    domain: Option<String>,

    /// Show one node with its incoming and outgoing edges
    #[arg(long, conflicts_with_all = ["node_type", "label", "domain"])]
    id: Option<String>,

    /// Read this stored graph instead of the latest one
    #[arg(long)]
    graph: Option<String>,

    /// List stored graphs for every codebase instead of querying
    #[arg(long, conflicts_with_all = ["node_type", "label", "domain", "id", "graph"])]
    history: bool,

    /// Maximum nodes to list
    #[arg(long, short = 'n', default_value = "50")]
    limit: usize,

    /// Output as JSON
    #[arg(long)]
    json: bool,
}

fn parse_node_type(s: &str) -> Result<NodeType, String> {
    s.parse().map_err(|e: codeloom_core::CoreError| e.to_string())
}

/// One node with its neighbourhood
#[derive(Debug, Serialize)]
struct NodeDetail<'a> {
    node: &'a Node,
    outgoing: Vec<&'a Edge>,
    incoming: Vec<&'a Edge>,
}

/// Execute the graph command
pub async fn execute(args: GraphArgs, global: GlobalOptions) -> Result<()> {
    let workspace = resolve_workspace(&global)?;
    let config = load_config(&global, &workspace)?;
    let repository = JsonFileGraphRepository::new(config.graph_dir(&workspace));

    if args.history {
        let graphs = repository.list().await.context("Failed to list graphs")?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&graphs)?);
        } else if graphs.is_empty() {
            println!("No graphs stored in {}", repository.directory().display());
        } else {
            for meta in graphs {
                println!(
                    "{}  {}  [{}]  {}",
                    meta.id,
                    meta.created_at,
                    meta.extensions.join(", "),
                    meta.codebase_id
                );
            }
        }
        return Ok(());
    }

    let graph = match args.graph {
        Some(ref id) => repository.find_by_id(id).await?,
        None => {
            repository
                .find_by_codebase_id(&workspace.to_string_lossy())
                .await?
        }
    };
    let Some(graph) = graph else {
        anyhow::bail!(
            "No graph found for {}. Run `codeloom build` first.",
            workspace.display()
        );
    };

    if let Some(ref id) = args.id {
        return show_node(&graph, id, args.json);
    }

    let mut criteria = QueryCriteria::new();
    if let Some(node_type) = args.node_type {
        criteria = criteria.with_type(node_type);
    }
    for label in &args.label {
        criteria = criteria.with_label(label.as_str());
    }
    if let Some(ref domain) = args.domain {
        criteria = criteria.with_domain(domain.as_str());
    }

    let filtered = criteria != QueryCriteria::new();
    if !filtered {
        return show_stats(&graph, args.json);
    }

    let query = GraphQuery::from_graph(&graph);
    let matches = query.find(&criteria);
    let total = matches.len();
    let shown: Vec<&Node> = matches.into_iter().take(args.limit).collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&shown)?);
        return Ok(());
    }

    for node in &shown {
        println!(
            "{:<20} {:<14} {}",
            node.id,
            node.node_type().as_str(),
            node.metadata.file_path.as_deref().unwrap_or(&node.name)
        );
    }
    if total > shown.len() {
        println!("... {} more (use --limit)", total - shown.len());
    }
    println!("{} matching node(s)", total);
    Ok(())
}

fn show_node(graph: &PropertyGraph, id: &str, json: bool) -> Result<()> {
    let node = graph
        .get_node(id)
        .ok_or_else(|| anyhow::anyhow!("Node '{}' not found in graph {}", id, graph.id()))?;
    let detail = NodeDetail {
        node,
        outgoing: graph.edges_from(id).collect(),
        incoming: graph.edges_to(id).collect(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
        return Ok(());
    }

    println!("{} ({})", node.name, node.node_type().as_str());
    println!("  id: {}", node.id);
    if let Some(ref source) = node.source {
        println!("  from: {} {} [{}]", source.extension, source.version, source.domain);
    }
    if !node.labels.is_empty() {
        let labels: Vec<&str> = node.labels.iter().map(String::as_str).collect();
        println!("  labels: {}", labels.join(", "));
    }
    for edge in &detail.outgoing {
        println!("  --{}--> {}", edge.edge_type.as_str(), edge.to);
    }
    for edge in &detail.incoming {
        println!("  <--{}-- {}", edge.edge_type.as_str(), edge.from);
    }
    Ok(())
}

/// Per-type and per-domain overview
#[derive(Debug, Serialize)]
struct GraphOverview<'a> {
    id: &'a str,
    codebase_id: &'a str,
    created_at: u64,
    extensions: &'a [String],
    stats: codeloom_core::GraphStats,
    types: Vec<(String, usize)>,
    domains: Vec<String>,
    dangling_edges: usize,
    has_cycles: bool,
}

fn show_stats(graph: &PropertyGraph, json: bool) -> Result<()> {
    let meta = graph.metadata();
    let overview = GraphOverview {
        id: graph.id(),
        codebase_id: &meta.codebase_id,
        created_at: meta.created_at,
        extensions: &meta.extensions,
        stats: graph.stats(),
        types: graph
            .type_counts()
            .into_iter()
            .map(|(t, n)| (t.as_str().to_string(), n))
            .collect(),
        domains: graph.all_domains().into_iter().collect(),
        dangling_edges: graph.dangling_edges().count(),
        has_cycles: graph.has_cycles(),
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&overview)?);
        return Ok(());
    }

    println!("Graph Statistics");
    println!("================\n");
    println!("Graph:      {}", overview.id);
    println!("Codebase:   {}", overview.codebase_id);
    println!("Extensions: {}", overview.extensions.join(", "));
    println!("Nodes:      {}", overview.stats.node_count);
    println!("Edges:      {}", overview.stats.edge_count);
    println!("Domains:    {}", overview.domains.join(", "));
    println!("Dangling:   {}", overview.dangling_edges);
    println!("Cycles:     {}", if overview.has_cycles { "yes" } else { "no" });
    println!();
    for (node_type, count) in &overview.types {
        println!("  {:<16} {}", node_type, count);
    }
    Ok(())
}
