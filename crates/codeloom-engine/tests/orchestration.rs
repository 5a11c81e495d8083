//! Integration tests for the parsing service
//!
//! Two cooperating extensions: a code extension that owns files and
//! classes, and a documentation extension that only links to them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use codeloom_core::{Edge, EdgeType, ManualClock, Node, NodeType, Provenance};
use codeloom_engine::{
    Extension, ExtensionMetadata, ExtensionOutput, GraphRepository, InMemoryGraphRepository,
    JsonFileGraphRepository, LinkContext, ParseContext, ParseOptions, ParsingService,
    QueryCriteria,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use tempfile::TempDir;

// ============================================================================
// Fixtures
// ============================================================================

/// Emits a file node and a class node it contains
struct CodeExtension {
    meta: ExtensionMetadata,
}

impl CodeExtension {
    fn new() -> Self {
        Self {
            meta: ExtensionMetadata::new("code", "1.0.0", "code"),
        }
    }
}

#[async_trait]
impl Extension for CodeExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    async fn parse(&self, _ctx: &ParseContext) -> anyhow::Result<ExtensionOutput> {
        Ok(ExtensionOutput::new(
            vec![
                Node::new("file:user.ts", NodeType::File, "user.ts"),
                Node::new("class:User", NodeType::Class, "User").with_label("Type"),
            ],
            vec![Edge::new(
                "contains:1",
                EdgeType::Contains,
                "file:user.ts",
                "class:User",
            )],
        ))
    }
}

/// Owns one doc node; links it to every class it can find
struct DocsExtension {
    meta: ExtensionMetadata,
    link_calls: AtomicUsize,
    seen_nodes: AtomicUsize,
}

impl DocsExtension {
    fn new() -> Self {
        Self {
            meta: ExtensionMetadata::new("docs", "0.3.0", "documentation"),
            link_calls: AtomicUsize::new(0),
            seen_nodes: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Extension for DocsExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    async fn parse(&self, ctx: &ParseContext) -> anyhow::Result<ExtensionOutput> {
        let title = ctx.config["title"].as_str().unwrap_or("README");
        Ok(ExtensionOutput::new(
            vec![Node::new("doc:readme", NodeType::File, title)],
            vec![],
        ))
    }

    async fn link(&self, ctx: &LinkContext) -> anyhow::Result<Vec<Edge>> {
        self.link_calls.fetch_add(1, Ordering::SeqCst);
        self.seen_nodes.store(ctx.all_nodes.len(), Ordering::SeqCst);
        Ok(ctx
            .query
            .find_by_type(NodeType::Class)
            .into_iter()
            .map(|class| {
                Edge::new(
                    format!("references:{}", class.id),
                    EdgeType::References,
                    "doc:readme",
                    &class.id,
                )
            })
            .collect())
    }
}

/// Contributes nodes handed to it up front, and nothing else
struct SeededNodes {
    meta: ExtensionMetadata,
    nodes: Vec<Node>,
}

#[async_trait]
impl Extension for SeededNodes {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    async fn parse(&self, _ctx: &ParseContext) -> anyhow::Result<ExtensionOutput> {
        Ok(ExtensionOutput::new(self.nodes.clone(), vec![]))
    }
}

/// Parses nothing; in link, points an already present node at every class
struct ReferenceLinker {
    meta: ExtensionMetadata,
    from: String,
}

#[async_trait]
impl Extension for ReferenceLinker {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    async fn parse(&self, _ctx: &ParseContext) -> anyhow::Result<ExtensionOutput> {
        Ok(ExtensionOutput::default())
    }

    async fn link(&self, ctx: &LinkContext) -> anyhow::Result<Vec<Edge>> {
        anyhow::ensure!(ctx.query.get(&self.from).is_some(), "{} is missing", self.from);
        Ok(ctx
            .query
            .find_by_type(NodeType::Class)
            .into_iter()
            .map(|class| {
                Edge::new(
                    format!("references:{}", class.id),
                    EdgeType::References,
                    &self.from,
                    &class.id,
                )
            })
            .collect())
    }
}

/// Parses slowly, to prove link waits for every parse call
struct SlowExtension {
    meta: ExtensionMetadata,
}

#[async_trait]
impl Extension for SlowExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    async fn parse(&self, _ctx: &ParseContext) -> anyhow::Result<ExtensionOutput> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(ExtensionOutput::new(
            vec![Node::new("slow:1", NodeType::Module, "slow")],
            vec![],
        ))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_two_extensions_end_to_end() {
    let docs = Arc::new(DocsExtension::new());
    let repository = Arc::new(InMemoryGraphRepository::new());
    let extensions: Vec<Arc<dyn Extension>> = vec![Arc::new(CodeExtension::new()), docs.clone()];
    let service = ParsingService::new(extensions, repository.clone())
        .with_clock(Arc::new(ManualClock::new(7)));

    let graph = service.parse("/workspace").await.unwrap();

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);

    let domains: Vec<_> = graph.all_domains().into_iter().collect();
    assert_eq!(domains, vec!["code", "documentation"]);

    let mut incoming: Vec<_> = graph
        .edges_to("class:User")
        .map(|e| e.edge_type)
        .collect();
    incoming.sort();
    assert_eq!(incoming, vec![EdgeType::Contains, EdgeType::References]);

    // The link edge is attributed to the extension that produced it
    let reference = graph.edges_by_type(EdgeType::References).next().unwrap();
    assert_eq!(reference.source.as_ref().unwrap().domain, "documentation");

    assert_eq!(docs.link_calls.load(Ordering::SeqCst), 1);
    assert_eq!(graph.metadata().extensions, vec!["code", "docs"]);

    // Persisted
    let stored = repository
        .find_by_codebase_id("/workspace")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.id(), graph.id());
}

#[tokio::test]
async fn test_link_only_extension_references_supplied_node() {
    let seeded = Node::new("doc:readme", NodeType::File, "README").with_source(Provenance::new(
        "documentation",
        "fixture",
        "0.1.0",
        7,
    ));
    let extensions: Vec<Arc<dyn Extension>> = vec![
        Arc::new(CodeExtension::new()),
        Arc::new(SeededNodes {
            meta: ExtensionMetadata::new("fixture", "0.1.0", "documentation"),
            nodes: vec![seeded],
        }),
        Arc::new(ReferenceLinker {
            meta: ExtensionMetadata::new("doc-links", "0.1.0", "documentation"),
            from: "doc:readme".to_string(),
        }),
    ];
    let service = ParsingService::new(Vec::new(), Arc::new(InMemoryGraphRepository::new()));

    let run = service
        .parse_with_report("/workspace", ParseOptions::new().with_extensions(extensions))
        .await
        .unwrap();
    let graph = &run.graph;

    assert!(run.report.failures.is_empty());
    assert_eq!(run.report.contributions[2].nodes, 0);
    assert_eq!(run.report.contributions[2].link_edges, 1);

    assert_eq!(graph.node_count(), 3);
    assert_eq!(graph.edge_count(), 2);
    let domains: Vec<_> = graph.all_domains().into_iter().collect();
    assert_eq!(domains, vec!["code", "documentation"]);

    let mut incoming: Vec<(EdgeType, &str)> = graph
        .edges_to("class:User")
        .map(|e| (e.edge_type, e.from.as_str()))
        .collect();
    incoming.sort();
    assert_eq!(
        incoming,
        vec![
            (EdgeType::Contains, "file:user.ts"),
            (EdgeType::References, "doc:readme"),
        ]
    );
}

#[tokio::test]
async fn test_extension_config_reaches_parse() {
    let service = ParsingService::new(
        vec![Arc::new(DocsExtension::new())],
        Arc::new(InMemoryGraphRepository::new()),
    )
    .with_extension_config("docs", json!({"title": "Guide"}));

    let graph = service.parse("/workspace").await.unwrap();
    assert_eq!(graph.get_node("doc:readme").unwrap().name, "Guide");
}

#[tokio::test]
async fn test_link_sees_every_parsed_node_with_concurrent_parse() {
    let docs = Arc::new(DocsExtension::new());
    let extensions: Vec<Arc<dyn Extension>> = vec![
        docs.clone(),
        Arc::new(SlowExtension {
            meta: ExtensionMetadata::new("slow", "1.0.0", "misc"),
        }),
        Arc::new(CodeExtension::new()),
    ];
    let service = ParsingService::new(extensions, Arc::new(InMemoryGraphRepository::new()))
        .with_concurrent_parse(true);

    let graph = service.parse("/workspace").await.unwrap();

    assert_eq!(docs.seen_nodes.load(Ordering::SeqCst), 4);
    assert_eq!(graph.node_count(), 4);
    // Merge order follows configuration, not completion order
    assert_eq!(graph.metadata().extensions, vec!["docs", "slow", "code"]);
}

#[tokio::test]
async fn test_graph_persists_to_json_files() {
    let dir = TempDir::new().unwrap();
    let repository = Arc::new(JsonFileGraphRepository::new(dir.path()));
    let extensions: Vec<Arc<dyn Extension>> = vec![
        Arc::new(CodeExtension::new()),
        Arc::new(DocsExtension::new()),
    ];
    let service = ParsingService::new(extensions, repository.clone());

    let graph = service.parse("/workspace").await.unwrap();
    let reloaded = repository.find_by_id(graph.id()).await.unwrap().unwrap();

    assert_eq!(reloaded.stats(), graph.stats());
    let criteria = QueryCriteria::new().with_domain("code").with_label("Type");
    let query = codeloom_engine::GraphQuery::from_graph(&reloaded);
    assert_eq!(
        query.find_one(&criteria).map(|n| n.id.as_str()),
        Some("class:User")
    );
}
