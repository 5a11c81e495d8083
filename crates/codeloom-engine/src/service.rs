//! Parsing Service
//!
//! Orchestrates one run over a codebase:
//!
//! 1. start a fresh graph builder
//! 2. parse phase: every extension in configured order, folding its output
//!    into the builder
//! 3. snapshot the merged nodes (no link call starts before every parse
//!    call has finished)
//! 4. link phase: every extension whose parse succeeded, in the same order,
//!    folding returned edges
//! 5. persist the finished graph and hand it back
//!
//! Extension failures (errors and panics) are logged with the extension
//! name and phase, recorded in the run report, and never abort the run.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use codeloom_core::{
    system_clock, Clock, Edge, GraphBuilder, GraphMetadata, IdGenerator, Node, PropertyGraph,
    SequentialIdGenerator,
};
use futures::future::join_all;
use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, info_span, Instrument};

use crate::error::EngineError;
use crate::extension::{Extension, ExtensionOutput, LinkContext, ParseContext};
use crate::query::GraphQuery;
use crate::repository::GraphRepository;

/// Progress callback: `(completed_steps, total_steps)`
pub type ProgressCallback = Box<dyn Fn(usize, usize) + Send + Sync>;

// ============================================================================
// Options & Report
// ============================================================================

/// Per-run options.
#[derive(Default)]
pub struct ParseOptions {
    /// Called after each extension finishes a phase. One step per extension
    /// per phase, so the total is twice the extension count.
    pub on_progress: Option<ProgressCallback>,

    /// Run these extensions instead of the configured ones
    pub extensions: Option<Vec<Arc<dyn Extension>>>,
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the progress callback
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        self.on_progress = Some(Box::new(callback));
        self
    }

    /// Override the extension list for this run
    pub fn with_extensions(mut self, extensions: Vec<Arc<dyn Extension>>) -> Self {
        self.extensions = Some(extensions);
        self
    }
}

impl fmt::Debug for ParseOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParseOptions")
            .field("on_progress", &self.on_progress.is_some())
            .field(
                "extensions",
                &self
                    .extensions
                    .as_ref()
                    .map(|exts| exts.iter().map(|e| e.metadata().name.clone()).collect::<Vec<_>>()),
            )
            .finish()
    }
}

/// Orchestration phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Parse,
    Link,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Parse => f.write_str("parse"),
            Phase::Link => f.write_str("link"),
        }
    }
}

/// What one extension added to the graph
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExtensionContribution {
    pub extension: String,
    pub nodes: usize,
    pub parse_edges: usize,
    pub link_edges: usize,
}

/// An isolated extension failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtensionFailure {
    pub extension: String,
    pub phase: Phase,
    pub message: String,
}

/// Per-extension outcome of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseReport {
    /// One entry per extension, in execution order
    pub contributions: Vec<ExtensionContribution>,
    /// Failures, in the order they happened
    pub failures: Vec<ExtensionFailure>,
}

impl ParseReport {
    /// Whether every extension succeeded in both phases
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Whether `extension` failed in `phase`
    pub fn failed(&self, extension: &str, phase: Phase) -> bool {
        self.failures
            .iter()
            .any(|f| f.extension == extension && f.phase == phase)
    }
}

/// A finished graph together with its run report.
#[derive(Debug, Clone)]
pub struct ParseRun {
    pub graph: PropertyGraph,
    pub report: ParseReport,
}

// ============================================================================
// Parsing Service
// ============================================================================

/// The orchestrator.
///
/// Holds no per-run state; a single service can run any number of parses.
pub struct ParsingService {
    extensions: Vec<Arc<dyn Extension>>,
    repository: Arc<dyn GraphRepository>,
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    extension_configs: HashMap<String, serde_json::Value>,
    concurrent_parse: bool,
}

impl ParsingService {
    /// Create a service running `extensions` in the given order
    pub fn new(extensions: Vec<Arc<dyn Extension>>, repository: Arc<dyn GraphRepository>) -> Self {
        Self {
            extensions,
            repository,
            clock: system_clock(),
            ids: Arc::new(SequentialIdGenerator::new()),
            extension_configs: HashMap::new(),
            concurrent_parse: false,
        }
    }

    /// Use `clock` for graph and provenance timestamps
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Id strategy handed to extensions
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Config bag passed to the extension named `name`
    pub fn with_extension_config(
        mut self,
        name: impl Into<String>,
        config: serde_json::Value,
    ) -> Self {
        self.extension_configs.insert(name.into(), config);
        self
    }

    /// Run parse calls concurrently. Results are still merged in the
    /// configured order.
    pub fn with_concurrent_parse(mut self, enabled: bool) -> Self {
        self.concurrent_parse = enabled;
        self
    }

    /// Names of the configured extensions, in order
    pub fn extension_names(&self) -> Vec<&str> {
        self.extensions
            .iter()
            .map(|e| e.metadata().name.as_str())
            .collect()
    }

    /// The repository graphs are saved to
    pub fn repository(&self) -> &Arc<dyn GraphRepository> {
        &self.repository
    }

    /// Parse `root_path` with the configured extensions.
    ///
    /// # Errors
    ///
    /// Only repository failures are returned; extension failures are
    /// logged and skipped.
    pub async fn parse(&self, root_path: impl AsRef<Path>) -> Result<PropertyGraph, EngineError> {
        self.parse_with_options(root_path, ParseOptions::default())
            .await
    }

    /// Parse with progress reporting or an extension override
    pub async fn parse_with_options(
        &self,
        root_path: impl AsRef<Path>,
        options: ParseOptions,
    ) -> Result<PropertyGraph, EngineError> {
        Ok(self.parse_with_report(root_path, options).await?.graph)
    }

    /// Parse and return the per-extension report alongside the graph
    pub async fn parse_with_report(
        &self,
        root_path: impl AsRef<Path>,
        options: ParseOptions,
    ) -> Result<ParseRun, EngineError> {
        let root_path = root_path.as_ref().to_path_buf();
        let extensions = options
            .extensions
            .unwrap_or_else(|| self.extensions.clone());
        let progress = Progress::new(options.on_progress, extensions.len());

        let started = self.clock.now_millis();
        let metadata = GraphMetadata::new(root_path.to_string_lossy(), started);
        info!(
            "Parsing {} with {} extension(s)",
            root_path.display(),
            extensions.len()
        );

        let mut builder = GraphBuilder::new();
        builder.start(metadata);
        let mut report = ParseReport {
            contributions: extensions
                .iter()
                .map(|e| ExtensionContribution {
                    extension: e.metadata().name.clone(),
                    ..Default::default()
                })
                .collect(),
            failures: Vec::new(),
        };

        // Parse phase
        let outcomes = self.run_parse_phase(&extensions, &root_path, &progress).await;
        let mut parsed_ok = Vec::with_capacity(extensions.len());
        for ((extension, outcome), contribution) in extensions
            .iter()
            .zip(outcomes)
            .zip(report.contributions.iter_mut())
        {
            let name = &extension.metadata().name;
            parsed_ok.push(outcome.is_ok());
            match outcome {
                Ok(output) => {
                    contribution.nodes = output.nodes.len();
                    contribution.parse_edges = output.edges.len();
                    self.merge_output(&mut builder, extension.as_ref(), output)?;
                }
                Err(message) => report.failures.push(ExtensionFailure {
                    extension: name.clone(),
                    phase: Phase::Parse,
                    message,
                }),
            }
        }

        // Barrier: every parse call has completed before this snapshot
        let all_nodes: Arc<BTreeMap<String, Node>> = Arc::new(builder.node_snapshot()?);
        let query = GraphQuery::new(all_nodes.clone());
        debug!("Link phase over {} node(s)", all_nodes.len());

        // Link phase, only for extensions whose parse succeeded
        for ((extension, contribution), ok) in extensions
            .iter()
            .zip(report.contributions.iter_mut())
            .zip(parsed_ok)
        {
            let meta = extension.metadata();
            if !ok {
                debug!("Skipping link for {}: parse failed", meta.name);
                progress.step();
                continue;
            }
            let span = info_span!("extension", name = %meta.name, phase = "link");
            let ctx = LinkContext {
                root_path: root_path.clone(),
                all_nodes: all_nodes.clone(),
                query: query.clone(),
                config: self.config_for(&meta.name),
                ids: self.ids.clone(),
                span: span.clone(),
            };

            let outcome = isolate(extension.link(&ctx).instrument(span)).await;
            progress.step();

            match outcome {
                Ok(edges) => {
                    contribution.link_edges = edges.len();
                    let stamped = self.stamp_edges(extension.as_ref(), edges);
                    builder.add_edges(stamped)?;
                    builder.record_extension(&meta.name)?;
                }
                Err(message) => {
                    log_failure(&meta.name, Phase::Link, &message);
                    report.failures.push(ExtensionFailure {
                        extension: meta.name.clone(),
                        phase: Phase::Link,
                        message,
                    });
                }
            }
        }

        let graph = builder.build()?;
        self.repository.save(&graph).await?;

        info!(
            "Graph {} ready: {} nodes, {} edges, {} failure(s)",
            graph.id(),
            graph.node_count(),
            graph.edge_count(),
            report.failures.len()
        );
        Ok(ParseRun { graph, report })
    }

    // ------------------------------------------------------------------------
    // Phases
    // ------------------------------------------------------------------------

    /// Run every parse call and return outcomes in extension order
    async fn run_parse_phase(
        &self,
        extensions: &[Arc<dyn Extension>],
        root_path: &Path,
        progress: &Progress,
    ) -> Vec<Result<ExtensionOutput, String>> {
        let contexts: Vec<ParseContext> = extensions
            .iter()
            .map(|e| self.parse_context(e.as_ref(), root_path))
            .collect();

        if self.concurrent_parse {
            let calls = extensions.iter().zip(&contexts).map(|(extension, ctx)| async move {
                let outcome = isolate(extension.parse(ctx).instrument(ctx.span.clone())).await;
                if let Err(message) = &outcome {
                    log_failure(&extension.metadata().name, Phase::Parse, message);
                }
                progress.step();
                outcome
            });
            join_all(calls).await
        } else {
            let mut outcomes = Vec::with_capacity(extensions.len());
            for (extension, ctx) in extensions.iter().zip(&contexts) {
                let outcome = isolate(extension.parse(ctx).instrument(ctx.span.clone())).await;
                if let Err(message) = &outcome {
                    log_failure(&extension.metadata().name, Phase::Parse, message);
                }
                progress.step();
                outcomes.push(outcome);
            }
            outcomes
        }
    }

    fn parse_context(&self, extension: &dyn Extension, root_path: &Path) -> ParseContext {
        let name = &extension.metadata().name;
        ParseContext {
            root_path: PathBuf::from(root_path),
            config: self.config_for(name),
            ids: self.ids.clone(),
            span: info_span!("extension", name = %name, phase = "parse"),
        }
    }

    fn config_for(&self, name: &str) -> serde_json::Value {
        self.extension_configs
            .get(name)
            .cloned()
            .unwrap_or(serde_json::Value::Null)
    }

    // ------------------------------------------------------------------------
    // Merging
    // ------------------------------------------------------------------------

    fn merge_output(
        &self,
        builder: &mut GraphBuilder,
        extension: &dyn Extension,
        output: ExtensionOutput,
    ) -> Result<(), EngineError> {
        let meta = extension.metadata();
        let now = self.clock.now_millis();
        let nodes = output.nodes.into_iter().map(|node| {
            if node.source.is_some() {
                node
            } else {
                node.with_source(meta.provenance(now))
            }
        });
        builder.add_nodes(nodes)?;
        builder.add_edges(self.stamp_edges(extension, output.edges))?;
        builder.record_extension(&meta.name)?;
        debug!(
            "Merged {}: {} nodes, {} edges so far",
            meta.name,
            builder.node_count(),
            builder.edge_count()
        );
        Ok(())
    }

    /// Fill missing edge provenance from the extension's metadata
    fn stamp_edges(&self, extension: &dyn Extension, edges: Vec<Edge>) -> Vec<Edge> {
        let meta = extension.metadata();
        let now = self.clock.now_millis();
        edges
            .into_iter()
            .map(|edge| {
                if edge.source.is_some() {
                    edge
                } else {
                    edge.with_source(meta.provenance(now))
                }
            })
            .collect()
    }
}

impl fmt::Debug for ParsingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParsingService")
            .field("extensions", &self.extension_names())
            .field("concurrent_parse", &self.concurrent_parse)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// Await an extension call, turning both errors and panics into a message
async fn isolate<T, F>(call: F) -> Result<T, String>
where
    F: std::future::Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(call).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(panic) => Err(panic_message(panic.as_ref())),
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

fn log_failure(extension: &str, phase: Phase, message: &str) {
    error!(
        extension = extension,
        phase = %phase,
        "Extension {} failed during {}: {}",
        extension,
        phase,
        message
    );
}

/// Step counter feeding the progress callback
struct Progress {
    callback: Option<ProgressCallback>,
    total: usize,
    done: std::sync::atomic::AtomicUsize,
}

impl Progress {
    fn new(callback: Option<ProgressCallback>, extension_count: usize) -> Self {
        Self {
            callback,
            total: extension_count * 2,
            done: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    fn step(&self) {
        let current = self
            .done
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst)
            + 1;
        if let Some(callback) = &self.callback {
            callback(current, self.total);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extension::ExtensionMetadata;
    use crate::repository::InMemoryGraphRepository;
    use async_trait::async_trait;
    use codeloom_core::{EdgeType, ManualClock, NodeType};
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Emits one node named after itself; optionally fails or panics
    struct Stub {
        meta: ExtensionMetadata,
        fail_parse: bool,
        panic_link: bool,
    }

    impl Stub {
        fn new(name: &str) -> Self {
            Self {
                meta: ExtensionMetadata::new(name, "1.0.0", name),
                fail_parse: false,
                panic_link: false,
            }
        }
    }

    #[async_trait]
    impl Extension for Stub {
        fn metadata(&self) -> &ExtensionMetadata {
            &self.meta
        }

        async fn parse(&self, _ctx: &ParseContext) -> anyhow::Result<ExtensionOutput> {
            if self.fail_parse {
                anyhow::bail!("cannot read sources");
            }
            Ok(ExtensionOutput::new(
                vec![Node::new(&self.meta.name, NodeType::Module, &self.meta.name)],
                vec![],
            ))
        }

        async fn link(&self, ctx: &LinkContext) -> anyhow::Result<Vec<Edge>> {
            if self.panic_link {
                panic!("link exploded");
            }
            Ok(ctx
                .all_nodes
                .keys()
                .filter(|id| **id != self.meta.name)
                .map(|id| {
                    Edge::new(
                        format!("{}->{}", self.meta.name, id),
                        EdgeType::References,
                        &self.meta.name,
                        id,
                    )
                })
                .collect())
        }
    }

    fn service(extensions: Vec<Arc<dyn Extension>>) -> ParsingService {
        ParsingService::new(extensions, Arc::new(InMemoryGraphRepository::new()))
            .with_clock(Arc::new(ManualClock::new(1_000)))
    }

    #[tokio::test]
    async fn test_provenance_is_filled() {
        let svc = service(vec![Arc::new(Stub::new("a"))]);
        let graph = svc.parse("/repo").await.unwrap();

        let node = graph.get_node("a").unwrap();
        let source = node.source.as_ref().unwrap();
        assert_eq!(source.extension, "a");
        assert_eq!(source.timestamp, 1_000);
        assert_eq!(graph.metadata().created_at, 1_000);
        assert_eq!(graph.metadata().codebase_id, "/repo");
    }

    #[tokio::test]
    async fn test_parse_failure_is_isolated() {
        let mut a = Stub::new("a");
        a.fail_parse = true;
        let svc = service(vec![
            Arc::new(a),
            Arc::new(Stub::new("b")),
            Arc::new(Stub::new("c")),
        ]);

        let run = svc
            .parse_with_report("/repo", ParseOptions::new())
            .await
            .unwrap();
        let graph = &run.graph;
        assert_eq!(graph.node_count(), 2);
        assert!(graph.contains_node("b"));
        assert!(graph.contains_node("c"));

        // a never links, so b and c only see each other
        let mut edges: Vec<&str> = graph.edges().iter().map(|e| e.id.as_str()).collect();
        edges.sort();
        assert_eq!(edges, vec!["b->c", "c->b"]);
        assert_eq!(graph.edges_from("a").count(), 0);
        assert_eq!(graph.metadata().extensions, vec!["b", "c"]);

        assert_eq!(run.report.failures.len(), 1);
        assert!(run.report.failed("a", Phase::Parse));
        assert!(!run.report.failed("a", Phase::Link));
        assert!(run.report.failures[0].message.contains("cannot read sources"));
        let a_contribution = &run.report.contributions[0];
        assert_eq!(
            (a_contribution.nodes, a_contribution.parse_edges, a_contribution.link_edges),
            (0, 0, 0)
        );
    }

    #[tokio::test]
    async fn test_skipped_link_still_reports_progress() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut broken = Stub::new("broken");
        broken.fail_parse = true;
        let svc = service(vec![Arc::new(broken), Arc::new(Stub::new("ok"))]);

        svc.parse_with_options(
            "/repo",
            ParseOptions::new().with_progress(move |current, total| {
                sink.lock().unwrap().push((current, total));
            }),
        )
        .await
        .unwrap();

        assert_eq!(seen.lock().unwrap().last(), Some(&(4, 4)));
    }

    #[tokio::test]
    async fn test_link_panic_is_isolated() {
        let mut exploding = Stub::new("boom");
        exploding.panic_link = true;
        let svc = service(vec![Arc::new(exploding), Arc::new(Stub::new("ok"))]);

        let run = svc
            .parse_with_report("/repo", ParseOptions::new())
            .await
            .unwrap();
        assert_eq!(run.graph.node_count(), 2);
        // Only ok's link edge survives
        assert_eq!(run.graph.edge_count(), 1);
        assert!(run.report.failed("boom", Phase::Link));
        assert!(run.report.failures[0].message.contains("link exploded"));
    }

    #[tokio::test]
    async fn test_progress_counts_both_phases() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let svc = service(vec![Arc::new(Stub::new("a")), Arc::new(Stub::new("b"))]);

        svc.parse_with_options(
            "/repo",
            ParseOptions::new().with_progress(move |current, total| {
                sink.lock().unwrap().push((current, total));
            }),
        )
        .await
        .unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![(1, 4), (2, 4), (3, 4), (4, 4)]
        );
    }

    #[tokio::test]
    async fn test_extension_override() {
        let svc = service(vec![Arc::new(Stub::new("a"))]);
        let graph = svc
            .parse_with_options(
                "/repo",
                ParseOptions::new().with_extensions(vec![Arc::new(Stub::new("z"))]),
            )
            .await
            .unwrap();
        assert!(graph.contains_node("z"));
        assert!(!graph.contains_node("a"));
        assert_eq!(graph.metadata().extensions, vec!["z"]);
    }

    #[tokio::test]
    async fn test_no_extensions_yields_empty_graph() {
        let svc = service(vec![]);
        let graph = svc.parse("/repo").await.unwrap();
        assert_eq!(graph.node_count(), 0);
        assert_eq!(graph.stats().average_degree, 0.0);
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Parse.to_string(), "parse");
        assert_eq!(Phase::Link.to_string(), "link");
    }
}
