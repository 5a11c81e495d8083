//! Extension Protocol
//!
//! An extension contributes one domain of knowledge to the graph. It runs
//! in two phases:
//!
//! 1. `parse` sees only the root path and its own config, and returns the
//!    nodes and edges it owns.
//! 2. `link` runs after every extension has parsed. It sees a read-only
//!    snapshot of all nodes and returns edges, typically crossing into
//!    other extensions' domains.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use codeloom_core::{Edge, EdgeType, IdGenerator, Node, NodeType, Provenance};
use serde::{Deserialize, Serialize};

use crate::query::GraphQuery;

// ============================================================================
// Static Description
// ============================================================================

/// Identity of an extension.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtensionMetadata {
    /// Unique name, also the key for its config bag
    pub name: String,
    /// Extension version
    pub version: String,
    /// Logical namespace of its output (e.g. "code", "git", "filesystem")
    pub domain: String,
}

impl ExtensionMetadata {
    /// Create metadata
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        domain: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            domain: domain.into(),
        }
    }

    /// Provenance stamped on entities this extension produces
    pub fn provenance(&self, timestamp: u64) -> Provenance {
        Provenance::new(&self.domain, &self.name, &self.version, timestamp)
    }
}

/// A node type an extension may produce. Documentation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeTypeInfo {
    pub node_type: NodeType,
    pub display_name: String,
    /// Labels the extension attaches to nodes of this type
    #[serde(default)]
    pub labels: Vec<String>,
}

impl NodeTypeInfo {
    pub fn new(node_type: NodeType, display_name: impl Into<String>) -> Self {
        Self {
            node_type,
            display_name: display_name.into(),
            labels: Vec::new(),
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels = labels.into_iter().map(Into::into).collect();
        self
    }
}

/// An edge type an extension may produce. Documentation only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeTypeInfo {
    pub edge_type: EdgeType,
    pub display_name: String,
}

impl EdgeTypeInfo {
    pub fn new(edge_type: EdgeType, display_name: impl Into<String>) -> Self {
        Self {
            edge_type,
            display_name: display_name.into(),
        }
    }
}

// ============================================================================
// Phase Contexts
// ============================================================================

/// Input to [`Extension::parse`].
#[derive(Debug, Clone)]
pub struct ParseContext {
    /// Root of the codebase being analyzed
    pub root_path: PathBuf,
    /// The extension's config bag (`Null` when none was supplied)
    pub config: serde_json::Value,
    /// Shared id strategy for the run
    pub ids: Arc<dyn IdGenerator>,
    /// Span scoped to this extension and phase; the parse future already
    /// runs inside it
    pub span: tracing::Span,
}

/// Input to [`Extension::link`].
#[derive(Debug, Clone)]
pub struct LinkContext {
    /// Root of the codebase being analyzed
    pub root_path: PathBuf,
    /// Every node produced during the parse phase, keyed by id
    pub all_nodes: Arc<BTreeMap<String, Node>>,
    /// Query view over `all_nodes`
    pub query: GraphQuery,
    /// The extension's config bag (`Null` when none was supplied)
    pub config: serde_json::Value,
    /// Shared id strategy for the run
    pub ids: Arc<dyn IdGenerator>,
    /// Span scoped to this extension and phase
    pub span: tracing::Span,
}

/// Result of a parse call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtensionOutput {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

impl ExtensionOutput {
    /// Create an output from parts
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self { nodes, edges }
    }

    /// Output with nothing in it
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether nothing was produced
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

// ============================================================================
// Extension Trait
// ============================================================================

/// A pluggable producer of graph content.
///
/// Errors returned from `parse` or `link` are isolated by the orchestrator:
/// the extension's contribution for that phase is dropped and the run
/// continues. Panics are treated the same way.
#[async_trait]
pub trait Extension: Send + Sync {
    /// Name, version and domain
    fn metadata(&self) -> &ExtensionMetadata;

    /// Node types this extension may produce
    fn node_types(&self) -> &[NodeTypeInfo] {
        &[]
    }

    /// Edge types this extension may produce
    fn edge_types(&self) -> &[EdgeTypeInfo] {
        &[]
    }

    /// Produce this extension's own nodes and edges.
    ///
    /// # Arguments
    /// * `ctx` - Root path, config bag and logging span
    async fn parse(&self, ctx: &ParseContext) -> anyhow::Result<ExtensionOutput>;

    /// Produce edges against the merged node set.
    ///
    /// # Arguments
    /// * `ctx` - Snapshot of all parsed nodes plus a query view over them
    async fn link(&self, _ctx: &LinkContext) -> anyhow::Result<Vec<Edge>> {
        Ok(Vec::new())
    }

    /// Release resources. Called by the embedding application, never by
    /// the orchestrator.
    async fn dispose(&self) -> anyhow::Result<()> {
        Ok(())
    }
}
