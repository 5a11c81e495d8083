//! Graph Builder
//!
//! Stateful accumulator for one run. `start` opens a fresh graph, nodes and
//! edges are appended while extensions run, and `build` hands the finished
//! graph out and resets the builder so it can be reused.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::debug;

use crate::graph::{GraphMetadata, PropertyGraph};
use crate::model::{Edge, Node};

// ============================================================================
// Errors
// ============================================================================

/// Errors that can occur during graph building.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuilderError {
    /// Mutation or build attempted before `start`
    #[error("graph builder not initialized: call start() first")]
    Uninitialized,
}

// ============================================================================
// Graph Builder
// ============================================================================

/// Accumulates nodes and edges into a [`PropertyGraph`].
///
/// # Example
///
/// ```
/// use codeloom_core::{GraphBuilder, GraphMetadata, Node, NodeType};
///
/// let mut builder = GraphBuilder::new();
/// builder.start(GraphMetadata::new("/repo", 0));
/// builder.add_node(Node::new("a", NodeType::File, "main.rs")).unwrap();
/// let graph = builder.build().unwrap();
/// assert_eq!(graph.node_count(), 1);
/// assert!(!builder.is_started());
/// ```
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: Option<PropertyGraph>,
}

impl GraphBuilder {
    /// Create an idle builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a new, empty graph. Any graph in progress is discarded.
    pub fn start(&mut self, metadata: GraphMetadata) -> &mut Self {
        debug!("Starting graph {} for {}", metadata.id, metadata.codebase_id);
        self.graph = Some(PropertyGraph::new(metadata));
        self
    }

    /// Whether a graph is in progress
    pub fn is_started(&self) -> bool {
        self.graph.is_some()
    }

    /// Add a node. A node with the same id replaces the earlier one.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Uninitialized`] before `start`.
    pub fn add_node(&mut self, node: Node) -> Result<&mut Self, BuilderError> {
        self.graph_mut()?.insert_node(node);
        Ok(self)
    }

    /// Add several nodes
    pub fn add_nodes<I>(&mut self, nodes: I) -> Result<&mut Self, BuilderError>
    where
        I: IntoIterator<Item = Node>,
    {
        let graph = self.graph_mut()?;
        for node in nodes {
            graph.insert_node(node);
        }
        Ok(self)
    }

    /// Add an edge. Endpoints are not checked.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Uninitialized`] before `start`.
    pub fn add_edge(&mut self, edge: Edge) -> Result<&mut Self, BuilderError> {
        self.graph_mut()?.push_edge(edge);
        Ok(self)
    }

    /// Add several edges
    pub fn add_edges<I>(&mut self, edges: I) -> Result<&mut Self, BuilderError>
    where
        I: IntoIterator<Item = Edge>,
    {
        let graph = self.graph_mut()?;
        for edge in edges {
            graph.push_edge(edge);
        }
        Ok(self)
    }

    /// Record an extension as a contributor to the graph
    pub fn record_extension(&mut self, name: impl Into<String>) -> Result<&mut Self, BuilderError> {
        let name = name.into();
        let extensions = &mut self.graph_mut()?.metadata_mut().extensions;
        if !extensions.contains(&name) {
            extensions.push(name);
        }
        Ok(self)
    }

    /// Nodes added so far (0 when idle)
    pub fn node_count(&self) -> usize {
        self.graph.as_ref().map_or(0, PropertyGraph::node_count)
    }

    /// Edges added so far (0 when idle)
    pub fn edge_count(&self) -> usize {
        self.graph.as_ref().map_or(0, PropertyGraph::edge_count)
    }

    /// Whether a node with `id` has been added
    pub fn contains_node(&self, id: &str) -> bool {
        self.graph.as_ref().is_some_and(|g| g.contains_node(id))
    }

    /// Copy of every node added so far, keyed by id
    pub fn node_snapshot(&self) -> Result<BTreeMap<String, Node>, BuilderError> {
        self.graph
            .as_ref()
            .map(|g| g.node_map().clone())
            .ok_or(BuilderError::Uninitialized)
    }

    /// Finish the graph and reset the builder.
    ///
    /// # Errors
    ///
    /// Returns [`BuilderError::Uninitialized`] before `start`.
    pub fn build(&mut self) -> Result<PropertyGraph, BuilderError> {
        let graph = self.graph.take().ok_or(BuilderError::Uninitialized)?;
        debug!(
            "Built graph {}: {} nodes, {} edges",
            graph.id(),
            graph.node_count(),
            graph.edge_count()
        );
        Ok(graph)
    }

    fn graph_mut(&mut self) -> Result<&mut PropertyGraph, BuilderError> {
        self.graph.as_mut().ok_or(BuilderError::Uninitialized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EdgeType, NodeType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_operations_before_start_fail() {
        let mut builder = GraphBuilder::new();

        assert_eq!(
            builder.add_node(Node::new("a", NodeType::File, "a")).err(),
            Some(BuilderError::Uninitialized)
        );
        assert_eq!(
            builder
                .add_edge(Edge::new("e", EdgeType::Calls, "a", "b"))
                .err(),
            Some(BuilderError::Uninitialized)
        );
        assert_eq!(builder.build().err(), Some(BuilderError::Uninitialized));
        assert_eq!(builder.node_snapshot().err(), Some(BuilderError::Uninitialized));
        assert_eq!(builder.node_count(), 0);
    }

    #[test]
    fn test_build_resets() {
        let mut builder = GraphBuilder::new();
        builder.start(GraphMetadata::new("/repo", 0));
        builder
            .add_node(Node::new("a", NodeType::File, "a"))
            .unwrap()
            .add_node(Node::new("b", NodeType::File, "b"))
            .unwrap()
            .add_edge(Edge::new("e", EdgeType::Contains, "a", "b"))
            .unwrap();

        let graph = builder.build().unwrap();
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);

        assert!(!builder.is_started());
        assert_eq!(builder.build().err(), Some(BuilderError::Uninitialized));
    }

    #[test]
    fn test_restart_discards_progress() {
        let mut builder = GraphBuilder::new();
        builder.start(GraphMetadata::new("/repo", 0));
        builder.add_node(Node::new("a", NodeType::File, "a")).unwrap();

        builder.start(GraphMetadata::new("/repo", 1));
        assert_eq!(builder.node_count(), 0);
        assert!(!builder.contains_node("a"));
    }

    #[test]
    fn test_record_extension_once() {
        let mut builder = GraphBuilder::new();
        builder.start(GraphMetadata::new("/repo", 0));
        builder.record_extension("filesystem").unwrap();
        builder.record_extension("git").unwrap();
        builder.record_extension("filesystem").unwrap();

        let graph = builder.build().unwrap();
        assert_eq!(graph.metadata().extensions, vec!["filesystem", "git"]);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut builder = GraphBuilder::new();
        builder.start(GraphMetadata::new("/repo", 0));
        builder.add_node(Node::new("a", NodeType::File, "a")).unwrap();

        let snapshot = builder.node_snapshot().unwrap();
        builder.add_node(Node::new("b", NodeType::File, "b")).unwrap();

        assert_eq!(snapshot.len(), 1);
        assert_eq!(builder.node_count(), 2);
    }
}
