//! Property Graph Store
//!
//! `PropertyGraph` holds every node and edge produced during one
//! orchestration run. Nodes are indexed by id (iteration is ordered by id,
//! so output is reproducible); edges live in an append-only list with
//! from/to adjacency indices maintained alongside it. Indices by type,
//! label and domain are derived on demand.
//!
//! Edges may dangle: the target of a cross-extension edge is not required
//! to exist, and such edges are kept rather than dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graphmap::DiGraphMap;
use serde::{Deserialize, Serialize};

use crate::ids::sha256_hex;
use crate::model::{Edge, EdgeType, Node, NodeType};

/// Language recorded for graphs merged from several extensions
pub const MULTI_LANGUAGE: &str = "multi";

// ============================================================================
// Graph Metadata
// ============================================================================

/// Identity and context of a graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMetadata {
    /// Graph identifier
    pub id: String,

    /// Codebase the graph describes (usually the root path)
    pub codebase_id: String,

    /// Language of the graph, `"multi"` when merged from several extensions
    pub language: String,

    /// Creation time in milliseconds since the Unix epoch
    pub created_at: u64,

    /// Extensions that contributed to the graph, in execution order
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extensions: Vec<String>,
}

impl GraphMetadata {
    /// Create metadata for a multi-extension graph.
    ///
    /// The id is derived from the codebase id and creation time.
    pub fn new(codebase_id: impl Into<String>, created_at: u64) -> Self {
        let codebase_id = codebase_id.into();
        let digest = sha256_hex(format!("{}\0{}", codebase_id, created_at).as_bytes());
        Self {
            id: format!("graph_{}", &digest[..16]),
            codebase_id,
            language: MULTI_LANGUAGE.to_string(),
            created_at,
            extensions: Vec::new(),
        }
    }

    /// Override the generated id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Summary statistics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Number of nodes
    pub node_count: usize,
    /// Number of edges
    pub edge_count: usize,
    /// `edge_count / node_count`, 0 for an empty graph
    pub average_degree: f64,
}

/// Serialized form of a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    /// Graph metadata
    pub metadata: GraphMetadata,
    /// All nodes, ordered by id
    pub nodes: Vec<Node>,
    /// All edges, in insertion order
    pub edges: Vec<Edge>,
}

// ============================================================================
// Property Graph
// ============================================================================

/// In-memory property graph for one run.
///
/// Mutation goes through [`GraphBuilder`](crate::builder::GraphBuilder);
/// once built, the graph only exposes reads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "GraphDocument", into = "GraphDocument")]
pub struct PropertyGraph {
    metadata: GraphMetadata,

    /// Node index keyed by id
    nodes: BTreeMap<String, Node>,

    /// Append-only edge list
    edges: Vec<Edge>,

    /// Node id -> positions in `edges` where the node is the source
    outgoing: HashMap<String, Vec<usize>>,

    /// Node id -> positions in `edges` where the node is the target
    incoming: HashMap<String, Vec<usize>>,
}

impl PropertyGraph {
    /// Create an empty graph
    pub fn new(metadata: GraphMetadata) -> Self {
        Self {
            metadata,
            nodes: BTreeMap::new(),
            edges: Vec::new(),
            outgoing: HashMap::new(),
            incoming: HashMap::new(),
        }
    }

    /// Rebuild a graph from its serialized form
    pub fn from_document(document: GraphDocument) -> Self {
        let mut graph = Self::new(document.metadata);
        for node in document.nodes {
            graph.insert_node(node);
        }
        for edge in document.edges {
            graph.push_edge(edge);
        }
        graph
    }

    /// Serialized form of the graph
    pub fn to_document(&self) -> GraphDocument {
        GraphDocument {
            metadata: self.metadata.clone(),
            nodes: self.nodes.values().cloned().collect(),
            edges: self.edges.clone(),
        }
    }

    /// Graph metadata
    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    /// Graph id
    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    // ------------------------------------------------------------------------
    // Mutation (builder only)
    // ------------------------------------------------------------------------

    /// Insert a node; an existing node with the same id is replaced.
    pub(crate) fn insert_node(&mut self, node: Node) {
        self.nodes.insert(node.id.clone(), node);
    }

    /// Append an edge and index both endpoints.
    pub(crate) fn push_edge(&mut self, edge: Edge) {
        let position = self.edges.len();
        self.outgoing
            .entry(edge.from.clone())
            .or_default()
            .push(position);
        self.incoming
            .entry(edge.to.clone())
            .or_default()
            .push(position);
        self.edges.push(edge);
    }

    pub(crate) fn metadata_mut(&mut self) -> &mut GraphMetadata {
        &mut self.metadata
    }

    pub(crate) fn node_map(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    // ------------------------------------------------------------------------
    // Node Queries
    // ------------------------------------------------------------------------

    /// Get a node by id
    pub fn get_node(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Check if a node exists
    pub fn contains_node(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    /// All nodes, ordered by id
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Number of distinct nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Nodes of the given type
    pub fn nodes_by_type(&self, node_type: NodeType) -> impl Iterator<Item = &Node> {
        self.nodes
            .values()
            .filter(move |n| n.node_type() == node_type)
    }

    /// Nodes carrying `label`
    pub fn nodes_by_label<'a>(&'a self, label: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes.values().filter(move |n| n.has_label(label))
    }

    /// Nodes carrying at least one of `labels`. Empty `labels` matches nothing.
    pub fn nodes_by_any_label<'a>(
        &'a self,
        labels: &'a [&'a str],
    ) -> impl Iterator<Item = &'a Node> {
        self.nodes
            .values()
            .filter(move |n| labels.iter().any(|l| n.has_label(l)))
    }

    /// Nodes carrying every one of `labels`. Empty `labels` matches everything.
    pub fn nodes_by_all_labels<'a>(
        &'a self,
        labels: &'a [&'a str],
    ) -> impl Iterator<Item = &'a Node> {
        self.nodes
            .values()
            .filter(move |n| labels.iter().all(|l| n.has_label(l)))
    }

    /// Nodes whose provenance domain is `domain`
    pub fn nodes_by_domain<'a>(&'a self, domain: &'a str) -> impl Iterator<Item = &'a Node> {
        self.nodes
            .values()
            .filter(move |n| n.domain() == Some(domain))
    }

    /// Every label used by any node
    pub fn all_labels(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .flat_map(|n| n.labels.iter().cloned())
            .collect()
    }

    /// Every domain recorded in node provenance
    pub fn all_domains(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .filter_map(|n| n.domain().map(str::to_string))
            .collect()
    }

    /// Node counts per type
    pub fn type_counts(&self) -> BTreeMap<NodeType, usize> {
        let mut counts = BTreeMap::new();
        for node in self.nodes.values() {
            *counts.entry(node.node_type()).or_insert(0) += 1;
        }
        counts
    }

    // ------------------------------------------------------------------------
    // Edge Queries
    // ------------------------------------------------------------------------

    /// All edges, in insertion order
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Edges whose source is `id`. Unknown ids yield nothing.
    pub fn edges_from<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> {
        self.indexed_edges(self.outgoing.get(id))
    }

    /// Edges whose target is `id`. Unknown ids yield nothing.
    pub fn edges_to<'a>(&'a self, id: &str) -> impl Iterator<Item = &'a Edge> {
        self.indexed_edges(self.incoming.get(id))
    }

    /// Edges of the given type
    pub fn edges_by_type(&self, edge_type: EdgeType) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.edge_type == edge_type)
    }

    /// Edges whose target is not a node in this graph
    pub fn dangling_edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges
            .iter()
            .filter(move |e| !self.nodes.contains_key(&e.to))
    }

    fn indexed_edges<'a>(&'a self, positions: Option<&'a Vec<usize>>) -> impl Iterator<Item = &'a Edge> {
        positions
            .into_iter()
            .flatten()
            .filter_map(move |&i| self.edges.get(i))
    }

    // ------------------------------------------------------------------------
    // Analysis
    // ------------------------------------------------------------------------

    /// Summary statistics
    pub fn stats(&self) -> GraphStats {
        let node_count = self.nodes.len();
        let edge_count = self.edges.len();
        let average_degree = if node_count == 0 {
            0.0
        } else {
            edge_count as f64 / node_count as f64
        };
        GraphStats {
            node_count,
            edge_count,
            average_degree,
        }
    }

    /// Whether the edges form at least one directed cycle.
    ///
    /// Dangling targets take part as plain vertices; a self-loop counts as
    /// a cycle.
    pub fn has_cycles(&self) -> bool {
        is_cyclic_directed(&self.to_graph_map())
    }

    /// Groups of node ids that lie on a common cycle.
    ///
    /// Each group is a strongly connected component with more than one
    /// member, or a single node with a self-loop. Ids inside a group and
    /// the groups themselves are sorted.
    pub fn cyclic_components(&self) -> Vec<Vec<String>> {
        let map = self.to_graph_map();
        let mut components: Vec<Vec<String>> = tarjan_scc(&map)
            .into_iter()
            .filter(|scc| scc.len() > 1 || map.contains_edge(scc[0], scc[0]))
            .map(|scc| {
                let mut ids: Vec<String> = scc.into_iter().map(str::to_string).collect();
                ids.sort();
                ids
            })
            .collect();
        components.sort();
        components
    }

    fn to_graph_map(&self) -> DiGraphMap<&str, ()> {
        let mut map = DiGraphMap::new();
        for id in self.nodes.keys() {
            map.add_node(id.as_str());
        }
        for edge in &self.edges {
            map.add_edge(edge.from.as_str(), edge.to.as_str(), ());
        }
        map
    }
}

impl From<GraphDocument> for PropertyGraph {
    fn from(document: GraphDocument) -> Self {
        PropertyGraph::from_document(document)
    }
}

impl From<PropertyGraph> for GraphDocument {
    fn from(graph: PropertyGraph) -> Self {
        GraphDocument {
            metadata: graph.metadata,
            nodes: graph.nodes.into_values().collect(),
            edges: graph.edges,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Provenance;
    use pretty_assertions::assert_eq;

    fn provenance(domain: &str) -> Provenance {
        Provenance::new(domain, format!("{}-ext", domain), "1.0.0", 0)
    }

    fn sample_graph() -> PropertyGraph {
        let mut graph = PropertyGraph::new(GraphMetadata::new("/repo", 1).with_id("g1"));
        graph.insert_node(
            Node::new("file", NodeType::File, "user.ts")
                .with_label("CodeElement")
                .with_source(provenance("code")),
        );
        graph.insert_node(
            Node::new("class", NodeType::Class, "User")
                .with_labels(["CodeElement", "Type"])
                .with_source(provenance("code")),
        );
        graph.insert_node(
            Node::new("dir", NodeType::FsDirectory, "src").with_source(provenance("filesystem")),
        );
        graph.push_edge(Edge::new("e1", EdgeType::Contains, "file", "class"));
        graph.push_edge(Edge::new("e2", EdgeType::Contains, "dir", "file"));
        graph.push_edge(Edge::new("e3", EdgeType::References, "class", "missing"));
        graph
    }

    fn ids<'a>(nodes: impl Iterator<Item = &'a Node>) -> Vec<&'a str> {
        nodes.map(|n| n.id.as_str()).collect()
    }

    #[test]
    fn test_reinserting_node_overwrites() {
        let mut graph = PropertyGraph::new(GraphMetadata::new("/repo", 0));
        graph.insert_node(Node::new("a", NodeType::File, "first"));
        graph.insert_node(Node::new("a", NodeType::File, "second"));
        graph.insert_node(Node::new("b", NodeType::File, "other"));

        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.get_node("a").unwrap().name, "second");
    }

    #[test]
    fn test_edges_from_and_to() {
        let graph = sample_graph();

        let from_file: Vec<_> = graph.edges_from("file").map(|e| e.id.as_str()).collect();
        assert_eq!(from_file, vec!["e1"]);

        let to_file: Vec<_> = graph.edges_to("file").map(|e| e.id.as_str()).collect();
        assert_eq!(to_file, vec!["e2"]);

        let to_missing: Vec<_> = graph.edges_to("missing").map(|e| e.id.as_str()).collect();
        assert_eq!(to_missing, vec!["e3"]);

        assert_eq!(graph.edges_from("nope").count(), 0);
        assert_eq!(graph.edges_to("nope").count(), 0);
    }

    #[test]
    fn test_dangling_edges_are_kept() {
        let graph = sample_graph();
        assert_eq!(graph.edge_count(), 3);
        let dangling: Vec<_> = graph.dangling_edges().map(|e| e.id.as_str()).collect();
        assert_eq!(dangling, vec!["e3"]);
    }

    #[test]
    fn test_label_queries() {
        let graph = sample_graph();

        assert_eq!(ids(graph.nodes_by_label("Type")), vec!["class"]);
        assert_eq!(
            ids(graph.nodes_by_all_labels(&["CodeElement", "Type"])),
            vec!["class"]
        );
        assert_eq!(
            ids(graph.nodes_by_any_label(&["Type", "CodeElement"])),
            vec!["class", "file"]
        );
        assert_eq!(graph.nodes_by_any_label(&[]).count(), 0);
        assert_eq!(graph.nodes_by_all_labels(&[]).count(), 3);

        let labels: Vec<_> = graph.all_labels().into_iter().collect();
        assert_eq!(labels, vec!["CodeElement", "Type"]);
    }

    #[test]
    fn test_domain_queries() {
        let graph = sample_graph();

        assert_eq!(ids(graph.nodes_by_domain("filesystem")), vec!["dir"]);
        assert_eq!(ids(graph.nodes_by_domain("code")), vec!["class", "file"]);
        assert_eq!(graph.nodes_by_domain("git").count(), 0);

        let domains: Vec<_> = graph.all_domains().into_iter().collect();
        assert_eq!(domains, vec!["code", "filesystem"]);
    }

    #[test]
    fn test_type_queries() {
        let graph = sample_graph();
        assert_eq!(ids(graph.nodes_by_type(NodeType::Class)), vec!["class"]);
        assert_eq!(graph.type_counts().get(&NodeType::File), Some(&1));
        assert_eq!(graph.edges_by_type(EdgeType::Contains).count(), 2);
    }

    #[test]
    fn test_stats() {
        let empty = PropertyGraph::new(GraphMetadata::new("/repo", 0));
        assert_eq!(empty.stats().average_degree, 0.0);

        let stats = sample_graph().stats();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 3);
        assert!((stats.average_degree - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cycle_detection() {
        let graph = sample_graph();
        assert!(!graph.has_cycles());
        assert!(graph.cyclic_components().is_empty());

        let mut cyclic = sample_graph();
        cyclic.push_edge(Edge::new("e4", EdgeType::Calls, "class", "dir"));
        assert!(cyclic.has_cycles());
        assert_eq!(
            cyclic.cyclic_components(),
            vec![vec!["class".to_string(), "dir".to_string(), "file".to_string()]]
        );
    }

    #[test]
    fn test_self_loop_is_a_cycle() {
        let mut graph = PropertyGraph::new(GraphMetadata::new("/repo", 0));
        graph.insert_node(Node::new("f", NodeType::Function, "recurse"));
        graph.push_edge(Edge::new("e", EdgeType::Calls, "f", "f"));

        assert!(graph.has_cycles());
        assert_eq!(graph.cyclic_components(), vec![vec!["f".to_string()]]);
    }

    #[test]
    fn test_document_round_trip_rebuilds_indices() {
        let graph = sample_graph();
        let json = serde_json::to_string(&graph).unwrap();
        let restored: PropertyGraph = serde_json::from_str(&json).unwrap();

        assert_eq!(restored.metadata(), graph.metadata());
        assert_eq!(restored.to_document(), graph.to_document());
        assert_eq!(restored.edges_to("class").count(), 1);
    }

    #[test]
    fn test_graph_metadata_id_is_derived() {
        let a = GraphMetadata::new("/repo", 10);
        let b = GraphMetadata::new("/repo", 10);
        let c = GraphMetadata::new("/repo", 11);
        assert_eq!(a.id, b.id);
        assert_ne!(a.id, c.id);
        assert_eq!(a.language, MULTI_LANGUAGE);
    }
}
