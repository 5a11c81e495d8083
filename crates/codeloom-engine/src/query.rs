//! Read-only query view handed to extensions during linking.

use std::collections::BTreeMap;
use std::sync::Arc;

use codeloom_core::{Node, NodeType, PropertyGraph};
use serde_json::Value;

/// Filter over nodes. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryCriteria {
    /// Exact node type
    pub node_type: Option<NodeType>,
    /// Exact node name
    pub name: Option<String>,
    /// Labels that must all be present
    pub labels: Vec<String>,
    /// Provenance domain
    pub domain: Option<String>,
    /// Metadata fields that must equal the given JSON values
    pub metadata: BTreeMap<String, Value>,
}

impl QueryCriteria {
    /// Criteria matching every node
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_type(mut self, node_type: NodeType) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.push(label.into());
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Whether `node` satisfies every set field
    pub fn matches(&self, node: &Node) -> bool {
        if self.node_type.is_some_and(|t| t != node.node_type()) {
            return false;
        }
        if self.name.as_deref().is_some_and(|n| n != node.name) {
            return false;
        }
        if !self.labels.iter().all(|l| node.has_label(l)) {
            return false;
        }
        if self
            .domain
            .as_deref()
            .is_some_and(|d| node.domain() != Some(d))
        {
            return false;
        }
        self.metadata
            .iter()
            .all(|(key, expected)| node.metadata.get(key).as_ref() == Some(expected))
    }
}

/// Query view over a frozen node set.
///
/// Cloning is cheap; all clones share the same snapshot.
#[derive(Debug, Clone)]
pub struct GraphQuery {
    nodes: Arc<BTreeMap<String, Node>>,
}

impl GraphQuery {
    /// Wrap a node snapshot
    pub fn new(nodes: Arc<BTreeMap<String, Node>>) -> Self {
        Self { nodes }
    }

    /// Snapshot the nodes of a finished graph
    pub fn from_graph(graph: &PropertyGraph) -> Self {
        let nodes = graph
            .nodes()
            .map(|n| (n.id.clone(), n.clone()))
            .collect::<BTreeMap<_, _>>();
        Self::new(Arc::new(nodes))
    }

    /// Node by id
    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes of the given type
    pub fn find_by_type(&self, node_type: NodeType) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.node_type() == node_type)
            .collect()
    }

    /// Nodes carrying `label`
    pub fn find_by_label(&self, label: &str) -> Vec<&Node> {
        self.nodes.values().filter(|n| n.has_label(label)).collect()
    }

    /// Nodes from the given provenance domain
    pub fn find_by_domain(&self, domain: &str) -> Vec<&Node> {
        self.nodes
            .values()
            .filter(|n| n.domain() == Some(domain))
            .collect()
    }

    /// Nodes matching `criteria`, ordered by id
    pub fn find(&self, criteria: &QueryCriteria) -> Vec<&Node> {
        self.nodes.values().filter(|n| criteria.matches(n)).collect()
    }

    /// First node (by id) matching `criteria`
    pub fn find_one(&self, criteria: &QueryCriteria) -> Option<&Node> {
        self.nodes.values().find(|n| criteria.matches(n))
    }

    /// Number of nodes in the snapshot
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
