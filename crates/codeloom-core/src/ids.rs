//! Node and edge identifier generation.
//!
//! Extensions mint ids through an [`IdGenerator`] so the strategy can be
//! swapped: sequential ids give reproducible tests, content-derived ids
//! stay stable across runs.

use std::sync::atomic::{AtomicU64, Ordering};

use sha2::{Digest, Sha256};

use crate::model::{EdgeType, NodeType};

/// Strategy for minting node and edge ids.
pub trait IdGenerator: Send + Sync + std::fmt::Debug {
    /// Id for a node identified by its type, name and (optional) file path
    fn node_id(&self, node_type: NodeType, name: &str, file_path: Option<&str>) -> String;

    /// Id for an edge of `edge_type` between two node ids
    fn edge_id(&self, edge_type: EdgeType, from: &str, to: &str) -> String;
}

/// Process-local monotonic ids: `node_1`, `node_2`, `edge_1`, …
///
/// Each instance owns its counters, so a fresh generator always starts at 1.
#[derive(Debug, Default)]
pub struct SequentialIdGenerator {
    nodes: AtomicU64,
    edges: AtomicU64,
}

impl SequentialIdGenerator {
    /// Create a generator starting at 1
    pub fn new() -> Self {
        Self::default()
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn node_id(&self, _node_type: NodeType, _name: &str, _file_path: Option<&str>) -> String {
        format!("node_{}", self.nodes.fetch_add(1, Ordering::Relaxed) + 1)
    }

    fn edge_id(&self, _edge_type: EdgeType, _from: &str, _to: &str) -> String {
        format!("edge_{}", self.edges.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

/// Ids derived from the identifying parts of the entity.
///
/// The same inputs always produce the same id, across processes.
/// Two edges of the same type between the same nodes share an id.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentHashIdGenerator;

/// Hex characters kept from the digest
const CONTENT_ID_LEN: usize = 16;

impl ContentHashIdGenerator {
    fn digest(kind: &str, parts: &[&str]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(kind.as_bytes());
        for part in parts {
            // Separator keeps ("ab", "c") distinct from ("a", "bc")
            hasher.update([0u8]);
            hasher.update(part.as_bytes());
        }
        let hex = format!("{:x}", hasher.finalize());
        format!("{}_{}", kind, &hex[..CONTENT_ID_LEN])
    }
}

impl IdGenerator for ContentHashIdGenerator {
    fn node_id(&self, node_type: NodeType, name: &str, file_path: Option<&str>) -> String {
        Self::digest(
            "node",
            &[node_type.as_str(), file_path.unwrap_or_default(), name],
        )
    }

    fn edge_id(&self, edge_type: EdgeType, from: &str, to: &str) -> String {
        Self::digest("edge", &[edge_type.as_str(), from, to])
    }
}

/// Lowercase hex SHA-256 of `data`
pub fn sha256_hex(data: &[u8]) -> String {
    format!("{:x}", Sha256::digest(data))
}
