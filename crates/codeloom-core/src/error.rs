//! Core error types.

use thiserror::Error;

/// Errors raised by the graph model.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Node type string not in the vocabulary
    #[error("unknown node type '{0}'")]
    UnknownNodeType(String),

    /// Edge type string not in the vocabulary
    #[error("unknown edge type '{0}'")]
    UnknownEdgeType(String),

    /// Graph document could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CoreError {
    /// Create an UnknownNodeType error.
    pub fn unknown_node_type(value: impl Into<String>) -> Self {
        Self::UnknownNodeType(value.into())
    }

    /// Create an UnknownEdgeType error.
    pub fn unknown_edge_type(value: impl Into<String>) -> Self {
        Self::UnknownEdgeType(value.into())
    }
}
