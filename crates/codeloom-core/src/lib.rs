//! codeloom Core - Property graph model, store and builder
//!
//! This crate provides the data layer shared by every other codeloom crate:
//! - Node and edge types with typed metadata, labels and provenance
//! - The in-memory property graph with its query surface
//! - The stateful graph builder used during an orchestration run
//! - Clock and id-generation seams

pub mod builder;
pub mod clock;
pub mod error;
pub mod graph;
pub mod ids;
pub mod model;

pub use builder::{BuilderError, GraphBuilder};
pub use clock::{system_clock, Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use graph::{GraphDocument, GraphMetadata, GraphStats, PropertyGraph, MULTI_LANGUAGE};
pub use ids::{sha256_hex, ContentHashIdGenerator, IdGenerator, SequentialIdGenerator};
pub use model::{
    Edge, EdgeMetadata, EdgeType, Node, NodeMetadata, NodeType, Provenance, DEFAULT_EDGE_WEIGHT,
};
