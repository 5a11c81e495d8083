//! codeloom Engine - Extension protocol and orchestration
//!
//! This crate turns a set of extensions into one merged property graph:
//! - [`Extension`]: the two-phase (parse, link) plugin contract
//! - [`GraphQuery`]: read-only view over the parsed nodes used while linking
//! - [`ParsingService`]: runs extensions, isolates their failures, persists
//! - [`GraphRepository`]: storage port with in-memory and JSON-file backends
//!
//! ## Example
//!
//! ```ignore
//! use codeloom_engine::{InMemoryGraphRepository, ParsingService};
//! use std::sync::Arc;
//!
//! let service = ParsingService::new(extensions, Arc::new(InMemoryGraphRepository::new()));
//! let graph = service.parse("/path/to/repo").await?;
//! println!("{} nodes", graph.node_count());
//! ```

mod error;
mod extension;
mod query;
mod repository;
mod service;

pub use error::{EngineError, RepositoryError};
pub use extension::{
    EdgeTypeInfo, Extension, ExtensionMetadata, ExtensionOutput, LinkContext, NodeTypeInfo,
    ParseContext,
};
pub use query::{GraphQuery, QueryCriteria};
pub use repository::{GraphRepository, InMemoryGraphRepository, JsonFileGraphRepository};
pub use service::{
    ExtensionContribution, ExtensionFailure, ParseOptions, ParseReport, ParseRun, ParsingService,
    Phase, ProgressCallback,
};
