//! Engine error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by a [`GraphRepository`](crate::GraphRepository).
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Filesystem operation failed
    #[error("repository I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored graph could not be encoded or decoded
    #[error("repository serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Graph id cannot be used as a storage key
    #[error("invalid graph id '{id}'")]
    InvalidId { id: String },
}

impl RepositoryError {
    /// Create a new Io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an InvalidId error.
    pub fn invalid_id(id: impl Into<String>) -> Self {
        Self::InvalidId { id: id.into() }
    }
}

/// Errors returned by the orchestrator.
///
/// Extension failures are not errors at this level: they are logged and
/// listed in the run report.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Persisting or loading the graph failed
    #[error("graph repository failed: {0}")]
    Repository(#[from] RepositoryError),

    /// Graph builder misuse
    #[error("graph builder failed: {0}")]
    Builder(#[from] codeloom_core::BuilderError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_error_converts() {
        let err: EngineError = RepositoryError::invalid_id("../x").into();
        assert!(matches!(err, EngineError::Repository(_)));
        assert!(err.to_string().contains("../x"));
    }
}
