//! Cache error types.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the cache layers.
///
/// The [`MultiLevelCache`](crate::MultiLevelCache) facade never surfaces
/// these to `get`/`set` callers; they are logged and treated as a miss.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Filesystem operation failed
    #[error("cache I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Value or metadata could not be encoded or decoded
    #[error("cache serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The disk layer needs a running tokio runtime for its writer task
    #[error("file cache requires a tokio runtime")]
    NoRuntime,
}

impl CacheError {
    /// Create a new Io error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_display_includes_path() {
        let err = CacheError::io(
            "/tmp/cache/ab/abc.json",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        let msg = err.to_string();
        assert!(msg.contains("/tmp/cache/ab/abc.json"));
        assert!(msg.contains("denied"));
    }
}
