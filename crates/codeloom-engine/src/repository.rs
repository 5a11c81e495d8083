//! Graph Repository
//!
//! Persistence port for finished graphs, with an in-memory implementation
//! for tests and embedding, and a JSON-file implementation that stores one
//! `<id>.json` document per graph.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use codeloom_core::{GraphMetadata, PropertyGraph};
use dashmap::DashMap;
use serde::Deserialize;
use tokio::fs;
use tracing::{debug, warn};

use crate::error::RepositoryError;

/// Storage for finished graphs.
#[async_trait]
pub trait GraphRepository: Send + Sync {
    /// Store a graph, replacing any graph with the same id
    async fn save(&self, graph: &PropertyGraph) -> Result<(), RepositoryError>;

    /// Load a graph by id
    async fn find_by_id(&self, id: &str) -> Result<Option<PropertyGraph>, RepositoryError>;

    /// Most recently created graph for a codebase
    async fn find_by_codebase_id(
        &self,
        codebase_id: &str,
    ) -> Result<Option<PropertyGraph>, RepositoryError>;

    /// Remove a graph. Returns whether it existed.
    async fn delete(&self, id: &str) -> Result<bool, RepositoryError>;

    /// Metadata of every stored graph, oldest first
    async fn list(&self) -> Result<Vec<GraphMetadata>, RepositoryError>;

    /// Whether a graph with `id` is stored
    async fn exists(&self, id: &str) -> Result<bool, RepositoryError>;
}

/// Newest first by creation time, ties broken by id
fn newest<'a>(candidates: impl Iterator<Item = &'a GraphMetadata>) -> Option<&'a GraphMetadata> {
    candidates.max_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    })
}

fn sort_oldest_first(list: &mut [GraphMetadata]) {
    list.sort_by(|a, b| {
        a.created_at
            .cmp(&b.created_at)
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ============================================================================
// In-Memory
// ============================================================================

/// Repository keeping graphs in a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryGraphRepository {
    graphs: DashMap<String, PropertyGraph>,
}

impl InMemoryGraphRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored graphs
    pub fn len(&self) -> usize {
        self.graphs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.graphs.is_empty()
    }
}

#[async_trait]
impl GraphRepository for InMemoryGraphRepository {
    async fn save(&self, graph: &PropertyGraph) -> Result<(), RepositoryError> {
        self.graphs.insert(graph.id().to_string(), graph.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PropertyGraph>, RepositoryError> {
        Ok(self.graphs.get(id).map(|g| g.clone()))
    }

    async fn find_by_codebase_id(
        &self,
        codebase_id: &str,
    ) -> Result<Option<PropertyGraph>, RepositoryError> {
        let metadata: Vec<GraphMetadata> = self
            .graphs
            .iter()
            .filter(|g| g.metadata().codebase_id == codebase_id)
            .map(|g| g.metadata().clone())
            .collect();
        match newest(metadata.iter()) {
            Some(latest) => self.find_by_id(&latest.id).await,
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.graphs.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<GraphMetadata>, RepositoryError> {
        let mut list: Vec<GraphMetadata> =
            self.graphs.iter().map(|g| g.metadata().clone()).collect();
        sort_oldest_first(&mut list);
        Ok(list)
    }

    async fn exists(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.graphs.contains_key(id))
    }
}

// ============================================================================
// JSON Files
// ============================================================================

const GRAPH_EXT: &str = "json";

/// Only the metadata of a stored document; the rest is skipped
#[derive(Deserialize)]
struct MetadataOnly {
    metadata: GraphMetadata,
}

/// Repository storing each graph as `<dir>/<id>.json`.
#[derive(Debug, Clone)]
pub struct JsonFileGraphRepository {
    directory: PathBuf,
}

impl JsonFileGraphRepository {
    /// Create a repository rooted at `directory`. The directory is created
    /// on first save.
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    /// Storage directory
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn graph_path(&self, id: &str) -> Result<PathBuf, RepositoryError> {
        let valid = !id.is_empty()
            && id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
            && !id.starts_with('.');
        if !valid {
            return Err(RepositoryError::invalid_id(id));
        }
        Ok(self.directory.join(format!("{}.{}", id, GRAPH_EXT)))
    }

    async fn read_graph(&self, path: &Path) -> Result<Option<PropertyGraph>, RepositoryError> {
        let bytes = match fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RepositoryError::io(path, e)),
        };
        Ok(Some(serde_json::from_slice(&bytes)?))
    }

    /// Metadata of every readable document. Unreadable files are skipped.
    async fn scan(&self) -> Result<Vec<GraphMetadata>, RepositoryError> {
        let mut found = Vec::new();
        let mut dir = match fs::read_dir(&self.directory).await {
            Ok(dir) => dir,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
            Err(e) => return Err(RepositoryError::io(&self.directory, e)),
        };

        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| RepositoryError::io(&self.directory, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(GRAPH_EXT) {
                continue;
            }
            let bytes = fs::read(&path)
                .await
                .map_err(|e| RepositoryError::io(&path, e))?;
            match serde_json::from_slice::<MetadataOnly>(&bytes) {
                Ok(doc) => found.push(doc.metadata),
                Err(e) => warn!("Skipping unreadable graph {}: {}", path.display(), e),
            }
        }
        Ok(found)
    }
}

#[async_trait]
impl GraphRepository for JsonFileGraphRepository {
    async fn save(&self, graph: &PropertyGraph) -> Result<(), RepositoryError> {
        let path = self.graph_path(graph.id())?;
        fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| RepositoryError::io(&self.directory, e))?;

        let json = serde_json::to_vec_pretty(graph)?;
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &json)
            .await
            .map_err(|e| RepositoryError::io(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| RepositoryError::io(&path, e))?;

        debug!("Saved graph {} to {}", graph.id(), path.display());
        Ok(())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<PropertyGraph>, RepositoryError> {
        let path = self.graph_path(id)?;
        self.read_graph(&path).await
    }

    async fn find_by_codebase_id(
        &self,
        codebase_id: &str,
    ) -> Result<Option<PropertyGraph>, RepositoryError> {
        let all = self.scan().await?;
        match newest(all.iter().filter(|m| m.codebase_id == codebase_id)) {
            Some(latest) => self.find_by_id(&latest.id).await,
            None => Ok(None),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let path = self.graph_path(id)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(RepositoryError::io(path, e)),
        }
    }

    async fn list(&self) -> Result<Vec<GraphMetadata>, RepositoryError> {
        let mut list = self.scan().await?;
        sort_oldest_first(&mut list);
        Ok(list)
    }

    async fn exists(&self, id: &str) -> Result<bool, RepositoryError> {
        let path = self.graph_path(id)?;
        fs::try_exists(&path)
            .await
            .map_err(|e| RepositoryError::io(path, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloom_core::{GraphBuilder, Node, NodeType};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn graph(id: &str, codebase: &str, created_at: u64) -> PropertyGraph {
        let mut builder = GraphBuilder::new();
        builder.start(GraphMetadata::new(codebase, created_at).with_id(id));
        builder
            .add_node(Node::new(format!("{}-n", id), NodeType::File, "f"))
            .unwrap();
        builder.build().unwrap()
    }

    async fn exercise(repo: &dyn GraphRepository) {
        assert!(repo.list().await.unwrap().is_empty());
        assert!(repo.find_by_codebase_id("/a").await.unwrap().is_none());

        repo.save(&graph("g1", "/a", 10)).await.unwrap();
        repo.save(&graph("g2", "/a", 20)).await.unwrap();
        repo.save(&graph("g3", "/b", 15)).await.unwrap();

        assert!(repo.exists("g1").await.unwrap());
        assert!(!repo.exists("g9").await.unwrap());

        let loaded = repo.find_by_id("g3").await.unwrap().unwrap();
        assert_eq!(loaded.metadata().codebase_id, "/b");
        assert!(loaded.contains_node("g3-n"));

        let latest = repo.find_by_codebase_id("/a").await.unwrap().unwrap();
        assert_eq!(latest.id(), "g2");

        let ids: Vec<_> = repo
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["g1", "g3", "g2"]);

        assert!(repo.delete("g2").await.unwrap());
        assert!(!repo.delete("g2").await.unwrap());
        let latest = repo.find_by_codebase_id("/a").await.unwrap().unwrap();
        assert_eq!(latest.id(), "g1");
    }

    #[tokio::test]
    async fn test_in_memory_repository() {
        let repo = InMemoryGraphRepository::new();
        exercise(&repo).await;
        assert_eq!(repo.len(), 2);
    }

    #[tokio::test]
    async fn test_json_file_repository() {
        let dir = TempDir::new().unwrap();
        let repo = JsonFileGraphRepository::new(dir.path().join("graphs"));
        exercise(&repo).await;
        assert!(dir.path().join("graphs/g1.json").is_file());
    }

    #[tokio::test]
    async fn test_json_file_repository_rejects_path_ids() {
        let dir = TempDir::new().unwrap();
        let repo = JsonFileGraphRepository::new(dir.path());
        let err = repo.find_by_id("../escape").await.unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidId { .. }));
    }

    #[tokio::test]
    async fn test_json_file_repository_skips_foreign_files() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("notes.json"), b"{\"hello\": 1}").unwrap();
        std::fs::write(dir.path().join("readme.txt"), b"x").unwrap();

        let repo = JsonFileGraphRepository::new(dir.path());
        repo.save(&graph("g1", "/a", 1)).await.unwrap();
        assert_eq!(repo.list().await.unwrap().len(), 1);
    }
}
