//! Filesystem walker extension.
//!
//! Emits one `fs_directory` node per directory and one `fs_file` node per
//! file under the root, connected by `contains` edges. Ignore files
//! (`.gitignore`, `.ignore`) are honoured and `exclude` globs prune further.
//!
//! Per-file facts (size, line count, language, content hash) are cached
//! under a key derived from the file's path and content, so unchanged
//! files are not re-derived on the next build.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use codeloom_cache::{hash_content, key_for_content, MultiLevelCache};
use codeloom_core::{Edge, EdgeType, Node, NodeMetadata, NodeType};
use codeloom_engine::{
    EdgeTypeInfo, Extension, ExtensionMetadata, ExtensionOutput, NodeTypeInfo, ParseContext,
};
use globset::{Glob, GlobSet, GlobSetBuilder};
use ignore::WalkBuilder;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

pub const NAME: &str = "filesystem";

/// Data directory never walked
const LOOM_DIR: &str = ".codeloom";

/// Settings read from `[extensions.filesystem]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilesystemSettings {
    /// Glob patterns, relative to the root, to leave out
    pub exclude: Vec<String>,
    /// Walk hidden files and directories
    pub include_hidden: bool,
    /// Files above this size get a node but no content facts
    pub max_file_kb: u64,
}

impl Default for FilesystemSettings {
    fn default() -> Self {
        Self {
            exclude: Vec::new(),
            include_hidden: false,
            max_file_kb: 1024,
        }
    }
}

impl FilesystemSettings {
    fn from_config(config: &serde_json::Value) -> Result<Self> {
        if config.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(config.clone()).context("invalid filesystem settings")
    }

    fn exclude_set(&self) -> Result<GlobSet> {
        let mut builder = GlobSetBuilder::new();
        for pattern in &self.exclude {
            let glob =
                Glob::new(pattern).with_context(|| format!("invalid exclude glob '{}'", pattern))?;
            builder.add(glob);
        }
        Ok(builder.build()?)
    }
}

/// Facts derived from a file's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFacts {
    pub size: u64,
    pub lines: usize,
    pub language: Option<String>,
    pub content_hash: String,
}

impl FileFacts {
    fn derive(path: &Path, content: &[u8]) -> Self {
        let lines = if content.is_empty() {
            0
        } else {
            content.iter().filter(|&&b| b == b'\n').count()
                + usize::from(!content.ends_with(b"\n"))
        };
        Self {
            size: content.len() as u64,
            lines,
            language: language_for(path).map(str::to_string),
            content_hash: hash_content(content),
        }
    }
}

/// Language by file extension
fn language_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?;
    Some(match ext {
        "rs" => "rust",
        "py" | "pyi" => "python",
        "js" | "mjs" | "cjs" | "jsx" => "javascript",
        "ts" | "tsx" | "mts" | "cts" => "typescript",
        "go" => "go",
        "java" => "java",
        "kt" | "kts" => "kotlin",
        "c" | "h" => "c",
        "cc" | "cpp" | "cxx" | "hpp" | "hh" => "cpp",
        "cs" => "csharp",
        "rb" => "ruby",
        "php" => "php",
        "swift" => "swift",
        "md" | "markdown" => "markdown",
        "toml" => "toml",
        "json" => "json",
        "yaml" | "yml" => "yaml",
        "sh" | "bash" => "shell",
        _ => return None,
    })
}

/// A walked entry, relative to the root
#[derive(Debug)]
struct Entry {
    relative: String,
    absolute: PathBuf,
    is_dir: bool,
}

/// Walk the root. Blocking; run off the async executor.
fn walk(root: &Path, settings: &FilesystemSettings) -> Result<Vec<Entry>> {
    let excludes = settings.exclude_set()?;
    let filter_root = root.to_path_buf();
    let walker = WalkBuilder::new(root)
        .hidden(!settings.include_hidden)
        .require_git(false)
        .sort_by_file_name(|a, b| a.cmp(b))
        .filter_entry(move |entry| {
            let Ok(relative) = entry.path().strip_prefix(&filter_root) else {
                return true;
            };
            if relative.as_os_str().is_empty() {
                return true;
            }
            !(relative.starts_with(LOOM_DIR) || excludes.is_match(relative))
        })
        .build();

    let mut entries = Vec::new();
    for result in walker {
        let entry = match result {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                continue;
            }
        };
        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let Some(file_type) = entry.file_type() else {
            continue;
        };
        if !file_type.is_dir() && !file_type.is_file() {
            continue;
        }
        entries.push(Entry {
            relative: to_slash(relative),
            absolute: entry.path().to_path_buf(),
            is_dir: file_type.is_dir(),
        });
    }
    Ok(entries)
}

fn to_slash(path: &Path) -> String {
    let joined = path
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/");
    if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

fn parent_of(relative: &str) -> Option<&str> {
    if relative == "." {
        return None;
    }
    Some(relative.rsplit_once('/').map_or(".", |(parent, _)| parent))
}

fn name_of(relative: &str, root: &Path) -> String {
    match relative {
        "." => root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string()),
        _ => relative
            .rsplit_once('/')
            .map_or(relative, |(_, name)| name)
            .to_string(),
    }
}

/// Walks the workspace and emits its directory tree.
pub struct FilesystemExtension {
    meta: ExtensionMetadata,
    node_types: Vec<NodeTypeInfo>,
    edge_types: Vec<EdgeTypeInfo>,
    cache: Option<Arc<MultiLevelCache<FileFacts>>>,
}

impl FilesystemExtension {
    /// Create the extension. Without a cache every file is read and
    /// derived on each run.
    pub fn new(cache: Option<Arc<MultiLevelCache<FileFacts>>>) -> Self {
        Self {
            meta: ExtensionMetadata::new(NAME, env!("CARGO_PKG_VERSION"), "filesystem"),
            node_types: vec![
                NodeTypeInfo::new(NodeType::FsDirectory, "Directory"),
                NodeTypeInfo::new(NodeType::FsFile, "File"),
            ],
            edge_types: vec![EdgeTypeInfo::new(EdgeType::Contains, "Contains")],
            cache,
        }
    }

    async fn facts(&self, entry: &Entry, settings: &FilesystemSettings) -> Result<Option<FileFacts>> {
        let size = tokio::fs::metadata(&entry.absolute)
            .await
            .with_context(|| format!("failed to stat {}", entry.absolute.display()))?
            .len();
        if size > settings.max_file_kb.saturating_mul(1024) {
            debug!("Skipping content of large file {} ({} bytes)", entry.relative, size);
            return Ok(None);
        }

        let content = tokio::fs::read(&entry.absolute)
            .await
            .with_context(|| format!("failed to read {}", entry.absolute.display()))?;

        let Some(ref cache) = self.cache else {
            return Ok(Some(FileFacts::derive(&entry.absolute, &content)));
        };

        let key = key_for_content(&entry.relative, &content);
        if let Some(facts) = cache.get(&key).await {
            return Ok(Some(facts));
        }
        let facts = FileFacts::derive(&entry.absolute, &content);
        cache.set(key, facts.clone());
        Ok(Some(facts))
    }
}

#[async_trait]
impl Extension for FilesystemExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    fn node_types(&self) -> &[NodeTypeInfo] {
        &self.node_types
    }

    fn edge_types(&self) -> &[EdgeTypeInfo] {
        &self.edge_types
    }

    async fn parse(&self, ctx: &ParseContext) -> Result<ExtensionOutput> {
        let settings = FilesystemSettings::from_config(&ctx.config)?;
        let root = ctx.root_path.clone();
        let walk_settings = settings.clone();
        let entries = tokio::task::spawn_blocking(move || walk(&root, &walk_settings))
            .await
            .context("filesystem walk was cancelled")??;

        let mut ids: HashMap<String, String> = HashMap::new();
        let mut output = ExtensionOutput::empty();

        for entry in &entries {
            let name = name_of(&entry.relative, &ctx.root_path);
            let (node_type, metadata) = if entry.is_dir {
                (
                    NodeType::FsDirectory,
                    NodeMetadata::new().with_file_path(&entry.relative),
                )
            } else {
                let mut metadata = NodeMetadata::new().with_file_path(&entry.relative);
                match self.facts(entry, &settings).await {
                    Ok(Some(facts)) => {
                        metadata = metadata
                            .with_size(facts.size)
                            .with_extra("lines", facts.lines.into())
                            .with_extra("content_hash", facts.content_hash.into());
                        if let Some(language) = facts.language {
                            metadata = metadata.with_language(language);
                        }
                    }
                    Ok(None) => {}
                    Err(e) => warn!("{:#}", e),
                }
                (NodeType::FsFile, metadata)
            };

            let id = ctx
                .ids
                .node_id(node_type, &name, Some(entry.relative.as_str()));
            output
                .nodes
                .push(Node::new(&id, node_type, name).with_metadata(metadata));

            if let Some(parent_id) = parent_of(&entry.relative).and_then(|p| ids.get(p)) {
                output.edges.push(Edge::new(
                    ctx.ids.edge_id(EdgeType::Contains, parent_id, &id),
                    EdgeType::Contains,
                    parent_id,
                    &id,
                ));
            }
            ids.insert(entry.relative.clone(), id);
        }

        if let Some(ref cache) = self.cache {
            let stats = cache.stats();
            debug!(
                "File facts cache: {} memory hits, {} disk hits, {} misses",
                stats.l1_hits, stats.l2_hits, stats.misses
            );
        }

        Ok(output)
    }

    async fn dispose(&self) -> Result<()> {
        if let Some(ref cache) = self.cache {
            cache.flush().await;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeloom_cache::CacheConfig;
    use codeloom_core::SequentialIdGenerator;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn ctx(root: &Path, config: serde_json::Value) -> ParseContext {
        ParseContext {
            root_path: root.to_path_buf(),
            config,
            ids: Arc::new(SequentialIdGenerator::new()),
            span: tracing::Span::none(),
        }
    }

    fn fixture() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/nested")).unwrap();
        std::fs::create_dir_all(root.join("target/debug")).unwrap();
        std::fs::create_dir_all(root.join(".codeloom/graphs")).unwrap();
        std::fs::write(root.join("src/lib.rs"), "fn a() {}\nfn b() {}\n").unwrap();
        std::fs::write(root.join("src/nested/util.py"), "x = 1").unwrap();
        std::fs::write(root.join("target/debug/out.bin"), [0u8; 4]).unwrap();
        std::fs::write(root.join(".codeloom/graphs/g.json"), "{}").unwrap();
        std::fs::write(root.join("README.md"), "# hi\n").unwrap();
        dir
    }

    fn paths(output: &ExtensionOutput, node_type: NodeType) -> Vec<String> {
        output
            .nodes
            .iter()
            .filter(|n| n.node_type() == node_type)
            .filter_map(|n| n.metadata.file_path.clone())
            .collect()
    }

    #[tokio::test]
    async fn test_walks_tree_with_excludes() {
        let dir = fixture();
        let ext = FilesystemExtension::new(None);
        let output = ext
            .parse(&ctx(dir.path(), json!({"exclude": ["target/**", "target"]})))
            .await
            .unwrap();

        assert_eq!(
            paths(&output, NodeType::FsDirectory),
            vec![".", "src", "src/nested"]
        );
        assert_eq!(
            paths(&output, NodeType::FsFile),
            vec!["README.md", "src/lib.rs", "src/nested/util.py"]
        );
        // One contains edge per non-root entry
        assert_eq!(output.edges.len(), output.nodes.len() - 1);
        assert!(output.edges.iter().all(|e| e.edge_type == EdgeType::Contains));
    }

    #[tokio::test]
    async fn test_file_facts() {
        let dir = fixture();
        let ext = FilesystemExtension::new(None);
        let output = ext.parse(&ctx(dir.path(), json!(null))).await.unwrap();

        let lib = output
            .nodes
            .iter()
            .find(|n| n.metadata.file_path.as_deref() == Some("src/lib.rs"))
            .unwrap();
        assert_eq!(lib.name, "lib.rs");
        assert_eq!(lib.metadata.size, Some(20));
        assert_eq!(lib.metadata.language.as_deref(), Some("rust"));
        assert_eq!(lib.metadata.get("lines"), Some(json!(2)));

        let util = output
            .nodes
            .iter()
            .find(|n| n.metadata.file_path.as_deref() == Some("src/nested/util.py"))
            .unwrap();
        assert_eq!(util.metadata.get("lines"), Some(json!(1)));
    }

    #[tokio::test]
    async fn test_contains_edges_follow_hierarchy() {
        let dir = fixture();
        let ext = FilesystemExtension::new(None);
        let output = ext.parse(&ctx(dir.path(), json!({}))).await.unwrap();

        let id_of = |path: &str| {
            output
                .nodes
                .iter()
                .find(|n| n.metadata.file_path.as_deref() == Some(path))
                .map(|n| n.id.clone())
                .unwrap()
        };
        let nested = id_of("src/nested");
        let util = id_of("src/nested/util.py");
        assert!(output
            .edges
            .iter()
            .any(|e| e.from == nested && e.to == util));
        let root = id_of(".");
        assert!(output.edges.iter().all(|e| e.to != root));
    }

    #[tokio::test]
    async fn test_gitignore_is_honoured() {
        let dir = fixture();
        std::fs::write(dir.path().join(".gitignore"), "target/\n").unwrap();
        let ext = FilesystemExtension::new(None);
        let output = ext.parse(&ctx(dir.path(), json!({}))).await.unwrap();

        assert!(!paths(&output, NodeType::FsDirectory)
            .iter()
            .any(|p| p.starts_with("target")));
    }

    #[tokio::test]
    async fn test_large_files_get_no_facts() {
        let dir = fixture();
        std::fs::write(dir.path().join("big.txt"), vec![b'a'; 2048]).unwrap();
        let ext = FilesystemExtension::new(None);
        let output = ext
            .parse(&ctx(dir.path(), json!({"max_file_kb": 1})))
            .await
            .unwrap();

        let big = output.nodes.iter().find(|n| n.name == "big.txt").unwrap();
        assert_eq!(big.metadata.size, None);
    }

    #[tokio::test]
    async fn test_invalid_glob_fails_parse() {
        let dir = fixture();
        let ext = FilesystemExtension::new(None);
        let err = ext
            .parse(&ctx(dir.path(), json!({"exclude": ["[unclosed"]})))
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("[unclosed"));
    }

    #[tokio::test]
    async fn test_facts_are_cached_across_runs() {
        let dir = fixture();
        let cache_dir = TempDir::new().unwrap();
        let config = CacheConfig::default().with_directory(cache_dir.path());

        let first = Arc::new(MultiLevelCache::new(&config).unwrap());
        let ext = FilesystemExtension::new(Some(first.clone()));
        ext.parse(&ctx(dir.path(), json!({}))).await.unwrap();
        ext.dispose().await.unwrap();
        // README.md, src/lib.rs, src/nested/util.py, target/debug/out.bin
        assert_eq!(first.stats().misses, 4);

        // A fresh process only has the disk layer
        let second = Arc::new(MultiLevelCache::new(&config).unwrap());
        let ext = FilesystemExtension::new(Some(second.clone()));
        ext.parse(&ctx(dir.path(), json!({}))).await.unwrap();
        assert_eq!(second.stats().l2_hits, 4);
        assert_eq!(second.stats().misses, 0);

        // Editing a file changes its key
        std::fs::write(dir.path().join("README.md"), "# changed\n").unwrap();
        ext.parse(&ctx(dir.path(), json!({}))).await.unwrap();
        assert_eq!(second.stats().l1_hits, 3);
        assert_eq!(second.stats().misses, 1);
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_of("."), None);
        assert_eq!(parent_of("src"), Some("."));
        assert_eq!(parent_of("src/a/b.rs"), Some("src/a"));
        assert_eq!(name_of("src/a/b.rs", Path::new("/x")), "b.rs");
        assert_eq!(name_of(".", Path::new("/x/repo")), "repo");
        assert_eq!(language_for(Path::new("a.tsx")), Some("typescript"));
        assert_eq!(language_for(Path::new("Makefile")), None);
    }
}
