//! Test-file linker extension.
//!
//! Owns no nodes. During linking it looks at every `fs_file` in the merged
//! node set, recognises test files by name, and adds a `tests` edge from
//! each test file to the source files sharing its stem and extension.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use codeloom_core::{Edge, EdgeMetadata, EdgeType, Node, NodeType};
use codeloom_engine::{
    EdgeTypeInfo, Extension, ExtensionMetadata, ExtensionOutput, LinkContext, ParseContext,
};
use regex::Regex;
use serde::Deserialize;
use tracing::debug;

pub const NAME: &str = "test-files";

/// Name patterns with a `stem` capture group.
const DEFAULT_PATTERNS: &[&str] = &[
    r"^test_(?P<stem>.+)$",
    r"^(?P<stem>.+)_test$",
    r"^(?P<stem>.+)\.(?:test|spec)$",
    r"^(?P<stem>.+)Test$",
];

/// Settings read from `[extensions.test-files]`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TestFileSettings {
    /// Regexes matched against the file name without its extension. Each
    /// must define a `stem` group naming the file under test.
    pub patterns: Vec<String>,
}

impl Default for TestFileSettings {
    fn default() -> Self {
        Self {
            patterns: DEFAULT_PATTERNS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl TestFileSettings {
    fn from_config(config: &serde_json::Value) -> Result<Self> {
        if config.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(config.clone()).context("invalid test-files settings")
    }

    fn compile(&self) -> Result<Vec<Regex>> {
        self.patterns
            .iter()
            .map(|p| {
                let re = Regex::new(p).with_context(|| format!("invalid test pattern '{}'", p))?;
                if re.capture_names().flatten().all(|name| name != "stem") {
                    anyhow::bail!("test pattern '{}' has no 'stem' group", p);
                }
                Ok(re)
            })
            .collect()
    }
}

/// Split `name.ext` into `(name, ext)`; dotfiles and extensionless names
/// have an empty extension.
fn split_name(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, ext),
        _ => (file_name, ""),
    }
}

/// Stem of the file under test, if `stem` looks like a test file name
fn tested_stem<'a>(patterns: &[Regex], stem: &'a str) -> Option<&'a str> {
    patterns
        .iter()
        .find_map(|re| re.captures(stem)?.name("stem"))
        .map(|m| m.as_str())
}

/// Links test files to the files they test.
pub struct TestFilesExtension {
    meta: ExtensionMetadata,
    edge_types: Vec<EdgeTypeInfo>,
}

impl TestFilesExtension {
    pub fn new() -> Self {
        Self {
            meta: ExtensionMetadata::new(NAME, env!("CARGO_PKG_VERSION"), "testing"),
            edge_types: vec![EdgeTypeInfo::new(EdgeType::Tests, "Tests")],
        }
    }
}

impl Default for TestFilesExtension {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Extension for TestFilesExtension {
    fn metadata(&self) -> &ExtensionMetadata {
        &self.meta
    }

    fn edge_types(&self) -> &[EdgeTypeInfo] {
        &self.edge_types
    }

    async fn parse(&self, ctx: &ParseContext) -> Result<ExtensionOutput> {
        // Fail early on bad patterns rather than silently linking nothing
        TestFileSettings::from_config(&ctx.config)?.compile()?;
        Ok(ExtensionOutput::empty())
    }

    async fn link(&self, ctx: &LinkContext) -> Result<Vec<Edge>> {
        let patterns = TestFileSettings::from_config(&ctx.config)?.compile()?;
        let files = ctx.query.find_by_type(NodeType::FsFile);

        // (stem, extension) -> candidate files under test
        let mut by_stem: BTreeMap<(&str, &str), Vec<&Node>> = BTreeMap::new();
        let mut tests = Vec::new();
        for file in files {
            let (stem, ext) = split_name(&file.name);
            match tested_stem(&patterns, stem) {
                Some(target) => tests.push((file, target, ext)),
                None => by_stem.entry((stem, ext)).or_default().push(file),
            }
        }

        let mut edges = Vec::new();
        for (test, target, ext) in tests {
            let Some(subjects) = by_stem.get(&(target, ext)) else {
                debug!("No file under test for {}", test.name);
                continue;
            };
            for subject in subjects {
                edges.push(
                    Edge::new(
                        ctx.ids.edge_id(EdgeType::Tests, &test.id, &subject.id),
                        EdgeType::Tests,
                        &test.id,
                        &subject.id,
                    )
                    .with_metadata(
                        EdgeMetadata::default().with_extra("matched_stem", target.into()),
                    ),
                );
            }
        }

        debug!("Linked {} test relationship(s)", edges.len());
        Ok(edges)
    }
}
