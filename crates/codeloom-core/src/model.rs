//! Graph Entity Definitions
//!
//! Nodes and edges carry a primary type from a closed vocabulary, a
//! strongly typed metadata struct with an open `extra` map for
//! extension-specific fields, and optional provenance describing which
//! extension produced them.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ============================================================================
// Node Types
// ============================================================================

/// Primary classification of a node.
///
/// The vocabulary is closed: extensions pick from these variants and use
/// labels for any finer, multi-membership classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    // --- Code ---
    /// Source file
    File,
    /// Module or compilation unit
    Module,
    /// Namespace or package
    Namespace,
    /// Class declaration
    Class,
    /// Interface or trait
    Interface,
    /// Enumeration
    Enum,
    /// Type alias
    TypeAlias,
    /// Free function
    Function,
    /// Method bound to a type
    Method,
    /// Property or field
    Property,
    /// Variable or constant
    Variable,
    /// Function parameter
    Parameter,
    /// Import declaration
    Import,
    /// Export declaration
    Export,

    // --- Filesystem ---
    /// Directory on disk
    FsDirectory,
    /// File on disk
    FsFile,

    // --- Version control ---
    /// Repository root
    GitRepository,
    /// Commit
    GitCommit,
    /// Commit author
    GitAuthor,
    /// Branch
    GitBranch,
    /// Tag
    GitTag,

    // --- Testing ---
    /// Test suite (file or group)
    TestSuite,
    /// Individual test case
    TestCase,
}

impl NodeType {
    /// Get the wire representation (matches serde)
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::File => "file",
            NodeType::Module => "module",
            NodeType::Namespace => "namespace",
            NodeType::Class => "class",
            NodeType::Interface => "interface",
            NodeType::Enum => "enum",
            NodeType::TypeAlias => "type_alias",
            NodeType::Function => "function",
            NodeType::Method => "method",
            NodeType::Property => "property",
            NodeType::Variable => "variable",
            NodeType::Parameter => "parameter",
            NodeType::Import => "import",
            NodeType::Export => "export",
            NodeType::FsDirectory => "fs_directory",
            NodeType::FsFile => "fs_file",
            NodeType::GitRepository => "git_repository",
            NodeType::GitCommit => "git_commit",
            NodeType::GitAuthor => "git_author",
            NodeType::GitBranch => "git_branch",
            NodeType::GitTag => "git_tag",
            NodeType::TestSuite => "test_suite",
            NodeType::TestCase => "test_case",
        }
    }

    /// All node types, in declaration order
    pub fn all() -> &'static [NodeType] {
        &[
            NodeType::File,
            NodeType::Module,
            NodeType::Namespace,
            NodeType::Class,
            NodeType::Interface,
            NodeType::Enum,
            NodeType::TypeAlias,
            NodeType::Function,
            NodeType::Method,
            NodeType::Property,
            NodeType::Variable,
            NodeType::Parameter,
            NodeType::Import,
            NodeType::Export,
            NodeType::FsDirectory,
            NodeType::FsFile,
            NodeType::GitRepository,
            NodeType::GitCommit,
            NodeType::GitAuthor,
            NodeType::GitBranch,
            NodeType::GitTag,
            NodeType::TestSuite,
            NodeType::TestCase,
        ]
    }
}

impl std::fmt::Display for NodeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for NodeType {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        NodeType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::CoreError::unknown_node_type(s))
    }
}

// ============================================================================
// Edge Types
// ============================================================================

/// Types of relationships between nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeType {
    /// Package or component dependency
    DependsOn,
    /// Import of another module or symbol
    Imports,
    /// Export of a symbol
    Exports,
    /// Hierarchical containment (directory→file, class→method)
    Contains,
    /// Call from one callable to another
    Calls,
    /// Class inheritance
    Extends,
    /// Interface implementation
    Implements,
    /// Generic reference
    References,
    /// Structural parent relationship
    ParentOf,
    /// Use of a value or type
    Uses,
    /// Test exercising a unit under test
    Tests,
    /// Commit touching a file
    Modifies,
    /// Commit authored by a person
    AuthoredBy,
}

impl EdgeType {
    /// Get the wire representation (matches serde)
    pub fn as_str(&self) -> &'static str {
        match self {
            EdgeType::DependsOn => "depends_on",
            EdgeType::Imports => "imports",
            EdgeType::Exports => "exports",
            EdgeType::Contains => "contains",
            EdgeType::Calls => "calls",
            EdgeType::Extends => "extends",
            EdgeType::Implements => "implements",
            EdgeType::References => "references",
            EdgeType::ParentOf => "parent_of",
            EdgeType::Uses => "uses",
            EdgeType::Tests => "tests",
            EdgeType::Modifies => "modifies",
            EdgeType::AuthoredBy => "authored_by",
        }
    }

    /// All edge types, in declaration order
    pub fn all() -> &'static [EdgeType] {
        &[
            EdgeType::DependsOn,
            EdgeType::Imports,
            EdgeType::Exports,
            EdgeType::Contains,
            EdgeType::Calls,
            EdgeType::Extends,
            EdgeType::Implements,
            EdgeType::References,
            EdgeType::ParentOf,
            EdgeType::Uses,
            EdgeType::Tests,
            EdgeType::Modifies,
            EdgeType::AuthoredBy,
        ]
    }
}

impl std::fmt::Display for EdgeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EdgeType {
    type Err = crate::CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EdgeType::all()
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| crate::CoreError::unknown_edge_type(s))
    }
}

// ============================================================================
// Provenance
// ============================================================================

/// Where a node or edge came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Logical namespace of the producing extension (e.g. "code", "git")
    pub domain: String,
    /// Extension identifier
    pub extension: String,
    /// Extension version
    pub version: String,
    /// Creation time in milliseconds since the Unix epoch
    pub timestamp: u64,
}

impl Provenance {
    /// Create provenance for the given extension
    pub fn new(
        domain: impl Into<String>,
        extension: impl Into<String>,
        version: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            domain: domain.into(),
            extension: extension.into(),
            version: version.into(),
            timestamp,
        }
    }
}

// ============================================================================
// Metadata
// ============================================================================

/// Metadata attached to a node.
///
/// Common fields are typed; anything else an extension wants to record
/// goes into `extra`, which is flattened into the same JSON object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NodeMetadata {
    /// Path of the file the entity lives in, relative to the root
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    /// Starting line (1-indexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_line: Option<usize>,

    /// Ending line (1-indexed)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_line: Option<usize>,

    /// Size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,

    /// Source language
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,

    /// Whether the entity is exported from its module
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_exported: Option<bool>,

    /// Extension-specific fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl NodeMetadata {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if metadata has any values set
    pub fn is_empty(&self) -> bool {
        self.file_path.is_none()
            && self.start_line.is_none()
            && self.end_line.is_none()
            && self.size.is_none()
            && self.language.is_none()
            && self.is_exported.is_none()
            && self.extra.is_empty()
    }

    /// Set the file path
    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    /// Set the line range
    pub fn with_lines(mut self, start: usize, end: usize) -> Self {
        self.start_line = Some(start);
        self.end_line = Some(end);
        self
    }

    /// Set the size in bytes
    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// Set the language
    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = Some(language.into());
        self
    }

    /// Set the exported flag
    pub fn with_exported(mut self, exported: bool) -> Self {
        self.is_exported = Some(exported);
        self
    }

    /// Add an extension-specific field
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Look up a field by key as JSON.
    ///
    /// Typed fields are addressed by their serialized name; any other key
    /// is looked up in `extra`.
    pub fn get(&self, key: &str) -> Option<serde_json::Value> {
        use serde_json::Value;
        match key {
            "file_path" => self.file_path.clone().map(Value::from),
            "start_line" => self.start_line.map(Value::from),
            "end_line" => self.end_line.map(Value::from),
            "size" => self.size.map(Value::from),
            "language" => self.language.clone().map(Value::from),
            "is_exported" => self.is_exported.map(Value::from),
            other => self.extra.get(other).cloned(),
        }
    }
}

/// Default edge weight
pub const DEFAULT_EDGE_WEIGHT: f64 = 1.0;

fn default_weight() -> f64 {
    DEFAULT_EDGE_WEIGHT
}

/// Metadata attached to an edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeMetadata {
    /// Relative strength of the relationship
    #[serde(default = "default_weight")]
    pub weight: f64,

    /// Line where the relationship is expressed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<usize>,

    /// Extension-specific fields
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for EdgeMetadata {
    fn default() -> Self {
        Self {
            weight: DEFAULT_EDGE_WEIGHT,
            line: None,
            extra: BTreeMap::new(),
        }
    }
}

impl EdgeMetadata {
    /// Set the weight
    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    /// Set the line
    pub fn with_line(mut self, line: usize) -> Self {
        self.line = Some(line);
        self
    }

    /// Add an extension-specific field
    pub fn with_extra(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }
}

// ============================================================================
// Node
// ============================================================================

/// A node in the property graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Opaque identifier, unique within a graph
    pub id: String,

    /// Primary type
    #[serde(rename = "type")]
    node_type: NodeType,

    /// Display name
    pub name: String,

    /// Typed metadata plus extension extras
    #[serde(default)]
    pub metadata: NodeMetadata,

    /// Classification tags, orthogonal to the type
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub labels: BTreeSet<String>,

    /// Producing extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
}

impl Node {
    /// Create a new node with empty metadata and no labels
    pub fn new(id: impl Into<String>, node_type: NodeType, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            node_type,
            name: name.into(),
            metadata: NodeMetadata::default(),
            labels: BTreeSet::new(),
            source: None,
        }
    }

    /// The node's primary type. Fixed at construction.
    pub fn node_type(&self) -> NodeType {
        self.node_type
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: NodeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a label
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.labels.insert(label.into());
        self
    }

    /// Add several labels
    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels.extend(labels.into_iter().map(Into::into));
        self
    }

    /// Set the provenance
    pub fn with_source(mut self, source: Provenance) -> Self {
        self.source = Some(source);
        self
    }

    /// Check if the node carries a label
    pub fn has_label(&self, label: &str) -> bool {
        self.labels.contains(label)
    }

    /// Domain of the producing extension, if known
    pub fn domain(&self) -> Option<&str> {
        self.source.as_ref().map(|s| s.domain.as_str())
    }
}

// ============================================================================
// Edge
// ============================================================================

/// A directed edge in the property graph.
///
/// The target does not have to exist when the edge is created; edges
/// produced during linking frequently point at nodes owned by another
/// extension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Opaque identifier
    pub id: String,

    /// Relationship type
    #[serde(rename = "type")]
    pub edge_type: EdgeType,

    /// Source node ID
    pub from: String,

    /// Target node ID
    pub to: String,

    /// Weight, line and extension extras
    #[serde(default)]
    pub metadata: EdgeMetadata,

    /// Producing extension
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<Provenance>,
}

impl Edge {
    /// Create a new edge with default metadata
    pub fn new(
        id: impl Into<String>,
        edge_type: EdgeType,
        from: impl Into<String>,
        to: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            edge_type,
            from: from.into(),
            to: to.into(),
            metadata: EdgeMetadata::default(),
            source: None,
        }
    }

    /// Set the metadata
    pub fn with_metadata(mut self, metadata: EdgeMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Set the provenance
    pub fn with_source(mut self, source: Provenance) -> Self {
        self.source = Some(source);
        self
    }

    /// Edge weight (defaults to 1.0)
    pub fn weight(&self) -> f64 {
        self.metadata.weight
    }
}
