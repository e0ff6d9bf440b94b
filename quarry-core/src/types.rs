use serde::{Deserialize, Serialize};

/// The syntactic category a chunk was extracted from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    Function,
    Class,
    Interface,
    Type,
    Struct,
    Module,
    Other,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Function => "function",
            NodeType::Class => "class",
            NodeType::Interface => "interface",
            NodeType::Type => "type",
            NodeType::Struct => "struct",
            NodeType::Module => "module",
            NodeType::Other => "other",
        }
    }
}

/// A contiguous, syntactically meaningful slice of a source file.
///
/// Chunks are produced by the chunker and immutable afterwards. `imports`
/// holds the import specifiers of the *containing file*, so every chunk from
/// the same file carries an identical list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChunk {
    pub id: String,
    pub filepath: String,
    pub start_line: usize,
    pub end_line: usize,
    pub node_type: NodeType,
    pub name: String,
    pub language: String,
    pub content: String,
    pub imports: Vec<String>,
    pub exports: Vec<String>,
    pub types: Vec<String>,
}

/// One imported symbol, as written in the source.
///
/// `symbol` is `*` for namespace, dynamic, and `require` imports. `line` is
/// 1-indexed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub symbol: String,
    pub from: String,
    pub is_type: bool,
    pub line: usize,
}

/// A file handed to the graph builder: repository-relative path plus content.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub filepath: String,
    pub content: String,
}

impl SourceFile {
    pub fn new(filepath: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            filepath: filepath.into(),
            content: content.into(),
        }
    }
}

/// Which pipeline stage produced a retrieval result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStage {
    Vector,
    Graph,
    Reranked,
}

/// Output of the retrieval pipeline. `scores[i]` corresponds to `chunks[i]`;
/// chunks pulled in by graph expansion without a vector score carry 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub chunks: Vec<CodeChunk>,
    pub scores: Vec<f32>,
    pub expanded_from: Vec<String>,
    pub stage: RetrievalStage,
}

impl RetrievalResult {
    pub fn empty(stage: RetrievalStage) -> Self {
        Self {
            chunks: Vec::new(),
            scores: Vec::new(),
            expanded_from: Vec::new(),
            stage,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Aggregate counters for one indexing run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexStats {
    pub files: usize,
    pub chunks: usize,
    pub embeddings: usize,
    #[serde(rename = "totalFiles")]
    pub total_files: usize,
    #[serde(rename = "totalEdges")]
    pub total_edges: usize,
    #[serde(rename = "avgImportsPerFile")]
    pub avg_imports_per_file: f64,
    #[serde(rename = "avgDependentsPerFile")]
    pub avg_dependents_per_file: f64,
    #[serde(rename = "parseFailures", default)]
    pub parse_failures: usize,
}

/// Embedding provider/model pair recorded alongside an index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    pub embedding_provider: String,
    pub embedding_model: String,
}

/// Self-describing metadata document written next to the snapshots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub version: String,
    pub indexed_at: u64,
    pub target_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_id: Option<String>,
    pub stats: IndexStats,
    pub config: IndexConfig,
}

/// Seconds since the Unix epoch.
pub(crate) fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
