pub mod chunker;
pub mod error;
pub mod graph;
pub mod retrieval;
pub mod store;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

pub use chunker::Chunker;
pub use error::{QuarryError, Result};
pub use graph::{DependencyGraph, ExpandOptions, build_graph, reset_workspace_cache};
pub use retrieval::{
    BgeReranker, ChatClient, ChatResponse, Embedder, HashEmbedder, RerankerKind, RetrievalOptions,
    RetrievalPipeline,
};
pub use store::{SearchOptions, VectorEntry, VectorStore};
pub use types::{
    CodeChunk, Import, IndexConfig, IndexMeta, IndexStats, NodeType, RetrievalResult,
    RetrievalStage, SourceFile,
};

use types::unix_now;

/// Snapshot filenames inside an index directory.
const VECTOR_SNAPSHOT: &str = "vectors.json";
const GRAPH_SNAPSHOT: &str = "graph.json";
const META_SNAPSHOT: &str = "meta.json";

/// Directories never worth indexing.
const SKIPPED_DIRS: &[&str] = &["node_modules", "target", "dist", "build", "__pycache__"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Maximum file size to index (in bytes)
    pub max_file_size: usize,

    /// Number of worker threads for chunking
    pub indexing_threads: usize,

    /// Embedding provider label recorded in index metadata
    pub embedding_provider: String,

    /// Queries longer than this are rejected at the engine surface
    pub max_query_length: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: 10 * 1024 * 1024, // 10MB
            indexing_threads: num_cpus::get(),
            embedding_provider: "hash".to_string(),
            max_query_length: 8192,
        }
    }
}

/// Everything a built index holds in memory.
struct IndexState {
    store: VectorStore,
    graph: DependencyGraph,
    meta: IndexMeta,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineStatus {
    pub ready: bool,
    pub indexed: bool,
    pub meta: Option<IndexMeta>,
    pub llm_config: Option<String>,
    pub embedding_config: IndexConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatOutput {
    pub answer: String,
    pub citations: Vec<String>,
    pub chunks: Vec<CodeChunk>,
    pub tokens_used: u32,
    pub stage: RetrievalStage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileListing {
    pub files: Vec<String>,
    pub tree: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DependencyReport {
    pub filepath: String,
    pub imports: Vec<Import>,
    pub exports: Vec<String>,
    pub dependencies: Vec<String>,
    pub dependents: Vec<String>,
    pub chunk_count: usize,
}

/// The indexing and retrieval engine behind the CLI/HTTP/MCP surfaces.
///
/// Readers (`search`, `get_dependencies`, `expand_context`, …) share the
/// index behind a read lock; indexing and snapshot loads take the write lock.
pub struct QuarryEngine {
    config: Config,
    embedder: Arc<dyn Embedder>,
    chat: Option<Arc<dyn ChatClient>>,
    bge: Option<BgeReranker>,
    state: RwLock<Option<IndexState>>,
}

impl QuarryEngine {
    pub fn new(config: Config, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            config,
            embedder,
            chat: None,
            bge: None,
            state: RwLock::new(None),
        }
    }

    pub fn with_chat_client(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(client);
        self
    }

    pub fn with_bge_reranker(mut self, reranker: BgeReranker) -> Self {
        self.bge = Some(reranker);
        self
    }

    fn pipeline(&self) -> RetrievalPipeline {
        let mut pipeline = RetrievalPipeline::new(self.embedder.clone());
        if let Some(bge) = &self.bge {
            pipeline = pipeline.with_bge(bge.clone());
        }
        if let Some(chat) = &self.chat {
            pipeline = pipeline.with_chat(chat.clone());
        }
        pipeline
    }

    /// Walk `path`, chunk and embed every supported file, build the graph,
    /// and swap the new index in.
    pub async fn index_directory(&self, path: &Path) -> Result<IndexStats> {
        let files = collect_source_files(path, self.config.max_file_size)?;
        info!(root = %path.display(), files = files.len(), "indexing directory");
        self.index_files(path, files).await
    }

    /// Index an in-memory file set. `target` is recorded in the metadata and
    /// anchors workspace-package resolution.
    pub async fn index_files(&self, target: &Path, files: Vec<SourceFile>) -> Result<IndexStats> {
        // CPU-bound chunking fans out across files; each worker owns a parser.
        let per_file: Vec<Vec<CodeChunk>> = files
            .par_iter()
            .map_init(Chunker::new, |chunker, file| {
                chunker.parse_file(&file.filepath, &file.content)
            })
            .collect();

        let parse_failures = files
            .iter()
            .zip(&per_file)
            .filter(|(file, chunks)| {
                chunks.is_empty()
                    && chunker::detect(&file.filepath).is_some()
                    && !file.content.trim().is_empty()
            })
            .count();

        let chunks: Vec<CodeChunk> = per_file.into_iter().flatten().collect();

        let mut graph = build_graph(&files, target);
        graph.attach_chunks(&chunks);

        // Single-writer merge: embed, then upsert into a fresh store.
        let mut store = VectorStore::new(self.embedder.dimension(), self.embedder.model_name());
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let mut embeddings = Vec::with_capacity(texts.len());
        for batch in texts.chunks(32) {
            embeddings.extend(
                self.embedder
                    .embed(batch)
                    .await
                    .map_err(|e| QuarryError::EmbedderFailure(e.to_string()))?,
            );
        }
        let entries: Vec<VectorEntry> = chunks
            .iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry {
                id: chunk.id.clone(),
                embedding,
                chunk: chunk.clone(),
            })
            .collect();
        store.add(entries)?;

        let stats = compute_stats(&files, &chunks, &graph, store.len(), parse_failures);
        let meta = IndexMeta {
            version: env!("CARGO_PKG_VERSION").to_string(),
            indexed_at: unix_now(),
            target_path: target.display().to_string(),
            repository_id: None,
            stats: stats.clone(),
            config: IndexConfig {
                embedding_provider: self.config.embedding_provider.clone(),
                embedding_model: self.embedder.model_name().to_string(),
            },
        };

        info!(
            files = stats.files,
            chunks = stats.chunks,
            edges = stats.total_edges,
            "index built"
        );

        *self.state.write().await = Some(IndexState { store, graph, meta });
        Ok(stats)
    }

    pub async fn status(&self) -> EngineStatus {
        let state = self.state.read().await;
        EngineStatus {
            ready: true,
            indexed: state.is_some(),
            meta: state.as_ref().map(|s| s.meta.clone()),
            llm_config: self.chat.as_ref().map(|c| c.model_name().to_string()),
            embedding_config: IndexConfig {
                embedding_provider: self.config.embedding_provider.clone(),
                embedding_model: self.embedder.model_name().to_string(),
            },
        }
    }

    /// Run the retrieval pipeline against the current index.
    pub async fn search(&self, query: &str, options: &RetrievalOptions) -> Result<RetrievalResult> {
        self.validate_query(query)?;
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(QuarryError::IndexNotInitialized)?;
        self.pipeline()
            .retrieve(query, &state.store, Some(&state.graph), options)
            .await
    }

    /// Retrieval composed with answer generation through the chat client.
    pub async fn chat(&self, query: &str, options: &RetrievalOptions) -> Result<ChatOutput> {
        let client = self
            .chat
            .clone()
            .ok_or_else(|| QuarryError::InvalidInput("no chat client configured".into()))?;

        let retrieval = self.search(query, options).await?;

        let mut context = String::new();
        for chunk in &retrieval.chunks {
            context.push_str(&retrieval::format_passage(chunk));
            context.push_str("\n\n");
        }

        let system = "You answer questions about a codebase. Ground every claim in the \
                      provided context and cite filepaths in your answer.";
        let user = format!("Context:\n{context}\nQuestion: {query}");
        let response = client.complete(system, &user).await?;

        // Cite the files the answer actually mentions; fall back to every
        // retrieved file when the model cites nothing verbatim.
        let mut citations: Vec<String> = Vec::new();
        for chunk in &retrieval.chunks {
            if response.content.contains(&chunk.filepath) && !citations.contains(&chunk.filepath) {
                citations.push(chunk.filepath.clone());
            }
        }
        if citations.is_empty() {
            for chunk in &retrieval.chunks {
                if !citations.contains(&chunk.filepath) {
                    citations.push(chunk.filepath.clone());
                }
            }
        }

        Ok(ChatOutput {
            answer: response.content,
            citations,
            chunks: retrieval.chunks,
            tokens_used: response.tokens_used,
            stage: retrieval.stage,
        })
    }

    /// Indexed files, flat and as a rendered tree, optionally under a prefix.
    pub async fn list_files(&self, prefix: Option<&str>) -> Result<FileListing> {
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(QuarryError::IndexNotInitialized)?;

        let mut files: Vec<String> = state
            .graph
            .files()
            .filter(|f| prefix.is_none_or(|p| f.starts_with(p)))
            .map(str::to_string)
            .collect();
        files.sort();

        let tree = render_tree(&files);
        Ok(FileListing { files, tree })
    }

    pub async fn get_dependencies(&self, filepath: &str) -> Result<DependencyReport> {
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(QuarryError::IndexNotInitialized)?;
        let node = state
            .graph
            .node(filepath)
            .ok_or_else(|| QuarryError::InvalidInput(format!("unknown file: {filepath}")))?;

        Ok(DependencyReport {
            filepath: filepath.to_string(),
            imports: node.imports.clone(),
            exports: node.exports.iter().cloned().collect(),
            dependencies: state.graph.dependencies(filepath),
            dependents: state.graph.dependents(filepath),
            chunk_count: node.chunks.len(),
        })
    }

    /// Direct wrapper over graph BFS expansion.
    pub async fn expand_context(
        &self,
        filepaths: &[String],
        options: &ExpandOptions,
    ) -> Result<Vec<String>> {
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(QuarryError::IndexNotInitialized)?;
        Ok(state.graph.expand_context(filepaths, options))
    }

    /// Persist the current index as three snapshot documents.
    pub async fn save_index(&self, dir: &Path) -> Result<()> {
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(QuarryError::IndexNotInitialized)?;

        std::fs::create_dir_all(dir)?;
        store::snapshot::save_vector_store(&state.store, &dir.join(VECTOR_SNAPSHOT))?;
        store::snapshot::save_graph(&state.graph, &dir.join(GRAPH_SNAPSHOT))?;
        store::snapshot::save_meta(&state.meta, &dir.join(META_SNAPSHOT))?;
        info!(dir = %dir.display(), "index saved");
        Ok(())
    }

    /// Load snapshots saved by [`save_index`] and swap them in. Chunks are
    /// re-attached to the graph from the vector snapshot.
    pub async fn load_index(&self, dir: &Path) -> Result<()> {
        let store = store::snapshot::load_vector_store(&dir.join(VECTOR_SNAPSHOT))?;
        let mut graph = store::snapshot::load_graph(&dir.join(GRAPH_SNAPSHOT))?;
        let meta = store::snapshot::load_meta(&dir.join(META_SNAPSHOT))?;

        let chunks: Vec<CodeChunk> = store.entries().map(|e| e.chunk.clone()).collect();
        graph.attach_chunks(&chunks);

        *self.state.write().await = Some(IndexState { store, graph, meta });
        info!(dir = %dir.display(), "index loaded");
        Ok(())
    }

    fn validate_query(&self, query: &str) -> Result<()> {
        if query.trim().is_empty() {
            return Err(QuarryError::InvalidInput("query is empty".into()));
        }
        if query.len() > self.config.max_query_length {
            return Err(QuarryError::InvalidInput(format!(
                "query exceeds {} characters",
                self.config.max_query_length
            )));
        }
        Ok(())
    }
}

/// Initialize tracing with env-filter support. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Collect supported source files under `root` as repository-relative,
/// forward-slash paths. Oversized and unreadable files are skipped with a
/// warning.
fn collect_source_files(root: &Path, max_file_size: usize) -> Result<Vec<SourceFile>> {
    let mut files = Vec::new();

    let walker = walkdir::WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if entry.file_type().is_dir() {
                return !name.starts_with('.') && !SKIPPED_DIRS.contains(&name.as_ref());
            }
            true
        });

    for entry in walker {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!(error = %e, "skipping unreadable directory entry");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        if chunker::detect(&entry.file_name().to_string_lossy()).is_none() {
            continue;
        }
        match entry.metadata() {
            Ok(meta) if meta.len() as usize > max_file_size => {
                debug!(path = %entry.path().display(), "skipping oversized file");
                continue;
            }
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping file");
                continue;
            }
            _ => {}
        }

        let content = match std::fs::read_to_string(entry.path()) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "skipping unreadable file");
                continue;
            }
        };

        let rel = entry
            .path()
            .strip_prefix(root)
            .unwrap_or(entry.path())
            .to_string_lossy()
            .replace('\\', "/");
        files.push(SourceFile::new(rel, content));
    }

    files.sort_by(|a, b| a.filepath.cmp(&b.filepath));
    Ok(files)
}

fn compute_stats(
    files: &[SourceFile],
    chunks: &[CodeChunk],
    graph: &DependencyGraph,
    embeddings: usize,
    parse_failures: usize,
) -> IndexStats {
    let total_files = graph.node_count();
    let total_imports: usize = graph.nodes().map(|(_, n)| n.imports.len()).sum();
    let total_dependents: usize = graph.files().map(|f| graph.dependents(f).len()).sum();
    let denom = total_files.max(1) as f64;

    IndexStats {
        files: files.len(),
        chunks: chunks.len(),
        embeddings,
        total_files,
        total_edges: graph.edge_count(),
        avg_imports_per_file: total_imports as f64 / denom,
        avg_dependents_per_file: total_dependents as f64 / denom,
        parse_failures,
    }
}

/// Render a sorted file list as an indented tree.
fn render_tree(files: &[String]) -> String {
    let mut out = String::new();
    let mut previous: Vec<&str> = Vec::new();

    for file in files {
        let parts: Vec<&str> = file.split('/').collect();
        let mut common = 0;
        while common < parts.len().saturating_sub(1)
            && common < previous.len()
            && parts[common] == previous[common]
        {
            common += 1;
        }

        for (depth, part) in parts.iter().enumerate().skip(common) {
            let indent = "  ".repeat(depth);
            if depth + 1 == parts.len() {
                out.push_str(&format!("{indent}{part}\n"));
            } else {
                out.push_str(&format!("{indent}{part}/\n"));
            }
        }
        previous = parts[..parts.len() - 1].to_vec();
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> QuarryEngine {
        QuarryEngine::new(Config::default(), Arc::new(HashEmbedder::new(64)))
    }

    fn sample_files() -> Vec<SourceFile> {
        vec![
            SourceFile::new(
                "src/auth.ts",
                "import { findUser } from './user';\n\nexport class AuthService {\n  async login(name: string) {\n    return findUser(name);\n  }\n}\n",
            ),
            SourceFile::new(
                "src/user.ts",
                "export function findUser(name: string) {\n  return { name };\n}\n",
            ),
        ]
    }

    #[tokio::test]
    async fn test_operations_require_index() {
        let engine = engine();
        let err = engine
            .search("who handles login?", &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, QuarryError::IndexNotInitialized));

        assert!(engine.list_files(None).await.is_err());
        assert!(engine.get_dependencies("src/a.ts").await.is_err());
        assert!(
            engine
                .expand_context(&["src/a.ts".to_string()], &ExpandOptions::default())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_index_and_search() {
        let engine = engine();
        let tmp = tempfile::tempdir().unwrap();
        let stats = engine.index_files(tmp.path(), sample_files()).await.unwrap();

        assert_eq!(stats.files, 2);
        assert!(stats.chunks >= 3, "stats: {stats:?}");
        assert_eq!(stats.embeddings, stats.chunks);
        assert_eq!(stats.total_edges, 1);

        let status = engine.status().await;
        assert!(status.indexed);
        assert_eq!(status.meta.unwrap().stats.files, 2);

        // HashEmbedder is deterministic, so searching for a chunk's own
        // content must rank that chunk first.
        let options = RetrievalOptions {
            expand_graph: false,
            reranker: RerankerKind::None,
            ..RetrievalOptions::default()
        };
        let result = engine
            .search(
                "export function findUser(name: string) {\n  return { name };\n}",
                &options,
            )
            .await
            .unwrap();
        assert!(!result.is_empty());
        assert_eq!(result.chunks[0].filepath, "src/user.ts");
    }

    #[tokio::test]
    async fn test_query_validation() {
        let engine = engine();
        let tmp = tempfile::tempdir().unwrap();
        engine.index_files(tmp.path(), sample_files()).await.unwrap();

        let err = engine
            .search("", &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");

        let long = "q".repeat(10_000);
        let err = engine
            .search(&long, &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_list_files_and_dependencies() {
        let engine = engine();
        let tmp = tempfile::tempdir().unwrap();
        engine.index_files(tmp.path(), sample_files()).await.unwrap();

        let listing = engine.list_files(None).await.unwrap();
        assert_eq!(listing.files, vec!["src/auth.ts", "src/user.ts"]);
        assert!(listing.tree.contains("src/"));
        assert!(listing.tree.contains("auth.ts"));

        let filtered = engine.list_files(Some("src/a")).await.unwrap();
        assert_eq!(filtered.files, vec!["src/auth.ts"]);

        let report = engine.get_dependencies("src/auth.ts").await.unwrap();
        assert_eq!(report.dependencies, vec!["src/user.ts"]);
        assert!(report.dependents.is_empty());
        assert_eq!(report.imports.len(), 1);
        assert!(report.chunk_count >= 1);

        let report = engine.get_dependencies("src/user.ts").await.unwrap();
        assert_eq!(report.dependents, vec!["src/auth.ts"]);
        assert!(report.exports.contains(&"findUser".to_string()));

        let err = engine.get_dependencies("src/ghost.ts").await.unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[tokio::test]
    async fn test_expand_context_operation() {
        let engine = engine();
        let tmp = tempfile::tempdir().unwrap();
        engine.index_files(tmp.path(), sample_files()).await.unwrap();

        let expanded = engine
            .expand_context(&["src/user.ts".to_string()], &ExpandOptions::default())
            .await
            .unwrap();
        assert_eq!(expanded[0], "src/user.ts");
        assert!(expanded.contains(&"src/auth.ts".to_string()));
    }

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let engine = engine();
        let tmp = tempfile::tempdir().unwrap();
        engine.index_files(tmp.path(), sample_files()).await.unwrap();

        let index_dir = tmp.path().join("index");
        engine.save_index(&index_dir).await.unwrap();

        let fresh = QuarryEngine::new(Config::default(), Arc::new(HashEmbedder::new(64)));
        fresh.load_index(&index_dir).await.unwrap();

        let status = fresh.status().await;
        assert!(status.indexed);

        // The restored graph has chunks re-attached from the vector snapshot.
        let report = fresh.get_dependencies("src/auth.ts").await.unwrap();
        assert!(report.chunk_count >= 1);
        assert_eq!(report.dependencies, vec!["src/user.ts"]);
    }

    #[tokio::test]
    async fn test_index_directory_walks_and_filters() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("node_modules/dep")).unwrap();
        std::fs::write(root.join("src/a.ts"), "export const a = 1;\n").unwrap();
        std::fs::write(root.join("src/b.py"), "def b():\n    pass\n").unwrap();
        std::fs::write(root.join("notes.md"), "# not code\n").unwrap();
        std::fs::write(root.join("node_modules/dep/index.ts"), "export const x = 1;\n").unwrap();

        let engine = engine();
        let stats = engine.index_directory(root).await.unwrap();
        assert_eq!(stats.files, 2, "stats: {stats:?}");

        let listing = engine.list_files(None).await.unwrap();
        assert_eq!(listing.files, vec!["src/a.ts", "src/b.py"]);
    }

    struct EchoChat;

    #[async_trait::async_trait]
    impl ChatClient for EchoChat {
        async fn complete(&self, _system: &str, user: &str) -> Result<ChatResponse> {
            // Mention the first filepath that appears in the prompt.
            let citation = user
                .lines()
                .find_map(|l| l.split(':').next().filter(|p| p.ends_with(".ts")))
                .unwrap_or("nothing")
                .to_string();
            Ok(ChatResponse {
                content: format!("The relevant code is in {citation}."),
                tokens_used: 42,
            })
        }

        fn model_name(&self) -> &str {
            "echo-chat"
        }
    }

    #[tokio::test]
    async fn test_chat_composes_retrieval_and_generation() {
        let engine = QuarryEngine::new(Config::default(), Arc::new(HashEmbedder::new(64)))
            .with_chat_client(Arc::new(EchoChat));
        let tmp = tempfile::tempdir().unwrap();
        engine.index_files(tmp.path(), sample_files()).await.unwrap();

        let options = RetrievalOptions {
            min_score: -1.0,
            reranker: RerankerKind::None,
            ..RetrievalOptions::default()
        };
        let output = engine.chat("how does login work?", &options).await.unwrap();

        assert_eq!(output.tokens_used, 42);
        assert!(!output.chunks.is_empty());
        assert!(!output.citations.is_empty());
        assert!(output.answer.contains(".ts"));

        let status = engine.status().await;
        assert_eq!(status.llm_config.as_deref(), Some("echo-chat"));
    }

    #[tokio::test]
    async fn test_chat_without_client_is_invalid_input() {
        let engine = engine();
        let tmp = tempfile::tempdir().unwrap();
        engine.index_files(tmp.path(), sample_files()).await.unwrap();

        let err = engine
            .chat("anything", &RetrievalOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_input");
    }

    #[test]
    fn test_render_tree() {
        let files = vec![
            "src/auth.ts".to_string(),
            "src/user.ts".to_string(),
            "tests/auth_test.ts".to_string(),
        ];
        let tree = render_tree(&files);
        let expected = "src/\n  auth.ts\n  user.ts\ntests/\n  auth_test.ts\n";
        assert_eq!(tree, expected);
    }
}
