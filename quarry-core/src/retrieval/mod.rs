pub mod embedder;
pub mod reranker;

pub use embedder::{Embedder, HashEmbedder};
pub use reranker::{BgeReranker, ChatClient, ChatResponse, RerankerKind, format_passage};

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{QuarryError, Result};
use crate::graph::DependencyGraph;
use crate::store::{SearchOptions, VectorStore};
use crate::types::{CodeChunk, RetrievalResult, RetrievalStage};

/// Knobs for one retrieval run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalOptions {
    pub top_k: usize,
    pub min_score: f32,
    pub expand_graph: bool,
    pub max_hops: usize,
    pub max_expanded_chunks: usize,
    pub reranker: RerankerKind,
    pub rerank_top_k: usize,
}

impl Default for RetrievalOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: 0.0,
            expand_graph: true,
            max_hops: 2,
            max_expanded_chunks: 20,
            reranker: RerankerKind::default(),
            rerank_top_k: 5,
        }
    }
}

/// Three-stage retrieval: vector search, graph expansion, reranking.
///
/// Each stage produces a fresh [`RetrievalResult`] whose `stage` tag records
/// provenance; prior stages are never mutated. Reranker problems degrade
/// silently, embedder and store errors propagate.
pub struct RetrievalPipeline {
    embedder: Arc<dyn Embedder>,
    bge: Option<BgeReranker>,
    chat: Option<Arc<dyn ChatClient>>,
}

impl RetrievalPipeline {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            bge: None,
            chat: None,
        }
    }

    pub fn with_bge(mut self, reranker: BgeReranker) -> Self {
        self.bge = Some(reranker);
        self
    }

    pub fn with_chat(mut self, client: Arc<dyn ChatClient>) -> Self {
        self.chat = Some(client);
        self
    }

    pub async fn retrieve(
        &self,
        query: &str,
        store: &VectorStore,
        graph: Option<&DependencyGraph>,
        options: &RetrievalOptions,
    ) -> Result<RetrievalResult> {
        // Stage 1: vector search.
        let vectors = self
            .embedder
            .embed(&[query.to_string()])
            .await
            .map_err(|e| QuarryError::EmbedderFailure(e.to_string()))?;
        let query_vector = vectors
            .into_iter()
            .next()
            .ok_or_else(|| QuarryError::EmbedderFailure("embedder returned no vector".into()))?;

        let hits = store.search(
            &query_vector,
            &SearchOptions {
                top_k: options.top_k,
                min_score: options.min_score,
            },
        )?;

        let mut result = RetrievalResult {
            chunks: hits.iter().map(|h| h.entry.chunk.clone()).collect(),
            scores: hits.iter().map(|h| h.score).collect(),
            expanded_from: Vec::new(),
            stage: RetrievalStage::Vector,
        };
        if result.is_empty() {
            debug!(query, "vector stage found nothing, short-circuiting");
            return Ok(result);
        }

        // Stage 2: graph expansion.
        if options.expand_graph
            && let Some(graph) = graph
        {
            result = expand(result, graph, options);
        }

        // Stage 3: reranking.
        if options.reranker != RerankerKind::None && result.chunks.len() > options.rerank_top_k {
            result = self.rerank(query, result, options).await;
        }

        Ok(result)
    }

    /// Never fails: any reranker error degrades to the first `rerank_top_k`
    /// chunks in their current order, with their current scores.
    async fn rerank(
        &self,
        query: &str,
        input: RetrievalResult,
        options: &RetrievalOptions,
    ) -> RetrievalResult {
        let ranked = match options.reranker {
            RerankerKind::Bge => self.bge_rerank(query, &input, options).await,
            RerankerKind::Llm => self.llm_rerank(query, &input, options).await,
            RerankerKind::None => unreachable!("rerank is gated on the kind"),
        };

        match ranked {
            Ok((chunks, scores)) => RetrievalResult {
                chunks,
                scores,
                expanded_from: input.expanded_from,
                stage: RetrievalStage::Reranked,
            },
            Err(e) => {
                warn!(error = %e, "reranker failed, returning unreranked head");
                let keep = options.rerank_top_k.min(input.chunks.len());
                RetrievalResult {
                    chunks: input.chunks[..keep].to_vec(),
                    scores: input.scores[..keep].to_vec(),
                    expanded_from: input.expanded_from,
                    stage: RetrievalStage::Reranked,
                }
            }
        }
    }

    async fn bge_rerank(
        &self,
        query: &str,
        input: &RetrievalResult,
        options: &RetrievalOptions,
    ) -> Result<(Vec<CodeChunk>, Vec<f32>)> {
        let bge = self
            .bge
            .as_ref()
            .ok_or_else(|| QuarryError::RerankerFailure("no bge scorer configured".into()))?;

        let passages: Vec<String> = input.chunks.iter().map(format_passage).collect();
        let scores = bge.score(query, &passages).await?;

        let mut order: Vec<usize> = (0..input.chunks.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        order.truncate(options.rerank_top_k);

        Ok((
            order.iter().map(|&i| input.chunks[i].clone()).collect(),
            order.iter().map(|&i| scores[i]).collect(),
        ))
    }

    async fn llm_rerank(
        &self,
        query: &str,
        input: &RetrievalResult,
        options: &RetrievalOptions,
    ) -> Result<(Vec<CodeChunk>, Vec<f32>)> {
        let client = self
            .chat
            .as_ref()
            .ok_or_else(|| QuarryError::RerankerFailure("no chat client configured".into()))?;

        let order =
            reranker::llm_rank(client.as_ref(), query, &input.chunks, options.rerank_top_k)
                .await?;

        // Synthetic scores: 1 - rank * 0.1.
        Ok((
            order.iter().map(|&i| input.chunks[i].clone()).collect(),
            (0..order.len()).map(|rank| 1.0 - rank as f32 * 0.1).collect(),
        ))
    }
}

/// Stage 2: pull in chunks from graph-adjacent files. Chunks that were in the
/// vector stage keep their score (matched by id), expanded-in chunks carry 0.
fn expand(
    input: RetrievalResult,
    graph: &DependencyGraph,
    options: &RetrievalOptions,
) -> RetrievalResult {
    let expanded =
        graph.get_expanded_chunks(&input.chunks, options.max_hops, options.max_expanded_chunks);

    let mut expanded_from: Vec<String> = Vec::new();
    for chunk in &input.chunks {
        if !expanded_from.contains(&chunk.filepath) {
            expanded_from.push(chunk.filepath.clone());
        }
    }

    let scores: Vec<f32> = expanded
        .iter()
        .map(|chunk| {
            input
                .chunks
                .iter()
                .position(|c| c.id == chunk.id)
                .map(|i| input.scores[i])
                .unwrap_or(0.0)
        })
        .collect();

    debug!(
        seeds = input.chunks.len(),
        expanded = expanded.len(),
        "graph expansion complete"
    );

    RetrievalResult {
        chunks: expanded,
        scores,
        expanded_from,
        stage: RetrievalStage::Graph,
    }
}
