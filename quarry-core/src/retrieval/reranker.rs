//! Reranking backends for the third pipeline stage.
//!
//! The BGE reranker runs as a single-shot subprocess: one JSON request on
//! stdin, one JSON float array on stdout. The LLM reranker asks a chat model
//! for a ranked index list. Both are best-effort; the pipeline degrades to
//! the unreranked head of the candidate list on any failure.

use std::collections::HashSet;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{QuarryError, Result};
use crate::types::CodeChunk;

/// Which reranker the pipeline should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RerankerKind {
    Bge,
    Llm,
    None,
}

impl Default for RerankerKind {
    fn default() -> Self {
        RerankerKind::Bge
    }
}

#[derive(Debug, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub tokens_used: u32,
}

/// Chat-model seam used by the LLM reranker and the engine's answer
/// generation. Implementations wrap whatever provider the host application
/// talks to.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatClient: Send + Sync {
    async fn complete(&self, system: &str, user: &str) -> Result<ChatResponse>;

    fn model_name(&self) -> &str;
}

/// Hard ceiling on one scoring subprocess run.
pub const BGE_TIMEOUT: Duration = Duration::from_secs(30);

/// The passage text handed to scorers:
/// `<filepath>:<start>-<end> (<node_type>: <name>)` then the chunk content.
pub fn format_passage(chunk: &CodeChunk) -> String {
    format!(
        "{}:{}-{} ({}: {})\n{}",
        chunk.filepath,
        chunk.start_line,
        chunk.end_line,
        chunk.node_type.as_str(),
        chunk.name,
        chunk.content
    )
}

#[derive(Serialize)]
struct BgeRequest<'a> {
    query: &'a str,
    passages: &'a [String],
}

/// Cross-encoder scorer behind a line-based subprocess protocol.
#[derive(Debug, Clone)]
pub struct BgeReranker {
    command: String,
    args: Vec<String>,
}

impl BgeReranker {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Run one scoring pass. Any subprocess problem (spawn failure, nonzero
    /// exit, timeout, empty or unparseable output, length mismatch) is an
    /// error; the process is terminated when the call settles either way.
    pub async fn score(&self, query: &str, passages: &[String]) -> Result<Vec<f32>> {
        let mut child = Command::new(&self.command)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| QuarryError::RerankerFailure(format!("spawn {}: {e}", self.command)))?;

        let request = serde_json::to_vec(&BgeRequest { query, passages })
            .map_err(|e| QuarryError::RerankerFailure(format!("encode request: {e}")))?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| QuarryError::RerankerFailure("no stdin pipe".to_string()))?;
        stdin
            .write_all(&request)
            .await
            .map_err(|e| QuarryError::RerankerFailure(format!("write request: {e}")))?;
        drop(stdin); // EOF signals the end of the single request

        // On timeout the future is dropped and kill_on_drop reaps the child.
        let output = tokio::time::timeout(BGE_TIMEOUT, child.wait_with_output())
            .await
            .map_err(|_| QuarryError::RerankerFailure("scoring timed out".to_string()))?
            .map_err(|e| QuarryError::RerankerFailure(format!("wait: {e}")))?;

        if !output.status.success() {
            return Err(QuarryError::RerankerFailure(format!(
                "scorer exited with {}",
                output.status
            )));
        }
        if output.stdout.is_empty() {
            return Err(QuarryError::RerankerFailure("empty scorer output".to_string()));
        }

        let scores: Vec<f32> = serde_json::from_slice(&output.stdout)
            .map_err(|e| QuarryError::RerankerFailure(format!("parse scores: {e}")))?;
        if scores.len() != passages.len() {
            return Err(QuarryError::RerankerFailure(format!(
                "expected {} scores, got {}",
                passages.len(),
                scores.len()
            )));
        }

        debug!(passages = passages.len(), "bge scoring complete");
        Ok(scores)
    }
}

static INDEX_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d[\d,\s]*").unwrap());

/// Parse the first digit run in an LLM reply into ranked indices: clamp each
/// to `[0, len)`, deduplicate preserving order, truncate to `top_k`.
pub(crate) fn parse_index_ranking(text: &str, len: usize, top_k: usize) -> Option<Vec<usize>> {
    if len == 0 {
        return None;
    }
    let run = INDEX_RUN.find(text)?;

    let mut seen = HashSet::new();
    let mut indices = Vec::new();
    for token in run.as_str().split(|c: char| !c.is_ascii_digit()) {
        if token.is_empty() {
            continue;
        }
        let idx: usize = token.parse().ok()?;
        let idx = idx.min(len - 1);
        if seen.insert(idx) {
            indices.push(idx);
        }
        if indices.len() == top_k {
            break;
        }
    }

    if indices.is_empty() {
        None
    } else {
        Some(indices)
    }
}

/// Ask the chat model to rank passages; returns ranked indices.
pub(crate) async fn llm_rank(
    client: &dyn ChatClient,
    query: &str,
    chunks: &[CodeChunk],
    top_k: usize,
) -> Result<Vec<usize>> {
    let mut passages = String::new();
    for (i, chunk) in chunks.iter().enumerate() {
        passages.push_str(&format!("[{i}] {}\n\n", format_passage(chunk)));
    }

    let system = "You rank code passages by how relevant they are to a question. \
                  Respond with a JSON array of passage indices only, most relevant first.";
    let user = format!(
        "Question: {query}\n\nPassages:\n{passages}\nReturn a JSON array of the {top_k} most \
         relevant passage indices, e.g. [2, 0, 5]."
    );

    let response = client.complete(system, &user).await?;
    parse_index_ranking(&response.content, chunks.len(), top_k).ok_or_else(|| {
        QuarryError::RerankerFailure(format!(
            "could not parse ranking from reply: {:.80}",
            response.content
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NodeType;

    fn chunk(name: &str) -> CodeChunk {
        CodeChunk {
            id: name.to_string(),
            filepath: "src/auth.ts".to_string(),
            start_line: 3,
            end_line: 9,
            node_type: NodeType::Function,
            name: name.to_string(),
            language: "typescript".to_string(),
            content: format!("function {name}() {{}}"),
            imports: Vec::new(),
            exports: Vec::new(),
            types: Vec::new(),
        }
    }

    #[test]
    fn test_format_passage_shape() {
        let passage = format_passage(&chunk("login"));
        assert!(passage.starts_with("src/auth.ts:3-9 (function: login)\n"));
        assert!(passage.ends_with("function login() {}"));
    }

    #[test]
    fn test_parse_index_ranking() {
        assert_eq!(parse_index_ranking("[2, 0, 5]", 6, 3), Some(vec![2, 0, 5]));
        assert_eq!(
            parse_index_ranking("The best are: 1, 3, 2", 4, 3),
            Some(vec![1, 3, 2])
        );
        // Clamped into range, then deduplicated in order.
        assert_eq!(parse_index_ranking("[9, 1, 2]", 3, 3), Some(vec![2, 1]));
        // Truncated to top_k.
        assert_eq!(parse_index_ranking("[0, 1, 2, 3]", 4, 2), Some(vec![0, 1]));
        assert_eq!(parse_index_ranking("no numbers here", 4, 2), None);
        assert_eq!(parse_index_ranking("[0]", 0, 2), None);
    }

    #[tokio::test]
    async fn test_bge_scorer_happy_path() {
        // `cat` is not a scorer, so drive a real one with a tiny shell stub
        // that echoes a fixed score array.
        let reranker =
            BgeReranker::new("sh").with_args(vec!["-c".into(), "cat > /dev/null; echo '[0.1, 0.9]'".into()]);
        let scores = reranker
            .score("query", &["p1".to_string(), "p2".to_string()])
            .await
            .unwrap();
        assert_eq!(scores, vec![0.1, 0.9]);
    }

    #[tokio::test]
    async fn test_bge_scorer_nonzero_exit_fails() {
        let reranker = BgeReranker::new("sh").with_args(vec!["-c".into(), "exit 3".into()]);
        let err = reranker.score("q", &["p".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), "reranker_failure");
    }

    #[tokio::test]
    async fn test_bge_scorer_bad_output_fails() {
        let reranker = BgeReranker::new("sh")
            .with_args(vec!["-c".into(), "cat > /dev/null; echo 'not json'".into()]);
        assert!(reranker.score("q", &["p".to_string()]).await.is_err());
    }

    #[tokio::test]
    async fn test_bge_scorer_length_mismatch_fails() {
        let reranker = BgeReranker::new("sh")
            .with_args(vec!["-c".into(), "cat > /dev/null; echo '[0.5]'".into()]);
        assert!(
            reranker
                .score("q", &["p1".to_string(), "p2".to_string()])
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_bge_scorer_missing_binary_fails() {
        let reranker = BgeReranker::new("definitely-not-a-real-binary-7f3a");
        let err = reranker.score("q", &["p".to_string()]).await.unwrap_err();
        assert_eq!(err.kind(), "reranker_failure");
    }
}
