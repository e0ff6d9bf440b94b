pub mod snapshot;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{QuarryError, Result};
use crate::types::{unix_now, CodeChunk};

/// One stored chunk embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk: CodeChunk,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchOptions {
    pub top_k: usize,
    pub min_score: f32,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: 10,
            min_score: 0.0,
        }
    }
}

/// A scored search result.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub score: f32,
    pub entry: VectorEntry,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreStats {
    pub total_entries: usize,
    pub dimension: usize,
    pub model: String,
    pub created_at: u64,
    pub updated_at: u64,
}

/// In-memory vector store with upsert-by-id semantics.
///
/// Entries keep their insertion order across upserts: replacing an existing
/// id leaves the entry at its original position. Every vector must match the
/// store dimension.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dimension: usize,
    model_name: String,
    entries: IndexMap<String, VectorEntry>,
    created_at: u64,
    updated_at: u64,
}

impl VectorStore {
    pub fn new(dimension: usize, model_name: impl Into<String>) -> Self {
        let now = unix_now();
        Self {
            dimension,
            model_name: model_name.into(),
            entries: IndexMap::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn from_parts(
        dimension: usize,
        model_name: String,
        entries: IndexMap<String, VectorEntry>,
        created_at: u64,
        updated_at: u64,
    ) -> Self {
        Self {
            dimension,
            model_name,
            entries,
            created_at,
            updated_at,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &VectorEntry> {
        self.entries.values()
    }

    pub(crate) fn created_at(&self) -> u64 {
        self.created_at
    }

    pub(crate) fn updated_at(&self) -> u64 {
        self.updated_at
    }

    /// Upsert entries by id. The whole batch is dimension-checked before any
    /// mutation so a failed add leaves the store untouched.
    pub fn add(&mut self, entries: Vec<VectorEntry>) -> Result<()> {
        for entry in &entries {
            if entry.embedding.len() != self.dimension {
                return Err(QuarryError::DimensionMismatch {
                    expected: self.dimension,
                    actual: entry.embedding.len(),
                });
            }
        }

        let count = entries.len();
        for entry in entries {
            // IndexMap keeps the original slot on key collision.
            self.entries.insert(entry.id.clone(), entry);
        }
        self.updated_at = unix_now();
        debug!(count, total = self.entries.len(), "upserted vector entries");
        Ok(())
    }

    /// Cosine top-k search. Results are sorted by score descending with ties
    /// broken by insertion order, filtered by `min_score`.
    pub fn search(&self, query: &[f32], options: &SearchOptions) -> Result<Vec<SearchHit>> {
        if query.len() != self.dimension {
            return Err(QuarryError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        let mut hits: Vec<SearchHit> = self
            .entries
            .values()
            .map(|entry| SearchHit {
                score: cosine_similarity(query, &entry.embedding),
                entry: entry.clone(),
            })
            .filter(|hit| hit.score >= options.min_score)
            .collect();

        // Stable sort keeps insertion order for equal scores.
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(options.top_k);
        Ok(hits)
    }

    /// Delete entries by id; returns how many were removed.
    pub fn delete(&mut self, ids: &[String]) -> usize {
        let mut removed = 0;
        for id in ids {
            if self.entries.shift_remove(id).is_some() {
                removed += 1;
            }
        }
        if removed > 0 {
            self.updated_at = unix_now();
        }
        removed
    }

    /// Delete every entry whose chunk came from `filepath`.
    pub fn delete_by_filepath(&mut self, filepath: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.chunk.filepath != filepath);
        let removed = before - self.entries.len();
        if removed > 0 {
            self.updated_at = unix_now();
        }
        removed
    }

    pub fn get_by_filepath(&self, filepath: &str) -> Vec<&VectorEntry> {
        self.entries
            .values()
            .filter(|entry| entry.chunk.filepath == filepath)
            .collect()
    }

    pub fn stats(&self) -> StoreStats {
        StoreStats {
            total_entries: self.entries.len(),
            dimension: self.dimension,
            model: self.model_name.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// `dot(a, b) / (‖a‖ · ‖b‖)`, with 0 for zero-magnitude vectors (never NaN).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}
