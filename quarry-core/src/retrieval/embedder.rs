use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::error::Result;

/// Maps text to fixed-dimension vectors. Provider-backed implementations live
/// outside the engine; the pipeline only sees this trait.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Embedder: Send + Sync {
    /// One vector per input text, all of `dimension()` length.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Deterministic, offline embedder: a normalized blake3-derived vector per
/// text, cached by content hash. Identical inputs always produce identical
/// vectors, which makes it the default for local indexes and the test suite.
pub struct HashEmbedder {
    dimension: usize,
    model: String,
    cache: DashMap<String, Vec<f32>>,
}

impl HashEmbedder {
    pub const DEFAULT_DIMENSION: usize = 256;

    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model: format!("hash-blake3-{dimension}"),
            cache: DashMap::new(),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let key = blake3::hash(text.as_bytes()).to_hex().to_string();
        if let Some(cached) = self.cache.get(&key) {
            debug!("embedding cache hit");
            return cached.clone();
        }

        // Stretch the 32-byte digest across the dimension by rehashing with a
        // counter, then L2-normalize.
        let mut embedding = Vec::with_capacity(self.dimension);
        let mut block = 0u32;
        while embedding.len() < self.dimension {
            let digest = blake3::hash(format!("{key}:{block}").as_bytes());
            for byte in digest.as_bytes() {
                if embedding.len() == self.dimension {
                    break;
                }
                embedding.push(*byte as f32 / 255.0 - 0.5);
            }
            block += 1;
        }

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        self.cache.insert(key, embedding.clone());
        embedding
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_DIMENSION)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let embedder = HashEmbedder::default();
        let texts = vec!["fn main() {}".to_string()];
        let first = embedder.embed(&texts).await.unwrap();
        let second = embedder.embed(&texts).await.unwrap();
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_dimension_and_normalization() {
        let embedder = HashEmbedder::new(64);
        let vectors = embedder
            .embed(&["some code".to_string(), "other code".to_string()])
            .await
            .unwrap();
        assert_eq!(vectors.len(), 2);
        for v in &vectors {
            assert_eq!(v.len(), 64);
            let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "norm was {norm}");
        }
    }

    #[tokio::test]
    async fn test_distinct_texts_distinct_vectors() {
        let embedder = HashEmbedder::default();
        let vectors = embedder
            .embed(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_ne!(vectors[0], vectors[1]);
    }

    #[test]
    fn test_model_name_includes_dimension() {
        assert_eq!(HashEmbedder::new(128).model_name(), "hash-blake3-128");
    }
}
