use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{Error, Result};

#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

#[async_trait]
impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }
}

#[async_trait]
impl<E: EmbeddingProvider + ?Sized> EmbeddingProvider for Arc<E> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        (**self).embed(text).await
    }
}

/// Runs one embedding call bounded by `limit`; an elapsed call is a
/// capability failure like any other.
pub async fn embed_with_timeout(
    embedder: &dyn EmbeddingProvider,
    text: &str,
    limit: Duration,
) -> Result<Vec<f32>> {
    match tokio::time::timeout(limit, embedder.embed(text)).await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            operation: "embedding",
            elapsed: limit,
        }),
    }
}

/// Offline token-hash embedder: deterministic, no model required.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    dim: usize,
}

impl HashEmbeddingProvider {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(8) }
    }

    pub fn dimension(&self) -> usize {
        self.dim
    }

    fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];

        for token in text
            .to_ascii_lowercase()
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let mut h: u64 = 1469598103934665603;
            for b in token.as_bytes() {
                h ^= *b as u64;
                h = h.wrapping_mul(1099511628211);
            }
            let idx = (h as usize) % self.dim;
            v[idx] += 1.0;
        }

        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }

        v
    }
}

impl Default for HashEmbeddingProvider {
    fn default() -> Self {
        Self { dim: 768 }
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.embed_sync(text))
    }
}

/// Fixed lookup table of vectors. Unknown text is an embedding error, which
/// makes it handy for stubbing the capability deterministically.
#[derive(Debug, Clone, Default)]
pub struct MapEmbeddingProvider {
    vectors: HashMap<String, Vec<f32>>,
}

impl MapEmbeddingProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, text: impl Into<String>, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.into(), vector);
        self
    }

    pub fn insert(&mut self, text: impl Into<String>, vector: Vec<f32>) {
        self.vectors.insert(text.into(), vector);
    }
}

#[async_trait]
impl EmbeddingProvider for MapEmbeddingProvider {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.vectors
            .get(text)
            .cloned()
            .ok_or_else(|| Error::Embedding(format!("no vector for '{text}'")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::cosine_similarity;

    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(vec![1.0])
        }
    }

    #[tokio::test]
    async fn hash_embedder_is_deterministic_and_normalized() {
        let embedder = HashEmbeddingProvider::new(64);
        let a = embedder.embed("How do I cancel?").await.unwrap();
        let b = embedder.embed("how do i cancel").await.unwrap();

        assert_eq!(a.len(), 64);
        assert_eq!(a, b);
        let norm = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn hash_embedder_scores_shared_tokens_higher() {
        let embedder = HashEmbeddingProvider::default();
        let q = embedder.embed("store opening hours").await.unwrap();
        let near = embedder.embed("what are the store hours").await.unwrap();
        let far = embedder.embed("international shipping rates").await.unwrap();

        assert!(cosine_similarity(&q, &near) > cosine_similarity(&q, &far));
    }

    #[tokio::test]
    async fn map_embedder_fails_on_unknown_text() {
        let embedder = MapEmbeddingProvider::new().with("known", vec![1.0, 0.0]);
        assert_eq!(embedder.embed("known").await.unwrap(), vec![1.0, 0.0]);
        assert!(matches!(
            embedder.embed("unknown").await,
            Err(Error::Embedding(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn elapsed_call_becomes_timeout_error() {
        let err = embed_with_timeout(&SlowEmbedder, "q", Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { operation: "embedding", .. }));
    }
}
