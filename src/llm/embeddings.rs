use anyhow::{Error, Result};
use futures::stream::{self, StreamExt, TryStreamExt};
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

use crate::providers::traits::EmbeddingProvider;

const QUERY_CACHE_SIZE: usize = 256;
const EMBED_BATCH: usize = 32;
const CONCURRENT_BATCHES: usize = 4;

/// Embeds texts through an [`EmbeddingProvider`], caching single-query
/// embeddings and batching bulk requests.
#[derive(Clone)]
pub struct EmbeddingGenerator {
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<Mutex<LruCache<String, Vec<f32>>>>,
}

impl EmbeddingGenerator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        let capacity = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);
        Self {
            provider,
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    pub fn dimension(&self) -> u64 {
        self.provider.dimension()
    }

    pub fn model_name(&self) -> String {
        self.provider.model_name()
    }

    pub async fn generate_embedding(&self, text: &str) -> Result<Vec<f32>> {
        if let Ok(mut cache) = self.cache.lock() {
            if let Some(hit) = cache.get(text) {
                return Ok(hit.clone());
            }
        }

        let mut vectors = self.provider.embed(&[text.to_string()]).await?;
        let embedding = vectors
            .pop()
            .ok_or_else(|| Error::msg("Embedding provider returned no vector"))?;

        if let Ok(mut cache) = self.cache.lock() {
            cache.put(text.to_string(), embedding.clone());
        }
        Ok(embedding)
    }

    /// Embed `texts` in groups, a few groups in flight at once. Output order
    /// matches input order.
    pub async fn generate_batch_embeddings(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let groups: Vec<Vec<String>> = texts.chunks(EMBED_BATCH).map(<[String]>::to_vec).collect();
        let batches: Vec<Vec<Vec<f32>>> = stream::iter(groups)
            .map(|batch| {
                let provider = self.provider.clone();
                async move {
                    let vectors = provider.embed(&batch).await?;
                    if vectors.len() != batch.len() {
                        return Err(Error::msg(format!(
                            "Embedding provider returned {} vectors for {} texts",
                            vectors.len(),
                            batch.len()
                        )));
                    }
                    Ok(vectors)
                }
            })
            .buffered(CONCURRENT_BATCHES)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    #[cfg(test)]
    fn cached(&self) -> usize {
        self.cache.lock().map(|c| c.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingEmbedder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmbeddingProvider for CountingEmbedder {
        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }

        fn dimension(&self) -> u64 {
            2
        }

        fn model_name(&self) -> String {
            "counting".to_string()
        }
    }

    #[tokio::test]
    async fn test_query_embeddings_are_cached() {
        let provider = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
        let generator = EmbeddingGenerator::new(provider.clone());

        let first = generator.generate_embedding("attention").await.unwrap();
        let second = generator.generate_embedding("attention").await.unwrap();
        assert_eq!(first, second);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 1);
        assert_eq!(generator.cached(), 1);
    }

    #[tokio::test]
    async fn test_batches_split_into_groups() {
        let provider = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
        let generator = EmbeddingGenerator::new(provider.clone());

        let texts: Vec<String> = (0..70).map(|i| format!("chunk {}", i)).collect();
        let out = generator.generate_batch_embeddings(&texts).await.unwrap();
        assert_eq!(out.len(), 70);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 3);
        assert_eq!(out[69], vec!["chunk 69".len() as f32, 1.0]);
    }

    #[tokio::test]
    async fn test_batch_embedding_runs_on_spawned_task() {
        let provider = Arc::new(CountingEmbedder { calls: AtomicUsize::new(0) });
        let generator = EmbeddingGenerator::new(provider);

        let texts: Vec<String> = (0..40).map(|i| format!("passage {}", i)).collect();
        let handle = tokio::spawn(async move { generator.generate_batch_embeddings(&texts).await });
        let out = handle.await.unwrap().unwrap();
        assert_eq!(out.len(), 40);
    }
}
