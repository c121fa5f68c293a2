use anyhow::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::vector_db::{point_id_for, VectorDB, VectorPoint};
use crate::llm::embeddings::EmbeddingGenerator;
use crate::rag::Retriever;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub text: String,
    pub score: f32,
    pub paper_id: String,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub section: Option<String>,
    pub chunk_index: usize,
}

impl SearchResult {
    /// Rebuild a result from a stored point payload. Points without text are
    /// skipped.
    pub fn from_payload(score: f32, payload: &HashMap<String, Value>) -> Option<Self> {
        let text = payload.get("text")?.as_str()?.to_string();
        let string = |key: &str| {
            payload
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let authors = payload
            .get("authors")
            .and_then(Value::as_array)
            .map(|a| a.iter().filter_map(Value::as_str).map(str::to_string).collect())
            .unwrap_or_default();

        Some(Self {
            text,
            score,
            paper_id: string("paper_id").unwrap_or_default(),
            arxiv_id: string("arxiv_id"),
            title: string("title").unwrap_or_else(|| "Untitled".to_string()),
            authors,
            section: string("section"),
            chunk_index: payload
                .get("chunk_index")
                .and_then(Value::as_u64)
                .unwrap_or(0) as usize,
        })
    }
}

/// A chunk of paper text waiting to be embedded and indexed.
#[derive(Debug, Clone)]
pub struct IndexedChunk {
    pub paper_id: String,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub section: Option<String>,
    pub chunk_index: usize,
    pub text: String,
}

impl IndexedChunk {
    fn payload(&self) -> HashMap<String, Value> {
        let mut payload = HashMap::new();
        payload.insert("text".to_string(), json!(self.text));
        payload.insert("paper_id".to_string(), json!(self.paper_id));
        payload.insert("title".to_string(), json!(self.title));
        payload.insert("authors".to_string(), json!(self.authors));
        payload.insert("chunk_index".to_string(), json!(self.chunk_index));
        if let Some(arxiv_id) = &self.arxiv_id {
            payload.insert("arxiv_id".to_string(), json!(arxiv_id));
        }
        if let Some(section) = &self.section {
            payload.insert("section".to_string(), json!(section));
        }
        payload
    }
}

/// Embedding search over the paper chunk collection.
#[derive(Clone)]
pub struct SemanticSearch {
    vector_db: VectorDB,
    embeddings: EmbeddingGenerator,
    collection_name: String,
}

impl SemanticSearch {
    pub async fn new(
        vector_db: VectorDB,
        embeddings: EmbeddingGenerator,
        collection_name: &str,
    ) -> Result<Self> {
        vector_db
            .create_collection(collection_name, embeddings.dimension())
            .await
            .map_err(|e| Error::msg(format!("Failed to prepare collection: {}", e)))?;

        Ok(Self {
            vector_db,
            embeddings,
            collection_name: collection_name.to_string(),
        })
    }

    pub fn collection_name(&self) -> &str {
        &self.collection_name
    }

    pub fn embeddings(&self) -> &EmbeddingGenerator {
        &self.embeddings
    }

    /// Embed and upsert chunks. Returns the number of points written.
    pub async fn index_chunks(&self, chunks: &[IndexedChunk]) -> Result<usize> {
        if chunks.is_empty() {
            return Ok(0);
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self.embeddings.generate_batch_embeddings(&texts).await?;

        let points = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| VectorPoint {
                id: point_id_for(&chunk.paper_id, chunk.chunk_index),
                vector,
                payload: chunk.payload(),
            })
            .collect();

        self.vector_db
            .upsert_points(&self.collection_name, points)
            .await
            .map_err(|e| Error::msg(format!("Failed to index chunks: {}", e)))
    }

    pub async fn search(&self, query: &str, limit: u64) -> Result<Vec<SearchResult>> {
        self.search_filtered(query, limit, None).await
    }

    pub async fn search_in_paper(
        &self,
        query: &str,
        paper_id: &str,
        limit: u64,
    ) -> Result<Vec<SearchResult>> {
        self.search_filtered(query, limit, Some(("paper_id", paper_id)))
            .await
    }

    async fn search_filtered(
        &self,
        query: &str,
        limit: u64,
        field: Option<(&str, &str)>,
    ) -> Result<Vec<SearchResult>> {
        let query_embedding = self.embeddings.generate_embedding(query).await?;
        let results = self
            .vector_db
            .search_vectors(&self.collection_name, query_embedding, limit, field)
            .await
            .map_err(|e| Error::msg(format!("Failed to search: {}", e)))?;

        Ok(results
            .iter()
            .filter_map(|point| SearchResult::from_payload(point.score, &point.payload))
            .collect())
    }

    pub async fn count(&self) -> Result<u64> {
        self.vector_db
            .count_points(&self.collection_name)
            .await
            .map_err(|e| Error::msg(format!("Failed to count points: {}", e)))
    }

    pub async fn delete_paper(&self, paper_id: &str) -> Result<()> {
        self.vector_db
            .delete_paper(&self.collection_name, paper_id)
            .await
            .map_err(|e| Error::msg(format!("Failed to delete paper {}: {}", paper_id, e)))
    }
}

#[async_trait]
impl Retriever for SemanticSearch {
    async fn retrieve(&self, query: &str, limit: u64) -> Result<Vec<SearchResult>> {
        self.search(query, limit).await
    }

    async fn retrieve_in_paper(
        &self,
        query: &str,
        paper_id: &str,
        limit: u64,
    ) -> Result<Vec<SearchResult>> {
        self.search_in_paper(query, paper_id, limit).await
    }

    async fn document_count(&self) -> Result<u64> {
        self.count().await
    }
}
