use anyhow::Result;
use async_trait::async_trait;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;

use crate::llm::SearchResult;
use crate::providers::traits::CompletionProvider;

pub type RetrievedChunk = SearchResult;

pub const NO_CONTEXT: &str = "No relevant context found in the database.";
pub const RETRIEVAL_FAILED: &str = "Error retrieving context from database.";

#[derive(Error, Debug)]
pub enum RagError {
    #[error("Query must not be empty")]
    EmptyQuery,
    #[error("Retrieval failed: {0}")]
    Retrieval(String),
    #[error("Generation failed: {0}")]
    Generation(String),
}

/// Source of context chunks for a query.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, limit: u64) -> Result<Vec<RetrievedChunk>>;

    /// Like [`Retriever::retrieve`], restricted to chunks of one paper.
    async fn retrieve_in_paper(
        &self,
        query: &str,
        paper_id: &str,
        limit: u64,
    ) -> Result<Vec<RetrievedChunk>>;

    async fn document_count(&self) -> Result<u64>;
}

/// A paper cited by an answer, in the shape the web UI renders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRef {
    pub title: String,
    pub authors: String,
    pub paper_id: String,
    pub url: Option<String>,
    pub similarity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub response: String,
    pub papers: Vec<PaperRef>,
}

/// Context lines plus the chunks they came from.
#[derive(Debug, Clone, Default)]
pub struct Context {
    pub lines: Vec<String>,
    pub chunks: Vec<RetrievedChunk>,
}

pub fn arxiv_url(arxiv_id: &str) -> String {
    format!("https://arxiv.org/abs/{}", arxiv_id)
}

pub fn generate_prompt(query: &str, context_chunks: &[String]) -> String {
    let context = context_chunks.join("\n");
    format!(
        "Context information is below:\n\
         ---------------------\n\
         {}\n\
         ---------------------\n\
         Given the context information above, answer the following question. \
         If the context doesn't contain relevant information, provide a general response:\n\
         Question: {}\n\
         Answer: ",
        context, query
    )
}

/// One entry per paper, best-scoring chunk first.
pub fn papers_from_chunks(chunks: &[RetrievedChunk]) -> Vec<PaperRef> {
    let mut sorted: Vec<&RetrievedChunk> = chunks.iter().collect();
    sorted.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));

    let mut seen = HashSet::new();
    sorted
        .into_iter()
        .filter(|chunk| seen.insert(chunk.paper_id.clone()))
        .map(|chunk| PaperRef {
            title: chunk.title.clone(),
            authors: chunk.authors.join(", "),
            paper_id: chunk.paper_id.clone(),
            url: chunk.arxiv_id.as_deref().map(arxiv_url),
            similarity: format!("{:.2}", chunk.score),
        })
        .collect()
}

#[derive(Clone)]
pub struct RagEngine {
    retriever: Arc<dyn Retriever>,
    provider: Arc<dyn CompletionProvider>,
    top_k: u64,
}

impl RagEngine {
    pub fn new(retriever: Arc<dyn Retriever>, provider: Arc<dyn CompletionProvider>, top_k: u64) -> Self {
        Self {
            retriever,
            provider,
            top_k: top_k.max(1),
        }
    }

    pub fn retriever(&self) -> &Arc<dyn Retriever> {
        &self.retriever
    }

    pub async fn document_count(&self) -> Result<u64> {
        self.retriever.document_count().await
    }

    /// Top-k chunks for `query`. Never fails: an empty result or a retrieval
    /// error becomes a single placeholder context line.
    pub async fn get_relevant_chunks(&self, query: &str) -> Context {
        match self.retriever.retrieve(query, self.top_k).await {
            Ok(chunks) if chunks.is_empty() => {
                info!("No matching documents found for query");
                Context {
                    lines: vec![NO_CONTEXT.to_string()],
                    chunks,
                }
            }
            Ok(chunks) => {
                info!("Found {} relevant chunks", chunks.len());
                Context {
                    lines: chunks.iter().map(|c| c.text.clone()).collect(),
                    chunks,
                }
            }
            Err(e) => {
                error!("Error querying vector store: {}", e);
                Context {
                    lines: vec![RETRIEVAL_FAILED.to_string()],
                    chunks: Vec::new(),
                }
            }
        }
    }

    pub async fn generate_response(&self, query: &str) -> Result<Answer, RagError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        let context = self.get_relevant_chunks(query).await;
        let prompt = generate_prompt(query, &context.lines);
        debug!("Prompt is {} chars", prompt.len());

        let response = self
            .provider
            .complete(&prompt)
            .await
            .map_err(|e| RagError::Generation(e.to_string()))?;

        Ok(Answer {
            response: response.trim().to_string(),
            papers: papers_from_chunks(&context.chunks),
        })
    }
}
