use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::arxiv::ArxivError;
use crate::database::{Database, DatabaseError, PaperRecord};
use crate::document::chunker::ChunkError;
use crate::document::{find_arxiv_citations, Chunker, ExtractedPaper, PdfExtractor};
use crate::llm::{IndexedChunk, SemanticSearch};

pub mod pipeline;
pub mod snapshot;

pub use pipeline::{ArxivPipeline, PipelineReport};
pub use snapshot::{SnapshotRecord, SnapshotReport};

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
    #[error("Vector index error: {0}")]
    Index(String),
    #[error("Extraction failed: {0}")]
    Extraction(String),
    #[error("arXiv error: {0}")]
    Arxiv(#[from] ArxivError),
    #[error("Chunking error: {0}")]
    Chunking(#[from] ChunkError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where embedded chunks end up.
#[async_trait]
pub trait ChunkStore: Send + Sync {
    async fn index_chunks(&self, chunks: &[IndexedChunk]) -> Result<usize>;

    async fn delete_paper(&self, paper_id: &str) -> Result<()>;
}

#[async_trait]
impl ChunkStore for SemanticSearch {
    async fn index_chunks(&self, chunks: &[IndexedChunk]) -> Result<usize> {
        SemanticSearch::index_chunks(self, chunks).await
    }

    async fn delete_paper(&self, paper_id: &str) -> Result<()> {
        SemanticSearch::delete_paper(self, paper_id).await
    }
}

/// Bibliographic data that does not come from the PDF itself.
#[derive(Debug, Clone, Default)]
pub struct PaperSource {
    pub arxiv_id: Option<String>,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StoredPaper {
    pub paper_id: String,
    pub chunks: usize,
    pub citations: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DirectoryReport {
    pub processed: usize,
    pub failed: usize,
    pub paper_ids: Vec<String>,
}

/// The arXiv id when there is one, otherwise a stable hash of title and
/// authors.
pub fn generate_paper_id(title: &str, authors: &[String], arxiv_id: Option<&str>) -> String {
    if let Some(id) = arxiv_id.filter(|id| !id.trim().is_empty()) {
        return id.trim().to_string();
    }
    let unique = format!("{}-{}", title, authors.join(", "));
    Uuid::new_v5(&Uuid::NAMESPACE_OID, unique.as_bytes())
        .simple()
        .to_string()
}

pub(crate) fn progress_bar(len: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.set_message(message.to_string());
    pb
}

/// Writes papers to SQLite and the vector index.
#[derive(Clone)]
pub struct DataIngestion {
    db: Database,
    index: Arc<dyn ChunkStore>,
    chunker: Chunker,
    extractor: PdfExtractor,
}

impl DataIngestion {
    pub fn new(db: Database, index: Arc<dyn ChunkStore>, chunker: Chunker) -> Self {
        Self {
            db,
            index,
            chunker,
            extractor: PdfExtractor::new(),
        }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn index(&self) -> &Arc<dyn ChunkStore> {
        &self.index
    }

    pub fn extractor(&self) -> &PdfExtractor {
        &self.extractor
    }

    pub async fn store_paper(
        &self,
        paper: &ExtractedPaper,
        source: &PaperSource,
    ) -> Result<StoredPaper, IngestError> {
        if let Some(error) = &paper.metadata.error {
            return Err(IngestError::Extraction(error.clone()));
        }

        let paper_id = generate_paper_id(&paper.title, &source.authors, source.arxiv_id.as_deref());
        let abstract_text = source
            .abstract_text
            .clone()
            .or_else(|| paper.section("abstract").map(|s| s.text.clone()));

        let chunks: Vec<IndexedChunk> = self
            .chunker
            .chunk_paper(paper)
            .into_iter()
            .map(|chunk| IndexedChunk {
                paper_id: paper_id.clone(),
                arxiv_id: source.arxiv_id.clone(),
                title: paper.title.clone(),
                authors: source.authors.clone(),
                section: chunk.section,
                chunk_index: chunk.chunk_index,
                text: chunk.text,
            })
            .collect();

        // The papers row marks a paper as processed, so it is only written
        // once its vectors are in place.
        let indexed = match self.replace_chunks(&paper_id, &chunks).await {
            Ok(indexed) => indexed,
            Err(e) => {
                // Old vectors may already be gone; forget the paper so it is retried.
                if self.db.delete_paper(&paper_id).await? {
                    warn!("Removed stale record for {} after indexing failed", paper_id);
                }
                return Err(e);
            }
        };

        let record = PaperRecord {
            paper_id: paper_id.clone(),
            arxiv_id: source.arxiv_id.clone(),
            title: paper.title.clone(),
            authors: source.authors.clone(),
            abstract_text,
            categories: source.categories.clone(),
            sections_found: paper.metadata.sections_found.clone(),
            total_pages: paper.metadata.total_pages,
            filename: Some(paper.metadata.filename.clone()).filter(|f| !f.is_empty()),
            processed_date: Utc::now(),
        };
        self.db.upsert_paper(&record).await?;
        self.db.replace_sections(&paper_id, &paper.sections).await?;

        let citations = match paper.section("references") {
            Some(references) => {
                let found = find_arxiv_citations(&references.text);
                self.db.record_citations(&paper_id, &found).await?
            }
            None => 0,
        };

        info!(
            "Stored paper {} ({} chunks, {} new citations)",
            paper_id, indexed, citations
        );

        Ok(StoredPaper {
            paper_id,
            chunks: indexed,
            citations,
        })
    }

    /// Drop chunks from an earlier, longer version of the paper, then index
    /// the new ones.
    async fn replace_chunks(&self, paper_id: &str, chunks: &[IndexedChunk]) -> Result<usize, IngestError> {
        self.index
            .delete_paper(paper_id)
            .await
            .map_err(|e| IngestError::Index(e.to_string()))?;
        self.index
            .index_chunks(chunks)
            .await
            .map_err(|e| IngestError::Index(e.to_string()))
    }

    pub async fn ingest_pdf(&self, path: &Path, source: &PaperSource) -> Result<StoredPaper, IngestError> {
        let paper = self.extractor.extract_text_with_sections(path).await;
        self.store_paper(&paper, source).await
    }

    /// Ingest every PDF in `dir`. Failures are logged and counted.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<DirectoryReport, IngestError> {
        let mut files: Vec<PathBuf> = Vec::new();
        let mut entries = tokio::fs::read_dir(dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.is_file() && self.extractor.supports(&path) {
                files.push(path);
            }
        }
        files.sort();

        info!("Found {} PDF files in {}", files.len(), dir.display());
        let pb = progress_bar(files.len() as u64, "Ingesting papers");
        let mut report = DirectoryReport::default();

        for path in &files {
            pb.set_message(
                path.file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default(),
            );
            match self.ingest_pdf(path, &PaperSource::default()).await {
                Ok(stored) => {
                    report.processed += 1;
                    report.paper_ids.push(stored.paper_id);
                }
                Err(e) => {
                    warn!("Failed to ingest {}: {}", path.display(), e);
                    report.failed += 1;
                }
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!(
            "Ingested {} papers ({} failed)",
            report.processed, report.failed
        ));
        Ok(report)
    }
}
