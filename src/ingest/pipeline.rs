use chrono::Utc;
use log::{error, info, warn};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

use super::{DataIngestion, IngestError, PaperSource, StoredPaper};
use crate::arxiv::{ArxivClient, ArxivEntry, ArxivQuery};

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchOutcome {
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PipelineReport {
    pub batches: usize,
    pub processed: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Entries not yet ingested, in feed order.
pub fn pending_entries<'a>(entries: &'a [ArxivEntry], processed: &HashSet<String>) -> Vec<&'a ArxivEntry> {
    entries
        .iter()
        .filter(|e| !processed.contains(&e.arxiv_id))
        .collect()
}

/// Pulls recent papers from arXiv in batches and ingests their PDFs.
pub struct ArxivPipeline {
    ingestion: DataIngestion,
    client: ArxivClient,
    query: ArxivQuery,
    pdf_dir: PathBuf,
    wait_time: Duration,
}

impl ArxivPipeline {
    pub fn new(
        ingestion: DataIngestion,
        client: ArxivClient,
        query: ArxivQuery,
        pdf_dir: PathBuf,
        wait_time: Duration,
    ) -> Self {
        Self {
            ingestion,
            client,
            query,
            pdf_dir,
            wait_time,
        }
    }

    /// Run up to `total_batches` batches, stopping at the first one that
    /// ingests nothing.
    pub async fn run(&self, total_batches: usize, batch_size: usize) -> Result<PipelineReport, IngestError> {
        tokio::fs::create_dir_all(&self.pdf_dir).await?;
        let mut report = PipelineReport::default();

        for batch in 0..total_batches {
            info!("Processing batch {} of {}...", batch + 1, total_batches);
            let outcome = self.process_batch(batch, batch_size).await;

            report.batches += 1;
            report.processed += outcome.processed;
            report.skipped += outcome.skipped;
            report.failed += outcome.failed;

            if outcome.processed == 0 {
                info!("No new papers processed in this batch, stopping");
                break;
            }
        }

        info!("Total papers processed: {}", report.processed);
        Ok(report)
    }

    /// One feed page. Feed errors end the batch with nothing processed.
    pub async fn process_batch(&self, batch: usize, batch_size: usize) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        let url = self
            .query
            .build_query_url(batch * batch_size, batch_size, Utc::now());

        let entries = match self.client.fetch(&url).await {
            Ok(entries) => entries,
            Err(e) => {
                error!("Error in batch processing: {}", e);
                return outcome;
            }
        };

        let processed_ids = match self.ingestion.database().processed_arxiv_ids().await {
            Ok(ids) => ids,
            Err(e) => {
                error!("Could not load processed paper ids: {}", e);
                return outcome;
            }
        };

        let pending = pending_entries(&entries, &processed_ids);
        outcome.skipped = entries.len() - pending.len();
        if outcome.skipped > 0 {
            info!("Skipping {} already processed papers", outcome.skipped);
        }

        for entry in pending {
            match self.process_entry(entry).await {
                Ok(Some(stored)) => {
                    info!("Successfully processed: {} ({})", entry.title, stored.paper_id);
                    outcome.processed += 1;
                }
                Ok(None) => outcome.skipped += 1,
                Err(e) => {
                    warn!("Error processing entry {}: {}", entry.arxiv_id, e);
                    outcome.failed += 1;
                }
            }
            tokio::time::sleep(self.wait_time).await;
        }

        info!("Batch complete. Processed {} new papers", outcome.processed);
        outcome
    }

    async fn process_entry(&self, entry: &ArxivEntry) -> Result<Option<StoredPaper>, IngestError> {
        let Some(pdf_url) = entry.pdf_url.as_deref() else {
            warn!("No PDF link for {}", entry.arxiv_id);
            return Ok(None);
        };

        let pdf_path = self.pdf_dir.join(format!("{}.pdf", entry.arxiv_id.replace('/', "_")));
        info!(
            "Downloading: {} ({})",
            entry.title.chars().take(100).collect::<String>(),
            entry.abs_url()
        );
        self.client.download_pdf(pdf_url, &pdf_path).await?;

        let mut paper = self
            .ingestion
            .extractor()
            .extract_text_with_sections(&pdf_path)
            .await;
        if !entry.title.is_empty() {
            paper.title = entry.title.clone();
        }

        let source = PaperSource {
            arxiv_id: Some(entry.arxiv_id.clone()),
            authors: entry.authors.clone(),
            abstract_text: Some(entry.summary.clone()).filter(|s| !s.is_empty()),
            categories: entry.categories.clone(),
        };
        let stored = self.ingestion.store_paper(&paper, &source).await;

        if let Err(e) = tokio::fs::remove_file(&pdf_path).await {
            warn!("Could not remove {}: {}", pdf_path.display(), e);
        }

        stored.map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str) -> ArxivEntry {
        ArxivEntry {
            arxiv_id: id.to_string(),
            title: format!("Paper {}", id),
            summary: String::new(),
            authors: vec![],
            pdf_url: None,
            primary_category: None,
            categories: vec![],
            published: None,
        }
    }

    #[test]
    fn test_pending_skips_processed() {
        let entries = vec![entry("2401.00001v1"), entry("2401.00002v1"), entry("2401.00003v2")];
        let processed: HashSet<String> = ["2401.00002v1".to_string()].into_iter().collect();

        let pending: Vec<&str> = pending_entries(&entries, &processed)
            .iter()
            .map(|e| e.arxiv_id.as_str())
            .collect();
        assert_eq!(pending, vec!["2401.00001v1", "2401.00003v2"]);
    }

    #[tokio::test]
    async fn test_entry_without_pdf_is_skipped() {
        let (ingestion, store) = crate::ingest::tests::ingestion().await;
        let dir = tempfile::tempdir().unwrap();
        let pipeline = ArxivPipeline::new(
            ingestion,
            ArxivClient::new().unwrap(),
            ArxivQuery::default(),
            dir.path().to_path_buf(),
            Duration::from_millis(0),
        );

        assert!(pipeline.process_entry(&entry("2401.00001v1")).await.unwrap().is_none());
        assert!(store.chunks.lock().unwrap().is_empty());
    }
}
