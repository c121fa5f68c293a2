use chrono::Utc;
use log::{info, warn};
use serde::Deserialize;
use std::path::Path;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{DataIngestion, IngestError};
use crate::database::PaperRecord;
use crate::document::{ChunkStrategy, Chunker};
use crate::llm::IndexedChunk;

/// Snapshot chunks overlap by half a window.
pub const SNAPSHOT_STRATEGY: ChunkStrategy = ChunkStrategy::Window {
    size: 1000,
    overlap: 500,
    min_len: 100,
};

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl Default for StringOrList {
    fn default() -> Self {
        StringOrList::Many(Vec::new())
    }
}

/// One line of an arXiv metadata snapshot (`arxiv-metadata-oai-snapshot.json`).
#[derive(Debug, Clone, Deserialize)]
pub struct SnapshotRecord {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(rename = "abstract", default)]
    pub abstract_text: String,
    #[serde(default)]
    authors: StringOrList,
    #[serde(default)]
    categories: StringOrList,
}

impl SnapshotRecord {
    /// Authors come either as a list or as `"A, B and C"`.
    pub fn authors(&self) -> Vec<String> {
        match &self.authors {
            StringOrList::Many(list) => list.clone(),
            StringOrList::One(s) => s
                .replace(" and ", ", ")
                .split(',')
                .map(|a| a.split_whitespace().collect::<Vec<_>>().join(" "))
                .filter(|a| !a.is_empty())
                .collect(),
        }
    }

    pub fn categories(&self) -> Vec<String> {
        match &self.categories {
            StringOrList::Many(list) => list.clone(),
            StringOrList::One(s) => s.split_whitespace().map(str::to_string).collect(),
        }
    }

    pub fn title(&self) -> String {
        self.title.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SnapshotReport {
    pub processed: usize,
    pub skipped: usize,
    pub chunks: usize,
}

impl DataIngestion {
    /// Ingest title and abstract of every paper in a JSON-lines snapshot.
    /// Malformed lines and papers without an abstract are skipped.
    pub async fn ingest_snapshot(&self, path: &Path) -> Result<SnapshotReport, IngestError> {
        let chunker = Chunker::new(SNAPSHOT_STRATEGY)?;
        let file = tokio::fs::File::open(path).await?;
        let mut lines = BufReader::new(file).lines();
        let mut report = SnapshotReport::default();

        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let record: SnapshotRecord = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(_) => {
                    report.skipped += 1;
                    continue;
                }
            };
            if record.abstract_text.trim().is_empty() {
                report.skipped += 1;
                continue;
            }

            match self.store_snapshot_record(&record, &chunker).await {
                Ok(chunks) => {
                    report.processed += 1;
                    report.chunks += chunks;
                    if report.processed % 100 == 0 {
                        info!("Processed {} papers", report.processed);
                    }
                }
                Err(e) => {
                    warn!("Error processing paper {}: {}", record.id, e);
                    report.skipped += 1;
                }
            }
        }

        info!(
            "Processing complete. Total papers processed: {}",
            report.processed
        );
        Ok(report)
    }

    async fn store_snapshot_record(
        &self,
        record: &SnapshotRecord,
        chunker: &Chunker,
    ) -> Result<usize, IngestError> {
        let title = record.title();
        let authors = record.authors();
        let abstract_text = record.abstract_text.trim().to_string();

        let chunks: Vec<IndexedChunk> = chunker
            .chunk_text(&format!("{} {}", title, abstract_text))
            .into_iter()
            .map(|chunk| IndexedChunk {
                paper_id: record.id.clone(),
                arxiv_id: Some(record.id.clone()),
                title: title.clone(),
                authors: authors.clone(),
                section: Some("abstract".to_string()),
                chunk_index: chunk.chunk_index,
                text: chunk.text,
            })
            .collect();

        let indexed = self
            .index()
            .index_chunks(&chunks)
            .await
            .map_err(|e| IngestError::Index(e.to_string()))?;

        self.database()
            .upsert_paper(&PaperRecord {
                paper_id: record.id.clone(),
                arxiv_id: Some(record.id.clone()),
                title,
                authors,
                abstract_text: Some(abstract_text),
                categories: record.categories(),
                sections_found: vec!["abstract".to_string()],
                total_pages: 0,
                filename: None,
                processed_date: Utc::now(),
            })
            .await?;
        Ok(indexed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::tests::ingestion;
    use std::io::Write;

    #[test]
    fn test_record_field_shapes() {
        let line = r#"{"id":"0704.0001","title":"Calculation of prompt\n  diphoton production","abstract":"x","authors":"C. Balazs, E. L. Berger and C.-P. Yuan","categories":"hep-ph cs.LG"}"#;
        let record: SnapshotRecord = serde_json::from_str(line).unwrap();
        assert_eq!(record.title(), "Calculation of prompt diphoton production");
        assert_eq!(record.authors(), vec!["C. Balazs", "E. L. Berger", "C.-P. Yuan"]);
        assert_eq!(record.categories(), vec!["hep-ph", "cs.LG"]);

        let listed: SnapshotRecord =
            serde_json::from_str(r#"{"id":"1","authors":["A","B"],"categories":["cs.CL"]}"#).unwrap();
        assert_eq!(listed.authors(), vec!["A", "B"]);
        assert!(listed.abstract_text.is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_ingestion_skips_bad_lines() {
        let (ingestion, store) = ingestion().await;
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let abstract_text = "transformers ".repeat(120);
        writeln!(
            file,
            r#"{{"id":"1706.03762","title":"Attention Is All You Need","abstract":"{}","authors":"A. Vaswani and N. Shazeer","categories":"cs.CL"}}"#,
            abstract_text
        )
        .unwrap();
        writeln!(file, "{{not json").unwrap();
        writeln!(file, r#"{{"id":"empty","title":"No abstract","abstract":""}}"#).unwrap();

        let report = ingestion.ingest_snapshot(file.path()).await.unwrap();
        assert_eq!(report.processed, 1);
        assert_eq!(report.skipped, 2);

        // 1585 collapsed chars; the window at 1500 is too short to keep.
        let chunks = store.chunks.lock().unwrap();
        assert_eq!(chunks.len(), report.chunks);
        assert_eq!(chunks.len(), 3);
        assert!(chunks[0].text.starts_with("Attention Is All You Need transformers"));
        assert_eq!(chunks[0].authors, vec!["A. Vaswani", "N. Shazeer"]);

        let ids = ingestion.database().processed_arxiv_ids().await.unwrap();
        assert!(ids.contains("1706.03762"));
    }
}
