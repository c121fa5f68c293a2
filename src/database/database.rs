use chrono::{DateTime, Utc};
use log::info;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use tokio_rusqlite::Connection;

use crate::document::{ArxivCitation, Section};

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] tokio_rusqlite::Error),
    #[error("Database connection error: {0}")]
    Connection(String),
    #[error("Corrupt row for paper {paper_id}: {reason}")]
    CorruptRow { paper_id: String, reason: String },
}

/// One stored paper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaperRecord {
    pub paper_id: String,
    pub arxiv_id: Option<String>,
    pub title: String,
    pub authors: Vec<String>,
    pub abstract_text: Option<String>,
    pub categories: Vec<String>,
    pub sections_found: Vec<String>,
    pub total_pages: usize,
    pub filename: Option<String>,
    pub processed_date: DateTime<Utc>,
}

type RawPaperRow = (
    String,
    Option<String>,
    String,
    String,
    Option<String>,
    String,
    String,
    i64,
    Option<String>,
    String,
);

const PAPER_COLUMNS: &str = "paper_id, arxiv_id, title, authors, abstract, categories, \
                             sections_found, total_pages, filename, processed_date";

fn read_paper_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawPaperRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
        row.get(8)?,
        row.get(9)?,
    ))
}

fn decode_paper(raw: RawPaperRow) -> Result<PaperRecord, DatabaseError> {
    let (paper_id, arxiv_id, title, authors, abstract_text, categories, sections, pages, filename, date) =
        raw;
    let corrupt = |reason: String| DatabaseError::CorruptRow {
        paper_id: paper_id.clone(),
        reason,
    };

    let list = |json: &str| serde_json::from_str::<Vec<String>>(json).map_err(|e| corrupt(e.to_string()));
    let authors = list(&authors)?;
    let categories = list(&categories)?;
    let sections_found = list(&sections)?;
    let processed_date = DateTime::parse_from_rfc3339(&date)
        .map_err(|e| corrupt(e.to_string()))?
        .with_timezone(&Utc);

    Ok(PaperRecord {
        paper_id,
        arxiv_id,
        title,
        authors,
        abstract_text,
        categories,
        sections_found,
        total_pages: pages.max(0) as usize,
        filename,
        processed_date,
    })
}

fn encode_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| "[]".to_string())
}

/// Paper metadata, sections and citation edges in SQLite.
#[derive(Clone)]
pub struct Database {
    conn: Arc<Connection>,
}

impl Database {
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| DatabaseError::Connection(e.to_string()))?;
            }
        }

        let conn = Connection::open(path)
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::from_connection(conn).await
    }

    pub async fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory()
            .await
            .map_err(|e| DatabaseError::Connection(e.to_string()))?;
        Self::from_connection(conn).await
    }

    async fn from_connection(conn: Connection) -> Result<Self, DatabaseError> {
        let db = Self {
            conn: Arc::new(conn),
        };
        db.initialize().await?;
        Ok(db)
    }

    async fn initialize(&self) -> Result<(), DatabaseError> {
        // Create tables if they don't exist
        self.conn
            .call(|conn| {
                conn.execute_batch(
                    "PRAGMA foreign_keys = ON;
                    CREATE TABLE IF NOT EXISTS papers (
                        paper_id TEXT PRIMARY KEY,
                        arxiv_id TEXT,
                        title TEXT NOT NULL,
                        authors TEXT NOT NULL DEFAULT '[]',
                        abstract TEXT,
                        categories TEXT NOT NULL DEFAULT '[]',
                        sections_found TEXT NOT NULL DEFAULT '[]',
                        total_pages INTEGER NOT NULL DEFAULT 0,
                        filename TEXT,
                        processed_date TEXT NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS idx_papers_arxiv_id ON papers(arxiv_id);
                    CREATE TABLE IF NOT EXISTS sections (
                        id INTEGER PRIMARY KEY,
                        paper_id TEXT NOT NULL REFERENCES papers(paper_id) ON DELETE CASCADE,
                        position INTEGER NOT NULL,
                        section_type TEXT NOT NULL,
                        content TEXT NOT NULL
                    );
                    CREATE TABLE IF NOT EXISTS citations (
                        id INTEGER PRIMARY KEY,
                        paper_id TEXT NOT NULL REFERENCES papers(paper_id) ON DELETE CASCADE,
                        cited_arxiv_id TEXT NOT NULL,
                        context TEXT,
                        created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
                        UNIQUE(paper_id, cited_arxiv_id)
                    );",
                )
            })
            .await?;

        info!("Database initialized successfully");
        Ok(())
    }

    /// Insert a paper, or refresh its metadata and `processed_date` if the id
    /// already exists.
    pub async fn upsert_paper(&self, paper: &PaperRecord) -> Result<(), DatabaseError> {
        let paper_id = paper.paper_id.clone();
        let arxiv_id = paper.arxiv_id.clone();
        let title = paper.title.clone();
        let authors = encode_list(&paper.authors);
        let abstract_text = paper.abstract_text.clone();
        let categories = encode_list(&paper.categories);
        let sections = encode_list(&paper.sections_found);
        let pages = paper.total_pages as i64;
        let filename = paper.filename.clone();
        let date = paper.processed_date.to_rfc3339();

        self.conn
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO papers (paper_id, arxiv_id, title, authors, abstract, categories,
                                         sections_found, total_pages, filename, processed_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                     ON CONFLICT(paper_id) DO UPDATE SET
                        arxiv_id = COALESCE(excluded.arxiv_id, papers.arxiv_id),
                        title = excluded.title,
                        authors = excluded.authors,
                        abstract = COALESCE(excluded.abstract, papers.abstract),
                        categories = excluded.categories,
                        sections_found = excluded.sections_found,
                        total_pages = excluded.total_pages,
                        filename = COALESCE(excluded.filename, papers.filename),
                        processed_date = excluded.processed_date",
                    params![
                        paper_id,
                        arxiv_id,
                        title,
                        authors,
                        abstract_text,
                        categories,
                        sections,
                        pages,
                        filename,
                        date
                    ],
                )
            })
            .await?;

        Ok(())
    }

    pub async fn replace_sections(
        &self,
        paper_id: &str,
        sections: &[Section],
    ) -> Result<(), DatabaseError> {
        let paper_id = paper_id.to_string();
        let sections = sections.to_vec();

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM sections WHERE paper_id = ?1", params![paper_id])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO sections (paper_id, position, section_type, content)
                         VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for (position, section) in sections.iter().enumerate() {
                        stmt.execute(params![paper_id, position as i64, section.name, section.text])?;
                    }
                }
                tx.commit()
            })
            .await?;

        Ok(())
    }

    pub async fn get_sections(&self, paper_id: &str) -> Result<Vec<Section>, DatabaseError> {
        let paper_id = paper_id.to_string();
        let sections = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT section_type, content FROM sections WHERE paper_id = ?1 ORDER BY position",
                )?;
                let rows = stmt.query_map(params![paper_id], |row| {
                    Ok(Section {
                        name: row.get(0)?,
                        text: row.get(1)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        Ok(sections)
    }

    /// Store citation edges, ignoring ones already recorded. Returns how many
    /// were new.
    pub async fn record_citations(
        &self,
        paper_id: &str,
        citations: &[ArxivCitation],
    ) -> Result<usize, DatabaseError> {
        let paper_id = paper_id.to_string();
        let citations = citations.to_vec();

        let inserted = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut inserted = 0;
                {
                    let mut stmt = tx.prepare(
                        "INSERT OR IGNORE INTO citations (paper_id, cited_arxiv_id, context)
                         VALUES (?1, ?2, ?3)",
                    )?;
                    for citation in &citations {
                        inserted += stmt.execute(params![paper_id, citation.arxiv_id, citation.context])?;
                    }
                }
                tx.commit()?;
                Ok(inserted)
            })
            .await?;

        Ok(inserted)
    }

    pub async fn citations_for(&self, paper_id: &str) -> Result<Vec<ArxivCitation>, DatabaseError> {
        let paper_id = paper_id.to_string();
        let citations = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT cited_arxiv_id, COALESCE(context, '') FROM citations
                     WHERE paper_id = ?1 ORDER BY id",
                )?;
                let rows = stmt.query_map(params![paper_id], |row| {
                    Ok(ArxivCitation {
                        arxiv_id: row.get(0)?,
                        context: row.get(1)?,
                    })
                })?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        Ok(citations)
    }

    /// Ids of stored papers that cite the given arXiv id.
    pub async fn cited_by(&self, arxiv_id: &str) -> Result<Vec<String>, DatabaseError> {
        let arxiv_id = arxiv_id.to_string();
        let papers = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT paper_id FROM citations WHERE cited_arxiv_id = ?1 ORDER BY paper_id",
                )?;
                let rows = stmt.query_map(params![arxiv_id], |row| row.get::<_, String>(0))?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;
        Ok(papers)
    }

    pub async fn get_paper(&self, paper_id: &str) -> Result<Option<PaperRecord>, DatabaseError> {
        let paper_id = paper_id.to_string();
        let raw = self
            .conn
            .call(move |conn| {
                conn.query_row(
                    &format!("SELECT {} FROM papers WHERE paper_id = ?1", PAPER_COLUMNS),
                    params![paper_id],
                    read_paper_row,
                )
                .optional()
            })
            .await?;

        raw.map(decode_paper).transpose()
    }

    pub async fn list_papers(&self, limit: i64) -> Result<Vec<PaperRecord>, DatabaseError> {
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {} FROM papers ORDER BY processed_date DESC LIMIT ?1",
                    PAPER_COLUMNS
                ))?;
                let rows = stmt.query_map(params![limit], read_paper_row)?;
                rows.collect::<rusqlite::Result<Vec<_>>>()
            })
            .await?;

        rows.into_iter().map(decode_paper).collect()
    }

    pub async fn processed_arxiv_ids(&self) -> Result<HashSet<String>, DatabaseError> {
        let ids = self
            .conn
            .call(|conn| {
                let mut stmt =
                    conn.prepare("SELECT arxiv_id FROM papers WHERE arxiv_id IS NOT NULL")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                rows.collect::<rusqlite::Result<HashSet<_>>>()
            })
            .await?;
        Ok(ids)
    }

    /// Remove a paper with its sections and citations. Returns whether a row
    /// existed.
    pub async fn delete_paper(&self, paper_id: &str) -> Result<bool, DatabaseError> {
        let paper_id = paper_id.to_string();
        let deleted = self
            .conn
            .call(move |conn| conn.execute("DELETE FROM papers WHERE paper_id = ?1", params![paper_id]))
            .await?;
        Ok(deleted > 0)
    }

    pub async fn paper_count(&self) -> Result<u64, DatabaseError> {
        let count = self
            .conn
            .call(|conn| conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get::<_, i64>(0)))
            .await?;
        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(paper_id: &str, arxiv_id: Option<&str>) -> PaperRecord {
        PaperRecord {
            paper_id: paper_id.to_string(),
            arxiv_id: arxiv_id.map(str::to_string),
            title: "Efficient Estimation of Word Representations in Vector Space".to_string(),
            authors: vec!["Tomas Mikolov".to_string(), "Kai Chen".to_string()],
            abstract_text: Some("We propose two novel model architectures.".to_string()),
            categories: vec!["cs.CL".to_string()],
            sections_found: vec!["abstract".to_string(), "introduction".to_string()],
            total_pages: 12,
            filename: Some("1301.3781v3.pdf".to_string()),
            processed_date: Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get_paper() {
        let db = Database::open_in_memory().await.unwrap();
        let paper = record("p1", Some("1301.3781"));
        db.upsert_paper(&paper).await.unwrap();

        let stored = db.get_paper("p1").await.unwrap().unwrap();
        assert_eq!(stored, paper);
        assert!(db.get_paper("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_conflict_refreshes_date() {
        let db = Database::open_in_memory().await.unwrap();
        let mut paper = record("p1", Some("1301.3781"));
        db.upsert_paper(&paper).await.unwrap();

        paper.processed_date = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        paper.abstract_text = None;
        db.upsert_paper(&paper).await.unwrap();

        let stored = db.get_paper("p1").await.unwrap().unwrap();
        assert_eq!(stored.processed_date, paper.processed_date);
        assert_eq!(
            stored.abstract_text.as_deref(),
            Some("We propose two novel model architectures.")
        );
        assert_eq!(db.paper_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sections_are_replaced_in_order() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_paper(&record("p1", None)).await.unwrap();

        let first = vec![Section { name: "unknown".to_string(), text: "x".to_string() }];
        db.replace_sections("p1", &first).await.unwrap();

        let second = vec![
            Section { name: "abstract".to_string(), text: "a".to_string() },
            Section { name: "introduction".to_string(), text: "b".to_string() },
        ];
        db.replace_sections("p1", &second).await.unwrap();

        assert_eq!(db.get_sections("p1").await.unwrap(), second);
    }

    #[tokio::test]
    async fn test_citations_deduplicate_and_reverse_lookup() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_paper(&record("p1", Some("1301.3781"))).await.unwrap();
        db.upsert_paper(&record("p2", Some("1706.03762"))).await.unwrap();

        let cites = vec![ArxivCitation {
            arxiv_id: "1409.0473".to_string(),
            context: "Bahdanau et al.".to_string(),
        }];
        assert_eq!(db.record_citations("p1", &cites).await.unwrap(), 1);
        assert_eq!(db.record_citations("p1", &cites).await.unwrap(), 0);
        db.record_citations("p2", &cites).await.unwrap();

        assert_eq!(db.citations_for("p1").await.unwrap(), cites);
        assert_eq!(db.cited_by("1409.0473").await.unwrap(), vec!["p1", "p2"]);
    }

    #[tokio::test]
    async fn test_delete_paper_cascades() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_paper(&record("p1", Some("1301.3781"))).await.unwrap();
        db.replace_sections(
            "p1",
            &[Section {
                name: "abstract".to_string(),
                text: "Word vectors.".to_string(),
            }],
        )
        .await
        .unwrap();

        assert!(db.delete_paper("p1").await.unwrap());
        assert!(!db.delete_paper("p1").await.unwrap());
        assert!(db.get_paper("p1").await.unwrap().is_none());
        assert!(db.get_sections("p1").await.unwrap().is_empty());
        assert!(db.processed_arxiv_ids().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_processed_ids_and_listing() {
        let db = Database::open_in_memory().await.unwrap();
        db.upsert_paper(&record("p1", Some("1301.3781"))).await.unwrap();
        let mut newer = record("p2", None);
        newer.processed_date = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
        db.upsert_paper(&newer).await.unwrap();

        let ids = db.processed_arxiv_ids().await.unwrap();
        assert_eq!(ids.len(), 1);
        assert!(ids.contains("1301.3781"));

        let listed = db.list_papers(10).await.unwrap();
        assert_eq!(listed[0].paper_id, "p2");
        assert_eq!(listed.len(), 2);
    }
}
