use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

const API_URL: &str = "http://export.arxiv.org/api/query";

#[derive(Error, Debug)]
pub enum ArxivError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("arXiv returned HTTP {0}")]
    Status(u16),
    #[error("Invalid feed: {0}")]
    Feed(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// What to ask the arXiv API for.
#[derive(Debug, Clone, PartialEq)]
pub struct ArxivQuery {
    pub categories: Vec<String>,
    pub lookback_days: i64,
}

impl Default for ArxivQuery {
    fn default() -> Self {
        Self {
            categories: vec!["cs.LG".to_string(), "cs.CL".to_string(), "cs.CV".to_string()],
            lookback_days: 2000,
        }
    }
}

impl ArxivQuery {
    pub fn with_categories(categories: Vec<String>) -> Self {
        Self {
            categories,
            ..Self::default()
        }
    }

    /// `(cat:a OR cat:b) AND (submittedDate:[FROM0000 TO TO2359])`
    pub fn search_query(&self, now: DateTime<Utc>) -> String {
        let cat_query = self
            .categories
            .iter()
            .map(|c| format!("cat:{}", c))
            .collect::<Vec<_>>()
            .join(" OR ");

        let date_start = (now - Duration::days(self.lookback_days)).format("%Y%m%d");
        let date_end = now.format("%Y%m%d");

        format!(
            "({}) AND (submittedDate:[{}0000 TO {}2359])",
            cat_query, date_start, date_end
        )
    }

    pub fn build_query_url(&self, start: usize, max_results: usize, now: DateTime<Utc>) -> String {
        let start = start.to_string();
        let max_results = max_results.to_string();
        let search_query = self.search_query(now);

        let params = [
            ("search_query", search_query.as_str()),
            ("start", start.as_str()),
            ("max_results", max_results.as_str()),
            ("sortBy", "submittedDate"),
            ("sortOrder", "descending"),
        ];

        match Url::parse_with_params(API_URL, &params) {
            Ok(url) => url.to_string(),
            Err(_) => format!(
                "{}?search_query={}&start={}&max_results={}&sortBy=submittedDate&sortOrder=descending",
                API_URL,
                urlencoding::encode(&search_query),
                start,
                max_results
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivEntry {
    pub arxiv_id: String,
    pub title: String,
    pub summary: String,
    pub authors: Vec<String>,
    pub pdf_url: Option<String>,
    pub primary_category: Option<String>,
    pub categories: Vec<String>,
    pub published: Option<String>,
}

impl ArxivEntry {
    fn empty() -> Self {
        Self {
            arxiv_id: String::new(),
            title: String::new(),
            summary: String::new(),
            authors: Vec::new(),
            pdf_url: None,
            primary_category: None,
            categories: Vec::new(),
            published: None,
        }
    }

    pub fn abs_url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.arxiv_id)
    }
}

/// `http://arxiv.org/abs/cs/0112017v1` -> `cs/0112017v1`. Old-style ids keep
/// their archive prefix.
fn id_from_abs_url(id: &str) -> String {
    match id.split_once("/abs/") {
        Some((_, rest)) => rest.trim_matches('/').to_string(),
        None if id.contains("://") => id.rsplit('/').next().unwrap_or_default().to_string(),
        None => id.to_string(),
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn attr(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .map(|a| String::from_utf8_lossy(&a.value).to_string())
}

/// Record link and category attributes, which arrive on self-closing tags.
fn entry_attributes(entry: &mut ArxivEntry, e: &BytesStart<'_>) {
    match e.local_name().as_ref() {
        b"link" => {
            if attr(e, b"title").as_deref() == Some("pdf") && entry.pdf_url.is_none() {
                entry.pdf_url = attr(e, b"href").map(|href| href.replace("abs", "pdf"));
            }
        }
        b"primary_category" => {
            if let Some(term) = attr(e, b"term") {
                for cat in term.split(',').map(str::trim).filter(|c| !c.is_empty()) {
                    if entry.primary_category.is_none() {
                        entry.primary_category = Some(cat.to_string());
                    }
                    if !entry.categories.iter().any(|c| c == cat) {
                        entry.categories.insert(0, cat.to_string());
                    }
                }
            }
        }
        b"category" => {
            if let Some(term) = attr(e, b"term") {
                if !entry.categories.contains(&term) {
                    entry.categories.push(term);
                }
            }
        }
        _ => {}
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Field {
    None,
    Id,
    Title,
    Summary,
    Published,
    AuthorName,
}

/// Parse an arXiv Atom feed into entries.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivEntry>, ArxivError> {
    let mut reader = Reader::from_str(xml);
    let mut buf = Vec::new();

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut field = Field::None;
    let mut text = String::new();
    let mut in_author = false;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(ref e)) => {
                match e.local_name().as_ref() {
                    b"entry" => current = Some(ArxivEntry::empty()),
                    b"author" if current.is_some() => in_author = true,
                    b"id" if current.is_some() => field = Field::Id,
                    b"title" if current.is_some() => field = Field::Title,
                    b"summary" if current.is_some() => field = Field::Summary,
                    b"published" if current.is_some() => field = Field::Published,
                    b"name" if in_author => field = Field::AuthorName,
                    _ => {}
                }
                text.clear();
                if let Some(entry) = current.as_mut() {
                    entry_attributes(entry, e);
                }
            }
            Ok(Event::Empty(ref e)) => {
                if let Some(entry) = current.as_mut() {
                    entry_attributes(entry, e);
                }
            }
            Ok(Event::Text(ref e)) => {
                if field != Field::None {
                    let chunk = e
                        .unescape()
                        .map_err(|err| ArxivError::Feed(err.to_string()))?;
                    text.push_str(&chunk);
                }
            }
            Ok(Event::CData(ref e)) => {
                if field != Field::None {
                    text.push_str(&String::from_utf8_lossy(&e.to_vec()));
                }
            }
            Ok(Event::End(ref e)) => {
                let local = e.local_name();
                if local.as_ref() == b"entry" {
                    if let Some(entry) = current.take() {
                        if entry.arxiv_id.is_empty() {
                            debug!("Skipping feed entry without an id");
                        } else {
                            entries.push(entry);
                        }
                    }
                    field = Field::None;
                    continue;
                }
                if local.as_ref() == b"author" {
                    in_author = false;
                }

                if let Some(entry) = current.as_mut() {
                    let value = collapse_whitespace(&text);
                    match (field, local.as_ref()) {
                        (Field::Id, b"id") => {
                            entry.arxiv_id = id_from_abs_url(&value);
                        }
                        (Field::Title, b"title") => entry.title = value,
                        (Field::Summary, b"summary") => entry.summary = value,
                        (Field::Published, b"published") => entry.published = Some(value),
                        (Field::AuthorName, b"name") if !value.is_empty() => entry.authors.push(value),
                        _ => {}
                    }
                }
                field = Field::None;
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(ArxivError::Feed(format!("XML parse error: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(entries)
}

#[derive(Clone)]
pub struct ArxivClient {
    client: reqwest::Client,
}

impl ArxivClient {
    pub fn new() -> Result<Self, ArxivError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("research-copilot/", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }

    pub async fn fetch(&self, url: &str) -> Result<Vec<ArxivEntry>, ArxivError> {
        info!("Query URL: {}", url);
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ArxivError::Status(response.status().as_u16()));
        }
        let body = response.text().await?;
        parse_feed(&body)
    }

    pub async fn download_pdf(&self, url: &str, dest: &Path) -> Result<u64, ArxivError> {
        let response = self.client.get(url).send().await?;
        if !response.status().is_success() {
            return Err(ArxivError::Status(response.status().as_u16()));
        }
        let bytes = response.bytes().await?;

        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(dest, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
