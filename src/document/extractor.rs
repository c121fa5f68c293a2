use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::sections::{split_sections, Section};

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("PDF parsing failed: {0}")]
    Pdf(String),
    #[error("PDF extractor crashed on {0}")]
    Panicked(PathBuf),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PaperMetadata {
    pub title: String,
    pub filename: String,
    pub total_pages: usize,
    pub sections_found: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedPaper {
    pub title: String,
    pub sections: Vec<Section>,
    pub full_text: String,
    pub metadata: PaperMetadata,
}

impl ExtractedPaper {
    pub fn section(&self, name: &str) -> Option<&Section> {
        self.sections.iter().find(|s| s.name == name)
    }

    pub fn is_error(&self) -> bool {
        self.metadata.error.is_some()
    }

    /// Build a paper from already extracted page texts.
    pub fn from_pages<S: AsRef<str>>(pages: &[S], filename: &str) -> Self {
        let (title, sections) = split_sections(pages);
        let title = if title.is_empty() {
            fallback_title(filename)
        } else {
            title
        };

        let full_text = pages
            .iter()
            .map(|p| p.as_ref())
            .collect::<Vec<_>>()
            .join("\n");

        let metadata = PaperMetadata {
            title: title.clone(),
            filename: filename.to_string(),
            total_pages: pages.len(),
            sections_found: sections.iter().map(|s| s.name.clone()).collect(),
            error: None,
        };

        Self {
            title,
            sections,
            full_text,
            metadata,
        }
    }

    fn failed(filename: &str, error: &ExtractError) -> Self {
        Self {
            title: fallback_title(filename),
            sections: Vec::new(),
            full_text: String::new(),
            metadata: PaperMetadata {
                title: fallback_title(filename),
                filename: filename.to_string(),
                total_pages: 0,
                sections_found: Vec::new(),
                error: Some(error.to_string()),
            },
        }
    }
}

fn fallback_title(filename: &str) -> String {
    Path::new(filename)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct PdfExtractor {
    supported_formats: Vec<String>,
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl PdfExtractor {
    pub fn new() -> Self {
        Self {
            supported_formats: vec!["pdf".to_string()],
        }
    }

    pub fn supports(&self, path: &Path) -> bool {
        path.extension()
            .map(|ext| {
                let ext = ext.to_string_lossy().to_lowercase();
                self.supported_formats.iter().any(|f| *f == ext)
            })
            .unwrap_or(false)
    }

    /// Extract raw page texts. `pdf-extract` can panic on malformed input, so
    /// it runs on the blocking pool and a panic becomes an error.
    pub async fn extract_pages(&self, path: &Path) -> Result<Vec<String>, ExtractError> {
        if !path.exists() {
            return Err(ExtractError::NotFound(path.to_path_buf()));
        }
        if !self.supports(path) {
            return Err(ExtractError::UnsupportedFormat(path.display().to_string()));
        }

        let owned = path.to_path_buf();
        let result = tokio::task::spawn_blocking(move || pdf_extract::extract_text_by_pages(&owned)).await;

        match result {
            Ok(Ok(pages)) => Ok(pages),
            Ok(Err(e)) => Err(ExtractError::Pdf(e.to_string())),
            Err(_) => Err(ExtractError::Panicked(path.to_path_buf())),
        }
    }

    /// Extract the title and sections of a paper. Never fails: problems are
    /// reported through `metadata.error` with empty sections.
    pub async fn extract_text_with_sections(&self, path: &Path) -> ExtractedPaper {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        match self.extract_pages(path).await {
            Ok(pages) => {
                let paper = ExtractedPaper::from_pages(&pages, &filename);
                info!(
                    "Extracted {} sections from {} ({} pages)",
                    paper.sections.len(),
                    filename,
                    paper.metadata.total_pages
                );
                paper
            }
            Err(e) => {
                warn!("Extraction failed for {}: {}", path.display(), e);
                ExtractedPaper::failed(&filename, &e)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    #[test]
    fn test_from_pages_fills_metadata() {
        let pages = vec![
            "Deep Residual Learning for Image Recognition\nAbstract\nDeeper networks are harder to train.".to_string(),
            "1 Introduction\nDeep networks integrate features.".to_string(),
        ];
        let paper = ExtractedPaper::from_pages(&pages, "1512.03385.pdf");

        assert_eq!(paper.title, "Deep Residual Learning for Image Recognition");
        assert_eq!(paper.metadata.total_pages, 2);
        assert_eq!(paper.metadata.sections_found, vec!["abstract", "introduction"]);
        assert_eq!(paper.metadata.filename, "1512.03385.pdf");
        assert!(paper.full_text.contains("Deep networks integrate features."));
        assert_eq!(
            paper.section("abstract").map(|s| s.text.as_str()),
            Some("Deeper networks are harder to train.")
        );
    }

    #[test]
    fn test_untitled_pages_fall_back_to_file_stem() {
        let pages = ["Abstract\nNo title line here."];
        let paper = ExtractedPaper::from_pages(&pages, "uploads/notes.pdf");
        assert_eq!(paper.title, "notes");
    }

    #[tokio::test]
    async fn test_missing_file_reports_error_in_metadata() {
        let extractor = PdfExtractor::new();
        let paper = extractor
            .extract_text_with_sections(Path::new("does/not/exist.pdf"))
            .await;
        assert!(paper.is_error());
        assert!(paper.sections.is_empty());
        assert_eq!(paper.metadata.total_pages, 0);
    }

    #[tokio::test]
    async fn test_rejects_non_pdf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "plain text").unwrap();

        let err = PdfExtractor::new().extract_pages(&path).await.unwrap_err();
        assert!(matches!(err, ExtractError::UnsupportedFormat(_)));
    }

    #[tokio::test]
    async fn test_garbage_pdf_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"this is not a pdf").unwrap();

        let paper = PdfExtractor::new().extract_text_with_sections(&path).await;
        assert!(paper.is_error());
    }

    pub(crate) fn fixture_pdf() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("testdata/sparse_attention.pdf")
    }

    #[tokio::test]
    async fn test_extract_pages_reads_every_page() {
        let pages = PdfExtractor::new().extract_pages(&fixture_pdf()).await.unwrap();
        assert_eq!(pages.len(), 2);
        assert!(pages[0].contains("Sparse Attention for Long Documents"));
        assert!(pages[1].contains("sliding window"));
    }

    #[tokio::test]
    async fn test_extract_sections_from_pdf() {
        let paper = PdfExtractor::new()
            .extract_text_with_sections(&fixture_pdf())
            .await;

        assert!(!paper.is_error(), "{:?}", paper.metadata.error);
        assert_eq!(paper.title, "Sparse Attention for Long Documents");
        assert_eq!(paper.metadata.total_pages, 2);
        assert_eq!(paper.metadata.filename, "sparse_attention.pdf");
        assert_eq!(
            paper.metadata.sections_found,
            vec!["unknown", "abstract", "introduction", "methodology", "references"]
        );
        assert_eq!(
            paper.section("abstract").map(|s| s.text.as_str()),
            Some("We study sparse attention patterns.")
        );
        assert_eq!(
            paper.section("methodology").map(|s| s.text.as_str()),
            Some("We keep a sliding window of tokens.")
        );
        assert!(paper
            .section("references")
            .is_some_and(|s| s.text.contains("arXiv:1706.03762, 2017.")));
    }

    #[test]
    fn test_supports_is_case_insensitive() {
        let extractor = PdfExtractor::new();
        assert!(extractor.supports(Path::new("paper.PDF")));
        assert!(!extractor.supports(Path::new("paper")));
    }
}
