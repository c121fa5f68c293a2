use colored::Colorize;
use std::path::Path;

use crate::database::PaperRecord;
use crate::document::{ExtractedPaper, PdfExtractor};
use crate::ingest::{DataIngestion, PaperSource};

const PREVIEW_CHARS: usize = 160;

pub fn format_sections(paper: &ExtractedPaper) -> String {
    let mut out = format!(
        "\n📄 {}\n   {} pages, {} sections\n",
        paper.title.bright_yellow(),
        paper.metadata.total_pages,
        paper.sections.len()
    );

    for section in &paper.sections {
        let words = section.text.split_whitespace().count();
        let preview: String = section
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(PREVIEW_CHARS)
            .collect();
        out.push_str(&format!(
            "\n  {} ({} words)\n    {}\n",
            section.name.cyan().bold(),
            words,
            preview
        ));
    }
    out
}

pub fn format_paper_list(papers: &[PaperRecord]) -> String {
    if papers.is_empty() {
        return "No papers stored yet.\n".to_string();
    }

    let mut out = format!("\n📚 {} stored papers:\n", papers.len());
    for paper in papers {
        let id = paper.arxiv_id.as_deref().unwrap_or(&paper.paper_id);
        out.push_str(&format!(
            "  • {} [{}] {} sections, processed {}\n",
            paper.title.bright_yellow(),
            id.cyan(),
            paper.sections_found.len(),
            paper.processed_date.format("%Y-%m-%d %H:%M")
        ));
    }
    out
}

pub async fn extract(extractor: &PdfExtractor, path: &Path) -> Result<(), String> {
    println!("📄 Extracting: {}", path.display().to_string().bright_yellow());
    let paper = extractor.extract_text_with_sections(path).await;
    if let Some(error) = &paper.metadata.error {
        return Err(format!("Failed to extract {}: {}", path.display(), error));
    }
    print!("{}", format_sections(&paper));
    Ok(())
}

pub async fn ingest(ingestion: &DataIngestion, path: &Path) -> Result<(), String> {
    if path.is_dir() {
        let report = ingestion
            .ingest_directory(path)
            .await
            .map_err(|e| format!("Failed to ingest {}: {}", path.display(), e))?;
        println!(
            "✅ Ingested {} papers ({} failed)",
            report.processed.to_string().green(),
            report.failed.to_string().red()
        );
    } else {
        let stored = ingestion
            .ingest_pdf(path, &PaperSource::default())
            .await
            .map_err(|e| format!("Failed to ingest {}: {}", path.display(), e))?;
        println!(
            "✅ Stored {} as {} ({} chunks, {} citations)",
            path.display(),
            stored.paper_id.cyan(),
            stored.chunks,
            stored.citations
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_format_sections_previews_each_section() {
        let pages = ["Neural Machine Translation\nAbstract\nWe   jointly learn\nto align.\n1 Introduction\nRNNs encode."];
        let paper = ExtractedPaper::from_pages(&pages, "nmt.pdf");
        let out = format_sections(&paper);
        assert!(out.contains("Neural Machine Translation"));
        assert!(out.contains("abstract"));
        assert!(out.contains("We jointly learn to align."));
        assert!(out.contains("introduction"));
    }

    #[test]
    fn test_format_paper_list() {
        assert_eq!(format_paper_list(&[]), "No papers stored yet.\n");

        let paper = PaperRecord {
            paper_id: "abc".to_string(),
            arxiv_id: Some("1409.0473".to_string()),
            title: "Neural Machine Translation".to_string(),
            authors: vec![],
            abstract_text: None,
            categories: vec![],
            sections_found: vec!["abstract".to_string()],
            total_pages: 15,
            filename: None,
            processed_date: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
        };
        let out = format_paper_list(&[paper]);
        assert!(out.contains("1409.0473"));
        assert!(out.contains("2024-05-01 09:30"));
    }
}
