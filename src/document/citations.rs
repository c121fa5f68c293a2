use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

const CONTEXT_CHARS: usize = 120;

lazy_static! {
    // New-style ids (1301.3781, 2106.09685v2) and old-style ids (cs/0112017, hep-th/9901001).
    static ref ARXIV_ID_RE: Regex = Regex::new(
        r"(?i)(?:arxiv[:\s]*|abs/|pdf/)?\b((?:\d{4}\.\d{4,5})|(?:[a-z\-]+(?:\.[A-Z]{2})?/\d{7}))(?:v\d+)?\b"
    )
    .unwrap();
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArxivCitation {
    pub arxiv_id: String,
    pub context: String,
}

/// Scan a references section for cited arXiv identifiers. Duplicates are
/// dropped and order of first appearance is kept.
pub fn find_arxiv_citations(references: &str) -> Vec<ArxivCitation> {
    let mut found: Vec<ArxivCitation> = Vec::new();

    for caps in ARXIV_ID_RE.captures_iter(references) {
        let Some(id) = caps.get(1) else { continue };
        let arxiv_id = id.as_str().to_string();
        if found.iter().any(|c| c.arxiv_id == arxiv_id) {
            continue;
        }
        found.push(ArxivCitation {
            context: context_around(references, id.start(), id.end()),
            arxiv_id,
        });
    }

    found
}

fn context_around(text: &str, start: usize, end: usize) -> String {
    let before: String = text[..start]
        .chars()
        .rev()
        .take(CONTEXT_CHARS / 2)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    let after: String = text[end..].chars().take(CONTEXT_CHARS / 2).collect();
    format!("{}{}{}", before, &text[start..end], after)
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_finds_new_and_old_style_ids() {
        let refs = "[1] T. Mikolov. Efficient estimation. arXiv:1301.3781v3, 2013.\n\
                    [2] Some Author. Old work. hep-th/9901001.\n\
                    [3] Again cited. https://arxiv.org/abs/1301.3781";
        let ids: Vec<String> = find_arxiv_citations(refs).into_iter().map(|c| c.arxiv_id).collect();
        assert_eq!(ids, vec!["1301.3781", "hep-th/9901001"]);
    }

    #[test]
    fn test_context_contains_id() {
        let refs = "Vaswani et al. Attention is all you need. arXiv preprint arXiv:1706.03762, 2017.";
        let cites = find_arxiv_citations(refs);
        assert_eq!(cites.len(), 1);
        assert!(cites[0].context.contains("1706.03762"));
        assert!(cites[0].context.contains("Attention"));
    }

    #[test]
    fn test_ignores_plain_numbers() {
        assert!(find_arxiv_citations("pages 1234-5678, volume 12.3").is_empty());
    }
}
