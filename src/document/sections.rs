use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Section name used for lines that appear before any recognised header.
pub const UNKNOWN_SECTION: &str = "unknown";

const MAX_HEADER_CHARS: usize = 80;
const MAX_HEADER_WORDS: usize = 8;
const MAX_TITLE_LINES: usize = 2;

lazy_static! {
    static ref PAGE_NUMBER_RE: Regex = Regex::new(r"^\d{1,4}$").unwrap();
    static ref ARXIV_STAMP_RE: Regex =
        Regex::new(r"(?i)^arxiv:\s*(\d{4}\.\d{4,5}|[a-z\-]+(\.[A-Z]{2})?/\d{7})(v\d+)?\s+\[[^\]]+\]").unwrap();
    static ref ABSTRACT_RE: Regex =
        Regex::new(r"^(?i:abstract)\s*(?:[.:\-\x{2013}\x{2014}]\s*(.*)|$)").unwrap();
    static ref NUMBERED_RE: Regex =
        Regex::new(r"^(\d{1,2}(?:\.\d{1,2})*)\.?\s+([A-Z]\S*(?:\s+\S+)*)$").unwrap();
    static ref ROMAN_RE: Regex =
        Regex::new(r"^([IVX]{1,5})\.\s+([A-Z][A-Z0-9 \-&:]{2,79})$").unwrap();
    static ref NAMED_RE: Regex = Regex::new(
        r"(?i)^(introduction|intro|background|related\s+works?|prior\s+work|preliminaries|methods?|methodology|proposed\s+method|approach|experiments?|experimental\s+(?:results|setup)|evaluation|results(?:\s+and\s+discussion)?|discussion|analysis|limitations|conclusions?|concluding\s+remarks|conclusion\s+and\s+future\s+work|future\s+work|acknowledge?ments?|references|bibliography|works\s+cited|appendix(?:\s+[a-z])?|appendices|supplementary\s+material)\s*:?$"
    )
    .unwrap();
    static ref SPACE_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// Synonyms folded onto one canonical section name. Checked after
/// lowercasing and whitespace collapsing.
const SYNONYMS: &[(&str, &str)] = &[
    ("intro", "introduction"),
    ("conclusions", "conclusion"),
    ("concluding remarks", "conclusion"),
    ("conclusion and future work", "conclusion"),
    ("conclusions and future work", "conclusion"),
    ("bibliography", "references"),
    ("works cited", "references"),
    ("acknowledgements", "acknowledgments"),
    ("acknowledgement", "acknowledgments"),
    ("acknowledgment", "acknowledgments"),
    ("method", "methodology"),
    ("methods", "methodology"),
    ("proposed method", "methodology"),
    ("approach", "methodology"),
    ("experiment", "experiments"),
    ("experimental results", "experiments"),
    ("experimental setup", "experiments"),
    ("evaluation", "experiments"),
    ("related works", "related work"),
    ("prior work", "related work"),
    ("results and discussion", "results"),
    ("appendices", "appendix"),
];

/// Words that leave a title line unfinished when they end it.
const CONNECTORS: &[&str] = &[
    "a", "an", "and", "as", "at", "by", "for", "from", "in", "into", "of", "on", "or", "the",
    "to", "via", "with",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderKind {
    Abstract,
    Numbered { depth: usize },
    Roman,
    Named,
}

/// A line recognised as a section header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub kind: HeaderKind,
    pub name: String,
    /// Body text that shares the header's line, e.g. `Abstract—We propose ...`.
    pub remainder: Option<String>,
}

impl Header {
    /// Whether this header starts a new top-level section.
    pub fn opens_section(&self) -> bool {
        !matches!(self.kind, HeaderKind::Numbered { depth } if depth > 1)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub text: String,
}

/// Lines that carry no content: blanks, bare page numbers and arXiv margin stamps.
pub fn is_noise_line(line: &str) -> bool {
    let line = line.trim();
    line.is_empty() || PAGE_NUMBER_RE.is_match(line) || ARXIV_STAMP_RE.is_match(line)
}

/// Lowercase, strip punctuation and fold synonyms.
pub fn normalize_section_name(raw: &str) -> String {
    let lowered = raw
        .trim()
        .trim_end_matches(|c: char| c == ':' || c == '.')
        .to_lowercase();
    let collapsed = SPACE_RE.replace_all(lowered.trim(), " ").to_string();

    if collapsed.starts_with("appendix") {
        return "appendix".to_string();
    }

    SYNONYMS
        .iter()
        .find(|(from, _)| *from == collapsed)
        .map(|(_, to)| to.to_string())
        .unwrap_or(collapsed)
}

fn is_known_section(name: &str) -> bool {
    NAMED_RE.is_match(name.trim())
}

fn plausible_header_name(name: &str) -> bool {
    let name = name.trim();
    if name.is_empty() || name.chars().count() > MAX_HEADER_CHARS {
        return false;
    }
    if name.split_whitespace().count() > MAX_HEADER_WORDS {
        return false;
    }
    if name.ends_with(&['.', ',', ';', '?', '!'][..]) {
        return false;
    }
    if name.contains(',') || name.contains('@') || name.contains('=') {
        return false;
    }
    name.chars().any(|c| c.is_alphabetic())
}

/// Classify a single line as a section header. Patterns are tried in a
/// fixed order and the first match wins.
pub fn classify_header(line: &str) -> Option<Header> {
    let line = SPACE_RE.replace_all(line.trim(), " ");
    let line = line.as_ref();
    if line.is_empty() {
        return None;
    }

    if let Some(caps) = ABSTRACT_RE.captures(line) {
        let remainder = caps
            .get(1)
            .map(|m| m.as_str().trim().to_string())
            .filter(|s| !s.is_empty());
        return Some(Header {
            kind: HeaderKind::Abstract,
            name: "abstract".to_string(),
            remainder,
        });
    }

    if line.chars().count() > MAX_HEADER_CHARS {
        return None;
    }

    if let Some(caps) = NUMBERED_RE.captures(line) {
        let number = &caps[1];
        let name = &caps[2];
        if plausible_header_name(name) {
            return Some(Header {
                kind: HeaderKind::Numbered {
                    depth: number.split('.').filter(|p| !p.is_empty()).count(),
                },
                name: normalize_section_name(name),
                remainder: None,
            });
        }
    }

    if let Some(caps) = ROMAN_RE.captures(line) {
        let name = &caps[2];
        if plausible_header_name(name) {
            return Some(Header {
                kind: HeaderKind::Roman,
                name: normalize_section_name(name),
                remainder: None,
            });
        }
    }

    if NAMED_RE.is_match(line) {
        return Some(Header {
            kind: HeaderKind::Named,
            name: normalize_section_name(line),
            remainder: None,
        });
    }

    None
}

fn title_is_unfinished(title: &str, next: &str) -> bool {
    if title.ends_with(':') || title.ends_with('-') {
        return true;
    }
    let ends_with_connector = title
        .split_whitespace()
        .last()
        .map(|w| CONNECTORS.contains(&w.to_lowercase().as_str()))
        .unwrap_or(false);
    ends_with_connector || next.chars().next().is_some_and(|c| c.is_lowercase())
}

/// Pick the paper title from the first page. Returns the title and how many
/// of the given lines it consumed.
pub fn extract_title(lines: &[&str]) -> (String, usize) {
    let Some(first) = lines.first() else {
        return (String::new(), 0);
    };
    if classify_header(first).is_some() {
        return (String::new(), 0);
    }

    let mut title = first.trim().to_string();
    let mut consumed = 1;

    while consumed < MAX_TITLE_LINES {
        let Some(next) = lines.get(consumed) else { break };
        let next = next.trim();
        if next.contains('@') || classify_header(next).is_some() {
            break;
        }
        if !title_is_unfinished(&title, next) {
            break;
        }
        append_line(&mut title, next, ' ');
        consumed += 1;
    }

    (title, consumed)
}

/// Append a line, rejoining words hyphenated across the line break.
fn append_line(buf: &mut String, line: &str, sep: char) {
    if buf.is_empty() {
        buf.push_str(line);
        return;
    }
    let hyphenated = buf.ends_with('-')
        && buf
            .chars()
            .rev()
            .nth(1)
            .is_some_and(|c| c.is_alphabetic())
        && line.chars().next().is_some_and(|c| c.is_lowercase());
    if hyphenated {
        buf.pop();
    } else {
        buf.push(sep);
    }
    buf.push_str(line);
}

#[derive(Default)]
struct SectionBuilder {
    sections: Vec<Section>,
    active: Option<usize>,
}

impl SectionBuilder {
    fn open(&mut self, name: &str) {
        let idx = match self.sections.iter().position(|s| s.name == name) {
            Some(idx) => idx,
            None => {
                self.sections.push(Section {
                    name: name.to_string(),
                    text: String::new(),
                });
                self.sections.len() - 1
            }
        };
        self.active = Some(idx);
    }

    fn push_line(&mut self, line: &str) {
        if self.active.is_none() {
            self.open(UNKNOWN_SECTION);
        }
        if let Some(idx) = self.active {
            append_line(&mut self.sections[idx].text, line, '\n');
        }
    }

    fn active_name(&self) -> Option<&str> {
        self.active.map(|idx| self.sections[idx].name.as_str())
    }

    fn finish(self) -> Vec<Section> {
        self.sections
            .into_iter()
            .map(|s| Section {
                name: s.name,
                text: s.text.trim().to_string(),
            })
            .collect()
    }
}

/// Split page texts into the paper title and its sections.
///
/// Every non-noise line after the title belongs to exactly one section: the
/// most recently opened one, or [`UNKNOWN_SECTION`] before the first header.
/// Headers that repeat a canonical name reopen the earlier section.
pub fn split_sections<S: AsRef<str>>(pages: &[S]) -> (String, Vec<Section>) {
    let mut builder = SectionBuilder::default();
    let mut title = String::new();

    for (page_idx, page) in pages.iter().enumerate() {
        let lines: Vec<&str> = page
            .as_ref()
            .lines()
            .map(str::trim)
            .filter(|l| !is_noise_line(l))
            .collect();

        let mut start = 0;
        if page_idx == 0 {
            let (t, consumed) = extract_title(&lines);
            title = t;
            start = consumed;
        }

        for line in &lines[start..] {
            let in_references = builder.active_name() == Some("references");
            match classify_header(line) {
                Some(header)
                    if header.opens_section()
                        && (!in_references || is_known_section(&header.name)) =>
                {
                    builder.open(&header.name);
                    if let Some(rest) = &header.remainder {
                        builder.push_line(rest);
                    }
                }
                _ => builder.push_line(line),
            }
        }
    }

    (title, builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(sections: &[Section]) -> Vec<&str> {
        sections.iter().map(|s| s.name.as_str()).collect()
    }

    #[test]
    fn test_classify_numbered_headers() {
        let h = classify_header("1 Introduction").unwrap();
        assert_eq!(h.kind, HeaderKind::Numbered { depth: 1 });
        assert_eq!(h.name, "introduction");

        let h = classify_header("2. Related Works").unwrap();
        assert_eq!(h.name, "related work");

        let h = classify_header("3.1 Training Setup").unwrap();
        assert_eq!(h.kind, HeaderKind::Numbered { depth: 2 });
        assert!(!h.opens_section());
    }

    #[test]
    fn test_classify_rejects_sentences() {
        assert!(classify_header("1 We train the model on a large corpus of news articles.").is_none());
        assert!(classify_header("2 Mikolov, Chen, Corrado").is_none());
        assert!(classify_header("2017 Neural Networks").is_none());
        assert!(classify_header("Abstract syntax trees are widely used").is_none());
        assert!(classify_header("Abstract Meaning Representation Parsing").is_none());
    }

    #[test]
    fn test_classify_abstract_with_inline_body() {
        let h = classify_header("Abstract\u{2014}We propose two novel architectures").unwrap();
        assert_eq!(h.kind, HeaderKind::Abstract);
        assert_eq!(h.remainder.as_deref(), Some("We propose two novel architectures"));

        let h = classify_header("ABSTRACT").unwrap();
        assert_eq!(h.kind, HeaderKind::Abstract);
        assert!(h.remainder.is_none());
    }

    #[test]
    fn test_classify_roman_and_named() {
        let h = classify_header("II. RELATED WORK").unwrap();
        assert_eq!(h.kind, HeaderKind::Roman);
        assert_eq!(h.name, "related work");

        let h = classify_header("Conclusions:").unwrap();
        assert_eq!(h.kind, HeaderKind::Named);
        assert_eq!(h.name, "conclusion");

        assert_eq!(classify_header("Bibliography").unwrap().name, "references");
        assert_eq!(classify_header("Appendix B").unwrap().name, "appendix");
    }

    #[test]
    fn test_noise_lines() {
        assert!(is_noise_line("   "));
        assert!(is_noise_line("12"));
        assert!(is_noise_line("arXiv:1301.3781v3 [cs.CL] 7 Sep 2013"));
        assert!(!is_noise_line("12 angry men"));
        assert!(!is_noise_line("arXiv:1409.0473, 2014."));
    }

    #[test]
    fn test_extract_title_joins_unfinished_line() {
        let lines = ["Efficient Estimation of Word", "representations in vector space", "Tomas Mikolov"];
        let (title, consumed) = extract_title(&lines);
        assert_eq!(title, "Efficient Estimation of Word representations in vector space");
        assert_eq!(consumed, 2);

        let lines = ["Attention Is All You Need", "Ashish Vaswani"];
        let (title, consumed) = extract_title(&lines);
        assert_eq!(title, "Attention Is All You Need");
        assert_eq!(consumed, 1);
    }

    #[test]
    fn test_split_sections_assigns_every_line() {
        let pages = vec![
            "Efficient Estimation of Word Representations in Vector Space\n\
             Tomas Mikolov\n\
             Google Inc.\n\
             Abstract\n\
             We propose two novel model architectures.\n\
             1 Introduction\n\
             Many current NLP systems treat words as atomic units.\n\
             1",
            "1.1 Goals of the Paper\n\
             The main goal is to introduce tech-\n\
             niques for learning vectors.\n\
             2 Model Architectures\n\
             Many different types of models were proposed.\n\
             References\n\
             1. Y. Bengio, R. Ducharme. A neural probabilistic language model.\n\
             2 Extra Notes",
        ];

        let (title, sections) = split_sections(&pages);
        assert_eq!(title, "Efficient Estimation of Word Representations in Vector Space");
        assert_eq!(
            names(&sections),
            vec!["unknown", "abstract", "introduction", "model architectures", "references"]
        );
        assert_eq!(sections[0].text, "Tomas Mikolov\nGoogle Inc.");
        assert!(sections[2].text.contains("1.1 Goals of the Paper"));
        assert!(sections[2].text.contains("introduce techniques for learning"));
        assert!(sections[4].text.ends_with("2 Extra Notes"));
    }

    #[test]
    fn test_repeated_header_accumulates() {
        let pages = ["Title Line\nIntroduction\nfirst part\nMethods\nsetup\nIntroduction\nsecond part"];
        let (_, sections) = split_sections(&pages);
        assert_eq!(names(&sections), vec!["introduction", "methodology"]);
        assert_eq!(sections[0].text, "first part\nsecond part");
    }

    #[test]
    fn test_split_without_headers_is_unknown() {
        let pages = ["Some Title\nBody text starts here\nmore text"];
        let (title, sections) = split_sections(&pages);
        assert_eq!(title, "Some Title");
        assert_eq!(names(&sections), vec![UNKNOWN_SECTION]);
        assert_eq!(sections[0].text, "Body text starts here\nmore text");
    }

    #[test]
    fn test_title_case_abstract_words_are_not_headers() {
        let pages = ["Abstract Meaning Representation Parsing\n\
                      Jane Doe\n\
                      Abstract\n\
                      We parse AMR.\n\
                      1 Introduction\n\
                      AMR graphs are rooted.\n\
                      Abstract Meaning Representation is a formalism\n\
                      that encodes semantics."];
        let (title, sections) = split_sections(&pages);
        assert_eq!(title, "Abstract Meaning Representation Parsing");
        assert_eq!(names(&sections), vec!["unknown", "abstract", "introduction"]);
        assert_eq!(sections[0].text, "Jane Doe");
        assert_eq!(sections[1].text, "We parse AMR.");
        assert_eq!(
            sections[2].text,
            "AMR graphs are rooted.\nAbstract Meaning Representation is a formalism\nthat encodes semantics."
        );
    }

    #[test]
    fn test_reference_lines_starting_with_arxiv_id_are_kept() {
        let pages = ["Some Title\n\
                      arXiv:1409.0473v7 [cs.CL] 19 May 2016\n\
                      References\n\
                      [1] D. Bahdanau, K. Cho. Neural machine translation by jointly\n\
                      learning to align and translate.\n\
                      arXiv:1409.0473, 2014."];
        let (_, sections) = split_sections(&pages);
        assert_eq!(names(&sections), vec!["references"]);
        assert!(sections[0].text.ends_with("arXiv:1409.0473, 2014."));
        assert!(!sections[0].text.contains("[cs.CL]"));

        let cited = crate::document::find_arxiv_citations(&sections[0].text);
        assert_eq!(cited.len(), 1);
        assert_eq!(cited[0].arxiv_id, "1409.0473");
    }

    #[test]
    fn test_normalize_section_name() {
        assert_eq!(normalize_section_name("  Concluding   Remarks: "), "conclusion");
        assert_eq!(normalize_section_name("Acknowledgements"), "acknowledgments");
        assert_eq!(normalize_section_name("Learning Sparse Codes"), "learning sparse codes");
    }
}
