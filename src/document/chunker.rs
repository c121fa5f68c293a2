use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::extractor::ExtractedPaper;

#[derive(Error, Debug, PartialEq)]
pub enum ChunkError {
    #[error("Chunk overlap ({overlap}) must be smaller than chunk size ({size})")]
    OverlapTooLarge { size: usize, overlap: usize },
    #[error("Chunk size must be greater than zero")]
    ZeroSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkStrategy {
    /// Greedy word packing; a chunk's size counts each word plus one space.
    Words { max_chars: usize },
    /// Sliding character window with a stride of `size - overlap`.
    Window {
        size: usize,
        overlap: usize,
        min_len: usize,
    },
}

impl Default for ChunkStrategy {
    fn default() -> Self {
        ChunkStrategy::Window {
            size: 1000,
            overlap: 200,
            min_len: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextChunk {
    pub text: String,
    pub chunk_index: usize,
    pub section: Option<String>,
    /// Character offsets into the (whitespace-collapsed) source text.
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone)]
pub struct Chunker {
    strategy: ChunkStrategy,
}

impl Chunker {
    pub fn new(strategy: ChunkStrategy) -> Result<Self, ChunkError> {
        match strategy {
            ChunkStrategy::Words { max_chars: 0 } => return Err(ChunkError::ZeroSize),
            ChunkStrategy::Window { size: 0, .. } => return Err(ChunkError::ZeroSize),
            ChunkStrategy::Window { size, overlap, .. } if overlap >= size => {
                return Err(ChunkError::OverlapTooLarge { size, overlap })
            }
            _ => {}
        }
        Ok(Self { strategy })
    }

    pub fn strategy(&self) -> ChunkStrategy {
        self.strategy
    }

    pub fn chunk_text(&self, text: &str) -> Vec<TextChunk> {
        let pieces = match self.strategy {
            ChunkStrategy::Words { max_chars } => chunk_words(text, max_chars),
            ChunkStrategy::Window {
                size,
                overlap,
                min_len,
            } => chunk_window(text, size, overlap, min_len),
        };

        pieces
            .into_iter()
            .enumerate()
            .map(|(chunk_index, (text, start, end))| TextChunk {
                text,
                chunk_index,
                section: None,
                start,
                end,
            })
            .collect()
    }

    /// Chunk every section on its own so each chunk keeps its section name.
    /// Indices run across the whole paper.
    pub fn chunk_paper(&self, paper: &ExtractedPaper) -> Vec<TextChunk> {
        let mut chunks = Vec::new();
        for section in &paper.sections {
            for mut chunk in self.chunk_text(&section.text) {
                chunk.chunk_index = chunks.len();
                chunk.section = Some(section.name.clone());
                chunks.push(chunk);
            }
        }
        chunks
    }
}

fn chunk_words(text: &str, max_chars: usize) -> Vec<(String, usize, usize)> {
    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0;
    let mut chunk_start = 0;
    let mut offset = 0;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();
        current_size += word_len + 1;
        if current_size > max_chars && !current.is_empty() {
            let joined = current.join(" ");
            let len = joined.chars().count();
            chunks.push((joined, chunk_start, chunk_start + len));
            chunk_start = offset;
            current = vec![word];
            current_size = word_len;
        } else {
            current.push(word);
        }
        offset += word_len + 1;
    }

    if !current.is_empty() {
        let joined = current.join(" ");
        let len = joined.chars().count();
        chunks.push((joined, chunk_start, chunk_start + len));
    }

    chunks
}

fn chunk_window(text: &str, size: usize, overlap: usize, min_len: usize) -> Vec<(String, usize, usize)> {
    let collapsed: Vec<char> = text
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();
    let stride = size - overlap;

    let mut chunks = Vec::new();
    let mut start = 0;
    while start < collapsed.len() {
        let end = (start + size).min(collapsed.len());
        if end - start >= min_len {
            let chunk: String = collapsed[start..end].iter().collect();
            chunks.push((chunk, start, end));
        }
        start += stride;
    }
    chunks
}
