pub mod api;
pub mod arxiv;
pub mod commands;
pub mod config;
pub mod database;
pub mod document;
pub mod ingest;
pub mod llm;
pub mod providers;
pub mod rag;

// Re-export commonly used items
pub use config::Config;
pub use document::{ExtractedPaper, PdfExtractor};
pub use rag::RagEngine;
