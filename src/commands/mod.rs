use colored::Colorize;
use std::path::PathBuf;

use crate::database::Database;
use crate::document::PdfExtractor;
use crate::ingest::DataIngestion;
use crate::rag::engine::papers_from_chunks;
use crate::rag::{Answer, RagEngine, RetrievedChunk};

mod document;
mod system;

pub use document::{format_paper_list, format_sections};

const SEARCH_RESULTS: u64 = 5;

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ask(String),
    Search(String),
    SearchPaper { paper_id: String, query: String },
    Extract(PathBuf),
    Ingest(PathBuf),
    Papers,
    Help,
    Quit,
    Empty,
}

impl Command {
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        if input.is_empty() {
            return Command::Empty;
        }

        // Handle single-word commands first
        match input.to_lowercase().as_str() {
            "help" => return Command::Help,
            "exit" | "quit" => return Command::Quit,
            "papers" => return Command::Papers,
            _ => {}
        }

        let (head, rest) = match input.split_once(char::is_whitespace) {
            Some((head, rest)) => (head.to_lowercase(), rest.trim()),
            None => (input.to_lowercase(), ""),
        };

        match head.as_str() {
            "search" if !rest.is_empty() => Command::Search(rest.to_string()),
            "search-in" => match rest.split_once(char::is_whitespace) {
                Some((paper_id, query)) if !query.trim().is_empty() => Command::SearchPaper {
                    paper_id: paper_id.to_string(),
                    query: query.trim().to_string(),
                },
                _ => Command::Ask(input.to_string()),
            },
            "extract" if !rest.is_empty() => Command::Extract(PathBuf::from(rest)),
            "ingest" if !rest.is_empty() => Command::Ingest(PathBuf::from(rest)),
            _ => Command::Ask(input.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Flow {
    Continue,
    Quit,
}

pub fn format_answer(answer: &Answer) -> String {
    let mut out = format!("{}\n", answer.response.truecolor(255, 236, 179));
    if !answer.papers.is_empty() {
        out.push_str(&format!("\n{}\n", "📚 Related papers:".bold()));
        for paper in &answer.papers {
            out.push_str(&format!(
                "  • {} ({}) [similarity {}]\n",
                paper.title.bright_yellow(),
                paper.authors,
                paper.similarity.cyan()
            ));
            if let Some(url) = &paper.url {
                out.push_str(&format!("    {}\n", url.blue()));
            }
        }
    }
    out
}

fn print_matches(chunks: &[RetrievedChunk]) {
    if chunks.is_empty() {
        println!("No results found");
        return;
    }

    for (i, chunk) in chunks.iter().enumerate() {
        let preview: String = chunk.text.chars().take(200).collect();
        println!("\n{} {}", format!("Match {}:", i + 1).bold(), chunk.title.bright_yellow());
        println!("  Authors: {}", chunk.authors.join(", "));
        if let Some(section) = &chunk.section {
            println!("  Section: {}", section.cyan());
        }
        println!("  Similarity: {:.4}", chunk.score);
        println!("  {}...", preview);
    }

    let papers = papers_from_chunks(chunks);
    println!("\n{} distinct papers", papers.len().to_string().cyan());
}

pub struct CommandHandler {
    engine: RagEngine,
    db: Database,
    extractor: PdfExtractor,
    ingestion: Option<DataIngestion>,
}

impl CommandHandler {
    pub fn new(engine: RagEngine, db: Database, ingestion: Option<DataIngestion>) -> Self {
        Self {
            engine,
            db,
            extractor: PdfExtractor::new(),
            ingestion,
        }
    }

    pub async fn handle_command(&mut self, input: &str) -> Result<Flow, String> {
        match Command::parse(input) {
            Command::Empty => {}
            Command::Help => system::print_help(),
            Command::Quit => {
                println!("👋 Goodbye!");
                return Ok(Flow::Quit);
            }
            Command::Papers => {
                let papers = self
                    .db
                    .list_papers(20)
                    .await
                    .map_err(|e| format!("Failed to list papers: {}", e))?;
                print!("{}", format_paper_list(&papers));
            }
            Command::Extract(path) => {
                document::extract(&self.extractor, &path).await?;
            }
            Command::Ingest(path) => {
                let ingestion = self
                    .ingestion
                    .as_ref()
                    .ok_or("Ingestion is not available in this session")?;
                document::ingest(ingestion, &path).await?;
            }
            Command::Search(query) => {
                println!("🔍 Searching papers for: {}", query.bright_yellow());
                let chunks = self.find_chunks(&query, None).await?;
                print_matches(&chunks);
            }
            Command::SearchPaper { paper_id, query } => {
                println!(
                    "🔍 Searching {} for: {}",
                    paper_id.cyan(),
                    query.bright_yellow()
                );
                let chunks = self.find_chunks(&query, Some(&paper_id)).await?;
                print_matches(&chunks);
            }
            Command::Ask(question) => self.handle_ask(&question).await?,
        }
        Ok(Flow::Continue)
    }

    async fn find_chunks(
        &self,
        query: &str,
        paper_id: Option<&str>,
    ) -> Result<Vec<RetrievedChunk>, String> {
        let retriever = self.engine.retriever();
        let found = match paper_id {
            Some(paper_id) => retriever.retrieve_in_paper(query, paper_id, SEARCH_RESULTS).await,
            None => retriever.retrieve(query, SEARCH_RESULTS).await,
        };
        found.map_err(|e| format!("Search failed: {}", e))
    }

    async fn handle_ask(&self, question: &str) -> Result<(), String> {
        let answer = self
            .engine
            .generate_response(question)
            .await
            .map_err(|e| format!("Failed to get AI response: {}", e))?;
        println!("{}", format_answer(&answer));
        Ok(())
    }
}
