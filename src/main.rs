use anyhow::{anyhow, Context, Result};
use clap::Parser;
use colored::Colorize;
use dotenv::dotenv;
use log::info;
use research_copilot::api;
use research_copilot::arxiv::{ArxivClient, ArxivQuery};
use research_copilot::commands::{format_sections, CommandHandler, Flow};
use research_copilot::config::{Config, EmbeddingBackend, LlmBackend, ProviderConfig};
use research_copilot::database::{Database, VectorDB};
use research_copilot::document::{ChunkStrategy, Chunker, PdfExtractor};
use research_copilot::ingest::{ArxivPipeline, DataIngestion};
use research_copilot::llm::{EmbeddingGenerator, SemanticSearch};
use research_copilot::providers::{
    CompletionProvider, DeepSeekProvider, EmbeddingProvider, HashingEmbedder, OpenAIEmbedder,
    OpenAIProvider, Sampling, DEFAULT_SYSTEM_PROMPT,
};
use research_copilot::rag::RagEngine;
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Research paper copilot", long_about = None)]
struct Args {
    /// Serve the web endpoint
    #[arg(long)]
    api: bool,

    #[arg(long)]
    port: Option<u16>,

    /// Print the sections of a PDF and exit
    #[arg(long, value_name = "PDF")]
    extract: Option<PathBuf>,

    /// Ingest every PDF in a directory
    #[arg(long, value_name = "DIR")]
    ingest: Option<PathBuf>,

    /// Pull recent papers from arXiv
    #[arg(long)]
    fetch_arxiv: bool,

    #[arg(long, default_value = "10")]
    batches: usize,

    #[arg(long, default_value = "2")]
    batch_size: usize,

    /// Ingest an arXiv metadata snapshot (JSON lines)
    #[arg(long, value_name = "JSONL")]
    snapshot: Option<PathBuf>,

    /// Create the database tables and vector collection, then exit
    #[arg(long)]
    init_db: bool,
}

/// Everything the modes below share.
struct Services {
    config: Config,
    db: Database,
    search: SemanticSearch,
    ingestion: DataIngestion,
    engine: RagEngine,
}

fn embedding_provider(config: &Config) -> Arc<dyn EmbeddingProvider> {
    match config.embedding_backend {
        EmbeddingBackend::Hashing => Arc::new(HashingEmbedder::new(config.embedding_dim)),
        EmbeddingBackend::OpenAI => Arc::new(OpenAIEmbedder::new(
            &ProviderConfig::from_env("openai"),
            config.embedding_model.clone(),
            config.embedding_dim,
        )),
    }
}

fn completion_provider(config: &Config) -> Result<Arc<dyn CompletionProvider>> {
    let sampling = Sampling {
        top_p: config.top_p,
        max_tokens: config.max_tokens,
        ..Sampling::default()
    };
    let provider_config = config.provider();
    let system_message = DEFAULT_SYSTEM_PROMPT.to_string();

    let provider: Arc<dyn CompletionProvider> = match config.llm_backend {
        LlmBackend::OpenAI => Arc::new(OpenAIProvider::new(&provider_config, system_message, sampling)?),
        LlmBackend::DeepSeek => Arc::new(DeepSeekProvider::new(&provider_config, system_message, sampling)?),
    };
    Ok(provider)
}

fn chunker(config: &Config) -> Result<Chunker> {
    Chunker::new(ChunkStrategy::Window {
        size: config.chunk_size,
        overlap: config.chunk_overlap,
        min_len: config.min_chunk_len,
    })
    .map_err(|e| anyhow!("Invalid chunking settings: {}", e))
}

async fn build_services(config: Config) -> Result<Services> {
    let db = Database::new(&config.database_path)
        .await
        .with_context(|| format!("Failed to open {}", config.database_path.display()))?;

    let vector_db = VectorDB::new(&config.qdrant_url)
        .await
        .context("Failed to initialize vector database")?;

    let embeddings = EmbeddingGenerator::new(embedding_provider(&config));
    info!("Embedding with {} ({} dims)", embeddings.model_name(), embeddings.dimension());

    let search = SemanticSearch::new(vector_db, embeddings, &config.collection_name).await?;
    let ingestion = DataIngestion::new(db.clone(), Arc::new(search.clone()), chunker(&config)?);
    let engine = RagEngine::new(
        Arc::new(search.clone()),
        completion_provider(&config)?,
        config.top_k,
    );

    Ok(Services {
        config,
        db,
        search,
        ingestion,
        engine,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize colored output
    colored::control::set_override(true);

    // Load environment variables
    dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Parse command line arguments
    let args = Args::parse();
    let config = Config::from_env();

    if let Some(pdf) = &args.extract {
        return run_extract(pdf).await;
    }

    let services = build_services(config).await?;

    if args.init_db {
        println!(
            "✅ Database ready at {} with {} papers; collection {} holds {} chunks",
            services.config.database_path.display(),
            services.db.paper_count().await?,
            services.search.collection_name().cyan(),
            services.search.count().await?
        );
        return Ok(());
    }

    if let Some(dir) = &args.ingest {
        let report = services.ingestion.ingest_directory(dir).await?;
        println!(
            "✅ Ingested {} papers ({} failed)",
            report.processed.to_string().green(),
            report.failed.to_string().red()
        );
        return Ok(());
    }

    if let Some(path) = &args.snapshot {
        let report = services.ingestion.ingest_snapshot(path).await?;
        println!(
            "✅ Snapshot: {} papers, {} chunks, {} skipped",
            report.processed.to_string().green(),
            report.chunks,
            report.skipped
        );
        return Ok(());
    }

    if args.fetch_arxiv {
        return run_arxiv_pipeline(&services, &args).await;
    }

    if args.api {
        let port = args.port.unwrap_or(services.config.port);
        println!("Starting API server on port {}", port.to_string().cyan());
        return api::serve(services.engine, port).await;
    }

    run_cli_mode(services).await
}

async fn run_extract(pdf: &Path) -> Result<()> {
    let paper = PdfExtractor::new().extract_text_with_sections(pdf).await;
    if let Some(error) = &paper.metadata.error {
        return Err(anyhow!("Failed to extract {}: {}", pdf.display(), error));
    }
    print!("{}", format_sections(&paper));
    Ok(())
}

async fn run_arxiv_pipeline(services: &Services, args: &Args) -> Result<()> {
    let pipeline = ArxivPipeline::new(
        services.ingestion.clone(),
        ArxivClient::new()?,
        ArxivQuery::with_categories(services.config.arxiv_categories.clone()),
        services.config.pdf_dir.clone(),
        Duration::from_secs(services.config.arxiv_wait_secs),
    );

    let report = pipeline.run(args.batches, args.batch_size).await?;
    println!(
        "✅ {} batches: {} papers processed, {} skipped, {} failed",
        report.batches,
        report.processed.to_string().green(),
        report.skipped,
        report.failed.to_string().red()
    );
    Ok(())
}

async fn run_cli_mode(services: Services) -> Result<()> {
    let mut command_handler = CommandHandler::new(
        services.engine,
        services.db,
        Some(services.ingestion),
    );

    // Show initial help menu
    if let Err(e) = command_handler.handle_command("help").await {
        println!("{}", e.red());
    }

    // Initialize rustyline editor
    let mut rl = Editor::<(), DefaultHistory>::new()?;

    // Main input loop
    loop {
        match rl.readline("👤 ") {
            Ok(line) => {
                let input = line.trim();
                let _ = rl.add_history_entry(input);

                match command_handler.handle_command(input).await {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Continue) => {}
                    Err(e) => println!("{}", e.red()),
                }
            }
            Err(ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(ReadlineError::Eof) => {
                println!("CTRL-D");
                break;
            }
            Err(err) => {
                println!("Error: {:?}", err);
                break;
            }
        }
    }
    Ok(())
}
