use std::env;
use std::path::PathBuf;
use std::str::FromStr;

#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub api_key: Option<String>,
    pub models: Vec<String>,
    pub api_url: String,
    pub temperature: f32,
}

impl ProviderConfig {
    pub fn from_env(provider: &str) -> Self {
        Self::from_lookup(provider, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(provider: &str, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = provider.to_uppercase();

        let api_key = lookup(&format!("{}_API_KEY", prefix)).filter(|k| !k.trim().is_empty());

        // Get models from env or use defaults
        let models = lookup(&format!("{}_MODELS", prefix))
            .map(|m| {
                m.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_else(|| match provider {
                "openai" => vec!["gpt-4o-mini".to_string(), "gpt-3.5-turbo".to_string()],
                "deepseek" => vec!["deepseek-chat".to_string()],
                _ => vec![],
            });

        let api_url = lookup(&format!("{}_API_URL", prefix)).unwrap_or_else(|| match provider {
            "openai" => "https://api.openai.com/v1".to_string(),
            "deepseek" => "https://api.deepseek.com/v1/chat/completions".to_string(),
            _ => String::new(),
        });

        let temperature = lookup(&format!("{}_TEMPERATURE", prefix))
            .and_then(|t| t.parse().ok())
            .unwrap_or(0.7);

        Self {
            api_key,
            models,
            api_url,
            temperature,
        }
    }

    pub fn primary_model(&self) -> Option<&str> {
        self.models.first().map(String::as_str)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAI,
    DeepSeek,
}

impl FromStr for LlmBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(LlmBackend::OpenAI),
            "deepseek" => Ok(LlmBackend::DeepSeek),
            other => Err(format!("Unknown LLM provider: {}", other)),
        }
    }
}

impl LlmBackend {
    pub fn name(&self) -> &'static str {
        match self {
            LlmBackend::OpenAI => "openai",
            LlmBackend::DeepSeek => "deepseek",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    OpenAI,
    Hashing,
}

impl FromStr for EmbeddingBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(EmbeddingBackend::OpenAI),
            "hashing" | "local" => Ok(EmbeddingBackend::Hashing),
            other => Err(format!("Unknown embedding provider: {}", other)),
        }
    }
}

/// Runtime settings, read from the environment (and `.env` via dotenv).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_path: PathBuf,
    pub qdrant_url: String,
    pub collection_name: String,
    pub llm_backend: LlmBackend,
    pub embedding_backend: EmbeddingBackend,
    pub embedding_model: String,
    pub embedding_dim: u64,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub min_chunk_len: usize,
    pub top_k: u64,
    pub max_tokens: u16,
    pub top_p: f32,
    pub upload_dir: PathBuf,
    pub pdf_dir: PathBuf,
    pub arxiv_categories: Vec<String>,
    pub arxiv_wait_secs: u64,
    pub port: u16,
}

fn parse_or<T: FromStr>(value: Option<String>, key: &str, default: T) -> T {
    match value {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            log::warn!("Invalid value {:?} for {}, using default", raw, key);
            default
        }),
        None => default,
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let llm_backend = parse_or(get("LLM_PROVIDER"), "LLM_PROVIDER", LlmBackend::OpenAI);
        let embedding_backend = parse_or(
            get("EMBEDDING_PROVIDER"),
            "EMBEDDING_PROVIDER",
            EmbeddingBackend::Hashing,
        );
        let default_dim = match embedding_backend {
            EmbeddingBackend::OpenAI => 1536,
            EmbeddingBackend::Hashing => 384,
        };

        let arxiv_categories = get("ARXIV_CATEGORIES")
            .map(|c| c.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_else(|| vec!["cs.LG".to_string(), "cs.CL".to_string(), "cs.CV".to_string()]);

        Self {
            database_path: get("DATABASE_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/research_copilot.db")),
            qdrant_url: get("QDRANT_URL").unwrap_or_else(|| "http://localhost:6333".to_string()),
            collection_name: get("COLLECTION_NAME").unwrap_or_else(|| "research_papers".to_string()),
            llm_backend,
            embedding_backend,
            embedding_model: get("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-small".to_string()),
            embedding_dim: parse_or(get("EMBEDDING_DIM"), "EMBEDDING_DIM", default_dim),
            chunk_size: parse_or(get("CHUNK_SIZE"), "CHUNK_SIZE", 1000),
            chunk_overlap: parse_or(get("CHUNK_OVERLAP"), "CHUNK_OVERLAP", 200),
            min_chunk_len: parse_or(get("MIN_CHUNK_LEN"), "MIN_CHUNK_LEN", 100),
            top_k: parse_or(get("TOP_K"), "TOP_K", 3),
            max_tokens: parse_or(get("MAX_TOKENS"), "MAX_TOKENS", 512),
            top_p: parse_or(get("TOP_P"), "TOP_P", 0.95),
            upload_dir: get("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("data/uploads")),
            pdf_dir: get("PDF_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("ml_papers")),
            arxiv_categories,
            arxiv_wait_secs: parse_or(get("ARXIV_WAIT_SECS"), "ARXIV_WAIT_SECS", 3),
            port: parse_or(get("PORT"), "PORT", 5000),
        }
    }

    pub fn provider(&self) -> ProviderConfig {
        ProviderConfig::from_env(self.llm_backend.name())
    }
}
