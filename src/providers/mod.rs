pub mod deepseek;
pub mod hashing;
pub mod openai;
pub mod traits;

pub use deepseek::DeepSeekProvider;
pub use hashing::HashingEmbedder;
pub use openai::{OpenAIEmbedder, OpenAIProvider};
pub use traits::{CompletionProvider, EmbeddingProvider};

/// System prompt shared by every chat backend.
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a research paper Q&A assistant. Your goal is to answer questions as accurately as possible based on the context provided.";

/// Sampling parameters sent with every completion request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sampling {
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u16,
}

impl Default for Sampling {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            top_p: 0.95,
            max_tokens: 512,
        }
    }
}
