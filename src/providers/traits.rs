use anyhow::Result;
use async_trait::async_trait;
use std::any::Any;

/// A chat model that turns a prompt into text.
#[async_trait]
pub trait CompletionProvider: Any + Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;

    async fn get_model_info(&self) -> Result<String>;

    fn get_system_message(&self) -> String;

    fn clone_box(&self) -> Box<dyn CompletionProvider + Send + Sync>;
}

impl Clone for Box<dyn CompletionProvider + Send + Sync> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// A model that maps texts to fixed-size vectors.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimension(&self) -> u64;

    fn model_name(&self) -> String;
}
