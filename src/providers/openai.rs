use anyhow::{anyhow, Result};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs, CreateEmbeddingRequestArgs, EmbeddingInput,
    },
    Client,
};
use async_trait::async_trait;

use super::traits::{CompletionProvider, EmbeddingProvider};
use super::Sampling;
use crate::config::ProviderConfig;

fn build_client(config: &ProviderConfig) -> Client<OpenAIConfig> {
    let openai_config = OpenAIConfig::new()
        .with_api_key(config.api_key.clone().unwrap_or_default())
        .with_api_base(config.api_url.clone());
    Client::with_config(openai_config)
}

/// Chat completions through the OpenAI API or any server speaking it
/// (llama.cpp, vLLM, Ollama's `/v1`).
#[derive(Clone)]
pub struct OpenAIProvider {
    system_message: String,
    client: Client<OpenAIConfig>,
    chat_model: String,
    sampling: Sampling,
}

impl OpenAIProvider {
    pub fn new(config: &ProviderConfig, system_message: String, sampling: Sampling) -> Result<Self> {
        let chat_model = config
            .primary_model()
            .ok_or_else(|| anyhow!("No chat model configured for OpenAI"))?
            .to_string();

        Ok(Self {
            system_message,
            client: build_client(config),
            chat_model,
            sampling: Sampling {
                temperature: config.temperature,
                ..sampling
            },
        })
    }
}

#[async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.chat_model)
            .messages(vec![
                ChatCompletionRequestSystemMessageArgs::default()
                    .content(self.system_message.clone())
                    .build()?
                    .into(),
                ChatCompletionRequestUserMessageArgs::default()
                    .content(prompt.to_string())
                    .build()?
                    .into(),
            ])
            .temperature(self.sampling.temperature)
            .top_p(self.sampling.top_p)
            .max_tokens(self.sampling.max_tokens)
            .build()?;

        let response = self.client.chat().create(request).await?;

        response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No response content"))
    }

    async fn get_model_info(&self) -> Result<String> {
        Ok(self.chat_model.clone())
    }

    fn get_system_message(&self) -> String {
        self.system_message.clone()
    }

    fn clone_box(&self) -> Box<dyn CompletionProvider + Send + Sync> {
        Box::new(self.clone())
    }
}

#[derive(Clone)]
pub struct OpenAIEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimension: u64,
}

impl OpenAIEmbedder {
    pub fn new(config: &ProviderConfig, model: String, dimension: u64) -> Self {
        Self {
            client: build_client(config),
            model,
            dimension,
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::StringArray(texts.to_vec()))
            .build()?;

        let response = self.client.embeddings().create(request).await?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != texts.len() {
            return Err(anyhow!(
                "Embedding count mismatch: sent {}, got {}",
                texts.len(),
                data.len()
            ));
        }

        let embeddings: Vec<Vec<f32>> = data.into_iter().map(|e| e.embedding).collect();
        if let Some(bad) = embeddings.iter().find(|e| e.len() as u64 != self.dimension) {
            return Err(anyhow!(
                "Generated embedding has wrong size: {} (expected {})",
                bad.len(),
                self.dimension
            ));
        }
        Ok(embeddings)
    }

    fn dimension(&self) -> u64 {
        self.dimension
    }

    fn model_name(&self) -> String {
        self.model.clone()
    }
}
