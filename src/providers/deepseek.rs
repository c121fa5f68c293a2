use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use super::traits::CompletionProvider;
use super::Sampling;
use crate::config::ProviderConfig;

/// Chat completions over plain HTTP against an OpenAI-compatible
/// `/chat/completions` endpoint. Defaults to DeepSeek.
#[derive(Clone)]
pub struct DeepSeekProvider {
    api_key: String,
    system_message: String,
    client: Client,
    model: String,
    api_url: String,
    sampling: Sampling,
}

impl DeepSeekProvider {
    pub fn new(config: &ProviderConfig, system_message: String, sampling: Sampling) -> Result<Self> {
        let api_key = config
            .api_key
            .clone()
            .ok_or_else(|| anyhow!("DEEPSEEK_API_KEY not set"))?;
        let model = config
            .primary_model()
            .unwrap_or("deepseek-chat")
            .to_string();

        Ok(Self {
            api_key,
            system_message,
            client: Client::new(),
            model,
            api_url: config.api_url.clone(),
            sampling: Sampling {
                temperature: config.temperature,
                ..sampling
            },
        })
    }

    fn request_body(&self, prompt: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": self.system_message
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": self.sampling.temperature,
            "top_p": self.sampling.top_p,
            "max_tokens": self.sampling.max_tokens
        })
    }
}

/// Pull the assistant message out of a chat completion response.
pub(crate) fn parse_completion(response_json: &Value) -> Result<String> {
    // Check for API-level errors
    if let Some(error) = response_json.get("error") {
        return Err(anyhow!("API returned error: {}", error));
    }

    response_json
        .get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|message| message.get("content"))
        .and_then(|content| content.as_str())
        .map(|s| s.to_string())
        .ok_or_else(|| {
            let debug_json = serde_json::to_string_pretty(response_json).unwrap_or_default();
            anyhow!("Invalid response format. Response JSON: {}", debug_json)
        })
}

#[async_trait]
impl CompletionProvider for DeepSeekProvider {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&self.request_body(prompt))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await?;
            return Err(anyhow!(
                "API request failed: Status {}, Body: {}",
                status,
                error_text
            ));
        }

        let response_json: Value = response.json().await?;
        parse_completion(&response_json)
    }

    async fn get_model_info(&self) -> Result<String> {
        Ok(self.model.clone())
    }

    fn get_system_message(&self) -> String {
        self.system_message.clone()
    }

    fn clone_box(&self) -> Box<dyn CompletionProvider + Send + Sync> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ProviderConfig {
        ProviderConfig {
            api_key: Some("sk-test".to_string()),
            models: vec!["deepseek-chat".to_string()],
            api_url: "http://localhost:9/v1/chat/completions".to_string(),
            temperature: 0.2,
        }
    }

    #[test]
    fn test_parse_completion() {
        let body = json!({"choices": [{"message": {"role": "assistant", "content": "Word2vec."}}]});
        assert_eq!(parse_completion(&body).unwrap(), "Word2vec.");

        let err = parse_completion(&json!({"error": {"message": "quota"}})).unwrap_err();
        assert!(err.to_string().contains("quota"));

        assert!(parse_completion(&json!({"choices": []})).is_err());
    }

    #[test]
    fn test_request_body_carries_sampling() {
        let provider = DeepSeekProvider::new(&config(), "sys".to_string(), Sampling::default()).unwrap();
        let body = provider.request_body("What is attention?");
        assert_eq!(body["messages"][0]["content"], "sys");
        assert_eq!(body["messages"][1]["content"], "What is attention?");
        assert_eq!(body["max_tokens"], 512);
        assert!((body["temperature"].as_f64().unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_requires_api_key() {
        let mut cfg = config();
        cfg.api_key = None;
        assert!(DeepSeekProvider::new(&cfg, "sys".to_string(), Sampling::default()).is_err());
    }
}
