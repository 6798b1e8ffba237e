//! Chat-completion client used to phrase FAQ answers.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;

use crate::config::LlmConfig;
use crate::openai::{api_key_from_env, ApiClient};

/// A language model that answers one system + user prompt pair.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, system: &str, user: &str) -> Result<String>;
}

/// Build the chat model named by `config.provider`.
pub fn create_chat_model(config: &LlmConfig) -> Result<Arc<dyn ChatModel>> {
    match config.provider.as_str() {
        "disabled" => Ok(Arc::new(DisabledChat)),
        "openai" => Ok(Arc::new(OpenAIChat::new(config, api_key_from_env()?)?)),
        other => bail!("Unknown LLM provider: {}", other),
    }
}

pub struct DisabledChat;

#[async_trait]
impl ChatModel for DisabledChat {
    fn model_name(&self) -> &str {
        "disabled"
    }

    async fn complete(&self, _system: &str, _user: &str) -> Result<String> {
        bail!("LLM provider is disabled")
    }
}

/// Calls `POST /v1/chat/completions`.
pub struct OpenAIChat {
    model: String,
    max_tokens: u32,
    temperature: f32,
    api: ApiClient,
}

impl OpenAIChat {
    pub fn new(config: &LlmConfig, api_key: String) -> Result<Self> {
        let api = ApiClient::new(
            config.base_url.as_deref(),
            "/v1/chat/completions",
            api_key,
            config.timeout_secs,
            config.max_retries,
        )?;
        Ok(Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            api,
        })
    }
}

#[async_trait]
impl ChatModel for OpenAIChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, system: &str, user: &str) -> Result<String> {
        let body = serde_json::json!({
            "model": self.model,
            "messages": [
                {"role": "system", "content": system},
                {"role": "user", "content": user}
            ],
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        let json = self.api.post_json(&body).await?;
        parse_chat_response(&json)
    }
}

fn parse_chat_response(json: &serde_json::Value) -> Result<String> {
    json.pointer("/choices/0/message/content")
        .and_then(|c| c.as_str())
        .map(|c| c.trim().to_string())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices[0].message.content"))
}
