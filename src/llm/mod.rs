pub mod claude;
pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".into(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: "assistant".into(),
            content: content.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ModelInfo {
    pub id: String,
    pub name: String,
    pub provider: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

/// Anything that can turn a message list into a completion.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError>;
}

/// Unified LLM provider enum — dispatches to OpenAI-compatible or Claude backends.
#[derive(Debug, Clone)]
pub enum Provider {
    OpenAi(openai::OpenAiConfig),
    Claude(claude::ClaudeConfig),
    Ollama(openai::OpenAiConfig),
}

impl Provider {
    pub fn openai(api_key: String, base_url: String) -> Self {
        Provider::OpenAi(openai::OpenAiConfig { api_key, base_url })
    }

    pub fn claude(api_key: String, base_url: String) -> Self {
        Provider::Claude(claude::ClaudeConfig { api_key, base_url })
    }

    pub fn ollama(host: String) -> Self {
        Provider::Ollama(openai::OpenAiConfig {
            api_key: String::new(),
            base_url: format!("{}/v1", host.trim_end_matches('/')),
        })
    }

    /// Resolve a model string like "gpt-4o", "openai/gpt-4o", "claude/..." or
    /// "ollama/..." into a provider and the bare model id.
    pub fn resolve(model: &str, config: &AppConfig) -> Result<(Provider, String), LlmError> {
        if let Some(model_id) = model.strip_prefix("ollama/") {
            Ok((Provider::ollama(config.ollama_host.clone()), model_id.to_string()))
        } else if let Some(model_id) = model.strip_prefix("claude/") {
            let api_key = config
                .claude
                .api_key
                .clone()
                .ok_or(LlmError::MissingKey("Claude"))?;
            Ok((
                Provider::claude(api_key, config.claude.base_url.clone()),
                model_id.to_string(),
            ))
        } else {
            let model_id = model.strip_prefix("openai/").unwrap_or(model);
            let api_key = config
                .openai
                .api_key
                .clone()
                .ok_or(LlmError::MissingKey("OpenAI"))?;
            Ok((
                Provider::openai(api_key, config.openai.base_url.clone()),
                model_id.to_string(),
            ))
        }
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        match self {
            Provider::OpenAi(config) | Provider::Ollama(config) => {
                openai::chat(config, request).await
            }
            Provider::Claude(config) => claude::chat(config, request).await,
        }
    }
}

#[async_trait]
impl ChatModel for Provider {
    async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse, LlmError> {
        self.chat(request).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("{0} API key not configured")]
    MissingKey(&'static str),
}

impl Serialize for LlmError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
