pub mod openai;

use crate::config::ProviderConfig;
use async_trait::async_trait;
use reqwest::{Client, Proxy};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TEMPERATURE: f32 = 0.3;
pub const MAX_TOKENS: u32 = 2048;
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

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
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ChatResponse {
    pub content: String,
    pub model: String,
}

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Anything that can answer a list of chat messages.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatResponse, LlmError>;
}

/// Chat-completion client for one provider, bound to the proxy it was built
/// with. Instances are memoized by the app state.
pub struct LlmClient {
    client: Client,
    config: openai::OpenAiConfig,
    model: String,
}

impl LlmClient {
    pub fn new(provider: &ProviderConfig, proxy_url: Option<&str>) -> Result<Self, LlmError> {
        let client = build_http_client(proxy_url, REQUEST_TIMEOUT)?;
        Ok(Self {
            client,
            config: openai::OpenAiConfig::from(provider),
            model: provider.model_name.clone(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl ChatModel for LlmClient {
    async fn chat(&self, messages: Vec<ChatMessage>) -> Result<ChatResponse, LlmError> {
        let request = ChatRequest {
            messages,
            model: self.model.clone(),
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };
        openai::chat(&self.client, &self.config, &request).await
    }
}

/// Every outbound client goes through here so the proxy setting applies to
/// embedding, chat and connection tests alike.
pub fn build_http_client(proxy_url: Option<&str>, timeout: Duration) -> Result<Client, reqwest::Error> {
    let mut builder = Client::builder().timeout(timeout);
    builder = match proxy_url {
        Some(url) => builder.proxy(Proxy::all(url)?),
        None => builder.no_proxy(),
    };
    builder.build()
}
