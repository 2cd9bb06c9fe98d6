//! Chat-completion client for the Perplexity API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{info_span, Instrument};

pub const DEFAULT_BASE_URL: &str = "https://api.perplexity.ai";
pub const DEFAULT_MODEL: &str = "sonar-pro";
pub const DEFAULT_MAX_TOKENS: u32 = 4000;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ResearchError {
    #[error("provider returned status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("completion contained no choices")]
    EmptyCompletion,

    #[error(transparent)]
    Transport(#[from] reqwest::Error),
}

/// A single completion, with whatever usage the provider reported.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
    pub total_tokens: Option<u32>,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, ResearchError>;
}

#[derive(Debug, Clone)]
pub struct PerplexityConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f64,
    pub top_p: f64,
    pub timeout: Duration,
}

impl PerplexityConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: 0.2,
            top_p: 0.9,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("PERPLEXITY_API_KEY").ok()?;
        let mut config = Self::new(api_key);
        if let Ok(base_url) = std::env::var("PERPLEXITY_BASE_URL") {
            config.base_url = base_url;
        }
        if let Ok(model) = std::env::var("PERPLEXITY_MODEL") {
            config.model = model;
        }
        Some(config)
    }
}

pub struct PerplexityClient {
    config: PerplexityConfig,
    http: reqwest::Client,
}

impl PerplexityClient {
    pub fn new(config: PerplexityConfig) -> Result<Self, ResearchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;
        Ok(Self { config, http })
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f64,
    top_p: f64,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[async_trait]
impl CompletionClient for PerplexityClient {
    async fn complete(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<Completion, ResearchError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system_prompt {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: prompt,
        });

        let request = ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
        };

        let url = format!("{}/chat/completions", self.config.base_url);
        let span = info_span!("perplexity_complete", model = %self.config.model);

        async {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.config.api_key)
                .json(&request)
                .send()
                .await?;

            let status = response.status();
            if !status.is_success() {
                let message = response.text().await.unwrap_or_default();
                return Err(ResearchError::Status {
                    status: status.as_u16(),
                    message,
                });
            }

            let body: ChatResponse = response.json().await?;
            let content = body
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content)
                .filter(|content| !content.trim().is_empty())
                .ok_or(ResearchError::EmptyCompletion)?;

            tracing::debug!(tokens = ?body.usage.as_ref().map(|u| u.total_tokens), "completion received");

            Ok(Completion {
                content,
                total_tokens: body.usage.map(|u| u.total_tokens),
            })
        }
        .instrument(span)
        .await
    }
}
