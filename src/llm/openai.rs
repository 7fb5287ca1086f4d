use super::client::{LanguageModel, ModelReply, ModelRequest};
use super::error::ModelError;
use crate::conversation::Role;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Client for OpenAI-compatible `/chat/completions` endpoints (OpenRouter,
/// OpenAI, local gateways)
pub struct OpenAiCompatibleClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    referer: Option<String>,
    title: Option<String>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatCompletionBody<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    presence_penalty: f32,
    frequency_penalty: f32,
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiCompatibleClient {
    pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        let base_url = base_url.into();
        if api_key.is_none() {
            warn!("No API key configured for {}; requests will likely be rejected", base_url);
        }
        info!("Language model client configured for {}", base_url);

        Ok(Self {
            http,
            base_url,
            api_key,
            referer: None,
            title: None,
        })
    }

    /// Attribution headers some gateways (OpenRouter) expect
    pub fn with_attribution(mut self, referer: Option<String>, title: Option<String>) -> Self {
        self.referer = referer;
        self.title = title;
        self
    }

    fn body<'a>(request: &'a ModelRequest) -> ChatCompletionBody<'a> {
        let mut messages = Vec::with_capacity(request.messages.len() + 1);
        messages.push(ChatMessage {
            role: "system",
            content: &request.system_prompt,
        });
        messages.extend(request.messages.iter().map(|m| ChatMessage {
            role: m.role.as_str(),
            content: &m.content,
        }));

        ChatCompletionBody {
            model: &request.model_id,
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            presence_penalty: request.presence_penalty,
            frequency_penalty: request.frequency_penalty,
        }
    }

    fn classify(err: reqwest::Error, timeout_ms: u64) -> ModelError {
        if err.is_timeout() {
            ModelError::Timeout(timeout_ms)
        } else if err.is_connect() || err.is_request() {
            ModelError::Network(err.to_string())
        } else if err.is_decode() {
            ModelError::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            ModelError::from_status(status.as_u16(), err.to_string())
        } else {
            ModelError::Other(err.to_string())
        }
    }
}

#[async_trait::async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));

        let mut builder = self
            .http
            .post(&url)
            .timeout(Duration::from_millis(request.timeout_ms))
            .json(&Self::body(request));
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        if let Some(referer) = &self.referer {
            builder = builder.header("HTTP-Referer", referer);
        }
        if let Some(title) = &self.title {
            builder = builder.header("X-Title", title);
        }

        debug!(
            "Sending {} messages to {} (model={})",
            request.messages.len(),
            url,
            request.model_id
        );

        let response = builder
            .send()
            .await
            .map_err(|e| Self::classify(e, request.timeout_ms))?;

        let status = response.status();
        if !status.is_success() {
            // Provider bodies may echo credentials or prompts; keep them out of errors
            warn!("Language model returned status {}", status.as_u16());
            return Err(ModelError::from_status(
                status.as_u16(),
                status.canonical_reason().unwrap_or("unknown"),
            ));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Self::classify(e, request.timeout_ms))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::Malformed("completion has no choices".to_string()))?;

        Ok(ModelReply {
            role: Role::Assistant,
            content: choice.message.and_then(|m| m.content),
        })
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}
