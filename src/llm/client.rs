use super::error::ModelError;
use crate::conversation::{Message, Role};
use serde::{Deserialize, Serialize};

/// Sampling parameters sent with every request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "anthropic/claude-3-haiku".to_string(),
            temperature: 0.5,
            max_tokens: 400,
            presence_penalty: 0.8,
            frequency_penalty: 0.7,
        }
    }
}

/// Request sent to the language-generation service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelRequest {
    pub system_prompt: String,
    pub messages: Vec<Message>,
    pub model_id: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
    pub timeout_ms: u64,
}

impl ModelRequest {
    /// Content of the most recent user message, if any
    pub fn last_user_content(&self) -> Option<&str> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
    }
}

/// Raw reply; `content` is validated by the pipeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelReply {
    pub role: Role,
    pub content: Option<String>,
}

impl ModelReply {
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: Some(content.into()),
        }
    }
}

/// Language-generation service
#[async_trait::async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelError>;

    /// Provider name for logging
    fn name(&self) -> &str;
}
