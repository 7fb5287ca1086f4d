use super::cache::{CacheKey, Clock, RequestCache, SystemClock};
use super::fallback;
use super::similarity::{is_too_similar, CLARIFICATION, DEFAULT_SIMILARITY_THRESHOLD};
use crate::coaching::CoachingOption;
use crate::conversation::{sanitize_messages, Message, Role, DEFAULT_CONTEXT_WINDOW};
use crate::llm::{LanguageModel, ModelError, ModelRequest, ModelSettings};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Timeout, retry and cache parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    pub context_window: usize,
    pub similarity_threshold: f64,
    pub cache_ttl_ms: u64,
    pub cache_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeout_ms: 20_000,
            max_attempts: 3,
            backoff_base_ms: 1_500,
            backoff_max_ms: 6_000,
            context_window: DEFAULT_CONTEXT_WINDOW,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            cache_ttl_ms: 30_000,
            cache_capacity: 50,
        }
    }
}

impl PipelineConfig {
    /// Delay after failed attempt `attempt` (1-based)
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self.backoff_base_ms.saturating_mul(1u64 << exponent);
        Duration::from_millis(delay.min(self.backoff_max_ms))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Everything needed to produce one assistant reply
#[derive(Debug, Clone)]
pub struct TurnRequest {
    pub topic: String,
    pub option: CoachingOption,
    /// Full conversation so far; windowed by the pipeline
    pub conversation: Vec<Message>,
    /// Milliseconds since the epoch; part of the cache key
    pub timestamp: i64,
    /// Set for end-of-session feedback requests
    pub summary_prompt: Option<String>,
}

impl TurnRequest {
    pub fn turn(
        topic: impl Into<String>,
        option: CoachingOption,
        conversation: Vec<Message>,
        timestamp: i64,
    ) -> Self {
        Self {
            topic: topic.into(),
            option,
            conversation,
            timestamp,
            summary_prompt: None,
        }
    }

    pub fn feedback(
        topic: impl Into<String>,
        option: CoachingOption,
        conversation: Vec<Message>,
        timestamp: i64,
    ) -> Self {
        let topic = topic.into();
        let summary_prompt = option.summary_prompt_for(&topic);
        Self {
            topic,
            option,
            conversation,
            timestamp,
            summary_prompt: Some(summary_prompt),
        }
    }

    pub fn is_feedback(&self) -> bool {
        self.summary_prompt.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplyOutcome {
    Generated,
    Cached,
    Fallback,
}

/// Always a well-formed assistant message
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReply {
    pub message: Message,
    pub outcome: ReplyOutcome,
    pub attempts: u32,
    /// Last error seen, for fallbacks
    pub error: Option<ModelError>,
}

impl PipelineReply {
    pub fn is_fallback(&self) -> bool {
        self.outcome == ReplyOutcome::Fallback
    }
}

enum Attempt {
    Ok(String),
    Retry(ModelError),
    Fatal(ModelError),
}

/// Resilient request path to the language model
pub struct RequestPipeline {
    model: Arc<dyn LanguageModel>,
    settings: ModelSettings,
    config: PipelineConfig,
    cache: Mutex<RequestCache<PipelineReply>>,
}

impl RequestPipeline {
    pub fn new(model: Arc<dyn LanguageModel>, settings: ModelSettings, config: PipelineConfig) -> Self {
        Self::with_clock(model, settings, config, Box::new(SystemClock))
    }

    pub fn with_clock(
        model: Arc<dyn LanguageModel>,
        settings: ModelSettings,
        config: PipelineConfig,
        clock: Box<dyn Clock>,
    ) -> Self {
        let cache = RequestCache::with_clock(config.cache_capacity, clock);
        Self {
            model,
            settings,
            config,
            cache: Mutex::new(cache),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Topic-substituted template followed by the instructions block
    pub fn system_prompt(option: &CoachingOption, topic: &str) -> String {
        let mut prompt = option.prompt_for(topic);
        prompt.push_str("\n\nAdditional instructions:");
        for (i, instruction) in option.instructions().iter().enumerate() {
            prompt.push_str(&format!("\n{}. {}", i + 1, instruction));
        }
        prompt
    }

    pub fn build_request(&self, request: &TurnRequest) -> ModelRequest {
        let conversation = sanitize_messages(request.conversation.clone());
        let messages = match &request.summary_prompt {
            Some(summary_prompt) => {
                let mut messages: Vec<Message> = conversation
                    .into_iter()
                    .filter(|m| !m.is_feedback_summary)
                    .collect();
                messages.push(Message::user(summary_prompt.clone()));
                messages
            }
            None => {
                let start = conversation.len().saturating_sub(self.config.context_window);
                conversation[start..].to_vec()
            }
        };

        ModelRequest {
            system_prompt: Self::system_prompt(&request.option, &request.topic),
            messages,
            model_id: self.settings.model.clone(),
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
            presence_penalty: self.settings.presence_penalty,
            frequency_penalty: self.settings.frequency_penalty,
            timeout_ms: self.config.timeout_ms,
        }
    }

    /// Produce the assistant reply for a turn. Never fails: transport and
    /// validation failures are turned into canned replies.
    pub async fn respond(&self, request: &TurnRequest) -> PipelineReply {
        let model_request = self.build_request(request);
        let key = CacheKey::new(request.timestamp, &model_request.messages);

        if let Some(mut cached) = self.cache.lock().await.get(&key) {
            debug!("Request cache hit (timestamp={})", request.timestamp);
            // Cached fallbacks stay fallbacks
            if cached.outcome == ReplyOutcome::Generated {
                cached.outcome = ReplyOutcome::Cached;
            }
            cached.attempts = 0;
            return cached;
        }

        let reply = self.run(request, &model_request).await;

        let ttl = Duration::from_millis(if reply.is_fallback() {
            self.config.cache_ttl_ms / 2
        } else {
            self.config.cache_ttl_ms
        });
        self.cache.lock().await.insert(key, reply.clone(), ttl);

        reply
    }

    async fn run(&self, request: &TurnRequest, model_request: &ModelRequest) -> PipelineReply {
        let max_attempts = self.config.max_attempts.max(1);
        let mut last_error = ModelError::Other("no attempt made".to_string());

        for attempt in 1..=max_attempts {
            match self.attempt(model_request).await {
                Attempt::Ok(content) => {
                    info!(
                        "Model reply received on attempt {} ({} chars)",
                        attempt,
                        content.len()
                    );
                    let message = if request.is_feedback() {
                        Message::feedback(content)
                    } else {
                        suppress_repeats(
                            Message::assistant(content),
                            &request.conversation,
                            self.config.similarity_threshold,
                        )
                    };
                    return PipelineReply {
                        message,
                        outcome: ReplyOutcome::Generated,
                        attempts: attempt,
                        error: None,
                    };
                }
                Attempt::Fatal(error) => {
                    warn!(
                        "Model request failed without retry (kind={}, status={:?})",
                        error.kind(),
                        error.status()
                    );
                    return self.fallback(request, fallback::for_error(&error).to_string(), attempt, error);
                }
                Attempt::Retry(error) => {
                    warn!(
                        "Model attempt {}/{} failed (kind={}, status={:?})",
                        attempt,
                        max_attempts,
                        error.kind(),
                        error.status()
                    );
                    last_error = error;
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.backoff(attempt)).await;
                    }
                }
            }
        }

        let text = fallback::exhausted(&last_error);
        self.fallback(request, text, max_attempts, last_error)
    }

    async fn attempt(&self, model_request: &ModelRequest) -> Attempt {
        let result = tokio::time::timeout(self.config.timeout(), self.model.complete(model_request)).await;

        match result {
            Err(_) => Attempt::Retry(ModelError::Timeout(self.config.timeout_ms)),
            Ok(Err(error)) if error.is_retryable() => Attempt::Retry(error),
            Ok(Err(error)) => Attempt::Fatal(error),
            Ok(Ok(reply)) => match reply.content.as_deref().map(str::trim) {
                Some(content) if !content.is_empty() => Attempt::Ok(content.to_string()),
                _ => Attempt::Retry(ModelError::EmptyContent),
            },
        }
    }

    fn fallback(&self, request: &TurnRequest, text: String, attempts: u32, error: ModelError) -> PipelineReply {
        let message = if request.is_feedback() {
            Message::feedback(text)
        } else {
            Message::assistant(text)
        };
        PipelineReply {
            message,
            outcome: ReplyOutcome::Fallback,
            attempts,
            error: Some(error),
        }
    }
}

/// Tag exact repeats of an earlier reply and flag near-repeats of the last one
pub fn suppress_repeats(mut message: Message, conversation: &[Message], threshold: f64) -> Message {
    let previous: Vec<&str> = conversation
        .iter()
        .filter(|m| m.role == Role::Assistant && !m.is_feedback_summary)
        .map(|m| m.content.as_str())
        .collect();

    if previous.contains(&message.content.as_str()) {
        debug!("Reply repeats an earlier one; tagging it");
        let marker: String = uuid::Uuid::new_v4().simple().to_string().chars().take(8).collect();
        message.unique_id = Some(marker);
    } else if let Some(last) = previous.last() {
        if is_too_similar(last, &message.content, threshold) {
            debug!("Reply is too similar to the previous one; adding clarification");
            message.content.push_str(CLARIFICATION);
        }
    }
    message
}
