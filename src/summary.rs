//! End-of-session feedback

use crate::coaching::CoachingOption;
use crate::conversation::{has_exchange, sanitize, Message};
use crate::pipeline::{RequestPipeline, TurnRequest};
use crate::store::SessionStore;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Returned instead of feedback when generation failed
pub const FEEDBACK_UNAVAILABLE: &str =
    "Sorry, there was an error generating the feedback. Please try again.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "text", rename_all = "snake_case")]
pub enum SummaryOutcome {
    /// Feedback produced (and persisted when the store accepted it)
    Generated(String),
    /// Generation failed; carries the user-facing placeholder
    Unavailable(String),
    /// The conversation lacks a user/assistant exchange
    Skipped,
}

impl SummaryOutcome {
    pub fn text(&self) -> Option<&str> {
        match self {
            SummaryOutcome::Generated(text) | SummaryOutcome::Unavailable(text) => Some(text),
            SummaryOutcome::Skipped => None,
        }
    }
}

pub struct SummaryGenerator {
    pipeline: Arc<RequestPipeline>,
    store: Arc<dyn SessionStore>,
}

impl SummaryGenerator {
    pub fn new(pipeline: Arc<RequestPipeline>, store: Arc<dyn SessionStore>) -> Self {
        Self { pipeline, store }
    }

    /// Generate feedback for a finished session. The persisted conversation
    /// is preferred; `in_memory` is used when it cannot be read.
    pub async fn generate(
        &self,
        session_id: &str,
        topic: &str,
        option: &CoachingOption,
        in_memory: &[Message],
    ) -> SummaryOutcome {
        let conversation = match self.store.get_session(session_id).await {
            Ok(record) => {
                let persisted = record.conversation.as_ref().map(sanitize).unwrap_or_default();
                if persisted.is_empty() {
                    in_memory.to_vec()
                } else {
                    persisted
                }
            }
            Err(e) => {
                warn!("Reading conversation for {} failed, using in-memory copy: {}", session_id, e);
                in_memory.to_vec()
            }
        };

        if !has_exchange(&conversation) {
            info!("Skipping feedback for {}: no exchange yet", session_id);
            return SummaryOutcome::Skipped;
        }

        let request = TurnRequest::feedback(
            topic,
            option.clone(),
            conversation,
            chrono::Utc::now().timestamp_millis(),
        );
        let reply = self.pipeline.respond(&request).await;

        if reply.is_fallback() {
            warn!(
                "Feedback generation for {} failed (kind={:?})",
                session_id,
                reply.error.as_ref().map(|e| e.kind())
            );
            return SummaryOutcome::Unavailable(FEEDBACK_UNAVAILABLE.to_string());
        }

        let text = reply.message.content;
        if let Err(e) = self.store.update_session_feedback(session_id, &text).await {
            warn!("Failed to persist feedback for {}: {}", session_id, e);
        } else {
            info!("Feedback saved for {} ({} chars)", session_id, text.len());
        }
        SummaryOutcome::Generated(text)
    }
}
