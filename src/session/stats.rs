use super::state::SessionState;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Snapshot of a coaching session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub session_id: String,

    pub topic: String,

    pub coaching_option: String,

    pub expert_name: String,

    pub state: SessionState,

    /// Whether the recognizer is currently running
    pub recognition_active: bool,

    /// Advisory: listening but nothing heard for a while
    pub listening_no_speech: bool,

    /// Advisory: recovering from a recognition error
    pub recognition_recovering: bool,

    /// Consecutive recognition errors
    pub recognition_errors: u32,

    /// Messages in the in-memory conversation
    pub message_count: usize,

    /// `None` when the session has no metered user
    pub credits_remaining: Option<i64>,

    pub last_error: Option<String>,

    pub started_at: DateTime<Utc>,

    /// Total duration in seconds
    pub duration_secs: f64,
}
