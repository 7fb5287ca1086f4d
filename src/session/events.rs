use super::state::SessionState;
use crate::audio::RecordingMetadata;
use crate::conversation::Message;
use crate::pipeline::ReplyOutcome;
use crate::speech::TranscriptSegment;
use crate::summary::SummaryOutcome;
use serde::Serialize;

/// Broadcast to session subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    Partial {
        segment: TranscriptSegment,
    },
    Final {
        segment: TranscriptSegment,
    },
    MessageAppended {
        message: Message,
        /// `None` for user messages and the greeting
        outcome: Option<ReplyOutcome>,
    },
    RecognitionActive {
        active: bool,
    },
    ListeningNoSpeech {
        flagged: bool,
    },
    Recovering {
        flagged: bool,
    },
    Error {
        message: String,
    },
    Ended {
        report: DisconnectReport,
    },
}

/// Result of tearing a session down
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectReport {
    pub session_id: String,
    /// Whether the final conversation write succeeded
    pub flushed: bool,
    pub message_count: usize,
    pub feedback: Option<SummaryOutcome>,
    pub recording: Option<RecordingMetadata>,
}
