pub mod audio;
pub mod coaching;
pub mod config;
pub mod conversation;
pub mod http;
pub mod llm;
pub mod nats;
pub mod pipeline;
pub mod session;
pub mod speech;
pub mod store;
pub mod summary;
pub mod usage;

pub use audio::{AudioFrame, AudioInput, Microphone, MicrophoneError, RecordingMetadata};
pub use coaching::{CoachingCatalog, CoachingOption, Expert};
pub use config::Config;
pub use conversation::{ConversationBuffer, Message, Role};
pub use http::{create_router, AppState};
pub use llm::{LanguageModel, ModelError, OpenAiCompatibleClient};
pub use nats::{AudioFrameMessage, NatsClient, TranscriptMessage};
pub use pipeline::{PipelineConfig, PipelineReply, ReplyOutcome, RequestPipeline, TurnRequest};
pub use session::{
    CoachingSession, DisconnectReport, NewSession, SessionConfig, SessionError, SessionEvent,
    SessionServices, SessionState, SessionStatus,
};
pub use speech::{SpeechCaptureAdapter, SpeechConfig, TranscriptSegment};
pub use store::{JsonFileStore, MemoryStore, SessionStore, StoreError};
pub use summary::{SummaryGenerator, SummaryOutcome};
