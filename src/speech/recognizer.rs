use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::mpsc;

/// Error kinds reported by a recognition service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum RecognitionErrorKind {
    NoSpeech,
    Network,
    ServiceNotAllowed,
    Aborted,
    AudioCapture,
    NotAllowed,
    Other(String),
}

/// How the adapter reacts to an error kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Dropped without counting
    Ignored,
    /// Counted, advertised as recovering, restarted
    Recoverable,
    /// Counted and restarted
    Unclassified,
}

impl RecognitionErrorKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "no-speech" => Self::NoSpeech,
            "network" => Self::Network,
            "service-not-allowed" => Self::ServiceNotAllowed,
            "aborted" => Self::Aborted,
            "audio-capture" => Self::AudioCapture,
            "not-allowed" => Self::NotAllowed,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NoSpeech => "no-speech",
            Self::Network => "network",
            Self::ServiceNotAllowed => "service-not-allowed",
            Self::Aborted => "aborted",
            Self::AudioCapture => "audio-capture",
            Self::NotAllowed => "not-allowed",
            Self::Other(raw) => raw,
        }
    }

    pub fn class(&self) -> ErrorClass {
        match self {
            Self::NoSpeech => ErrorClass::Ignored,
            Self::Network
            | Self::ServiceNotAllowed
            | Self::Aborted
            | Self::AudioCapture
            | Self::NotAllowed => ErrorClass::Recoverable,
            Self::Other(_) => ErrorClass::Unclassified,
        }
    }
}

impl fmt::Display for RecognitionErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for RecognitionErrorKind {
    fn from(raw: String) -> Self {
        Self::parse(&raw)
    }
}

impl From<RecognitionErrorKind> for String {
    fn from(kind: RecognitionErrorKind) -> Self {
        kind.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RecognitionAlternative {
    pub text: String,
    pub confidence: f32,
}

impl RecognitionAlternative {
    pub fn new(text: impl Into<String>, confidence: f32) -> Self {
        Self {
            text: text.into(),
            confidence,
        }
    }
}

/// Event raised by a recognizer instance
#[derive(Debug, Clone, PartialEq)]
pub enum RecognizerEvent {
    Started,
    Ended,
    Result {
        interim: Option<RecognitionAlternative>,
        finals: Vec<RecognitionAlternative>,
    },
    Error(RecognitionErrorKind),
}

/// Recognizer event stamped with the instance generation that raised it
#[derive(Debug, Clone, PartialEq)]
pub struct TaggedEvent {
    pub generation: u64,
    pub event: RecognizerEvent,
}

/// Event sink handed to a recognizer when it is created
#[derive(Debug, Clone)]
pub struct RecognizerEvents {
    generation: u64,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl RecognizerEvents {
    pub fn new(generation: u64, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Returns false once the adapter is gone
    pub fn emit(&self, event: RecognizerEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("Speech recognition is not supported in this environment.")]
    Unsupported,

    #[error("failed to start recognition: {0}")]
    Start(String),

    #[error("failed to stop recognition: {0}")]
    Stop(String),

    #[error("failed to create recognizer: {0}")]
    Create(String),
}

/// A continuous recognition instance
#[async_trait::async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn start(&mut self) -> Result<(), RecognitionError>;

    async fn stop(&mut self) -> Result<(), RecognitionError>;

    fn name(&self) -> &str;
}

/// Creates recognizer instances for a session
#[async_trait::async_trait]
pub trait RecognizerFactory: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    async fn create(
        &self,
        session_id: &str,
        events: RecognizerEvents,
    ) -> Result<Box<dyn SpeechRecognizer>, RecognitionError>;

    fn name(&self) -> &str;
}

/// Factory for hosts without a recognition capability
pub struct UnsupportedRecognizerFactory;

#[async_trait::async_trait]
impl RecognizerFactory for UnsupportedRecognizerFactory {
    fn is_supported(&self) -> bool {
        false
    }

    async fn create(
        &self,
        _session_id: &str,
        _events: RecognizerEvents,
    ) -> Result<Box<dyn SpeechRecognizer>, RecognitionError> {
        Err(RecognitionError::Unsupported)
    }

    fn name(&self) -> &str {
        "unsupported"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classes() {
        assert_eq!(RecognitionErrorKind::parse("no-speech").class(), ErrorClass::Ignored);
        for raw in ["network", "service-not-allowed", "aborted", "audio-capture", "not-allowed"] {
            assert_eq!(RecognitionErrorKind::parse(raw).class(), ErrorClass::Recoverable);
            assert_eq!(RecognitionErrorKind::parse(raw).as_str(), raw);
        }
        assert_eq!(
            RecognitionErrorKind::parse("language-not-supported").class(),
            ErrorClass::Unclassified
        );
    }

    #[test]
    fn test_events_carry_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let events = RecognizerEvents::new(4, tx);
        assert!(events.emit(RecognizerEvent::Started));
        let tagged = rx.try_recv().unwrap();
        assert_eq!(tagged.generation, 4);
        assert_eq!(tagged.event, RecognizerEvent::Started);
    }
}
