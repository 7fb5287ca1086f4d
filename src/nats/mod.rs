pub mod client;
pub mod messages;
pub mod recognizer;

pub use client::{audio_subject, NatsClient, TRANSCRIPT_SUBJECT};
pub use messages::{AudioFrameMessage, TranscriptMessage};
pub use recognizer::{NatsRecognizer, NatsRecognizerFactory};
