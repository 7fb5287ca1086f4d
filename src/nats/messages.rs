use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;

/// Rate and layout announced on the end-of-stream marker
const END_OF_STREAM_RATE: u32 = 16000;
const END_OF_STREAM_CHANNELS: u16 = 1;

/// Audio frame message published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AudioFrameMessage {
    pub session_id: String,
    pub sequence: u32,
    pub pcm: String, // Base64-encoded PCM bytes
    pub sample_rate: u32,
    pub channels: u16,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_frame: bool,
}

impl AudioFrameMessage {
    pub fn new(
        session_id: &str,
        pcm_bytes: &[u8],
        sample_rate: u32,
        channels: u16,
        sequence: u32,
        is_final: bool,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            sequence,
            pcm: base64::engine::general_purpose::STANDARD.encode(pcm_bytes),
            sample_rate,
            channels,
            timestamp: chrono::Utc::now().to_rfc3339(),
            final_frame: is_final,
        }
    }

    /// Little-endian i16 PCM of a captured frame
    pub fn from_frame(session_id: &str, frame: &AudioFrame, sequence: u32) -> Self {
        Self::new(
            session_id,
            &frame.to_le_bytes(),
            frame.sample_rate,
            frame.channels,
            sequence,
            false,
        )
    }

    /// Empty frame telling the STT service the session's audio is over
    pub fn end_of_stream(session_id: &str, sequence: u32) -> Self {
        Self::new(
            session_id,
            &[],
            END_OF_STREAM_RATE,
            END_OF_STREAM_CHANNELS,
            sequence,
            true,
        )
    }
}

/// Transcript message received from STT service
#[derive(Debug, Serialize, Deserialize)]
pub struct TranscriptMessage {
    pub session_id: String,
    pub text: String,
    pub partial: bool,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub confidence: Option<f32>,
}

impl TranscriptMessage {
    /// Confidence assumed when the service omits it
    pub const DEFAULT_CONFIDENCE: f32 = 0.9;

    pub fn confidence_or_default(&self) -> f32 {
        self.confidence.unwrap_or(Self::DEFAULT_CONFIDENCE)
    }
}
