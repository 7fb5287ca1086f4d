use anyhow::{Context, Result};
use async_nats::Client;
use tracing::{debug, info};

use super::messages::AudioFrameMessage;
use crate::audio::{AudioFrame, FrameSink};

/// Subject the STT service publishes partial and final transcripts under
pub const TRANSCRIPT_SUBJECT: &str = "stt.text.>";

/// Subject audio frames for a session are published to
pub fn audio_subject(session_id: &str) -> String {
    format!("audio.frame.session-{}", session_id)
}

/// Shared NATS connection; one per process, used by every session
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish an audio frame on its session's subject
    pub async fn publish_audio_frame(&self, message: AudioFrameMessage) -> Result<()> {
        let subject = audio_subject(&message.session_id);
        let payload = serde_json::to_vec(&message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .context("Failed to publish audio frame")?;

        debug!(
            "Published audio frame to {} (seq={}, final={})",
            subject, message.sequence, message.final_frame
        );

        Ok(())
    }

    /// Subscribe to transcript messages for all sessions; callers filter by
    /// the session id in the payload
    pub async fn subscribe_transcripts(&self) -> Result<async_nats::Subscriber> {
        info!("Subscribing to transcripts on {}", TRANSCRIPT_SUBJECT);

        let subscriber = self
            .client
            .subscribe(TRANSCRIPT_SUBJECT)
            .await
            .context("Failed to subscribe to transcripts")?;

        Ok(subscriber)
    }
}

#[async_trait::async_trait]
impl FrameSink for NatsClient {
    async fn send_frame(&self, session_id: &str, frame: &AudioFrame, sequence: u32) -> Result<()> {
        self.publish_audio_frame(AudioFrameMessage::from_frame(session_id, frame, sequence))
            .await
    }

    async fn finish(&self, session_id: &str, sequence: u32) -> Result<()> {
        self.publish_audio_frame(AudioFrameMessage::end_of_stream(session_id, sequence))
            .await
    }
}
