use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::TranscriptMessage;
use crate::speech::{
    RecognitionAlternative, RecognitionError, RecognitionErrorKind, RecognizerEvent,
    RecognizerEvents, RecognizerFactory, SpeechRecognizer,
};

/// Recognizer backed by the STT service's transcript subjects
pub struct NatsRecognizer {
    client: Arc<NatsClient>,
    session_id: String,
    events: RecognizerEvents,
    task: Option<JoinHandle<()>>,
}

impl NatsRecognizer {
    pub fn new(client: Arc<NatsClient>, session_id: String, events: RecognizerEvents) -> Self {
        Self {
            client,
            session_id,
            events,
            task: None,
        }
    }

    /// Event for a raw transcript payload, if it belongs to `session_id`
    /// and carries text. Malformed payloads are logged and dropped.
    pub fn route(payload: &[u8], session_id: &str) -> Option<RecognizerEvent> {
        let transcript = match serde_json::from_slice::<TranscriptMessage>(payload) {
            Ok(transcript) => transcript,
            Err(e) => {
                warn!("Failed to parse transcript message: {}", e);
                return None;
            }
        };
        if transcript.session_id != session_id {
            return None;
        }
        Self::to_event(&transcript)
    }

    fn to_event(message: &TranscriptMessage) -> Option<RecognizerEvent> {
        let text = message.text.trim();
        if text.is_empty() {
            return None;
        }
        let alternative = RecognitionAlternative::new(text, message.confidence_or_default());
        Some(if message.partial {
            RecognizerEvent::Result {
                interim: Some(alternative),
                finals: Vec::new(),
            }
        } else {
            RecognizerEvent::Result {
                interim: None,
                finals: vec![alternative],
            }
        })
    }
}

#[async_trait::async_trait]
impl SpeechRecognizer for NatsRecognizer {
    async fn start(&mut self) -> Result<(), RecognitionError> {
        if let Some(task) = self.task.take() {
            task.abort();
        }

        let mut subscriber = self
            .client
            .subscribe_transcripts()
            .await
            .map_err(|e| RecognitionError::Start(format!("{:#}", e)))?;

        let events = self.events.clone();
        let session_id = self.session_id.clone();

        self.task = Some(tokio::spawn(async move {
            info!("Transcript receiving task started for {}", session_id);

            while let Some(msg) = subscriber.next().await {
                if let Some(event) = Self::route(&msg.payload, &session_id) {
                    if !events.emit(event) {
                        debug!("Adapter gone; stopping transcript task");
                        return;
                    }
                }
            }

            // Subscription closed underneath us
            warn!("Transcript subscription ended for {}", session_id);
            events.emit(RecognizerEvent::Error(RecognitionErrorKind::Network));
            events.emit(RecognizerEvent::Ended);
        }));

        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RecognitionError> {
        // The adapter tracks explicit stops itself; no Ended event
        if let Some(task) = self.task.take() {
            task.abort();
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "nats-stt"
    }
}

impl Drop for NatsRecognizer {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

pub struct NatsRecognizerFactory {
    client: Arc<NatsClient>,
}

impl NatsRecognizerFactory {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl RecognizerFactory for NatsRecognizerFactory {
    async fn create(
        &self,
        session_id: &str,
        events: RecognizerEvents,
    ) -> Result<Box<dyn SpeechRecognizer>, RecognitionError> {
        Ok(Box::new(NatsRecognizer::new(
            self.client.clone(),
            session_id.to_string(),
            events,
        )))
    }

    fn name(&self) -> &str {
        "nats-stt"
    }
}
