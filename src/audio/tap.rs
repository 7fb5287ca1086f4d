use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::microphone::{AudioFrame, Microphone};
use super::recorder::{RecordingMetadata, SessionRecorder};

/// Destination for captured audio (e.g. the STT service)
#[async_trait::async_trait]
pub trait FrameSink: Send + Sync {
    async fn send_frame(&self, session_id: &str, frame: &AudioFrame, sequence: u32) -> Result<()>;

    /// Signal end of stream
    async fn finish(&self, session_id: &str, sequence: u32) -> Result<()>;
}

/// Background task forwarding microphone frames to a sink and recorder
/// while enabled. Owns the microphone until shutdown.
pub struct AudioTap {
    microphone: Box<dyn Microphone>,
    enabled: Arc<AtomicBool>,
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<Option<RecordingMetadata>>>,
}

impl AudioTap {
    pub fn spawn(
        session_id: String,
        microphone: Box<dyn Microphone>,
        mut frames: mpsc::Receiver<AudioFrame>,
        sink: Option<Arc<dyn FrameSink>>,
        mut recorder: Option<SessionRecorder>,
    ) -> Self {
        let enabled = Arc::new(AtomicBool::new(true));
        let (stop_tx, mut stop_rx) = oneshot::channel();

        info!(
            "Audio tap started for {} (mic={}, sink={}, recording={})",
            session_id,
            microphone.name(),
            sink.is_some(),
            recorder.is_some()
        );

        let flag = enabled.clone();
        let task = tokio::spawn(async move {
            let mut sequence: u32 = 0;

            loop {
                let frame = tokio::select! {
                    _ = &mut stop_rx => break,
                    frame = frames.recv() => match frame {
                        Some(frame) => frame,
                        None => break,
                    },
                };

                if !flag.load(Ordering::Relaxed) {
                    continue;
                }

                if let Some(sink) = &sink {
                    if let Err(e) = sink.send_frame(&session_id, &frame, sequence).await {
                        warn!("Failed to forward audio frame {} for {}: {}", sequence, session_id, e);
                    }
                }
                if let Some(rec) = &mut recorder {
                    if let Err(e) = rec.write_frame(&frame) {
                        warn!("Recording failed for {}, disabling it: {}", session_id, e);
                        recorder = None;
                    }
                }
                sequence = sequence.wrapping_add(1);
            }

            if let Some(sink) = &sink {
                if let Err(e) = sink.finish(&session_id, sequence).await {
                    debug!("Failed to send final frame for {}: {}", session_id, e);
                }
            }

            let metadata = match recorder.map(SessionRecorder::finish) {
                Some(Ok(metadata)) => metadata,
                Some(Err(e)) => {
                    warn!("Failed to finalize recording for {}: {}", session_id, e);
                    None
                }
                None => None,
            };
            info!("Audio tap stopped for {} ({} frames)", session_id, sequence);
            metadata
        });

        Self {
            microphone,
            enabled,
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }

    /// Pause or resume forwarding; frames arriving while disabled are dropped
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Stop the tap, release the microphone and finalize the recording
    pub async fn shutdown(&mut self) -> Option<RecordingMetadata> {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        self.microphone.release().await;

        match self.task.take() {
            Some(task) => match task.await {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Audio tap task failed: {}", e);
                    None
                }
            },
            None => None,
        }
    }
}
