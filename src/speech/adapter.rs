use super::recognizer::{
    ErrorClass, RecognitionError, RecognitionErrorKind, RecognizerEvent, RecognizerEvents,
    RecognizerFactory, SpeechRecognizer, TaggedEvent,
};
use super::segment::{SegmentKind, TranscriptLog, TranscriptSegment};
use crate::audio::{AudioTap, RecordingMetadata};
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// Recognition restart, recovery and silence parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    pub silence_threshold_ms: u64,
    pub silence_check_interval_ms: u64,
    /// Delay before restarting after an unexpected end
    pub restart_delay_ms: u64,
    pub error_backoff_step_ms: u64,
    pub error_backoff_max_ms: u64,
    /// Recreate the recognizer once the error count exceeds this
    pub reinit_after_errors: u32,
    /// Consecutive failed recreations before giving up
    pub max_reinit_failures: u32,
    /// How long the "recovering" advisory stays raised
    pub recovering_flag_ms: u64,
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            silence_threshold_ms: 8_000,
            silence_check_interval_ms: 1_000,
            restart_delay_ms: 300,
            error_backoff_step_ms: 300,
            error_backoff_max_ms: 2_000,
            reinit_after_errors: 3,
            max_reinit_failures: 3,
            recovering_flag_ms: 5_000,
        }
    }
}

impl SpeechConfig {
    /// `min(error_count * step, max)`
    pub fn error_backoff(&self, error_count: u32) -> Duration {
        let delay = (error_count as u64).saturating_mul(self.error_backoff_step_ms);
        Duration::from_millis(delay.min(self.error_backoff_max_ms))
    }
}

/// What the adapter reports to the session
#[derive(Debug, Clone, PartialEq)]
pub enum AdapterEvent {
    Partial(TranscriptSegment),
    Final(TranscriptSegment),
    Error(RecognitionErrorKind),
    ActiveChanged(bool),
    ListeningNoSpeech(bool),
    Recovering(bool),
    Fatal(String),
}

/// Deferred adapter work; stale epochs are ignored when they fire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterTimer {
    Restart { epoch: u64 },
    ClearRecovering { epoch: u64 },
}

/// Receivers the owning session polls and feeds back into the adapter
pub struct AdapterChannels {
    pub events: mpsc::UnboundedReceiver<TaggedEvent>,
    pub timers: mpsc::UnboundedReceiver<AdapterTimer>,
}

/// Wraps a continuous recognizer: start/stop, restart on unexpected end,
/// error classification and recovery, silence detection. Also owns the
/// session's microphone tap.
///
/// The adapter never changes the session state; it reads it through `gate`
/// and reports through returned [`AdapterEvent`]s.
pub struct SpeechCaptureAdapter {
    session_id: String,
    config: SpeechConfig,
    factory: Arc<dyn RecognizerFactory>,
    gate: watch::Receiver<SessionState>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    timers_tx: mpsc::UnboundedSender<AdapterTimer>,

    recognizer: Option<Box<dyn SpeechRecognizer>>,
    generation: u64,
    active: bool,
    fatal: bool,
    released: bool,

    error_count: u32,
    reinit_failures: u32,
    recreated: bool,

    restart_epoch: u64,
    restart_pending: bool,
    recovering: bool,
    recovering_epoch: u64,

    no_speech: bool,
    last_speech_at: Instant,
    capture_started_at: Instant,
    transcript: TranscriptLog,

    audio: Option<AudioTap>,
    outbox: Vec<AdapterEvent>,
}

impl SpeechCaptureAdapter {
    pub fn new(
        session_id: impl Into<String>,
        config: SpeechConfig,
        factory: Arc<dyn RecognizerFactory>,
        gate: watch::Receiver<SessionState>,
    ) -> (Self, AdapterChannels) {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (timers_tx, timers) = mpsc::unbounded_channel();
        let now = Instant::now();

        let adapter = Self {
            session_id: session_id.into(),
            config,
            factory,
            gate,
            events_tx,
            timers_tx,
            recognizer: None,
            generation: 0,
            active: false,
            fatal: false,
            released: false,
            error_count: 0,
            reinit_failures: 0,
            recreated: false,
            restart_epoch: 0,
            restart_pending: false,
            recovering: false,
            recovering_epoch: 0,
            no_speech: false,
            last_speech_at: now,
            capture_started_at: now,
            transcript: TranscriptLog::default(),
            audio: None,
            outbox: Vec::new(),
        };

        (adapter, AdapterChannels { events, timers })
    }

    /// Create the first recognizer. `Unsupported` is final.
    pub async fn initialize(&mut self) -> Result<(), RecognitionError> {
        if !self.factory.is_supported() {
            error!("Speech recognition unsupported for session {}", self.session_id);
            return Err(RecognitionError::Unsupported);
        }
        self.fatal = false;
        self.error_count = 0;
        self.reinit_failures = 0;
        self.recreated = false;
        self.create_recognizer().await?;
        self.capture_started_at = Instant::now();
        info!(
            "Speech capture initialized for {} ({})",
            self.session_id,
            self.factory.name()
        );
        Ok(())
    }

    /// Start recognition if the session is listening and it is not running
    pub async fn start(&mut self) -> Vec<AdapterEvent> {
        self.try_start().await;
        self.drain()
    }

    /// Stop recognition without tearing anything down
    pub async fn suspend(&mut self) -> Vec<AdapterEvent> {
        self.cancel_restart();
        self.stop_recognizer().await;
        self.transcript.clear_partial();
        self.set_no_speech(false);
        self.drain()
    }

    /// Stop, zero the error counter, recreate the recognizer and start it
    pub async fn reset(&mut self) -> Vec<AdapterEvent> {
        if self.released {
            return Vec::new();
        }
        info!("Manual recognition reset for {}", self.session_id);
        self.cancel_restart();
        self.stop_recognizer().await;
        self.error_count = 0;
        self.reinit_failures = 0;
        self.fatal = false;

        match self.create_recognizer().await {
            Ok(()) => self.try_start().await,
            Err(e) => {
                warn!("Recognizer recreation failed for {}: {}", self.session_id, e);
                self.reinit_failures += 1;
                self.schedule_restart(self.config.restart_delay_ms);
            }
        }
        self.drain()
    }

    pub fn attach_audio(&mut self, tap: AudioTap) {
        self.audio = Some(tap);
    }

    /// Stop the microphone tap and finalize its recording
    pub async fn detach_audio(&mut self) -> Option<RecordingMetadata> {
        match self.audio.take() {
            Some(mut tap) => tap.shutdown().await,
            None => None,
        }
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        if let Some(tap) = &self.audio {
            tap.set_enabled(enabled);
        }
    }

    pub fn audio_enabled(&self) -> bool {
        self.audio.as_ref().is_some_and(AudioTap::is_enabled)
    }

    pub async fn handle_event(&mut self, tagged: TaggedEvent) -> Vec<AdapterEvent> {
        if self.released || tagged.generation != self.generation {
            debug!(
                "Ignoring event from stale recognizer {} (current {})",
                tagged.generation, self.generation
            );
            return Vec::new();
        }

        match tagged.event {
            // A late start report must not revive a suspended recognizer
            RecognizerEvent::Started if self.capture_wanted() => self.set_active(true),
            RecognizerEvent::Started => {}
            RecognizerEvent::Ended => self.on_ended(),
            RecognizerEvent::Result { interim, finals } => {
                self.on_speech();
                let now_ms = self.capture_offset_ms();

                // All finals of one result form a single user turn
                let spoken: Vec<_> = finals
                    .iter()
                    .filter(|a| !a.text.trim().is_empty())
                    .collect();
                if let Some(last) = spoken.last() {
                    let text = spoken
                        .iter()
                        .map(|a| a.text.trim())
                        .collect::<Vec<_>>()
                        .join(" ");
                    let segment =
                        TranscriptSegment::new(SegmentKind::Final, &text, last.confidence, now_ms);
                    self.transcript.push_final(segment.clone());
                    self.outbox.push(AdapterEvent::Final(segment));
                }

                if let Some(alternative) = interim {
                    if !alternative.text.trim().is_empty() {
                        let segment = TranscriptSegment::new(
                            SegmentKind::Partial,
                            &alternative.text,
                            alternative.confidence,
                            now_ms,
                        );
                        self.transcript.set_partial(segment.clone());
                        self.outbox.push(AdapterEvent::Partial(segment));
                    }
                }
            }
            RecognizerEvent::Error(kind) => self.on_error(kind),
        }

        self.drain()
    }

    pub async fn handle_timer(&mut self, timer: AdapterTimer) -> Vec<AdapterEvent> {
        if self.released {
            return Vec::new();
        }

        match timer {
            AdapterTimer::Restart { epoch } => {
                if epoch != self.restart_epoch || !self.restart_pending {
                    debug!("Ignoring superseded restart for {}", self.session_id);
                    return Vec::new();
                }
                self.restart_pending = false;
                self.restart().await;
            }
            AdapterTimer::ClearRecovering { epoch } => {
                if epoch == self.recovering_epoch {
                    self.set_recovering(false);
                }
            }
        }

        self.drain()
    }

    /// Raise or clear the "listening, no speech" advisory
    pub fn check_silence(&mut self, now: Instant) -> Vec<AdapterEvent> {
        let silent_for = now.saturating_duration_since(self.last_speech_at);
        let flagged = self.active
            && self.capture_wanted()
            && silent_for >= Duration::from_millis(self.config.silence_threshold_ms);
        self.set_no_speech(flagged);
        self.drain()
    }

    /// Tear everything down; safe to call more than once
    pub async fn release(&mut self) -> (Vec<AdapterEvent>, Option<RecordingMetadata>) {
        if self.released {
            return (Vec::new(), None);
        }
        self.cancel_restart();
        self.stop_recognizer().await;
        self.recognizer = None;
        // Any event still in flight belongs to a dead generation
        self.generation += 1;
        self.released = true;
        self.set_no_speech(false);
        self.set_recovering(false);

        let recording = self.detach_audio().await;

        info!("Speech capture released for {}", self.session_id);
        (self.drain(), recording)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn error_count(&self) -> u32 {
        self.error_count
    }

    pub fn is_recovering(&self) -> bool {
        self.recovering
    }

    pub fn is_listening_no_speech(&self) -> bool {
        self.no_speech
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn transcript(&self) -> &TranscriptLog {
        &self.transcript
    }

    fn capture_wanted(&self) -> bool {
        *self.gate.borrow() == SessionState::Listening
    }

    fn capture_offset_ms(&self) -> u64 {
        self.capture_started_at.elapsed().as_millis() as u64
    }

    fn drain(&mut self) -> Vec<AdapterEvent> {
        std::mem::take(&mut self.outbox)
    }

    async fn create_recognizer(&mut self) -> Result<(), RecognitionError> {
        if let Some(mut old) = self.recognizer.take() {
            if let Err(e) = old.stop().await {
                debug!("Stopping discarded recognizer failed: {}", e);
            }
        }
        self.set_active(false);

        self.generation += 1;
        let events = RecognizerEvents::new(self.generation, self.events_tx.clone());
        let recognizer = self.factory.create(&self.session_id, events).await?;
        debug!(
            "Created recognizer {} (generation {}) for {}",
            recognizer.name(),
            self.generation,
            self.session_id
        );
        self.recognizer = Some(recognizer);
        Ok(())
    }

    async fn try_start(&mut self) {
        if self.released || self.fatal || self.active || !self.capture_wanted() {
            return;
        }
        let Some(recognizer) = self.recognizer.as_mut() else {
            self.schedule_restart(self.config.restart_delay_ms);
            return;
        };

        match recognizer.start().await {
            Ok(()) => {
                self.last_speech_at = Instant::now();
                self.set_active(true);
                if self.recreated {
                    self.recreated = false;
                    self.error_count = 0;
                    self.reinit_failures = 0;
                }
                debug!("Recognition started for {}", self.session_id);
            }
            Err(e) => {
                self.error_count += 1;
                warn!(
                    "Recognition start failed for {} (errors={}): {}",
                    self.session_id, self.error_count, e
                );
                self.schedule_restart(self.config.error_backoff(self.error_count).as_millis() as u64);
            }
        }
    }

    async fn restart(&mut self) {
        if self.fatal || self.active || !self.capture_wanted() {
            return;
        }

        if self.recognizer.is_none() || self.error_count > self.config.reinit_after_errors {
            info!(
                "Recreating recognizer for {} after {} errors",
                self.session_id, self.error_count
            );
            match self.create_recognizer().await {
                Ok(()) => self.recreated = true,
                Err(e) => {
                    self.reinit_failures += 1;
                    warn!(
                        "Recognizer recreation failed for {} ({}/{}): {}",
                        self.session_id, self.reinit_failures, self.config.max_reinit_failures, e
                    );
                    if self.reinit_failures >= self.config.max_reinit_failures {
                        self.fatal = true;
                        self.outbox.push(AdapterEvent::Fatal(format!(
                            "Speech recognition could not be restarted: {}",
                            e
                        )));
                    } else {
                        self.schedule_restart(self.config.error_backoff(self.error_count).as_millis() as u64);
                    }
                    return;
                }
            }
        }

        self.try_start().await;
    }

    async fn stop_recognizer(&mut self) {
        if !self.active {
            return;
        }
        if let Some(recognizer) = self.recognizer.as_mut() {
            if let Err(e) = recognizer.stop().await {
                warn!("Failed to stop recognition for {}: {}", self.session_id, e);
            }
        }
        self.set_active(false);
    }

    fn on_speech(&mut self) {
        self.last_speech_at = Instant::now();
        self.error_count = 0;
        self.set_no_speech(false);
    }

    fn on_ended(&mut self) {
        self.set_active(false);
        if self.capture_wanted() && !self.restart_pending && !self.fatal {
            debug!("Recognition ended unexpectedly for {}; restarting", self.session_id);
            self.schedule_restart(self.config.restart_delay_ms);
        }
    }

    fn on_error(&mut self, kind: RecognitionErrorKind) {
        let class = kind.class();
        if class == ErrorClass::Ignored {
            debug!("Ignoring recognition error {} for {}", kind, self.session_id);
            return;
        }

        self.error_count += 1;
        warn!(
            "Recognition error {} for {} (errors={})",
            kind, self.session_id, self.error_count
        );
        self.outbox.push(AdapterEvent::Error(kind));
        self.set_active(false);

        if class == ErrorClass::Recoverable {
            self.set_recovering(true);
            self.recovering_epoch += 1;
            self.schedule(
                Duration::from_millis(self.config.recovering_flag_ms),
                AdapterTimer::ClearRecovering {
                    epoch: self.recovering_epoch,
                },
            );
        }

        if self.capture_wanted() && !self.fatal {
            self.schedule_restart(self.config.error_backoff(self.error_count).as_millis() as u64);
        }
    }

    /// Schedule a restart, superseding any pending one
    fn schedule_restart(&mut self, delay_ms: u64) {
        self.restart_epoch += 1;
        self.restart_pending = true;
        self.schedule(
            Duration::from_millis(delay_ms),
            AdapterTimer::Restart {
                epoch: self.restart_epoch,
            },
        );
    }

    fn cancel_restart(&mut self) {
        self.restart_epoch += 1;
        self.restart_pending = false;
    }

    fn schedule(&self, delay: Duration, timer: AdapterTimer) {
        let tx = self.timers_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(timer);
        });
    }

    fn set_active(&mut self, active: bool) {
        if self.active != active {
            self.active = active;
            self.outbox.push(AdapterEvent::ActiveChanged(active));
        }
    }

    fn set_no_speech(&mut self, flagged: bool) {
        if self.no_speech != flagged {
            self.no_speech = flagged;
            self.outbox.push(AdapterEvent::ListeningNoSpeech(flagged));
        }
    }

    fn set_recovering(&mut self, recovering: bool) {
        if self.recovering != recovering {
            self.recovering = recovering;
            self.outbox.push(AdapterEvent::Recovering(recovering));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_backoff_is_capped() {
        let config = SpeechConfig::default();
        assert_eq!(config.error_backoff(1), Duration::from_millis(300));
        assert_eq!(config.error_backoff(4), Duration::from_millis(1_200));
        assert_eq!(config.error_backoff(10), Duration::from_millis(2_000));
    }
}
