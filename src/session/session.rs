use super::error::SessionError;
use super::events::{DisconnectReport, SessionEvent};
use super::services::SessionServices;
use super::state::SessionState;
use super::stats::SessionStatus;
use crate::audio::{AudioTap, SessionRecorder};
use crate::coaching::{CoachingOption, Expert};
use crate::conversation::{sanitize, ConversationBuffer, Message};
use crate::pipeline::{PipelineReply, ReplyOutcome, TurnRequest};
use crate::speech::{
    AdapterChannels, AdapterEvent, SpeechCaptureAdapter, TranscriptLog, TranscriptSegment,
};
use crate::store::SessionRecord;
use crate::summary::{SummaryGenerator, SummaryOutcome};
use crate::usage::UsageAccountant;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

/// Parameters for a new session
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSession {
    pub topic: String,
    pub coaching_option: String,
    pub expert_name: String,
    #[serde(default)]
    pub user_id: Option<String>,
}

type Reply<T> = oneshot::Sender<T>;

enum Command {
    Connect(Reply<Result<(), SessionError>>),
    Pause(Reply<Result<(), SessionError>>),
    Resume(Reply<Result<(), SessionError>>),
    ResetRecognition(Reply<Result<(), SessionError>>),
    Disconnect(Reply<DisconnectReport>),
    Status(Reply<SessionStatus>),
    Conversation(Reply<Vec<Message>>),
    Transcript(Reply<TranscriptLog>),
    GenerateFeedback(Reply<SummaryOutcome>),
}

enum Internal {
    ModelReply { request: u64, reply: PipelineReply },
    CooldownElapsed { epoch: u64 },
}

/// Handle to a running coaching session
///
/// All mutations go through the session's actor task. Cloning the handle is
/// cheap; when the last clone is dropped the session is torn down.
#[derive(Clone)]
pub struct CoachingSession {
    id: String,
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<SessionState>,
    events: broadcast::Sender<SessionEvent>,
}

impl CoachingSession {
    /// Persist a new session record and start its actor
    pub async fn create(
        services: Arc<SessionServices>,
        params: NewSession,
    ) -> Result<Self, SessionError> {
        if services.catalog.option(&params.coaching_option).is_none() {
            return Err(SessionError::UnknownCoachingOption(params.coaching_option));
        }

        let id = services
            .store
            .create_session(
                &params.topic,
                &params.coaching_option,
                &params.expert_name,
                params.user_id.as_deref(),
            )
            .await?;
        info!("Created session {} ({} on {:?})", id, params.coaching_option, params.topic);

        Self::open(services, &id).await
    }

    /// Start an actor for a persisted session, hydrating its conversation
    pub async fn open(services: Arc<SessionServices>, id: &str) -> Result<Self, SessionError> {
        let record = services.store.get_session(id).await?;
        let option = services
            .catalog
            .option(&record.coaching_option)
            .cloned()
            .ok_or_else(|| SessionError::UnknownCoachingOption(record.coaching_option.clone()))?;
        let expert = services.catalog.expert_or_default(&record.expert_name);

        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (events_tx, _) = broadcast::channel(services.session.event_buffer.max(1));
        let (commands_tx, commands_rx) = mpsc::channel(32);

        let actor = SessionActor::new(services, record, option, expert, state_tx, events_tx.clone());
        let session_id = actor.id.clone();
        tokio::spawn(actor.run(commands_rx));

        Ok(Self {
            id: session_id,
            commands: commands_tx,
            state: state_rx,
            events: events_tx,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Acquire the microphone and start listening
    pub async fn connect(&self) -> Result<(), SessionError> {
        self.call(Command::Connect).await?
    }

    pub async fn pause(&self) -> Result<(), SessionError> {
        self.call(Command::Pause).await?
    }

    pub async fn resume(&self) -> Result<(), SessionError> {
        self.call(Command::Resume).await?
    }

    /// Recreate the recognizer from scratch
    pub async fn reset_recognition(&self) -> Result<(), SessionError> {
        self.call(Command::ResetRecognition).await?
    }

    /// End the session. Repeated calls return the first report.
    pub async fn disconnect(&self) -> Result<DisconnectReport, SessionError> {
        self.call(Command::Disconnect).await
    }

    pub async fn status(&self) -> Result<SessionStatus, SessionError> {
        self.call(Command::Status).await
    }

    pub async fn conversation(&self) -> Result<Vec<Message>, SessionError> {
        self.call(Command::Conversation).await
    }

    pub async fn transcript(&self) -> Result<TranscriptLog, SessionError> {
        self.call(Command::Transcript).await
    }

    /// Generate (or regenerate) the session feedback on demand
    pub async fn generate_feedback(&self) -> Result<SummaryOutcome, SessionError> {
        self.call(Command::GenerateFeedback).await
    }

    async fn call<T>(&self, make: impl FnOnce(Reply<T>) -> Command) -> Result<T, SessionError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}

/// Single writer for a session's state, conversation and adapter
struct SessionActor {
    id: String,
    topic: String,
    option: CoachingOption,
    expert: Expert,
    services: Arc<SessionServices>,

    state_tx: watch::Sender<SessionState>,
    events: broadcast::Sender<SessionEvent>,
    internal_tx: mpsc::UnboundedSender<Internal>,
    internal_rx: Option<mpsc::UnboundedReceiver<Internal>>,
    channels: Option<AdapterChannels>,

    buffer: ConversationBuffer,
    adapter: SpeechCaptureAdapter,
    usage: UsageAccountant,

    awaiting: Option<u64>,
    next_request: u64,
    cooldown_epoch: u64,
    last_error: Option<String>,
    started_at: DateTime<Utc>,
    report: Option<DisconnectReport>,
}

impl SessionActor {
    fn new(
        services: Arc<SessionServices>,
        record: SessionRecord,
        option: CoachingOption,
        expert: Expert,
        state_tx: watch::Sender<SessionState>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        let (adapter, channels) = SpeechCaptureAdapter::new(
            record.id.clone(),
            services.speech.clone(),
            services.recognizers.clone(),
            state_tx.subscribe(),
        );
        let (internal_tx, internal_rx) = mpsc::unbounded_channel();

        let buffer = match &record.conversation {
            Some(raw) => ConversationBuffer::hydrated(raw),
            None => ConversationBuffer::new(),
        };
        if !buffer.is_empty() {
            info!("Session {} hydrated with {} messages", record.id, buffer.len());
        }

        let usage = UsageAccountant::new(services.store.clone(), record.user_id.clone());

        Self {
            id: record.id,
            topic: record.topic,
            option,
            expert,
            services,
            state_tx,
            events,
            internal_tx,
            internal_rx: Some(internal_rx),
            channels: Some(channels),
            buffer,
            adapter,
            usage,
            awaiting: None,
            next_request: 0,
            cooldown_epoch: 0,
            last_error: None,
            started_at: Utc::now(),
            report: None,
        }
    }

    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        let (Some(mut channels), Some(mut internal)) = (self.channels.take(), self.internal_rx.take())
        else {
            return;
        };
        let period = Duration::from_millis(self.services.speech.silence_check_interval_ms.max(10));
        let mut silence = tokio::time::interval(period);
        silence.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        debug!("Session actor started for {}", self.id);

        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => {
                        // Last handle dropped
                        self.teardown().await;
                        break;
                    }
                },
                Some(event) = channels.events.recv() => {
                    let out = self.adapter.handle_event(event).await;
                    self.process(out).await;
                }
                Some(timer) = channels.timers.recv() => {
                    let out = self.adapter.handle_timer(timer).await;
                    self.process(out).await;
                }
                Some(message) = internal.recv() => self.handle_internal(message).await,
                _ = silence.tick() => {
                    let out = self.adapter.check_silence(tokio::time::Instant::now());
                    self.process(out).await;
                }
            }
        }

        debug!("Session actor stopped for {}", self.id);
    }

    fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&mut self, next: SessionState) -> bool {
        let current = self.state();
        if current == next {
            return true;
        }
        if !current.can_transition_to(next) {
            warn!("Session {}: refusing transition {} -> {}", self.id, current, next);
            return false;
        }
        self.state_tx.send_replace(next);
        info!("Session {}: {} -> {}", self.id, current, next);
        self.emit(SessionEvent::StateChanged {
            from: current,
            to: next,
        });
        true
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Connect(reply) => {
                let result = self.connect().await;
                let _ = reply.send(result);
            }
            Command::Pause(reply) => {
                let result = self.pause().await;
                let _ = reply.send(result);
            }
            Command::Resume(reply) => {
                let result = self.resume().await;
                let _ = reply.send(result);
            }
            Command::ResetRecognition(reply) => {
                let result = self.reset_recognition().await;
                let _ = reply.send(result);
            }
            Command::Disconnect(reply) => {
                let report = self.teardown().await;
                let _ = reply.send(report);
            }
            Command::Status(reply) => {
                let _ = reply.send(self.status());
            }
            Command::Conversation(reply) => {
                let conversation = self.conversation().await;
                let _ = reply.send(conversation);
            }
            Command::Transcript(reply) => {
                let _ = reply.send(self.adapter.transcript().clone());
            }
            Command::GenerateFeedback(reply) => {
                // Runs off the actor so capture keeps flowing
                let generator =
                    SummaryGenerator::new(self.services.pipeline.clone(), self.services.store.clone());
                let id = self.id.clone();
                let topic = self.topic.clone();
                let option = self.option.clone();
                let in_memory = self.buffer.materialize();
                tokio::spawn(async move {
                    let outcome = generator.generate(&id, &topic, &option, &in_memory).await;
                    let _ = reply.send(outcome);
                });
            }
        }
    }

    async fn connect(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if !matches!(state, SessionState::Idle | SessionState::Error) {
            return Err(SessionError::InvalidState {
                action: "connect",
                state,
            });
        }
        self.set_state(SessionState::Connecting);
        self.last_error = None;

        let mut microphone = match self.services.microphones.open(&self.id).await {
            Ok(microphone) => microphone,
            Err(e) => {
                self.fail(e.remediation()).await;
                return Err(e.into());
            }
        };
        let frames = match microphone.acquire().await {
            Ok(frames) => frames,
            Err(e) => {
                self.fail(e.remediation()).await;
                return Err(e.into());
            }
        };

        if let Err(e) = self.adapter.initialize().await {
            microphone.release().await;
            self.fail(e.to_string()).await;
            return Err(e.into());
        }

        let recorder = match &self.services.recordings_dir {
            Some(dir) => match SessionRecorder::new(dir, &self.id) {
                Ok(recorder) => Some(recorder),
                Err(e) => {
                    warn!("Session {}: recording disabled: {:#}", self.id, e);
                    None
                }
            },
            None => None,
        };
        let tap = AudioTap::spawn(
            self.id.clone(),
            microphone,
            frames,
            self.services.frame_sink.clone(),
            recorder,
        );
        self.adapter.attach_audio(tap);

        if let Err(e) = self.usage.load().await {
            warn!(
                "Session {}: could not load credits, retrying on first charge: {}",
                self.id, e
            );
        }

        self.set_state(SessionState::Listening);
        let out = self.adapter.start().await;
        self.process(out).await;

        if self.buffer.is_empty() && self.services.session.greet_on_start {
            self.greet().await;
        }

        info!("Session {} connected", self.id);
        Ok(())
    }

    async fn greet(&mut self) {
        let greeting = Message::assistant(format!(
            "Hello! I'm {}, your {} expert on \"{}\". I'll be guiding you through this topic \
             with interactive discussion. Feel free to ask questions or share what you already \
             know, and we'll build on that together. What would you like to focus on first?",
            self.expert.name, self.option.name, self.topic
        ));
        if self.buffer.append(greeting.clone()) {
            self.emit(SessionEvent::MessageAppended {
                message: greeting,
                outcome: None,
            });
            self.flush().await;
        }
    }

    async fn pause(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        match state {
            SessionState::Paused => return Ok(()),
            SessionState::Listening | SessionState::AwaitingModel => {}
            _ => {
                return Err(SessionError::InvalidState {
                    action: "pause",
                    state,
                })
            }
        }

        self.cooldown_epoch += 1;
        self.set_state(SessionState::Paused);
        let out = self.adapter.suspend().await;
        self.adapter.set_audio_enabled(false);
        self.process(out).await;
        Ok(())
    }

    async fn resume(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Paused {
            return Err(SessionError::InvalidState {
                action: "resume",
                state,
            });
        }

        self.adapter.set_audio_enabled(true);
        if self.awaiting.is_some() {
            // Reply still outstanding; listening resumes after it lands
            self.set_state(SessionState::AwaitingModel);
        } else {
            self.set_state(SessionState::Listening);
            let out = self.adapter.start().await;
            self.process(out).await;
        }
        Ok(())
    }

    async fn reset_recognition(&mut self) -> Result<(), SessionError> {
        let state = self.state();
        if state != SessionState::Listening {
            return Err(SessionError::InvalidState {
                action: "reset recognition",
                state,
            });
        }
        let out = self.adapter.reset().await;
        self.process(out).await;
        Ok(())
    }

    /// React to adapter output; follow-up events are queued rather than
    /// handled recursively.
    async fn process(&mut self, events: Vec<AdapterEvent>) {
        let mut queue: VecDeque<AdapterEvent> = events.into();

        while let Some(event) = queue.pop_front() {
            match event {
                AdapterEvent::Partial(segment) => {
                    self.emit(SessionEvent::Partial { segment });
                }
                AdapterEvent::Final(segment) => {
                    self.emit(SessionEvent::Final {
                        segment: segment.clone(),
                    });
                    if self.state() == SessionState::Listening {
                        queue.extend(self.on_final(segment).await);
                    } else {
                        debug!(
                            "Session {}: final transcript while {}, not sent",
                            self.id,
                            self.state()
                        );
                    }
                }
                AdapterEvent::Error(kind) => {
                    self.last_error = Some(format!("Speech recognition error: {}", kind));
                }
                AdapterEvent::ActiveChanged(active) => {
                    self.emit(SessionEvent::RecognitionActive { active });
                }
                AdapterEvent::ListeningNoSpeech(flagged) => {
                    self.emit(SessionEvent::ListeningNoSpeech { flagged });
                }
                AdapterEvent::Recovering(flagged) => {
                    self.emit(SessionEvent::Recovering { flagged });
                }
                AdapterEvent::Fatal(reason) => {
                    error!("Session {}: {}", self.id, reason);
                    self.fail(reason).await;
                }
            }
        }
    }

    /// User turn: append, stop listening, ask the model
    async fn on_final(&mut self, segment: TranscriptSegment) -> Vec<AdapterEvent> {
        let text = segment.text.trim();
        if text.is_empty() {
            return Vec::new();
        }

        let message = Message::user(text);
        if self.buffer.append(message.clone()) {
            self.emit(SessionEvent::MessageAppended {
                message,
                outcome: None,
            });
        }

        self.set_state(SessionState::AwaitingModel);
        let out = self.adapter.suspend().await;

        self.next_request += 1;
        let request_id = self.next_request;
        self.awaiting = Some(request_id);

        let turn = TurnRequest::turn(
            self.topic.clone(),
            self.option.clone(),
            self.buffer.materialize(),
            Utc::now().timestamp_millis(),
        );
        let pipeline = self.services.pipeline.clone();
        let tx = self.internal_tx.clone();
        tokio::spawn(async move {
            let reply = pipeline.respond(&turn).await;
            let _ = tx.send(Internal::ModelReply {
                request: request_id,
                reply,
            });
        });

        debug!("Session {}: model request {} issued", self.id, request_id);
        out
    }

    async fn handle_internal(&mut self, message: Internal) {
        match message {
            Internal::ModelReply { request, reply } => self.on_model_reply(request, reply).await,
            Internal::CooldownElapsed { epoch } => {
                if epoch != self.cooldown_epoch
                    || self.awaiting.is_some()
                    || self.state() != SessionState::AwaitingModel
                {
                    debug!("Session {}: stale cooldown ignored", self.id);
                    return;
                }
                self.set_state(SessionState::Listening);
                let out = self.adapter.start().await;
                self.process(out).await;
            }
        }
    }

    async fn on_model_reply(&mut self, request: u64, reply: PipelineReply) {
        if self.awaiting != Some(request) || self.state().is_terminal() {
            debug!("Session {}: dropping reply to request {}", self.id, request);
            return;
        }
        self.awaiting = None;

        let PipelineReply {
            message, outcome, ..
        } = reply;
        if !self.buffer.append(message.clone()) {
            debug!("Session {}: reply duplicates a retained turn", self.id);
        }
        self.emit(SessionEvent::MessageAppended {
            message: message.clone(),
            outcome: Some(outcome),
        });

        if outcome == ReplyOutcome::Generated {
            if let Err(e) = self.usage.charge(&message.content).await {
                warn!("Session {}: usage not recorded: {}", self.id, e);
            }
        }

        self.flush().await;

        if self.state() == SessionState::AwaitingModel {
            self.cooldown_epoch += 1;
            let epoch = self.cooldown_epoch;
            let delay = self.services.session.reply_cooldown();
            let tx = self.internal_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(delay).await;
                let _ = tx.send(Internal::CooldownElapsed { epoch });
            });
        }
    }

    /// Persist the conversation; false when the write failed
    async fn flush(&self) -> bool {
        let conversation = match serde_json::to_value(self.buffer.materialize()) {
            Ok(value) => value,
            Err(e) => {
                error!("Session {}: conversation not serializable: {}", self.id, e);
                return false;
            }
        };
        match self
            .services
            .store
            .update_conversation(&self.id, conversation)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                warn!("Session {}: conversation flush failed: {}", self.id, e);
                false
            }
        }
    }

    async fn fail(&mut self, reason: String) {
        self.last_error = Some(reason.clone());
        self.set_state(SessionState::Error);
        self.emit(SessionEvent::Error { message: reason });
        self.cooldown_epoch += 1;

        let out = self.adapter.suspend().await;
        for event in out {
            if let AdapterEvent::ActiveChanged(active) = event {
                self.emit(SessionEvent::RecognitionActive { active });
            }
        }
        if let Some(recording) = self.adapter.detach_audio().await {
            info!("Session {}: recording saved to {}", self.id, recording.file_path.display());
        }
    }

    /// End the session; idempotent
    async fn teardown(&mut self) -> DisconnectReport {
        if let Some(report) = &self.report {
            return report.clone();
        }

        self.set_state(SessionState::Ended);
        self.cooldown_epoch += 1;
        self.awaiting = None;

        let (out, recording) = self.adapter.release().await;
        self.process(out).await;

        let flushed = self.flush().await;
        let message_count = self.buffer.len();

        let feedback = if self.services.session.summarize_on_disconnect {
            let generator =
                SummaryGenerator::new(self.services.pipeline.clone(), self.services.store.clone());
            Some(
                generator
                    .generate(&self.id, &self.topic, &self.option, self.buffer.as_slice())
                    .await,
            )
        } else {
            None
        };

        if flushed {
            // Persisted copy is the source of truth from here on
            self.buffer.clear();
        }

        let report = DisconnectReport {
            session_id: self.id.clone(),
            flushed,
            message_count,
            feedback,
            recording,
        };
        info!(
            "Session {} ended ({} messages, flushed={})",
            self.id, message_count, flushed
        );
        self.emit(SessionEvent::Ended {
            report: report.clone(),
        });
        self.report = Some(report.clone());
        report
    }

    async fn conversation(&self) -> Vec<Message> {
        if !self.buffer.is_empty() || !self.state().is_terminal() {
            return self.buffer.materialize();
        }
        match self.services.store.get_session(&self.id).await {
            Ok(record) => record.conversation.as_ref().map(sanitize).unwrap_or_default(),
            Err(e) => {
                warn!("Session {}: could not read conversation: {}", self.id, e);
                Vec::new()
            }
        }
    }

    fn status(&self) -> SessionStatus {
        let duration = Utc::now().signed_duration_since(self.started_at);

        SessionStatus {
            session_id: self.id.clone(),
            topic: self.topic.clone(),
            coaching_option: self.option.name.clone(),
            expert_name: self.expert.name.clone(),
            state: self.state(),
            recognition_active: self.adapter.is_active(),
            listening_no_speech: self.adapter.is_listening_no_speech(),
            recognition_recovering: self.adapter.is_recovering(),
            recognition_errors: self.adapter.error_count(),
            message_count: self
                .report
                .as_ref()
                .map(|r| r.message_count)
                .unwrap_or_else(|| self.buffer.len()),
            credits_remaining: self.usage.account().map(|a| a.credits_remaining),
            last_error: self.last_error.clone(),
            started_at: self.started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
        }
    }
}
