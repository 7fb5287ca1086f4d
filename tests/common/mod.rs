// Shared fakes for integration tests
//
// Each test binary only uses part of this module.
#![allow(dead_code)]

use loqa_coach::audio::{Microphone, MicrophoneError, MicrophoneProvider, SilentMicrophone};
use loqa_coach::coaching::CoachingCatalog;
use loqa_coach::llm::{LanguageModel, ModelError, ModelReply, ModelRequest, ModelSettings};
use loqa_coach::pipeline::{PipelineConfig, RequestPipeline};
use loqa_coach::session::{SessionConfig, SessionEvent, SessionServices};
use loqa_coach::speech::{
    RecognitionAlternative, RecognitionError, RecognizerEvent, RecognizerEvents,
    RecognizerFactory, SpeechConfig, SpeechRecognizer,
};
use loqa_coach::store::{MemoryStore, SessionStore};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;

// ============================================================================
// Language model
// ============================================================================

/// One scripted model response
#[derive(Debug, Clone)]
pub enum Step {
    Reply(String),
    Fail(ModelError),
    /// Answer with no content
    Empty,
    /// Answer after a delay
    Slow(Duration, String),
    /// Never answer within any sane timeout
    Hang,
}

/// Plays back scripted steps, then answers with the default reply
pub struct ScriptedModel {
    steps: Mutex<VecDeque<Step>>,
    default_reply: String,
    calls: AtomicUsize,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(steps: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            steps: Mutex::new(steps.into()),
            default_reply: "Let's keep going.".to_string(),
            calls: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn replying(replies: &[&str]) -> Arc<Self> {
        Self::new(replies.iter().map(|r| Step::Reply(r.to_string())).collect())
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl LanguageModel for ScriptedModel {
    async fn complete(&self, request: &ModelRequest) -> Result<ModelReply, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());

        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(ModelReply::assistant(self.default_reply.clone())),
            Some(Step::Reply(text)) => Ok(ModelReply::assistant(text)),
            Some(Step::Fail(error)) => Err(error),
            Some(Step::Empty) => Ok(ModelReply::assistant("   ")),
            Some(Step::Slow(delay, text)) => {
                tokio::time::sleep(delay).await;
                Ok(ModelReply::assistant(text))
            }
            Some(Step::Hang) => {
                tokio::time::sleep(Duration::from_secs(60)).await;
                Ok(ModelReply::assistant("too late"))
            }
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Pipeline settings small enough for tests
pub fn fast_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        timeout_ms: 100,
        max_attempts: 3,
        backoff_base_ms: 5,
        backoff_max_ms: 20,
        ..PipelineConfig::default()
    }
}

pub fn pipeline(model: Arc<ScriptedModel>) -> Arc<RequestPipeline> {
    Arc::new(RequestPipeline::new(
        model,
        ModelSettings::default(),
        fast_pipeline_config(),
    ))
}

// ============================================================================
// Speech recognition
// ============================================================================

#[derive(Default)]
struct RecognizerCounters {
    creates: AtomicUsize,
    starts: AtomicUsize,
    stops: AtomicUsize,
    failing_creates: AtomicUsize,
    failing_starts: AtomicUsize,
}

/// Recognizer factory whose instances are driven from the test
#[derive(Clone, Default)]
pub struct FakeRecognizers {
    counters: Arc<RecognizerCounters>,
    latest: Arc<Mutex<Option<RecognizerEvents>>>,
}

impl FakeRecognizers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn creates(&self) -> usize {
        self.counters.creates.load(Ordering::SeqCst)
    }

    pub fn starts(&self) -> usize {
        self.counters.starts.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.counters.stops.load(Ordering::SeqCst)
    }

    /// Make the next `n` creations fail
    pub fn fail_next_creates(&self, n: usize) {
        self.counters.failing_creates.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` starts fail
    pub fn fail_next_starts(&self, n: usize) {
        self.counters.failing_starts.store(n, Ordering::SeqCst);
    }

    /// Event sink of the most recently created recognizer
    pub fn events(&self) -> RecognizerEvents {
        self.latest
            .lock()
            .unwrap()
            .clone()
            .expect("no recognizer created yet")
    }

    pub fn emit(&self, event: RecognizerEvent) {
        assert!(self.events().emit(event), "adapter is gone");
    }

    pub fn emit_final(&self, text: &str) {
        self.emit(RecognizerEvent::Result {
            interim: None,
            finals: vec![RecognitionAlternative::new(text, 0.9)],
        });
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait::async_trait]
impl RecognizerFactory for FakeRecognizers {
    async fn create(
        &self,
        _session_id: &str,
        events: RecognizerEvents,
    ) -> Result<Box<dyn SpeechRecognizer>, RecognitionError> {
        if take_one(&self.counters.failing_creates) {
            return Err(RecognitionError::Create("scripted failure".to_string()));
        }
        self.counters.creates.fetch_add(1, Ordering::SeqCst);
        *self.latest.lock().unwrap() = Some(events);
        Ok(Box::new(FakeRecognizer {
            counters: self.counters.clone(),
        }))
    }

    fn name(&self) -> &str {
        "fake"
    }
}

struct FakeRecognizer {
    counters: Arc<RecognizerCounters>,
}

#[async_trait::async_trait]
impl SpeechRecognizer for FakeRecognizer {
    async fn start(&mut self) -> Result<(), RecognitionError> {
        if take_one(&self.counters.failing_starts) {
            return Err(RecognitionError::Start("scripted failure".to_string()));
        }
        self.counters.starts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), RecognitionError> {
        self.counters.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn name(&self) -> &str {
        "fake"
    }
}

/// Speech timings small enough for tests
pub fn fast_speech_config() -> SpeechConfig {
    SpeechConfig {
        silence_threshold_ms: 8_000,
        silence_check_interval_ms: 50,
        restart_delay_ms: 5,
        error_backoff_step_ms: 5,
        error_backoff_max_ms: 20,
        reinit_after_errors: 3,
        max_reinit_failures: 3,
        recovering_flag_ms: 50,
    }
}

// ============================================================================
// Microphone
// ============================================================================

/// Silent microphones, or a scripted access failure
pub struct FakeMicrophones {
    failure: Option<MicrophoneError>,
}

impl FakeMicrophones {
    pub fn working() -> Arc<Self> {
        Arc::new(Self { failure: None })
    }

    pub fn failing(error: MicrophoneError) -> Arc<Self> {
        Arc::new(Self {
            failure: Some(error),
        })
    }
}

#[async_trait::async_trait]
impl MicrophoneProvider for FakeMicrophones {
    async fn open(&self, _session_id: &str) -> Result<Box<dyn Microphone>, MicrophoneError> {
        match &self.failure {
            Some(error) => Err(error.clone()),
            None => Ok(Box::new(SilentMicrophone::default())),
        }
    }
}

// ============================================================================
// Services
// ============================================================================

pub struct Harness {
    pub services: Arc<SessionServices>,
    pub store: Arc<MemoryStore>,
    pub model: Arc<ScriptedModel>,
    pub recognizers: FakeRecognizers,
}

pub struct HarnessBuilder {
    model: Arc<ScriptedModel>,
    recognizers: Option<Arc<dyn RecognizerFactory>>,
    microphones: Arc<dyn MicrophoneProvider>,
    session: SessionConfig,
}

impl HarnessBuilder {
    pub fn new(model: Arc<ScriptedModel>) -> Self {
        Self {
            model,
            recognizers: None,
            microphones: FakeMicrophones::working(),
            session: SessionConfig {
                reply_cooldown_ms: 20,
                summarize_on_disconnect: true,
                greet_on_start: false,
                event_buffer: 256,
            },
        }
    }

    pub fn recognizers(mut self, factory: Arc<dyn RecognizerFactory>) -> Self {
        self.recognizers = Some(factory);
        self
    }

    pub fn microphones(mut self, provider: Arc<dyn MicrophoneProvider>) -> Self {
        self.microphones = provider;
        self
    }

    pub fn session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    pub fn build(self) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let fake = FakeRecognizers::new();
        let recognizers = self
            .recognizers
            .unwrap_or_else(|| Arc::new(fake.clone()) as Arc<dyn RecognizerFactory>);

        let services = SessionServices {
            store: store.clone() as Arc<dyn SessionStore>,
            pipeline: pipeline(self.model.clone()),
            recognizers,
            microphones: self.microphones,
            frame_sink: None,
            catalog: Arc::new(CoachingCatalog::builtin()),
            speech: fast_speech_config(),
            session: self.session,
            recordings_dir: None,
        };

        Harness {
            services: Arc::new(services),
            store,
            model: self.model,
            recognizers: fake,
        }
    }
}

pub fn harness(model: Arc<ScriptedModel>) -> Harness {
    HarnessBuilder::new(model).build()
}

// ============================================================================
// Events
// ============================================================================

/// Collect session events until one matches, or fail after two seconds
pub async fn collect_until(
    rx: &mut broadcast::Receiver<SessionEvent>,
    mut done: impl FnMut(&SessionEvent) -> bool,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        let event = tokio::time::timeout_at(deadline, rx.recv())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for event; saw {:?}", seen))
            .expect("event channel closed");
        let finished = done(&event);
        seen.push(event);
        if finished {
            return seen;
        }
    }
}

/// Poll until the condition holds, or fail after two seconds
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "condition not met in time"
        );
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
