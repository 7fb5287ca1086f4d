use super::config::SessionConfig;
use crate::audio::{AudioInput, FrameSink, MicrophoneFactory, MicrophoneProvider};
use crate::coaching::CoachingCatalog;
use crate::config::{expand_path, Config};
use crate::llm::OpenAiCompatibleClient;
use crate::nats::{NatsClient, NatsRecognizerFactory};
use crate::pipeline::RequestPipeline;
use crate::speech::{RecognizerFactory, SpeechConfig, UnsupportedRecognizerFactory};
use crate::store::{JsonFileStore, SessionStore};
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Collaborators shared by every session in the process
pub struct SessionServices {
    pub store: Arc<dyn SessionStore>,
    pub pipeline: Arc<RequestPipeline>,
    pub recognizers: Arc<dyn RecognizerFactory>,
    pub microphones: Arc<dyn MicrophoneProvider>,
    /// Where captured audio is forwarded (the STT service)
    pub frame_sink: Option<Arc<dyn FrameSink>>,
    pub catalog: Arc<CoachingCatalog>,
    pub speech: SpeechConfig,
    pub session: SessionConfig,
    /// `None` disables WAV recordings
    pub recordings_dir: Option<PathBuf>,
}

impl SessionServices {
    /// Wire the production collaborators from configuration
    pub async fn from_config(cfg: &Config) -> Result<Self> {
        let data_dir = cfg.storage.data_path()?;
        let store = JsonFileStore::open(&data_dir)
            .await
            .with_context(|| format!("Failed to open data directory {}", data_dir.display()))?;

        let model = OpenAiCompatibleClient::new(&cfg.llm.base_url, cfg.llm.api_key())?
            .with_attribution(cfg.llm.referer.clone(), cfg.llm.title.clone());
        let pipeline = RequestPipeline::new(Arc::new(model), cfg.llm.settings(), cfg.pipeline.clone());

        let (recognizers, frame_sink): (Arc<dyn RecognizerFactory>, Option<Arc<dyn FrameSink>>) =
            if cfg.nats.enabled {
                match NatsClient::connect(&cfg.nats.url).await {
                    Ok(client) => {
                        let client = Arc::new(client);
                        (
                            Arc::new(NatsRecognizerFactory::new(client.clone())),
                            Some(client as Arc<dyn FrameSink>),
                        )
                    }
                    Err(e) => {
                        warn!("NATS unavailable, speech recognition disabled: {:#}", e);
                        (Arc::new(UnsupportedRecognizerFactory), None)
                    }
                }
            } else {
                info!("NATS disabled; speech recognition unavailable");
                (Arc::new(UnsupportedRecognizerFactory), None)
            };

        let input = match &cfg.audio.input_file {
            Some(path) => AudioInput::File(expand_path(path)?),
            None => AudioInput::Silent,
        };
        let microphones = MicrophoneFactory::new(input, cfg.audio.capture());

        Ok(Self {
            store: Arc::new(store),
            pipeline: Arc::new(pipeline),
            recognizers,
            microphones: Arc::new(microphones),
            frame_sink,
            catalog: Arc::new(CoachingCatalog::with_options(cfg.coaching.options.clone())),
            speech: cfg.speech.clone(),
            session: cfg.session.clone(),
            recordings_dir: cfg.audio.recordings_dir()?,
        })
    }
}
