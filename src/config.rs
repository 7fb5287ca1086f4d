use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::PathBuf;

use crate::audio::CaptureConfig;
use crate::coaching::CoachingOption;
use crate::llm::ModelSettings;
use crate::pipeline::PipelineConfig;
use crate::session::SessionConfig;
use crate::speech::SpeechConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub speech: SpeechConfig,
    pub session: SessionConfig,
    pub storage: StorageConfig,
    pub audio: AudioConfig,
    pub coaching: CoachingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "loqa-coach".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    pub enabled: bool,
    pub url: String,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: "nats://localhost:4222".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// OpenAI-compatible API root
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    /// Sent as `HTTP-Referer` / `X-Title` when set
    pub referer: Option<String>,
    pub title: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub presence_penalty: f32,
    pub frequency_penalty: f32,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let defaults = ModelSettings::default();
        Self {
            base_url: "https://openrouter.ai/api/v1".to_string(),
            api_key_env: "OPENROUTER_API_KEY".to_string(),
            referer: None,
            title: Some("loqa-coach".to_string()),
            model: defaults.model,
            temperature: defaults.temperature,
            max_tokens: defaults.max_tokens,
            presence_penalty: defaults.presence_penalty,
            frequency_penalty: defaults.frequency_penalty,
        }
    }
}

impl LlmConfig {
    pub fn settings(&self) -> ModelSettings {
        ModelSettings {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            presence_penalty: self.presence_penalty,
            frequency_penalty: self.frequency_penalty,
        }
    }

    pub fn api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.loqa-coach/data".to_string(),
        }
    }
}

impl StorageConfig {
    pub fn data_path(&self) -> Result<PathBuf> {
        expand_path(&self.data_dir)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Empty disables session recordings
    pub recordings_path: String,
    /// Replay this file as the microphone instead of staying silent
    pub input_file: Option<String>,
    pub sample_rate: u32,
    pub channels: u16,
    pub frame_duration_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        let capture = CaptureConfig::default();
        Self {
            recordings_path: "~/.loqa-coach/recordings".to_string(),
            input_file: None,
            sample_rate: capture.sample_rate,
            channels: capture.channels,
            frame_duration_ms: capture.frame_duration_ms,
        }
    }
}

impl AudioConfig {
    pub fn capture(&self) -> CaptureConfig {
        CaptureConfig {
            sample_rate: self.sample_rate,
            channels: self.channels,
            frame_duration_ms: self.frame_duration_ms,
        }
    }

    pub fn recordings_dir(&self) -> Result<Option<PathBuf>> {
        if self.recordings_path.trim().is_empty() {
            return Ok(None);
        }
        expand_path(&self.recordings_path).map(Some)
    }
}

/// Replaces the built-in coaching options when non-empty
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    pub options: Vec<CoachingOption>,
}

impl Config {
    /// Load `path` (any format the config crate supports, extension
    /// optional) layered with `LOQA_COACH__SECTION__KEY` variables. A missing
    /// file yields the defaults.
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("LOQA_COACH")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to load config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}

pub fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw).with_context(|| format!("Failed to expand path: {}", raw))?;
    Ok(PathBuf::from(expanded.as_ref()))
}
