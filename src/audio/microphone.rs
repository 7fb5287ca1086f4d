use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::sync::mpsc;
use tracing::info;

use super::file::FileMicrophone;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
}

impl AudioFrame {
    /// Little-endian PCM bytes, as published to the STT service
    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.samples.iter().flat_map(|s| s.to_le_bytes()).collect()
    }

    pub fn duration_ms(&self) -> u64 {
        let per_channel = self.samples.len() as u64 / self.channels.max(1) as u64;
        per_channel * 1000 / self.sample_rate.max(1) as u64
    }
}

/// Why microphone access failed
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MicrophoneError {
    #[error("microphone access denied")]
    Denied,

    #[error("no microphone device found")]
    NotFound,

    #[error("microphone is busy")]
    Busy,

    #[error("microphone error: {0}")]
    Other(String),
}

impl MicrophoneError {
    /// Actionable text shown to the user
    pub fn remediation(&self) -> String {
        let detail = match self {
            MicrophoneError::Denied => "Please allow microphone access in your settings.".to_string(),
            MicrophoneError::NotFound => "No microphone device found.".to_string(),
            MicrophoneError::Busy => {
                "Microphone is already in use by another application.".to_string()
            }
            MicrophoneError::Other(message) if !message.is_empty() => message.clone(),
            MicrophoneError::Other(_) => "Please check your audio settings.".to_string(),
        };
        format!("Failed to access microphone. {}", detail)
    }
}

/// Capture format delivered to the tap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Target sample rate (16kHz for the STT service)
    pub sample_rate: u32,
    /// Target channel count (1 = mono)
    pub channels: u16,
    /// Frame size in milliseconds (affects latency)
    pub frame_duration_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            frame_duration_ms: 100,
        }
    }
}

/// Microphone stream owned by a session
#[async_trait::async_trait]
pub trait Microphone: Send + Sync {
    /// Start capturing; frames arrive on the returned receiver
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, MicrophoneError>;

    /// Stop capturing and release the device
    async fn release(&mut self);

    fn is_capturing(&self) -> bool;

    fn name(&self) -> &str;
}

/// Opens a microphone for a session
#[async_trait::async_trait]
pub trait MicrophoneProvider: Send + Sync {
    async fn open(&self, session_id: &str) -> Result<Box<dyn Microphone>, MicrophoneError>;
}

/// Microphone that never produces frames (speech arrives from elsewhere,
/// e.g. an STT service fed by another client)
#[derive(Default)]
pub struct SilentMicrophone {
    tx: Option<mpsc::Sender<AudioFrame>>,
}

#[async_trait::async_trait]
impl Microphone for SilentMicrophone {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, MicrophoneError> {
        if self.tx.is_some() {
            return Err(MicrophoneError::Busy);
        }
        let (tx, rx) = mpsc::channel(1);
        self.tx = Some(tx);
        Ok(rx)
    }

    async fn release(&mut self) {
        self.tx = None;
    }

    fn is_capturing(&self) -> bool {
        self.tx.is_some()
    }

    fn name(&self) -> &str {
        "silent"
    }
}

/// Audio input source
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioInput {
    /// No local capture
    Silent,
    /// Replay an audio file in real time (testing/demos)
    File(PathBuf),
}

/// Microphone provider driven by configuration
pub struct MicrophoneFactory {
    input: AudioInput,
    capture: CaptureConfig,
}

impl MicrophoneFactory {
    pub fn new(input: AudioInput, capture: CaptureConfig) -> Self {
        Self { input, capture }
    }
}

#[async_trait::async_trait]
impl MicrophoneProvider for MicrophoneFactory {
    async fn open(&self, session_id: &str) -> Result<Box<dyn Microphone>, MicrophoneError> {
        match &self.input {
            AudioInput::Silent => {
                info!("Session {}: using silent microphone", session_id);
                Ok(Box::new(SilentMicrophone::default()))
            }
            AudioInput::File(path) => {
                if !path.exists() {
                    return Err(MicrophoneError::NotFound);
                }
                info!("Session {}: replaying {}", session_id, path.display());
                Ok(Box::new(FileMicrophone::new(path.clone(), self.capture.clone())))
            }
        }
    }
}
