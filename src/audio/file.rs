use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::microphone::{AudioFrame, CaptureConfig, Microphone, MicrophoneError};

/// Decoded audio clip
pub struct AudioClip {
    pub sample_rate: u32,
    pub channels: u16,
    /// Interleaved i16 PCM
    pub samples: Vec<i16>,
}

impl AudioClip {
    /// Decode any format symphonia can probe (WAV, MP3, FLAC, OGG, ...)
    pub fn decode(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Decoding audio file: {}", path.display());

        let file = std::fs::File::open(path)
            .with_context(|| format!("Failed to open audio file: {}", path.display()))?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
            .context("Unsupported audio container")?;
        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .context("No decodable audio track")?;
        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.context("Unknown sample rate")?;
        let channels = track
            .codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .context("Unsupported audio codec")?;

        let mut samples = Vec::new();
        while let Ok(packet) = format.next_packet() {
            if packet.track_id() != track_id {
                continue;
            }
            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut buf = SampleBuffer::<i16>::new(decoded.capacity() as u64, *decoded.spec());
                    buf.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buf.samples());
                }
                Err(symphonia::core::errors::Error::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                }
                Err(e) => return Err(e).context("Audio decode failed"),
            }
        }

        info!(
            "Audio file decoded: {}Hz, {} channels, {} samples",
            sample_rate,
            channels,
            samples.len()
        );

        Ok(Self {
            sample_rate,
            channels,
            samples,
        })
    }

    /// Downmix to mono and resample (linear interpolation) to `target_rate`
    pub fn to_mono(&self, target_rate: u32) -> Vec<i16> {
        let channels = self.channels.max(1) as usize;
        let mono: Vec<i16> = self
            .samples
            .chunks(channels)
            .map(|frame| {
                let sum: i32 = frame.iter().map(|&s| s as i32).sum();
                (sum / frame.len() as i32) as i16
            })
            .collect();

        if self.sample_rate == target_rate || mono.is_empty() {
            return mono;
        }

        let ratio = self.sample_rate as f64 / target_rate as f64;
        let out_len = (mono.len() as f64 / ratio).floor() as usize;
        (0..out_len)
            .map(|i| {
                let pos = i as f64 * ratio;
                let idx = pos as usize;
                let frac = pos - idx as f64;
                let a = mono[idx] as f64;
                let b = *mono.get(idx + 1).unwrap_or(&mono[idx]) as f64;
                (a + (b - a) * frac).round() as i16
            })
            .collect()
    }
}

/// Replays an audio file as if it were a live microphone
pub struct FileMicrophone {
    path: PathBuf,
    config: CaptureConfig,
    task: Option<JoinHandle<()>>,
}

impl FileMicrophone {
    pub fn new(path: PathBuf, config: CaptureConfig) -> Self {
        Self {
            path,
            config,
            task: None,
        }
    }
}

#[async_trait::async_trait]
impl Microphone for FileMicrophone {
    async fn acquire(&mut self) -> Result<mpsc::Receiver<AudioFrame>, MicrophoneError> {
        if self.task.is_some() {
            return Err(MicrophoneError::Busy);
        }

        let path = self.path.clone();
        let clip = tokio::task::spawn_blocking(move || AudioClip::decode(path))
            .await
            .map_err(|e| MicrophoneError::Other(e.to_string()))?
            .map_err(|e| MicrophoneError::Other(format!("{:#}", e)))?;

        let rate = self.config.sample_rate;
        let samples = clip.to_mono(rate);
        let frame_ms = self.config.frame_duration_ms.max(10);
        let frame_len = (rate as u64 * frame_ms / 1000) as usize;

        let (tx, rx) = mpsc::channel(32);
        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for (i, chunk) in samples.chunks(frame_len.max(1)).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: chunk.to_vec(),
                    sample_rate: rate,
                    channels: 1,
                    timestamp_ms: i as u64 * frame_ms,
                };
                if tx.send(frame).await.is_err() {
                    debug!("Frame receiver closed; stopping file replay");
                    return;
                }
            }
            info!("File replay finished");
        }));

        Ok(rx)
    }

    async fn release(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }

    fn is_capturing(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn name(&self) -> &str {
        "file"
    }
}
