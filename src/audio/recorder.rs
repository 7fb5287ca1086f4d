use anyhow::{Context, Result};
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::microphone::AudioFrame;

/// Finished session recording
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordingMetadata {
    pub file_path: PathBuf,
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_count: usize,
    /// Capture offset of the first and last frame written
    pub start_ms: u64,
    pub end_ms: u64,
}

impl RecordingMetadata {
    pub fn duration_secs(&self) -> f64 {
        self.sample_count as f64 / (self.sample_rate as f64 * self.channels.max(1) as f64)
    }
}

/// Writes a session's microphone audio to `{session}-{timestamp}.wav`
///
/// The WAV file is created on the first frame so that sessions without
/// audio leave nothing behind.
pub struct SessionRecorder {
    output_dir: PathBuf,
    session_id: String,
    writer: Option<hound::WavWriter<BufWriter<File>>>,
    metadata: Option<RecordingMetadata>,
}

impl SessionRecorder {
    pub fn new(output_dir: impl Into<PathBuf>, session_id: impl Into<String>) -> Result<Self> {
        let output_dir = output_dir.into();
        fs::create_dir_all(&output_dir).context("Failed to create recordings directory")?;

        Ok(Self {
            output_dir,
            session_id: session_id.into(),
            writer: None,
            metadata: None,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn write_frame(&mut self, frame: &AudioFrame) -> Result<()> {
        if self.writer.is_none() {
            self.open(frame)?;
        }

        if let Some(writer) = &mut self.writer {
            for &sample in &frame.samples {
                writer
                    .write_sample(sample)
                    .context("Failed to write sample to WAV")?;
            }
        }
        if let Some(meta) = &mut self.metadata {
            meta.end_ms = frame.timestamp_ms;
            meta.sample_count += frame.samples.len();
        }
        Ok(())
    }

    fn open(&mut self, frame: &AudioFrame) -> Result<()> {
        let file_path = self.output_dir.join(format!(
            "{}-{}.wav",
            self.session_id,
            chrono::Utc::now().format("%Y%m%dT%H%M%S")
        ));

        let spec = hound::WavSpec {
            channels: frame.channels,
            sample_rate: frame.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let writer = hound::WavWriter::create(&file_path, spec)
            .with_context(|| format!("Failed to create WAV file: {:?}", file_path))?;

        info!("Recording session {} to {}", self.session_id, file_path.display());

        self.writer = Some(writer);
        self.metadata = Some(RecordingMetadata {
            file_path,
            sample_rate: frame.sample_rate,
            channels: frame.channels,
            sample_count: 0,
            start_ms: frame.timestamp_ms,
            end_ms: frame.timestamp_ms,
        });
        Ok(())
    }

    /// Finalize the WAV header. `None` when no audio was written.
    pub fn finish(mut self) -> Result<Option<RecordingMetadata>> {
        if let Some(writer) = self.writer.take() {
            writer.finalize().context("Failed to finalize WAV file")?;
        }
        if let Some(meta) = &self.metadata {
            info!(
                "Recording complete: {} ({:.1}s, {} samples)",
                meta.file_path.display(),
                meta.duration_secs(),
                meta.sample_count
            );
        }
        Ok(self.metadata.take())
    }
}

impl Drop for SessionRecorder {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            if let Err(e) = writer.finalize() {
                warn!("Failed to finalize WAV writer on drop: {}", e);
            }
        }
    }
}
