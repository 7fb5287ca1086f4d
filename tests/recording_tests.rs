// Integration tests for session audio recording
//
// These tests verify that captured frames are written to a WAV file and
// forwarded to the frame sink only while the tap is enabled.

mod common;

use anyhow::Result;
use common::eventually;
use loqa_coach::audio::{AudioFrame, AudioTap, FrameSink, SessionRecorder, SilentMicrophone};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

fn frame(index: u64) -> AudioFrame {
    // 100ms of 16kHz mono
    AudioFrame {
        samples: vec![index as i16; 1600],
        sample_rate: 16000,
        channels: 1,
        timestamp_ms: index * 100,
    }
}

#[derive(Default)]
struct RecordingSink {
    sequences: Mutex<Vec<u32>>,
    finished: Mutex<Option<u32>>,
}

impl RecordingSink {
    fn count(&self) -> usize {
        self.sequences.lock().unwrap().len()
    }
}

#[async_trait::async_trait]
impl FrameSink for RecordingSink {
    async fn send_frame(&self, _session_id: &str, _frame: &AudioFrame, sequence: u32) -> Result<()> {
        self.sequences.lock().unwrap().push(sequence);
        Ok(())
    }

    async fn finish(&self, _session_id: &str, sequence: u32) -> Result<()> {
        *self.finished.lock().unwrap() = Some(sequence);
        Ok(())
    }
}

#[test]
fn test_recorder_writes_wav() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let mut recorder = SessionRecorder::new(temp_dir.path(), "session-1")?;

    for i in 0..50 {
        recorder.write_frame(&frame(i))?;
    }
    let metadata = recorder.finish()?.expect("recording metadata");

    assert_eq!(metadata.sample_count, 50 * 1600);
    assert_eq!(metadata.start_ms, 0);
    assert_eq!(metadata.end_ms, 4900);
    assert!(metadata.file_path.exists());
    assert!(metadata
        .file_path
        .file_name()
        .unwrap()
        .to_string_lossy()
        .starts_with("session-1-"));

    let reader = hound::WavReader::open(&metadata.file_path)?;
    assert_eq!(reader.spec().sample_rate, 16000);
    assert_eq!(reader.spec().channels, 1);
    assert_eq!(reader.len() as usize, 50 * 1600);
    Ok(())
}

#[test]
fn test_recorder_without_audio_creates_nothing() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let recorder = SessionRecorder::new(temp_dir.path(), "empty")?;

    assert!(recorder.finish()?.is_none());
    assert_eq!(std::fs::read_dir(temp_dir.path())?.count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_tap_forwards_only_while_enabled() -> Result<()> {
    let temp_dir = TempDir::new()?;
    let sink = Arc::new(RecordingSink::default());
    let recorder = SessionRecorder::new(temp_dir.path(), "tap")?;
    let (tx, rx) = mpsc::channel(16);

    let mut tap = AudioTap::spawn(
        "tap".to_string(),
        Box::new(SilentMicrophone::default()),
        rx,
        Some(sink.clone() as Arc<dyn FrameSink>),
        Some(recorder),
    );

    for i in 0..3 {
        tx.send(frame(i)).await?;
    }
    eventually(|| sink.count() == 3).await;

    tap.set_enabled(false);
    tx.send(frame(3)).await?;
    tx.send(frame(4)).await?;
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(sink.count(), 3);

    tap.set_enabled(true);
    tx.send(frame(5)).await?;
    eventually(|| sink.count() == 4).await;

    let metadata = tap.shutdown().await.expect("recording metadata");
    assert_eq!(metadata.sample_count, 4 * 1600);
    assert_eq!(*sink.sequences.lock().unwrap(), vec![0, 1, 2, 3]);
    assert_eq!(*sink.finished.lock().unwrap(), Some(4));
    Ok(())
}
