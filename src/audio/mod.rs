pub mod file;
pub mod microphone;
pub mod recorder;
pub mod tap;

pub use file::{AudioClip, FileMicrophone};
pub use microphone::{
    AudioFrame, AudioInput, CaptureConfig, Microphone, MicrophoneError, MicrophoneFactory,
    MicrophoneProvider, SilentMicrophone,
};
pub use recorder::{RecordingMetadata, SessionRecorder};
pub use tap::{AudioTap, FrameSink};
