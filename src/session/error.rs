use super::state::SessionState;
use crate::audio::MicrophoneError;
use crate::speech::RecognitionError;
use crate::store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("{}", .0.remediation())]
    Microphone(#[from] MicrophoneError),

    #[error("Speech recognition is not supported in this environment.")]
    RecognitionUnsupported,

    #[error("speech recognition failed: {0}")]
    Recognition(RecognitionError),

    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: SessionState,
    },

    #[error("unknown coaching option: {0}")]
    UnknownCoachingOption(String),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("session is closed")]
    Closed,
}

impl From<RecognitionError> for SessionError {
    fn from(err: RecognitionError) -> Self {
        match err {
            RecognitionError::Unsupported => SessionError::RecognitionUnsupported,
            other => SessionError::Recognition(other),
        }
    }
}
