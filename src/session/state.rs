use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of a coaching session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    Connecting,
    Listening,
    AwaitingModel,
    Paused,
    Ended,
    Error,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Listening => "listening",
            SessionState::AwaitingModel => "awaiting_model",
            SessionState::Paused => "paused",
            SessionState::Ended => "ended",
            SessionState::Error => "error",
        }
    }

    /// Whether `next` is a legal transition from `self`
    pub fn can_transition_to(&self, next: SessionState) -> bool {
        use SessionState::*;

        match (*self, next) {
            (Ended, _) => false,
            (_, Ended) | (_, Error) => true,
            (Idle, Connecting) | (Error, Connecting) => true,
            (Connecting, Listening) => true,
            (Listening, AwaitingModel) | (Listening, Paused) => true,
            (AwaitingModel, Listening) | (AwaitingModel, Paused) => true,
            (Paused, Listening) | (Paused, AwaitingModel) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        *self == SessionState::Ended
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::SessionState::*;

    #[test]
    fn test_happy_path_transitions() {
        assert!(Idle.can_transition_to(Connecting));
        assert!(Connecting.can_transition_to(Listening));
        assert!(Listening.can_transition_to(AwaitingModel));
        assert!(AwaitingModel.can_transition_to(Listening));
        assert!(Paused.can_transition_to(AwaitingModel));
    }

    #[test]
    fn test_illegal_transitions() {
        assert!(!Idle.can_transition_to(Listening));
        assert!(!Connecting.can_transition_to(AwaitingModel));
        assert!(!Paused.can_transition_to(Connecting));
        assert!(!Ended.can_transition_to(Ended));
        assert!(!Ended.can_transition_to(Connecting));
    }

    #[test]
    fn test_end_and_error_from_anywhere() {
        for state in [Idle, Connecting, Listening, AwaitingModel, Paused, Error] {
            assert!(state.can_transition_to(Ended));
            assert!(state.can_transition_to(Error));
        }
        assert!(Error.can_transition_to(Connecting));
    }
}
