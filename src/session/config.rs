use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Per-session behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Pause between appending a reply and listening again
    pub reply_cooldown_ms: u64,

    /// Generate feedback when the session is disconnected
    pub summarize_on_disconnect: bool,

    /// Greet the user when a session starts with an empty conversation
    pub greet_on_start: bool,

    /// Capacity of the session event broadcast
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            reply_cooldown_ms: 800,
            summarize_on_disconnect: true,
            greet_on_start: true,
            event_buffer: 64,
        }
    }
}

impl SessionConfig {
    pub fn reply_cooldown(&self) -> Duration {
        Duration::from_millis(self.reply_cooldown_ms)
    }
}
