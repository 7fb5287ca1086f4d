//! Coaching session management
//!
//! This module provides the `CoachingSession` abstraction that manages:
//! - The session lifecycle (`SessionState`) and its legal transitions
//! - Speech capture through the adapter, including the microphone tap
//! - The conversation buffer and model requests for each user turn
//! - Usage accounting, persistence flushes and end-of-session feedback

mod config;
mod error;
mod events;
mod services;
#[allow(clippy::module_inception)]
mod session;
mod state;
mod stats;

pub use config::SessionConfig;
pub use error::SessionError;
pub use events::{DisconnectReport, SessionEvent};
pub use services::SessionServices;
pub use session::{CoachingSession, NewSession};
pub use state::SessionState;
pub use stats::SessionStatus;
