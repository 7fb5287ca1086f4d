//! Conversation log
//!
//! Messages flow in from finalized transcripts and model replies and out to
//! the model (as context) and persistence. The buffer keeps the log flat,
//! free of duplicate turns and bounded in size, whatever shape the hydrated
//! data had.

mod buffer;
mod message;

pub use buffer::{
    cap, dedup, flatten, has_exchange, sanitize, sanitize_messages, ConversationBuffer,
    DEFAULT_CONTEXT_WINDOW, MAX_MESSAGES,
};
pub use message::{Message, Role};
