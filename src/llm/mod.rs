//! Language-generation service boundary
//!
//! - `LanguageModel` - trait the request pipeline calls
//! - `OpenAiCompatibleClient` - chat-completions over HTTP
//! - `ModelError` - transport/validation failures, classified for retry

mod client;
mod error;
mod openai;

pub use client::{LanguageModel, ModelReply, ModelRequest, ModelSettings};
pub use error::ModelError;
pub use openai::OpenAiCompatibleClient;
