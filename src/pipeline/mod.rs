//! Request pipeline
//!
//! Turns a conversation into exactly one assistant message: system prompt
//! assembly, per-attempt timeout, retry with backoff, content validation,
//! repeat suppression, canned fallbacks and a short-lived request cache.

mod cache;
pub mod fallback;
mod request;
mod similarity;

pub use cache::{CacheKey, Clock, RequestCache, SystemClock, KEY_CONTENT_CHARS};
pub use request::{
    suppress_repeats, PipelineConfig, PipelineReply, ReplyOutcome, RequestPipeline, TurnRequest,
};
pub use similarity::{is_too_similar, CLARIFICATION, DEFAULT_SIMILARITY_THRESHOLD};
