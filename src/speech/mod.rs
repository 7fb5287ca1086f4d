//! Speech capture
//!
//! - `recognizer` - recognition capability traits and events
//! - `segment` - transcript segments with synthesized word timings
//! - `adapter` - restart/recovery/silence logic around a recognizer

pub mod adapter;
pub mod recognizer;
pub mod segment;

pub use adapter::{AdapterChannels, AdapterEvent, AdapterTimer, SpeechCaptureAdapter, SpeechConfig};
pub use recognizer::{
    ErrorClass, RecognitionAlternative, RecognitionError, RecognitionErrorKind, RecognizerEvent,
    RecognizerEvents, RecognizerFactory, SpeechRecognizer, TaggedEvent, UnsupportedRecognizerFactory,
};
pub use segment::{
    synthesize_words, SegmentKind, TranscriptLog, TranscriptSegment, WordTiming, FINAL_SPAN_MS,
    PARTIAL_SPAN_MS, WORD_SLOT_MS,
};
