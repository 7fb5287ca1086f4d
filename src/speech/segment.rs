use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Width of a synthesized word slot
pub const WORD_SLOT_MS: u64 = 50;

/// Audio span attributed to a partial segment
pub const PARTIAL_SPAN_MS: u64 = 1_000;

/// Audio span attributed to a final segment
pub const FINAL_SPAN_MS: u64 = 2_000;

/// Finals retained by a transcript log, oldest dropped first
pub const MAX_FINALS: usize = crate::conversation::MAX_MESSAGES;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Partial,
    Final,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordTiming {
    pub word: String,
    pub start_ms: u64,
    pub end_ms: u64,
    pub confidence: f32,
}

/// Evenly spaced word slots ending at `now_ms`
pub fn synthesize_words(text: &str, now_ms: u64, confidence: f32) -> Vec<WordTiming> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let n = words.len() as u64;
    words
        .into_iter()
        .enumerate()
        .map(|(i, word)| {
            let start_ms = now_ms.saturating_sub((n - i as u64) * WORD_SLOT_MS);
            WordTiming {
                word: word.to_string(),
                start_ms,
                end_ms: start_ms + WORD_SLOT_MS,
                confidence,
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptSegment {
    pub kind: SegmentKind,
    pub text: String,
    pub words: Vec<WordTiming>,
    pub created_at: DateTime<Utc>,
    pub confidence: f32,
    pub audio_start_ms: u64,
    pub audio_end_ms: u64,
}

impl TranscriptSegment {
    /// `now_ms` is the audio offset since capture started
    pub fn new(kind: SegmentKind, text: &str, confidence: f32, now_ms: u64) -> Self {
        let span = match kind {
            SegmentKind::Partial => PARTIAL_SPAN_MS,
            SegmentKind::Final => FINAL_SPAN_MS,
        };
        let text = text.trim();
        Self {
            kind,
            text: text.to_string(),
            words: synthesize_words(text, now_ms, confidence),
            created_at: Utc::now(),
            confidence,
            audio_start_ms: now_ms.saturating_sub(span),
            audio_end_ms: now_ms,
        }
    }

    pub fn is_final(&self) -> bool {
        self.kind == SegmentKind::Final
    }
}

/// Finals in arrival order plus at most one live partial
#[derive(Debug, Clone, Default, Serialize)]
pub struct TranscriptLog {
    pub finals: Vec<TranscriptSegment>,
    pub partial: Option<TranscriptSegment>,
}

impl TranscriptLog {
    pub fn set_partial(&mut self, segment: TranscriptSegment) {
        self.partial = Some(segment);
    }

    pub fn push_final(&mut self, segment: TranscriptSegment) {
        self.partial = None;
        self.finals.push(segment);
        if self.finals.len() > MAX_FINALS {
            let excess = self.finals.len() - MAX_FINALS;
            self.finals.drain(..excess);
        }
    }

    pub fn clear_partial(&mut self) {
        self.partial = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_words_end_at_now() {
        let words = synthesize_words("one two three", 1_000, 0.9);
        assert_eq!(words.len(), 3);
        assert_eq!(words[0].start_ms, 850);
        assert_eq!(words[2].start_ms, 950);
        assert_eq!(words[2].end_ms, 1_000);
        assert!(words.iter().all(|w| (w.confidence - 0.9).abs() < f32::EPSILON));
    }

    #[test]
    fn test_words_near_start_saturate() {
        let words = synthesize_words("a b c", 60, 1.0);
        assert_eq!(words[0].start_ms, 0);
        assert_eq!(words[2].start_ms, 10);
    }

    #[test]
    fn test_final_clears_partial() {
        let mut log = TranscriptLog::default();
        log.set_partial(TranscriptSegment::new(SegmentKind::Partial, "hel", 0.5, 500));
        log.set_partial(TranscriptSegment::new(SegmentKind::Partial, "hello", 0.6, 700));
        assert_eq!(log.partial.as_ref().map(|p| p.text.as_str()), Some("hello"));

        log.push_final(TranscriptSegment::new(SegmentKind::Final, " hello there ", 0.9, 3_000));
        assert!(log.partial.is_none());
        assert_eq!(log.finals[0].text, "hello there");
        assert_eq!(log.finals[0].audio_start_ms, 1_000);
    }

    #[test]
    fn test_finals_are_capped_oldest_first() {
        let mut log = TranscriptLog::default();
        for i in 0..MAX_FINALS + 5 {
            log.push_final(TranscriptSegment::new(SegmentKind::Final, &format!("turn {i}"), 0.9, 0));
        }
        assert_eq!(log.finals.len(), MAX_FINALS);
        assert_eq!(log.finals[0].text, "turn 5");
        assert_eq!(log.finals.last().unwrap().text, format!("turn {}", MAX_FINALS + 4));
    }
}
