/// Default fraction of shared words above which two replies count as repeats
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.7;

/// Appended to a reply that closely repeats the previous one
pub const CLARIFICATION: &str =
    "\n\nIs there a specific aspect of this you'd like me to explain differently or in more detail?";

/// Whether `next` is a near-repeat of `previous`.
///
/// Replies whose character length differs by more than 40% of the previous
/// reply, or whose word counts differ by more than half of the smaller count,
/// are never similar.
pub fn is_too_similar(previous: &str, next: &str, threshold: f64) -> bool {
    if previous.is_empty() || next.is_empty() {
        return false;
    }

    let prev_len = previous.chars().count() as f64;
    let next_len = next.chars().count() as f64;
    if (prev_len - next_len).abs() > prev_len * 0.4 {
        return false;
    }

    let previous = previous.to_lowercase();
    let next = next.to_lowercase();
    let prev_words: Vec<&str> = previous.split_whitespace().collect();
    let next_words: Vec<&str> = next.split_whitespace().collect();
    if prev_words.is_empty() || next_words.is_empty() {
        return false;
    }

    let (p, n) = (prev_words.len() as f64, next_words.len() as f64);
    if (p - n).abs() > p.min(n) * 0.5 {
        return false;
    }

    let common = next_words
        .iter()
        .filter(|w| prev_words.contains(w))
        .count() as f64;
    common / p.max(n) > threshold
}
