//! Text normalization for repeat detection.
//!
//! Two player inputs that differ only in case, punctuation, or whitespace
//! runs map to the same key. This is deliberately literal: paraphrases are
//! different keys.

/// Normalize player text into a repeat-detection key.
///
/// Lowercases, strips everything outside ASCII `[a-z0-9 ]`, collapses
/// whitespace runs to a single space, and trims. Total over all inputs.
pub fn normalize(text: &str) -> String {
    let kept: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();

    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}
