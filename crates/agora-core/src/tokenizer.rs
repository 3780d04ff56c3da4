//! Fast token estimation for input descriptors and cost fallbacks.
//!
//! Providers report exact counts when they can; this estimate fills the
//! ledger's input descriptor before dispatch.

/// Average characters per token for English prose.
const CHARS_PER_TOKEN: f64 = 3.7;

/// Estimate the token count of `text` without a tokenizer.
pub fn estimate_tokens(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }
    (text.chars().count() as f64 / CHARS_PER_TOKEN).ceil() as usize
}
