//! Length Normalizer: canonical form used for every character count in the service.
//!
//! Counting rules:
//! - CRLF (and a lone CR) collapse to a single `\n`
//! - Unicode canonical composition (NFC) is applied afterwards
//! - Length is the number of Unicode scalar values, not bytes or grapheme clusters

use unicode_normalization::UnicodeNormalization;

/// Returns the canonical form of `text`. Idempotent.
pub fn normalize(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    unified.nfc().collect::<String>()
}

/// Character count of `text` after normalization.
pub fn char_count(text: &str) -> usize {
    normalize(text).chars().count()
}

/// Rough token estimate (four characters per token).
pub fn estimate_tokens(text: &str) -> usize {
    char_count(text).div_ceil(4)
}
