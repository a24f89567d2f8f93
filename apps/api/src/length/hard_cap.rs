//! Deterministic fallback truncation.
//!
//! The last step of every successful adjustment run. Guarantees
//! `char_count(output) <= max` no matter what the oracle returned, while trying
//! to end the text on a natural boundary.
//!
//! # Cut point search
//! 1. Take the first `max` scalar values of the normalized text.
//! 2. Scan the trailing window (last `TRAILING_WINDOW` scalar values) for each
//!    boundary class in `BOUNDARY_PRIORITY` order; the last match of the first
//!    class found wins and the boundary character is kept.
//! 3. Otherwise cut at the last whitespace before the window.
//! 4. Otherwise cut exactly at `max`.

use crate::length::normalize::normalize;

/// Size of the trailing lookback window, in scalar values.
pub const TRAILING_WINDOW: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoundaryClass {
    SentenceEnd,
    Comma,
    Dash,
    Whitespace,
}

/// Tie-break order for the trailing window search. Earlier entries win.
const BOUNDARY_PRIORITY: [BoundaryClass; 4] = [
    BoundaryClass::SentenceEnd,
    BoundaryClass::Comma,
    BoundaryClass::Dash,
    BoundaryClass::Whitespace,
];

impl BoundaryClass {
    fn matches(self, c: char) -> bool {
        match self {
            BoundaryClass::SentenceEnd => matches!(c, '.' | '!' | '?' | ';' | ':'),
            BoundaryClass::Comma => c == ',',
            BoundaryClass::Dash => matches!(c, '\u{2014}' | '\u{2013}' | '-'),
            BoundaryClass::Whitespace => c.is_whitespace(),
        }
    }
}

/// Caps `text` to at most `max` characters (as counted by `char_count`).
///
/// Text already within the limit is returned normalized but otherwise unchanged.
pub fn hard_cap_to_max(text: &str, max: usize) -> String {
    let normalized = normalize(text);
    let chars: Vec<char> = normalized.chars().collect();
    if chars.len() <= max {
        return normalized;
    }

    let slice = &chars[..max];
    let cut = find_cut_point(slice).unwrap_or(max);
    let capped: String = slice[..cut].iter().collect();

    // A prefix of an NFC string is re-normalized so the output is a fixed point.
    normalize(capped.trim_end())
}

/// Returns the exclusive end index of the preferred cut inside `slice`.
fn find_cut_point(slice: &[char]) -> Option<usize> {
    let window_start = slice.len().saturating_sub(TRAILING_WINDOW);
    let window = &slice[window_start..];

    for class in BOUNDARY_PRIORITY {
        if let Some(idx) = window.iter().rposition(|&c| class.matches(c)) {
            let cut = window_start + idx + 1;
            if has_content(&slice[..cut]) {
                return Some(cut);
            }
        }
    }

    slice[..window_start]
        .iter()
        .rposition(|c| c.is_whitespace())
        .filter(|&idx| has_content(&slice[..idx]))
}

fn has_content(chars: &[char]) -> bool {
    chars.iter().any(|c| !c.is_whitespace())
}
