// Length measurement and the deterministic hard cap.
// Everything here is pure and synchronous: no I/O, no allocation beyond the output string.

pub mod hard_cap;
pub mod normalize;

pub use hard_cap::hard_cap_to_max;
pub use normalize::{char_count, estimate_tokens, normalize};
