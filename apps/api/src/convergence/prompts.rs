//! Prompt templates for the convergence loop.
//!
//! Placeholders are `{name}` and filled with `str::replace`. The text placeholder
//! is always filled last so user text containing braces cannot be re-substituted.

// ────────────────────────────────────────────────────────────────────────────
// Shared fragments
// ────────────────────────────────────────────────────────────────────────────

pub const COUNTING_RULES: &str = "\
HOW CHARACTERS ARE COUNTED (like a word processor):\n\
- Every letter, accented or not, is 1 character\n\
- Every space between words is 1 character\n\
- Every punctuation mark (. , ; : ! ? -) is 1 character\n\
- Quotes, brackets and parentheses are 1 character each\n\
- Dashes count, and so do the spaces around them\n\
- Every line break is 1 character\n\
- Every digit and every symbol (@ # $ % & * + = / < > ~ ^ |) is 1 character";

pub const MUST_KEEP_FRAGMENT: &str = "\n\
TERMS THAT MUST APPEAR VERBATIM IN THE OUTPUT: {terms}";

pub const CONDENSE_STRATEGY: &str = "\
The text is LONGER than the target: rewrite and condense the LAST paragraph first.\n\
- If it still exceeds the target, condense the second-to-last paragraph, and so on\n\
- Remove redundancy and peripheral phrasing by rewriting, never by truncating\n\
- Stop once the length is between {lower_bound} and {target}";

pub const EXPAND_STRATEGY: &str = "\
The text is SHORTER than the target: expand the LAST paragraph with concrete detail (data, examples, benefits).\n\
- If more is still needed, expand the second-to-last paragraph\n\
- Stop once the length is between {lower_bound} and {target}";

// ────────────────────────────────────────────────────────────────────────────
// Round 1: drafting
// ────────────────────────────────────────────────────────────────────────────

pub const DRAFT_SYSTEM_TEMPLATE: &str = "\
You are a professional editor. Adjust the text so it is BETWEEN {lower_bound} and {target} characters, \
as close to {upper_bound} as possible WITHOUT EVER EXCEEDING {target}.\n\
\n\
TOLERANCE:\n\
- Accepted: {lower_bound} to {target} characters ([-{lower_percent}%, 0%])\n\
- Exceeding {target} is forbidden\n\
- Truncating is forbidden: never cut a word in half; rewrite or condense instead\n\
\n\
{counting_rules}\n\
\n\
QUALITY:\n\
1. Keep all essential information (names, numbers, dates, percentages, entities)\n\
2. Preserve the logical structure\n\
3. Avoid repetition\n\
4. Professional language\n\
5. Output ONLY the final text, with no commentary{must_keep}";

pub const DRAFT_USER_TEMPLATE: &str = "\
ORIGINAL TEXT ({source_length} characters):\n\
{source_text}\n\
\n\
GOAL:\n\
- Target: {target} characters (never exceed)\n\
- Accepted range: {lower_bound}–{target}\n\
- Change needed: {signed_delta} characters\n\
\n\
STRATEGY (WITHOUT CUTTING WORDS):\n\
{strategy}\n\
\n\
Return ONLY the edited text.";

// ────────────────────────────────────────────────────────────────────────────
// Correction: text above the target
// ────────────────────────────────────────────────────────────────────────────

pub const CONDENSE_SYSTEM_TEMPLATE: &str = "\
FINE ADJUSTMENT — TEXT ABOVE THE LIMIT (DO NOT TRUNCATE)\n\
\n\
Situation: {length} > {target} (over by {excess} characters, {excess_percent}%)\n\
Goal: rewrite/condense until the text is BETWEEN {lower_bound} and {target}, preferably {upper_bound} to {target}\n\
Method: rewrite the LAST paragraph first; if needed the second-to-last, and so on. \
Never cut words off; only rephrase to reduce.\n\
Format: coherent, professional prose.{must_keep}";

pub const CONDENSE_USER_TEMPLATE: &str = "\
TEXT ABOVE THE LIMIT ({length} characters):\n\
{text}\n\
\n\
TASK:\n\
- Reduce by rewriting/condensing (never by truncating)\n\
- Stop once it is between {lower_bound} and {target}\n\
- Keep essential information and coherence\n\
Return ONLY the condensed text.";

// ────────────────────────────────────────────────────────────────────────────
// Correction: text below the band
// ────────────────────────────────────────────────────────────────────────────

pub const EXPAND_SYSTEM_TEMPLATE: &str = "\
FINE ADJUSTMENT — TEXT BELOW THE RANGE (EXPAND PRECISELY)\n\
\n\
Current text: {length} characters ({fill_percent}% of the target)\n\
MISSING: {deficit} characters to reach the top of the range ({desired})\n\
\n\
Action: ADD EXACTLY {deficit} characters (±2) of relevant content.\n\
- Expand the LAST paragraph with concrete details (data, benefits, examples)\n\
- If more is still needed, expand the second-to-last\n\
- Keep coherence and logical flow\n\
- No repetition, no filler\n\
- Never exceed {target}{must_keep}";

pub const EXPAND_USER_TEMPLATE: &str = "\
TEXT BELOW THE RANGE ({length} characters):\n\
{text}\n\
\n\
ADD EXACTLY: {deficit} characters (tolerance ±2)\n\
GOAL: {desired} characters (top of the range, never above {target})\n\
RULES:\n\
- Use concrete details (results, metrics, examples, impact)\n\
- Stay coherent and avoid redundancy\n\
Return ONLY the expanded text.";
