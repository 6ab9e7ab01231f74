//! Answer-key normalization
//!
//! Trivia answer keys frequently bundle several acceptable answers into one
//! string, e.g. `"NYC | New York City / new york, or The Big Apple"`. This
//! module splits such a key into its canonical variants and compares
//! submissions against them.

use itertools::Itertools;

/// Normalizes an answer string for comparison: trimmed and lower-cased
pub fn clean_answer(answer: &str) -> String {
    answer.trim().to_lowercase()
}

/// Splits an answer key into its de-duplicated, lower-cased variants
///
/// Separators are applied in sequence (pipe, slash, the word "or", comma),
/// so any combination of them composes. Order of first appearance is kept.
/// Returns an empty list when the key holds no non-blank variant.
pub fn normalize_answer_spec(key: &str) -> Vec<String> {
    let mut parts = vec![key.to_owned()];

    parts = split_all(parts, |s| s.split('|').map(str::to_owned).collect());
    parts = split_all(parts, |s| s.split('/').map(str::to_owned).collect());
    parts = split_all(parts, |s| split_on_word(s, "or"));
    parts = split_all(parts, |s| s.split(',').map(str::to_owned).collect());

    parts
        .iter()
        .map(|part| clean_answer(part))
        .filter(|part| !part.is_empty())
        .unique()
        .collect_vec()
}

/// Canonical answer set for a trivia round, never empty
///
/// Falls back to the cleaned original key as the single variant when the
/// key does not split into anything.
pub fn canonical_answers(key: &str) -> Vec<String> {
    let variants = normalize_answer_spec(key);
    if variants.is_empty() {
        vec![clean_answer(key)]
    } else {
        variants
    }
}

/// Whether a submission matches any canonical variant
pub fn is_correct(submission: &str, variants: &[String]) -> bool {
    let cleaned = clean_answer(submission);
    variants.iter().any(|variant| *variant == cleaned)
}

fn split_all<F>(parts: Vec<String>, split: F) -> Vec<String>
where
    F: Fn(&str) -> Vec<String>,
{
    parts.iter().flat_map(|part| split(part)).collect_vec()
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// Splits on a case-insensitive ASCII word, honoring word boundaries
fn split_on_word(s: &str, word: &str) -> Vec<String> {
    let bytes = s.as_bytes();
    let needle = word.as_bytes();
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i + needle.len() <= bytes.len() {
        let candidate = &bytes[i..i + needle.len()];
        // `needle` is ASCII, so a match always starts and ends on char boundaries
        if candidate.eq_ignore_ascii_case(needle) {
            let before = s[..i].chars().next_back();
            let after = s[i + needle.len()..].chars().next();
            if !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char) {
                pieces.push(s[start..i].to_owned());
                i += needle.len();
                start = i;
                continue;
            }
        }
        i += 1;
    }

    pieces.push(s[start..].to_owned());
    pieces
}
