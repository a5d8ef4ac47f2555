//! Rule-based utterance completeness classification.
//!
//! Before a turn is handed to the LLM, the transcript is classified so the
//! endpointing timer can hold back on fragments ("I want to...") and trailing
//! fillers ("um...") without an extra model round-trip. The classifier is a
//! pure function over the transcript text; it reads no session state.
//!
//! # Examples
//!
//! ```
//! use parlance::classifier::{Utterance, classify};
//!
//! assert_eq!(classify("I'd like to book a room."), Utterance::Complete);
//! assert_eq!(classify("I want to"), Utterance::Incomplete);
//! assert_eq!(classify("well, um"), Utterance::Filler);
//! ```

use regex::Regex;
use std::sync::LazyLock;

/// Completeness verdict for a caller transcript.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Utterance {
    /// A finished thought; process it.
    Complete,
    /// Mid-sentence; hold and wait for more.
    Incomplete,
    /// Trailing hesitation; hold longer.
    Filler,
    /// Could go either way; defer to the endpointing wait.
    Maybe,
}

/// Hesitation interjections with elastic spelling ("um", "uhh", "hmmm"...).
static FILLER_TOKEN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:u+m+|u+h+|h+m+|m+m+|a+h+|e+r+)$").unwrap_or_else(|e| {
        unreachable!("filler pattern is a literal: {e}")
    })
});

/// Words that almost never end a finished English thought.
const FUNCTION_WORDS: &[&str] = &[
    "and", "but", "or", "so", "because", "if", "when", "then", "also", "the", "a", "an", "my",
    "your", "this", "that", "for", "from", "to", "in", "on", "at", "with", "i", "we", "they",
    "he", "she", "it", "you", "like", "well", "some", "any", "few", "more", "less",
];

/// Tokens allowed to pad out an all-filler utterance ("well, um, like...").
const FILLER_PADDING: &[&str] = &["like", "well", "so", "yeah", "ok"];

/// One-word answers that are complete on their own.
const AFFIRMATIVES: &[&str] = &[
    "yes", "yeah", "yep", "yup", "no", "nope", "nah", "sure", "okay", "ok", "correct", "right",
];

/// Spelled-out numbers callers answer with ("how many nights?" "three").
pub(crate) const NUMBER_WORDS: &[&str] = &[
    "one", "two", "three", "four", "five", "six", "seven", "eight", "nine", "ten",
];

const WEEKDAYS: &[&str] = &[
    "monday", "tuesday", "wednesday", "thursday", "friday", "saturday", "sunday",
];

/// Classify a transcript's completeness.
pub fn classify(text: &str) -> Utterance {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Utterance::Incomplete;
    }
    let lower = trimmed.to_lowercase();
    let bare = lower
        .trim_end_matches(['.', '!', '?', ','])
        .trim()
        .to_owned();

    // Single-shot answers win even below the length floor: a bare "no" must
    // be able to complete.
    if is_single_shot(&bare) {
        return Utterance::Complete;
    }

    if ends_with_filler(&bare) || is_all_fillers(&bare) {
        return Utterance::Filler;
    }

    if trimmed.chars().count() < 4 {
        return Utterance::Incomplete;
    }

    if trimmed.ends_with(['.', '!', '?']) {
        return Utterance::Complete;
    }

    let tokens: Vec<String> = bare
        .split_whitespace()
        .map(normalize_token)
        .filter(|t| !t.is_empty())
        .collect();

    if let Some(last) = tokens.last()
        && FUNCTION_WORDS.contains(&last.as_str())
    {
        return Utterance::Incomplete;
    }

    if tokens.len() >= 4 {
        return match trailing_fragment_words(trimmed) {
            Some(n) if (1..=3).contains(&n) => Utterance::Maybe,
            _ => Utterance::Complete,
        };
    }

    Utterance::Maybe
}

/// Whether the transcript trails off in a hesitation.
pub(crate) fn ends_with_filler(text: &str) -> bool {
    let lower = text.trim().to_lowercase();
    let bare = lower.trim_end_matches(['.', '!', '?', ',']).trim_end();
    if bare.ends_with("you know") {
        return true;
    }
    bare.split_whitespace()
        .next_back()
        .map(normalize_token)
        .is_some_and(|t| FILLER_TOKEN.is_match(&t))
}

fn is_single_shot(bare: &str) -> bool {
    if bare.contains(char::is_whitespace) {
        return false;
    }
    let token = normalize_token(bare);
    if token.is_empty() {
        return false;
    }
    if token.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    AFFIRMATIVES.contains(&token.as_str())
        || NUMBER_WORDS.contains(&token.as_str())
        || WEEKDAYS.contains(&token.as_str())
}

fn is_all_fillers(bare: &str) -> bool {
    let without_you_know = bare.replace("you know", " ");
    let had_you_know = without_you_know.len() != bare.len();
    let mut saw_filler = had_you_know;
    let mut saw_any = had_you_know;
    for token in without_you_know.split_whitespace() {
        let token = normalize_token(token);
        if token.is_empty() {
            continue;
        }
        saw_any = true;
        if FILLER_TOKEN.is_match(&token) {
            saw_filler = true;
        } else if !FILLER_PADDING.contains(&token.as_str()) {
            return false;
        }
    }
    saw_any && saw_filler
}

/// Words after the last internal terminal punctuation, or `None` if the text
/// has no terminal at all.
fn trailing_fragment_words(text: &str) -> Option<usize> {
    let last_terminal = text.rfind(['.', '!', '?'])?;
    let tail = &text[last_terminal + 1..];
    Some(tail.split_whitespace().count())
}

fn normalize_token(token: impl AsRef<str>) -> String {
    token
        .as_ref()
        .trim_matches(|c: char| !c.is_alphanumeric() && c != '\'')
        .to_lowercase()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    // ── Complete ──────────────────────────────────────────────

    #[test]
    fn terminal_punctuation_is_complete() {
        assert_eq!(classify("I'd like to book a room for tomorrow."), Utterance::Complete);
        assert_eq!(classify("What time do you open?"), Utterance::Complete);
        assert_eq!(classify("That works!"), Utterance::Complete);
    }

    #[test]
    fn single_shot_answers_are_complete() {
        assert_eq!(classify("yes"), Utterance::Complete);
        assert_eq!(classify("No"), Utterance::Complete);
        assert_eq!(classify("three"), Utterance::Complete);
        assert_eq!(classify("42"), Utterance::Complete);
        assert_eq!(classify("Friday"), Utterance::Complete);
        assert_eq!(classify("okay."), Utterance::Complete);
    }

    #[test]
    fn long_unpunctuated_speech_is_complete() {
        assert_eq!(
            classify("I need a room for two adults this weekend"),
            Utterance::Complete
        );
    }

    // ── Incomplete ────────────────────────────────────────────

    #[test]
    fn trailing_function_word_is_incomplete() {
        assert_eq!(classify("I want to"), Utterance::Incomplete);
        assert_eq!(classify("we could do it on"), Utterance::Incomplete);
        assert_eq!(classify("my name is and"), Utterance::Incomplete);
    }

    #[test]
    fn very_short_text_is_incomplete() {
        assert_eq!(classify("th"), Utterance::Incomplete);
        assert_eq!(classify("at"), Utterance::Incomplete);
        assert_eq!(classify(""), Utterance::Incomplete);
    }

    // ── Filler ────────────────────────────────────────────────

    #[test]
    fn trailing_hesitation_is_filler() {
        assert_eq!(classify("I was thinking um"), Utterance::Filler);
        assert_eq!(classify("maybe we could uhh"), Utterance::Filler);
        assert_eq!(classify("it's near the station you know"), Utterance::Filler);
    }

    #[test]
    fn all_filler_utterance_is_filler() {
        assert_eq!(classify("um"), Utterance::Filler);
        assert_eq!(classify("uh, hmm"), Utterance::Filler);
        assert_eq!(classify("well, um, like"), Utterance::Filler);
    }

    #[test]
    fn padding_alone_is_not_filler() {
        // "like well" has no true hesitation token.
        assert_ne!(classify("like well"), Utterance::Filler);
    }

    #[test]
    fn huh_is_not_a_filler_token() {
        assert_ne!(classify("huh"), Utterance::Filler);
    }

    // ── Maybe ────────────────────────────────────────────────

    #[test]
    fn short_fragment_after_terminal_is_maybe() {
        assert_eq!(
            classify("I'd like a room. maybe tomorrow"),
            Utterance::Maybe
        );
    }

    #[test]
    fn short_unclassifiable_is_maybe() {
        assert_eq!(classify("blue car"), Utterance::Maybe);
    }

    // ── Elastic filler spellings ──────────────────────────────

    #[test]
    fn elastic_spellings_match() {
        for token in ["um", "umm", "uum", "uh", "uhhh", "hm", "hmm", "mm", "mmm", "ah", "ahh", "er", "errr"] {
            assert!(FILLER_TOKEN.is_match(token), "{token} should match");
        }
        for token in ["umbrella", "uhuh", "her", "man"] {
            assert!(!FILLER_TOKEN.is_match(token), "{token} should not match");
        }
    }
}
