//! Layered endpointing policy: how long to wait before answering.
//!
//! The wait between the caller's (apparent) last word and the LLM call is the
//! single biggest lever on how the agent feels: too short and it talks over
//! people dictating phone numbers, too long and every exchange drags. The
//! policy layers rules from most to least specific:
//!
//! 1. what the assistant just asked for (structured data, dates),
//! 2. a trailing filler,
//! 3. terminal punctuation,
//! 4. a trailing number,
//! 5. the default.
//!
//! # Examples
//!
//! ```
//! use std::time::Duration;
//! use parlance::config::EndpointingConfig;
//! use parlance::endpointing::wait_for;
//!
//! let config = EndpointingConfig::default();
//! let wait = wait_for("I'd like to book a room.", "How can I help?", &config);
//! assert_eq!(wait, Duration::from_millis(400));
//! ```

use crate::classifier::{self, NUMBER_WORDS};
use crate::config::EndpointingConfig;
use std::time::Duration;

/// Prompt cues that mean the caller is about to dictate structured data.
const STRUCTURED_DATA_CUES: &[&str] = &[
    "name", "spell", "phone", "number", "address", "zip", "email",
];

/// Prompt cues that mean the caller is about to give a date or time.
const DATE_TIME_CUES: &[&str] = &["date", "when", "check in", "check out"];

/// Choose the endpointing wait for a transcript, given the most recent
/// assistant utterance.
pub fn wait_for(
    transcript: &str,
    last_assistant_prompt: &str,
    config: &EndpointingConfig,
) -> Duration {
    let prompt = last_assistant_prompt.to_lowercase();
    if STRUCTURED_DATA_CUES.iter().any(|cue| prompt.contains(cue)) {
        return Duration::from_millis(config.structured_data_wait_ms);
    }
    if DATE_TIME_CUES.iter().any(|cue| prompt.contains(cue)) {
        return Duration::from_millis(config.date_time_wait_ms);
    }

    let trimmed = transcript.trim();
    if classifier::ends_with_filler(trimmed) {
        return Duration::from_millis(config.filler_wait_ms);
    }
    if trimmed.ends_with(['.', '!', '?']) {
        return Duration::from_millis(config.punctuation_wait_ms);
    }
    if ends_in_number(trimmed) {
        return Duration::from_millis(config.number_wait_ms);
    }
    Duration::from_millis(config.default_wait_ms)
}

fn ends_in_number(text: &str) -> bool {
    if text.chars().next_back().is_some_and(|c| c.is_ascii_digit()) {
        return true;
    }
    text.split_whitespace()
        .next_back()
        .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .is_some_and(|t| NUMBER_WORDS.contains(&t.as_str()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn config() -> EndpointingConfig {
        EndpointingConfig::default()
    }

    fn wait_ms(transcript: &str, prompt: &str) -> u64 {
        wait_for(transcript, prompt, &config()).as_millis() as u64
    }

    // ── Context layer ─────────────────────────────────────────

    #[test]
    fn structured_data_prompt_waits_longest() {
        assert_eq!(wait_ms("John", "Could you spell your name for me?"), 3000);
        assert_eq!(wait_ms("555", "What's the best phone number?"), 3000);
        assert_eq!(wait_ms("foo@bar.com", "And your email address?"), 3000);
    }

    #[test]
    fn date_prompt_waits_long() {
        assert_eq!(wait_ms("next Tuesday", "When would you like to check out?"), 2000);
        assert_eq!(wait_ms("the fifth", "What date works for you?"), 2000);
    }

    #[test]
    fn context_beats_punctuation() {
        // Even a fully punctuated answer gets the structured-data wait.
        assert_eq!(wait_ms("It's Smith.", "Can I get your name?"), 3000);
    }

    // ── Transcript layers ─────────────────────────────────────

    #[test]
    fn trailing_filler_waits() {
        assert_eq!(wait_ms("I was thinking um", "How can I help?"), 2000);
        assert_eq!(wait_ms("maybe uhh", "How can I help?"), 2000);
    }

    #[test]
    fn terminal_punctuation_is_fast() {
        assert_eq!(wait_ms("I'd like to book a room.", "How can I help?"), 400);
        assert_eq!(wait_ms("Do you have parking?", "How can I help?"), 400);
    }

    #[test]
    fn trailing_number_waits_for_more_digits() {
        assert_eq!(wait_ms("room for 2", "How can I help?"), 1000);
        assert_eq!(wait_ms("I need three", "How can I help?"), 1000);
    }

    #[test]
    fn default_wait_otherwise() {
        assert_eq!(wait_ms("I would like a late checkout", "How can I help?"), 1500);
    }

    #[test]
    fn filler_beats_number() {
        assert_eq!(wait_ms("room for two um", "How can I help?"), 2000);
    }
}
