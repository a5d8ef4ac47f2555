//! Per-turn transcript accumulation.
//!
//! STT delivers cumulative partials followed by a final per utterance. The
//! [`TurnState`] merges them: finals commit, partials overlay, and a greedy
//! cancel can splice the already-processed text back in front so no caller
//! words are lost.

use std::time::Duration;
use tokio::time::Instant;

/// Rolling transcript buffer for the turn being accumulated.
#[derive(Debug, Default)]
pub struct TurnState {
    /// Finalized transcript segments, space-joined.
    committed: String,
    /// The current utterance's latest partial (replaced by its final).
    partial: String,
    last_partial_at: Option<Instant>,
    accumulation_started_at: Option<Instant>,
    /// Bumped whenever the outbound audio queue is purged, so a media
    /// adapter can drop frames tagged with an older sequence.
    audio_queue_seq: u64,
}

impl TurnState {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a partial transcript for the in-progress utterance.
    pub fn on_partial(&mut self, text: &str) {
        self.partial = text.trim().to_owned();
        self.last_partial_at = Some(Instant::now());
        self.start_accumulation();
    }

    /// Commit a final transcript segment, replacing the pending partial.
    pub fn push_final(&mut self, text: &str) {
        self.partial.clear();
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !self.committed.is_empty() {
            self.committed.push(' ');
        }
        self.committed.push_str(text);
        self.start_accumulation();
    }

    /// The effective transcript: committed finals plus the latest partial.
    pub fn transcript(&self) -> String {
        if self.partial.is_empty() {
            self.committed.clone()
        } else if self.committed.is_empty() {
            self.partial.clone()
        } else {
            format!("{} {}", self.committed, self.partial)
        }
    }

    /// Whether the buffer holds any transcript text.
    pub fn is_empty(&self) -> bool {
        self.committed.is_empty() && self.partial.is_empty()
    }

    /// Splice previously-processed text back in front of the buffer.
    ///
    /// Greedy cancel uses this so speech that resumes after a cancelled
    /// inference appends to the context the caller already provided.
    pub fn restore_front(&mut self, saved: &str) {
        let saved = saved.trim();
        if saved.is_empty() {
            return;
        }
        if self.committed.is_empty() {
            self.committed = saved.to_owned();
        } else {
            self.committed = format!("{saved} {}", self.committed);
        }
    }

    /// Clear all transcript text and timestamps.
    pub fn clear(&mut self) {
        self.committed.clear();
        self.partial.clear();
        self.last_partial_at = None;
        self.accumulation_started_at = None;
    }

    /// Start the accumulation clock if it isn't already running.
    pub fn start_accumulation(&mut self) {
        if self.accumulation_started_at.is_none() {
            self.accumulation_started_at = Some(Instant::now());
        }
    }

    /// Restart the accumulation clock from now.
    pub fn restart_accumulation(&mut self) {
        self.accumulation_started_at = Some(Instant::now());
    }

    /// Stop the accumulation clock.
    pub fn reset_accumulation(&mut self) {
        self.accumulation_started_at = None;
    }

    /// How long the current burst has been accumulating.
    pub fn accumulation_elapsed(&self) -> Option<Duration> {
        self.accumulation_started_at.map(|t| t.elapsed())
    }

    /// When the most recent partial arrived, if any.
    pub fn last_partial_at(&self) -> Option<Instant> {
        self.last_partial_at
    }

    /// The current outbound audio-queue sequence number.
    pub fn audio_queue_seq(&self) -> u64 {
        self.audio_queue_seq
    }

    /// Invalidate queued outbound audio by advancing the sequence.
    pub fn bump_audio_queue(&mut self) {
        self.audio_queue_seq = self.audio_queue_seq.wrapping_add(1);
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn final_replaces_partial() {
        let mut turn = TurnState::new();
        turn.on_partial("i want");
        turn.on_partial("i want to book");
        assert_eq!(turn.transcript(), "i want to book");
        assert!(turn.last_partial_at().is_some());
        turn.push_final("I want to book tonight.");
        assert_eq!(turn.transcript(), "I want to book tonight.");
    }

    #[test]
    fn finals_accumulate_space_joined() {
        let mut turn = TurnState::new();
        turn.push_final("I want to");
        turn.push_final("book tonight.");
        assert_eq!(turn.transcript(), "I want to book tonight.");
    }

    #[test]
    fn restore_front_prepends_processed_text() {
        let mut turn = TurnState::new();
        turn.restore_front("Three nights.");
        turn.push_final("Actually four nights.");
        assert_eq!(turn.transcript(), "Three nights. Actually four nights.");
    }

    #[test]
    fn restore_front_before_existing_content() {
        let mut turn = TurnState::new();
        turn.push_final("actually");
        turn.restore_front("Three nights.");
        assert_eq!(turn.transcript(), "Three nights. actually");
    }

    #[test]
    fn clear_empties_everything() {
        let mut turn = TurnState::new();
        turn.push_final("hello there");
        turn.clear();
        assert!(turn.is_empty());
        assert_eq!(turn.transcript(), "");
        assert!(turn.accumulation_elapsed().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn accumulation_clock_tracks_burst_start() {
        let mut turn = TurnState::new();
        assert!(turn.accumulation_elapsed().is_none());
        turn.push_final("first");
        tokio::time::advance(Duration::from_millis(500)).await;
        // A later final must not restart the clock.
        turn.push_final("second");
        let elapsed = turn.accumulation_elapsed().unwrap();
        assert!(elapsed >= Duration::from_millis(500));

        turn.restart_accumulation();
        assert!(turn.accumulation_elapsed().unwrap() < Duration::from_millis(500));
    }

    #[test]
    fn audio_queue_sequence_advances() {
        let mut turn = TurnState::new();
        let before = turn.audio_queue_seq();
        turn.bump_audio_queue();
        assert_eq!(turn.audio_queue_seq(), before + 1);
    }
}
