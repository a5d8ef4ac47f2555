//! Streaming sentence segmentation for chunked TTS.
//!
//! LLM text arrives in deltas; TTS wants sentence-sized chunks. The
//! [`SentenceSegmenter`] buffers deltas and yields complete sentences as soon
//! as they accrete, forcing a break on commas or spaces when the buffer
//! exceeds a ceiling so a rambling model can't stall speech output.
//!
//! The segmenter never normalizes punctuation; what the model wrote is what
//! the TTS hears.
//!
//! # Examples
//!
//! ```
//! use parlance::config::SegmenterConfig;
//! use parlance::segmenter::SentenceSegmenter;
//!
//! let mut seg = SentenceSegmenter::new(&SegmenterConfig::default());
//! assert!(seg.add("Sure — ").is_empty());
//! let sentences = seg.add("what time works best? I have ");
//! assert_eq!(sentences, vec!["Sure — what time works best?".to_owned()]);
//! assert_eq!(seg.flush().as_deref(), Some("I have"));
//! ```

use crate::config::SegmenterConfig;

/// Accumulates streamed text and yields sentence-sized chunks.
#[derive(Debug)]
pub struct SentenceSegmenter {
    buffer: String,
    min_chunk: usize,
    max_chunk: usize,
    break_on_comma: bool,
}

impl SentenceSegmenter {
    /// Create a segmenter with the given chunking configuration.
    pub fn new(config: &SegmenterConfig) -> Self {
        Self {
            buffer: String::new(),
            min_chunk: config.min_chunk.max(1),
            max_chunk: config.max_chunk.max(config.min_chunk.max(1)),
            break_on_comma: config.break_on_comma,
        }
    }

    /// Append streamed text and return any complete sentences it produced.
    pub fn add(&mut self, text: &str) -> Vec<String> {
        self.buffer.push_str(text);
        let mut sentences = Vec::new();
        while let Some(sentence) = self.extract_next() {
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
        }
        sentences
    }

    /// Return the trimmed remainder, if any, and empty the buffer.
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buffer);
        let rest = rest.trim();
        if rest.is_empty() {
            None
        } else {
            Some(rest.to_owned())
        }
    }

    /// Discard any buffered text.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// The raw buffered text (not yet yielded).
    pub fn peek(&self) -> &str {
        &self.buffer
    }

    /// Whether the buffer holds anything besides whitespace.
    pub fn has_content(&self) -> bool {
        !self.buffer.trim().is_empty()
    }

    /// Extract one sentence from the front of the buffer, or `None` if no
    /// boundary qualifies yet.
    fn extract_next(&mut self) -> Option<String> {
        let chars: Vec<(usize, char)> = self.buffer.char_indices().collect();
        if chars.is_empty() {
            return None;
        }

        // Earliest terminal punctuation followed by whitespace or end of
        // buffer, with the prefix at least min_chunk chars.
        for (ci, &(_, c)) in chars.iter().enumerate() {
            if !matches!(c, '.' | '!' | '?') || ci + 1 < self.min_chunk {
                continue;
            }
            match chars.get(ci + 1) {
                None => return Some(self.take_prefix(self.buffer.len())),
                Some(&(nbi, nc)) if nc.is_whitespace() => {
                    return Some(self.take_prefix(nbi + nc.len_utf8()));
                }
                _ => {}
            }
        }

        if chars.len() <= self.max_chunk {
            return None;
        }

        // Over the ceiling with no sentence boundary: break at the latest
        // comma-space, else the last space, else hard-cut at max_chunk.
        if self.break_on_comma {
            let comma = chars[..self.max_chunk.min(chars.len())]
                .iter()
                .enumerate()
                .rev()
                .find(|&(ci, &(_, c))| {
                    c == ','
                        && ci + 1 >= self.min_chunk
                        && matches!(chars.get(ci + 1), Some(&(_, nc)) if nc == ' ')
                });
            if let Some((ci, _)) = comma {
                let (sbi, sc) = chars[ci + 1];
                return Some(self.take_prefix(sbi + sc.len_utf8()));
            }
        }

        let space = chars[..self.max_chunk]
            .iter()
            .enumerate()
            .rev()
            .find(|&(ci, &(_, c))| c == ' ' && ci >= self.min_chunk);
        if let Some((_, &(bi, c))) = space {
            return Some(self.take_prefix(bi + c.len_utf8()));
        }

        let (bi, c) = chars[self.max_chunk - 1];
        Some(self.take_prefix(bi + c.len_utf8()))
    }

    /// Split off the first `boundary` bytes as a trimmed sentence and trim
    /// leading whitespace from what remains.
    fn take_prefix(&mut self, boundary: usize) -> String {
        let rest = self.buffer.split_off(boundary);
        let sentence = std::mem::replace(&mut self.buffer, rest);
        let trimmed_start = self.buffer.trim_start().len();
        let lead = self.buffer.len() - trimmed_start;
        self.buffer.drain(..lead);
        sentence.trim().to_owned()
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    fn segmenter() -> SentenceSegmenter {
        SentenceSegmenter::new(&SegmenterConfig::default())
    }

    // ── Terminal punctuation boundaries ───────────────────────

    #[test]
    fn sentence_extracted_at_terminal_and_whitespace() {
        let mut seg = segmenter();
        let out = seg.add("We have a room available. Would you like to book it?");
        assert_eq!(
            out,
            vec![
                "We have a room available.".to_owned(),
                "Would you like to book it?".to_owned(),
            ]
        );
        assert!(!seg.has_content());
    }

    #[test]
    fn sentence_extracted_at_terminal_end_of_buffer() {
        let mut seg = segmenter();
        let out = seg.add("That works for me!");
        assert_eq!(out, vec!["That works for me!".to_owned()]);
    }

    #[test]
    fn short_fragment_held_below_min_chunk() {
        let mut seg = segmenter();
        // "Yes." is only 4 chars; the boundary is below min_chunk so it waits.
        assert!(seg.add("Yes.").is_empty());
        let out = seg.add(" We can do that.");
        assert_eq!(out, vec!["Yes. We can do that.".to_owned()]);
    }

    #[test]
    fn decimal_point_is_not_a_boundary() {
        let mut seg = segmenter();
        assert!(seg.add("The rate is 3.5 percent").is_empty());
        let out = seg.add(" per night.");
        assert_eq!(out, vec!["The rate is 3.5 percent per night.".to_owned()]);
    }

    #[test]
    fn accumulates_across_adds() {
        let mut seg = segmenter();
        assert!(seg.add("Sure — ").is_empty());
        let out = seg.add("what time works best?");
        assert_eq!(out, vec!["Sure — what time works best?".to_owned()]);
        assert_eq!(seg.flush(), None);
    }

    // ── Forced breaks over the ceiling ────────────────────────

    #[test]
    fn forced_break_prefers_latest_comma() {
        let mut seg = segmenter();
        let long = format!("{}, {}, and then some more words without end", "a".repeat(60), "b".repeat(60));
        let out = seg.add(&long);
        assert!(!out.is_empty());
        assert!(out[0].ends_with(','));
        assert!(out[0].chars().count() <= 150);
        assert!(out[0].chars().count() >= 8);
    }

    #[test]
    fn forced_break_falls_back_to_space() {
        let mut seg = segmenter();
        let long = format!("{} {}", "a".repeat(100), "b".repeat(100));
        let out = seg.add(&long);
        assert_eq!(out, vec!["a".repeat(100)]);
        assert_eq!(seg.peek(), "b".repeat(100));
    }

    #[test]
    fn forced_break_hard_cut_without_any_space() {
        let mut seg = segmenter();
        let long = "x".repeat(200);
        let out = seg.add(&long);
        assert_eq!(out, vec!["x".repeat(150)]);
        assert_eq!(seg.peek(), "x".repeat(50));
    }

    #[test]
    fn no_forced_break_at_or_below_ceiling() {
        let mut seg = segmenter();
        let exactly = "y".repeat(150);
        assert!(seg.add(&exactly).is_empty());
        assert_eq!(seg.peek().len(), 150);
    }

    // ── flush / clear / peek ──────────────────────────────────

    #[test]
    fn flush_returns_trimmed_remainder() {
        let mut seg = segmenter();
        seg.add("  and one more thing  ");
        assert_eq!(seg.flush().as_deref(), Some("and one more thing"));
        assert_eq!(seg.flush(), None);
    }

    #[test]
    fn flush_empty_is_none() {
        let mut seg = segmenter();
        assert_eq!(seg.flush(), None);
        seg.add("   ");
        assert_eq!(seg.flush(), None);
    }

    #[test]
    fn clear_discards_buffer() {
        let mut seg = segmenter();
        seg.add("half a thought");
        seg.clear();
        assert!(!seg.has_content());
        assert_eq!(seg.flush(), None);
    }

    // ── Round trip ────────────────────────────────────────────

    #[test]
    fn round_trip_preserves_all_words() {
        let inputs = [
            "Good morning! ",
            "We have two room types available. The king suite runs ",
            "two hundred a night, and the double queen is one fifty. ",
            "Which would you prefer?",
        ];
        let mut seg = segmenter();
        let mut pieces = Vec::new();
        for input in inputs {
            pieces.extend(seg.add(input));
        }
        if let Some(rest) = seg.flush() {
            pieces.push(rest);
        }
        let rejoined = pieces.join(" ");
        let original = inputs.concat();
        let original_words: Vec<&str> = original.split_whitespace().collect();
        let rejoined_words: Vec<&str> = rejoined.split_whitespace().collect();
        assert_eq!(original_words, rejoined_words);
    }

    #[test]
    fn multibyte_text_splits_on_char_boundaries() {
        let mut seg = segmenter();
        let long = "héllo wörld ".repeat(20);
        let out = seg.add(&long);
        assert!(!out.is_empty());
        // Nothing panicked, and every piece is valid UTF-8 by construction.
        for piece in &out {
            assert!(!piece.is_empty());
        }
    }
}
