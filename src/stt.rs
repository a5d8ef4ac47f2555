//! Streaming speech-to-text interface.
//!
//! The STT service consumes raw audio frames and emits voice-activity events
//! plus partial and final transcripts. Adapter callbacks never touch session
//! state: the host forwards each [`SttEvent`] onto the session's event
//! channel, where the Turn Manager drains them in order.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Streaming STT adapter.
///
/// The contract the Turn Manager relies on: `is_final` is delivered exactly
/// once per utterance boundary, and speech start/end events bracket each
/// utterance.
#[async_trait]
pub trait SttAdapter: Send + Sync {
    /// Open the recognition stream.
    ///
    /// # Errors
    ///
    /// Returns an error if the stream cannot be established. The session
    /// continues without transcription (the greeting still plays), but the
    /// caller can no longer be understood.
    async fn start(&self) -> Result<()>;

    /// Close the recognition stream. Must not block cleanup indefinitely.
    async fn stop(&self);

    /// Feed one inbound audio frame. Fire-and-forget; adapters buffer.
    fn send_audio(&self, frame: Bytes);
}

/// Events emitted by the STT service.
#[derive(Debug, Clone)]
pub enum SttEvent {
    /// A transcript update.
    Transcript {
        /// The transcribed text.
        text: String,
        /// Whether this closes the current utterance.
        is_final: bool,
    },
    /// Voice activity started.
    SpeechStarted,
    /// Voice activity ended.
    SpeechEnded,
    /// The recognition stream failed.
    Error(String),
    /// The recognition stream closed.
    Closed,
}
