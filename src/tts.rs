//! Streaming text-to-speech interface.
//!
//! The TTS service accepts either a full utterance ([`TtsAdapter::speak`])
//! or incremental chunks ([`TtsAdapter::speak_chunk`]) with a continuation
//! flag. `continuation = true` tells the provider to join the chunk's
//! prosody to the previous one without a final fall; the last chunk of a
//! logical response is sent with `continuation = false` to close prosody.
//!
//! Synthesized audio comes back as [`TtsEvent::AudioChunk`] frames the host
//! routes to the media sink; `Done` fires once per dispatched chunk and
//! drives the Turn Manager's playback accounting.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Streaming TTS adapter.
#[async_trait]
pub trait TtsAdapter: Send + Sync {
    /// Establish the synthesis connection.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails. This is fatal for the
    /// call: a voice agent without a voice cannot proceed.
    async fn connect(&self) -> Result<()>;

    /// Tear down the synthesis connection. Must not block cleanup indefinitely.
    async fn disconnect(&self);

    /// Synthesize a complete utterance (greeting, fallback apology).
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be dispatched.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Synthesize one chunk of a streamed response.
    ///
    /// # Errors
    ///
    /// Returns an error if the request cannot be dispatched. Synthesis
    /// failures after dispatch arrive as [`TtsEvent::Error`].
    async fn speak_chunk(&self, text: &str, continuation: bool) -> Result<()>;

    /// Stop synthesis and drop anything queued provider-side.
    async fn cancel(&self);
}

/// Events emitted by the TTS service.
#[derive(Debug, Clone)]
pub enum TtsEvent {
    /// A frame of synthesized audio, ready for the media sink.
    AudioChunk(Bytes),
    /// One dispatched chunk finished synthesizing.
    Done,
    /// Synthesis failed.
    Error(String),
}
