//! Media stream interface to the telephony provider.
//!
//! The core treats call audio as opaque byte frames: format negotiation and
//! transport (WebSocket media streams, SIP, whatever the provider speaks)
//! live entirely in the adapter. Inbound frames flow to the STT adapter via
//! the dispatcher; outbound frames are the TTS adapter's audio chunks, which
//! the host wires to [`MediaSink::send_audio`]. The Turn Manager itself only
//! ever calls [`MediaSink::clear_audio`] to purge queued audio on interrupt.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Audio format announced by the media provider at stream start.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFormat {
    /// Codec name as the provider reports it (e.g. `"audio/x-mulaw"`).
    pub encoding: String,
    /// Sample rate in Hz.
    pub sample_rate: u32,
}

/// Descriptor delivered when a media stream opens.
#[derive(Debug, Clone)]
pub struct StreamStart {
    /// Provider-assigned stream identifier.
    pub stream_id: String,
    /// Caller's phone number, when the provider shares it.
    pub caller_phone: Option<String>,
    /// Negotiated audio format.
    pub format: MediaFormat,
}

/// Inbound events from the media transport.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// A stream opened; a session should be created.
    Start(StreamStart),
    /// An audio frame arrived.
    Audio(Bytes),
    /// The stream closed normally (caller hung up).
    Stop,
    /// The transport failed.
    Error(String),
}

/// Outbound side of the media stream.
#[async_trait]
pub trait MediaSink: Send + Sync {
    /// Queue an audio frame for playback to the caller.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the frame.
    async fn send_audio(&self, frame: Bytes) -> Result<()>;

    /// Purge all queued outbound audio immediately.
    ///
    /// Called on barge-in and greedy cancel; anything buffered in the
    /// provider must stop reaching the caller's ear.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport rejects the purge.
    async fn clear_audio(&self) -> Result<()>;
}
