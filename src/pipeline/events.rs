//! Event types flowing into and out of a session task.
//!
//! Everything that can happen to a call (transcripts, VAD edges, TTS
//! completions, LLM chunks, tool results, hangup) arrives as a
//! [`SessionEvent`] on the session's bounded channel and is drained in FIFO
//! order by the Turn Manager task. Adapter callbacks never mutate session
//! state directly.
//!
//! [`AgentEvent`] is the lossy telemetry fan-out (dashboards, tests); the
//! core never blocks on it.

use crate::fsm::PipelineState;
use crate::llm::LlmChunk;
use crate::session::{CallId, EndReason};
use crate::stt::SttEvent;

/// Bound on the per-session inbound event channel.
pub(crate) const SESSION_EVENT_BUFFER: usize = 64;

/// Capacity of the telemetry broadcast channel.
pub const TELEMETRY_BUFFER: usize = 64;

/// Inbound events drained by a session task.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// An STT callback (transcript, VAD edge, error).
    Stt(SttEvent),
    /// One dispatched TTS chunk finished synthesizing/playing.
    TtsDone,
    /// The TTS stream failed.
    TtsError(String),
    /// A chunk from the in-flight LLM stream.
    Llm {
        /// Which stream generation produced this chunk; stale ones are dropped.
        epoch: u64,
        /// The chunk itself.
        chunk: LlmChunk,
    },
    /// The LLM stream ended without an explicit `Done`.
    LlmClosed {
        /// Which stream generation closed.
        epoch: u64,
    },
    /// The `stream_chat` call itself failed; no stream was established.
    LlmFailed {
        /// Which stream generation failed.
        epoch: u64,
        /// Provider error description.
        message: String,
    },
    /// A spawned tool execution finished.
    ToolFinished {
        /// Stream generation the tool belongs to.
        epoch: u64,
        /// The tool call id being answered.
        call_id: String,
        /// The tool name.
        name: String,
        /// String-coerced result.
        result: String,
    },
    /// A spawned tool execution failed.
    ToolFailed {
        /// Stream generation the tool belongs to.
        epoch: u64,
        /// The tool call id being answered.
        call_id: String,
        /// The tool name.
        name: String,
        /// Error description.
        message: String,
    },
    /// End the call and clean up.
    Hangup {
        /// Why the call is ending.
        reason: EndReason,
    },
}

/// Telemetry events broadcast by session tasks.
#[derive(Debug, Clone)]
pub enum AgentEvent {
    /// The pipeline moved between states.
    StateChanged {
        /// The call this event belongs to.
        call_id: CallId,
        /// Previous state.
        from: PipelineState,
        /// New state.
        to: PipelineState,
    },
    /// An endpointing timer was (re)armed.
    EndpointingScheduled {
        /// The call this event belongs to.
        call_id: CallId,
        /// Chosen wait in milliseconds.
        wait_ms: u64,
    },
    /// A user turn was dispatched to the LLM.
    TurnStarted {
        /// The call this event belongs to.
        call_id: CallId,
        /// The processed transcript.
        transcript: String,
    },
    /// First token of a response arrived.
    FirstToken {
        /// The call this event belongs to.
        call_id: CallId,
        /// Milliseconds from dispatch to first token.
        latency_ms: u64,
        /// Provider tag, when the adapter reports one.
        provider: Option<String>,
    },
    /// The model requested a tool.
    ToolCalled {
        /// The call this event belongs to.
        call_id: CallId,
        /// The tool name.
        name: String,
    },
    /// A mid-playback acknowledgement was discarded without interrupting.
    BargeInSuppressed {
        /// The call this event belongs to.
        call_id: CallId,
        /// The acknowledgement transcript.
        text: String,
    },
    /// Caller speech interrupted assistant audio.
    BargeInExecuted {
        /// The call this event belongs to.
        call_id: CallId,
    },
    /// Speculative inference was dropped because the caller resumed.
    GreedyCancelled {
        /// The call this event belongs to.
        call_id: CallId,
    },
    /// A full assistant response finished streaming.
    ResponseComplete {
        /// The call this event belongs to.
        call_id: CallId,
        /// The response text.
        text: String,
    },
    /// The session ended.
    CallEnded {
        /// The call this event belongs to.
        call_id: CallId,
        /// Why it ended.
        reason: EndReason,
    },
}
