//! Call session state and the process-wide session registry.
//!
//! Each phone call owns exactly one [`CallSession`], mutated only by its
//! session task. The [`SessionRegistry`] is the single process-wide mutable
//! structure: a concurrent map from call id to the handles the dispatcher
//! needs (event channel, cancellation, STT feed).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::SessionConfig;
use crate::history::ChatMessage;
use crate::media::StreamStart;
use crate::pipeline::events::SessionEvent;
use crate::stt::SttAdapter;

/// Unique identifier for one phone call.
pub type CallId = String;

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// The caller hung up (media stream stopped).
    CallerHangup,
    /// The media transport failed.
    MediaError(String),
    /// TTS could not connect; the call cannot proceed without voice.
    TtsInitFailed,
    /// The process is shutting down.
    Shutdown,
}

impl std::fmt::Display for EndReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CallerHangup => write!(f, "caller hangup"),
            Self::MediaError(e) => write!(f, "media error: {e}"),
            Self::TtsInitFailed => write!(f, "TTS init failed"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}

/// Per-call counters and latency samples.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallMetrics {
    /// Completed turn count (LLM requests started for user turns).
    pub turns: u32,
    /// Tool invocations.
    pub tool_calls: u32,
    /// Confirmed barge-ins.
    pub barge_ins: u32,
    /// Greedy cancels (caller resumed during inference).
    pub greedy_cancels: u32,
    /// Time to first token per turn, milliseconds.
    pub first_token_ms: Vec<u64>,
}

impl CallMetrics {
    /// Record a time-to-first-token sample.
    pub fn record_first_token(&mut self, latency_ms: u64) {
        self.first_token_ms.push(latency_ms);
    }
}

/// Snapshot persisted (by the CRM layer, out of scope here) when a call ends.
#[derive(Debug, Clone, Serialize)]
pub struct CallSummary {
    /// The call's unique identifier.
    pub call_id: CallId,
    /// Tenant the call belonged to.
    pub tenant_id: String,
    /// Caller's phone number, when known.
    pub caller_phone: Option<String>,
    /// Media provider's stream identifier.
    pub stream_id: String,
    /// When the stream started.
    pub started_at: DateTime<Utc>,
    /// When cleanup ran.
    pub ended_at: DateTime<Utc>,
    /// Why the call ended.
    pub end_reason: EndReason,
    /// Per-call counters.
    pub metrics: CallMetrics,
    /// Full chat history at end of call.
    pub history: Vec<ChatMessage>,
}

/// Mutable state for one phone call. Single-owner: only the session task
/// touches it.
#[derive(Debug)]
pub struct CallSession {
    /// The call's unique identifier.
    pub call_id: CallId,
    /// Tenant the call belongs to.
    pub tenant_id: String,
    /// Caller's phone number, when the provider shares it.
    pub caller_phone: Option<String>,
    /// Media provider's stream identifier.
    pub stream_id: String,
    /// When the stream started.
    pub started_at: DateTime<Utc>,
    /// Ordered chat history. Append-only, except the single-slot pop a
    /// greedy cancel performs.
    pub history: Vec<ChatMessage>,
    /// Whether the caller is currently speaking (VAD).
    pub is_speaking: bool,
    /// Whether assistant audio is currently playing.
    pub is_playing: bool,
    /// Whether a barge-in is pending arbitration.
    pub interrupt_requested: bool,
    /// Per-call counters.
    pub metrics: CallMetrics,
}

impl CallSession {
    /// Create a session for a newly started media stream.
    pub fn new(config: &SessionConfig, start: &StreamStart) -> Self {
        Self {
            call_id: Uuid::new_v4().to_string(),
            tenant_id: config.tenant_id.clone(),
            caller_phone: start.caller_phone.clone(),
            stream_id: start.stream_id.clone(),
            started_at: Utc::now(),
            history: Vec::new(),
            is_speaking: false,
            is_playing: false,
            interrupt_requested: false,
            metrics: CallMetrics::default(),
        }
    }

    /// Snapshot the session for end-of-call persistence.
    pub fn summary(&self, end_reason: EndReason) -> CallSummary {
        CallSummary {
            call_id: self.call_id.clone(),
            tenant_id: self.tenant_id.clone(),
            caller_phone: self.caller_phone.clone(),
            stream_id: self.stream_id.clone(),
            started_at: self.started_at,
            ended_at: Utc::now(),
            end_reason,
            metrics: self.metrics.clone(),
            history: self.history.clone(),
        }
    }
}

/// Session-level callbacks out of the core.
///
/// Implementations must be cheap and non-blocking; they run on the session
/// task.
pub trait SessionCallbacks: Send + Sync {
    /// A full assistant response finished streaming.
    fn on_response(&self, _full_text: &str) {}

    /// The model asked to hand the caller to a human.
    fn on_transfer_requested(&self, _phone: &str) {}

    /// The session ended. Fires exactly once per call.
    fn on_call_end(&self, _summary: &CallSummary) {}
}

/// Callbacks that do nothing. Useful for tests and transcription-only hosts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl SessionCallbacks for NoopCallbacks {}

/// What the dispatcher keeps per live session.
#[derive(Clone)]
pub struct SessionHandle {
    /// The call this handle belongs to.
    pub call_id: CallId,
    /// Event channel into the session task.
    pub events: mpsc::Sender<SessionEvent>,
    /// Cancels the session task (process shutdown).
    pub cancel: CancellationToken,
    /// The session's STT adapter, for inbound audio forwarding.
    pub stt: Arc<dyn SttAdapter>,
}

/// Process-wide map of live sessions, keyed by call id.
///
/// Concurrent create/lookup/end are safe; the inner session state stays
/// single-owner inside its task.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<CallId, SessionHandle>>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session. Replaces any stale entry with the same id.
    pub async fn insert(&self, handle: SessionHandle) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(handle.call_id.clone(), handle);
    }

    /// Look up a live session's handle.
    pub async fn get(&self, call_id: &str) -> Option<SessionHandle> {
        self.sessions.read().await.get(call_id).cloned()
    }

    /// Remove a session, returning its handle if it was present.
    pub async fn remove(&self, call_id: &str) -> Option<SessionHandle> {
        self.sessions.write().await.remove(call_id)
    }

    /// Number of live sessions.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Whether no sessions are live.
    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Handles for every live session (used for shutdown fan-out).
    pub async fn all(&self) -> Vec<SessionHandle> {
        self.sessions.read().await.values().cloned().collect()
    }
}
