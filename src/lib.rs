//! Parlance: real-time turn-taking core for phone voice agents.
//!
//! Mediates a phone call between a human caller and an LLM, with streaming
//! STT, streaming TTS, and tool execution as external collaborators:
//!
//! Caller audio → STT → endpointing → LLM → sentence segmenter → TTS → caller
//!
//! # Architecture
//!
//! Each call runs as a single actor task owning all of its state. Adapters
//! post events onto the session's bounded channel; the task drains them in
//! FIFO order, which serializes every state mutation without locks. The hard
//! part is the Turn Manager ([`pipeline::manager`]): it decides moment by
//! moment who owns the conversational floor: when the caller's utterance is
//! complete, when to speculatively cancel inference, when to let an
//! acknowledgement pass versus honoring a real barge-in, and how to thread
//! tool calls through a streamed spoken response.
//!
//! - **Segmenter** ([`segmenter`]): streamed LLM text → sentence-sized TTS chunks
//! - **Classifier** ([`classifier`]): rule-based utterance completeness
//! - **Endpointing** ([`endpointing`]): layered wait policy before answering
//! - **FSM** ([`fsm`]): floor ownership with an explicit transition table
//! - **Turn Manager** ([`pipeline::manager`]): the per-call orchestrator
//! - **Dispatcher** ([`dispatch`]): media stream lifecycle → sessions
//!
//! STT, TTS, LLM, tools, and the media transport are trait seams
//! ([`stt`], [`tts`], [`llm`], [`tools`], [`media`]); hosts plug in
//! provider integrations and wire their callbacks back through the
//! dispatcher.

pub mod classifier;
pub mod config;
pub mod dispatch;
pub mod endpointing;
pub mod error;
pub mod fsm;
pub mod history;
pub mod llm;
pub mod media;
pub mod pipeline;
pub mod segmenter;
pub mod session;
pub mod stt;
pub mod tools;
pub mod tts;
pub mod turn;

pub use config::AgentConfig;
pub use dispatch::{CallDispatcher, SessionFactory};
pub use error::{AgentError, Result};
pub use pipeline::events::{AgentEvent, SessionEvent};
pub use pipeline::manager::{SessionDeps, TurnManager};
pub use session::{CallSummary, EndReason, SessionCallbacks, SessionRegistry};
