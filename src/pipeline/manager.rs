//! The Turn Manager: per-call orchestration of who speaks when.
//!
//! Each call runs as one actor task owning all of its state. External
//! collaborators (STT, TTS, LLM, tools, media transport) post
//! [`SessionEvent`]s onto the session's bounded channel; the task drains
//! them in FIFO order, so there is no re-entrancy and no locking inside a
//! session. Timers are deadlines polled by the task's own `select!` loop and
//! re-check their predicates when they fire, which makes a timer that lost a
//! race with a state change a no-op.
//!
//! The manager decides, moment by moment:
//! - when the caller's utterance is complete enough to answer (endpointing,
//!   layered over the rule-based completeness classifier);
//! - when to speculatively cancel inference because the caller resumed
//!   (greedy cancel, restoring the already-heard transcript);
//! - when caller speech during playback is a real interruption versus a
//!   backchannel acknowledgement ("uh-huh") to talk through;
//! - how to interleave tool calls into a streamed response without going
//!   silent (tool fillers) and without corrupting history;
//! - when a response has fully drained so the floor returns to the caller.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::classifier::{self, Utterance};
use crate::config::AgentConfig;
use crate::endpointing;
use crate::fsm::{self, PipelineEvent, PipelineState};
use crate::history;
use crate::history::{ChatMessage, ToolCallRequest};
use crate::llm::{ChatRequest, LlmChunk, LlmClient, ToolDefinition};
use crate::media::{MediaSink, StreamStart};
use crate::pipeline::events::{AgentEvent, SESSION_EVENT_BUFFER, SessionEvent};
use crate::segmenter::SentenceSegmenter;
use crate::session::{CallSession, EndReason, SessionCallbacks, SessionHandle};
use crate::stt::{SttAdapter, SttEvent};
use crate::tools::{TRANSFER_TOOL, ToolContext, ToolExecutor, coerce_result, tool_filler};
use crate::tts::TtsAdapter;
use crate::turn::TurnState;

/// Transcripts that are backchannel acknowledgements, not interruptions.
/// A final matching this set while a barge-in is pending cancels the
/// barge-in and is discarded.
const ACKNOWLEDGEMENTS: &[&str] = &[
    "yeah", "yes", "yep", "yup", "okay", "ok", "right", "uh-huh", "uh huh", "mm-hmm", "mm hmm",
    "mmhmm", "mhm", "got it", "sure", "alright", "correct", "that's right",
];

/// External collaborators injected into a session.
pub struct SessionDeps {
    /// Speech-to-text stream.
    pub stt: Arc<dyn SttAdapter>,
    /// Text-to-speech stream.
    pub tts: Arc<dyn TtsAdapter>,
    /// Streaming LLM client (with provider fallback inside).
    pub llm: Arc<dyn LlmClient>,
    /// Tool executor.
    pub tools: Arc<dyn ToolExecutor>,
    /// Outbound media transport.
    pub media: Arc<dyn MediaSink>,
    /// Session-level callbacks out of the core.
    pub callbacks: Arc<dyn SessionCallbacks>,
    /// Tools offered to the model on every request.
    pub tool_definitions: Vec<ToolDefinition>,
}

/// A barge-in waiting for its transcript to be arbitrated.
#[derive(Debug, Clone, Copy)]
struct PendingBargeIn {
    /// When the safety timer fires and interrupts unconditionally.
    deadline: Instant,
}

/// Per-call orchestrator. Constructed and spawned via [`TurnManager::spawn`].
pub struct TurnManager {
    config: AgentConfig,
    deps: SessionDeps,
    session: CallSession,
    state: PipelineState,
    turn: TurnState,
    segmenter: SentenceSegmenter,

    events_tx: mpsc::Sender<SessionEvent>,
    telemetry: Option<broadcast::Sender<AgentEvent>>,

    /// Session-wide cancellation (process shutdown).
    cancel: CancellationToken,
    /// Cancellation for the in-flight LLM stream only.
    llm_abort: CancellationToken,
    /// Stream generation counter; events tagged with an older epoch are stale.
    epoch: u64,

    endpoint_deadline: Option<Instant>,
    filler_deadline: Option<Instant>,
    barge_in: Option<PendingBargeIn>,
    /// Set when a barge-in was admitted for the current playback; blocks a
    /// second admission until playback ends or an acknowledgement resets it.
    barge_in_handled: bool,

    /// An LLM request is in flight (invariant: at most one per session).
    processing: bool,
    /// A turn arrived while one was in flight; re-check when it drains.
    pending_transcript: bool,
    /// A tool is executing; the stream resumes from its result.
    awaiting_tool: bool,
    /// Transcript snapshot for greedy-cancel restore.
    saved_transcript: Option<String>,

    /// TTS chunks dispatched but not yet reported done.
    pending_tts_chunks: usize,
    /// The response stream has delivered everything it will.
    response_stream_complete: bool,
    /// When the current playback's first chunk went out.
    tts_started_at: Option<Instant>,

    /// First sentence of the current stream segment gets a fresh chunk.
    segment_first_chunk: bool,
    /// A thinking filler was spoken before this segment's first sentence,
    /// so that sentence continues the filler's prosody.
    segment_filler_bias: bool,
    /// Text of the assistant message currently being streamed.
    segment_text: String,
    /// All response text for this turn (across tool-call segments).
    response_text: String,
    first_token_seen: bool,
    turn_started_at: Option<Instant>,

    /// The most recent assistant utterance, for context-aware endpointing.
    last_assistant_prompt: String,

    cleaned_up: bool,
}

impl TurnManager {
    /// Create a session for a new media stream and spawn its actor task.
    ///
    /// Returns the dispatcher-facing handle and the task's join handle.
    pub fn spawn(
        config: AgentConfig,
        start: StreamStart,
        deps: SessionDeps,
        telemetry: Option<broadcast::Sender<AgentEvent>>,
    ) -> (SessionHandle, JoinHandle<()>) {
        let (events_tx, events_rx) = mpsc::channel(SESSION_EVENT_BUFFER);
        let cancel = CancellationToken::new();
        let llm_abort = cancel.child_token();
        let session = CallSession::new(&config.session, &start);
        let handle = SessionHandle {
            call_id: session.call_id.clone(),
            events: events_tx.clone(),
            cancel: cancel.clone(),
            stt: Arc::clone(&deps.stt),
        };
        let segmenter = SentenceSegmenter::new(&config.segmenter);
        let greeting = config.session.greeting.clone();
        let manager = Self {
            config,
            deps,
            session,
            state: PipelineState::Idle,
            turn: TurnState::new(),
            segmenter,
            events_tx,
            telemetry,
            cancel,
            llm_abort,
            epoch: 0,
            endpoint_deadline: None,
            filler_deadline: None,
            barge_in: None,
            barge_in_handled: false,
            processing: false,
            pending_transcript: false,
            awaiting_tool: false,
            saved_transcript: None,
            pending_tts_chunks: 0,
            response_stream_complete: false,
            tts_started_at: None,
            segment_first_chunk: true,
            segment_filler_bias: false,
            segment_text: String::new(),
            response_text: String::new(),
            first_token_seen: false,
            turn_started_at: None,
            last_assistant_prompt: greeting,
            cleaned_up: false,
        };
        let join = tokio::spawn(manager.run(events_rx));
        (handle, join)
    }

    /// The session actor: greeting, then drain events until terminated.
    async fn run(mut self, mut events: mpsc::Receiver<SessionEvent>) {
        info!(call_id = %self.session.call_id, stream_id = %self.session.stream_id, "call session starting");

        if let Err(e) = self.deps.tts.connect().await {
            error!(call_id = %self.session.call_id, "TTS connect failed, aborting call: {e}");
            self.cleanup(EndReason::TtsInitFailed).await;
            return;
        }
        if let Err(e) = self.deps.stt.start().await {
            // Non-fatal at init: the greeting still plays, but the caller
            // can no longer be understood.
            error!(call_id = %self.session.call_id, "STT start failed, continuing without transcription: {e}");
        }

        self.apply(PipelineEvent::StartGreeting);
        if let Err(e) = self.deps.tts.speak(&self.config.session.greeting).await {
            warn!(call_id = %self.session.call_id, "greeting synthesis failed: {e}");
            self.apply(PipelineEvent::GreetingFailed);
        }

        let cancel = self.cancel.clone();
        loop {
            if self.state == PipelineState::Terminated {
                break;
            }
            let endpoint_deadline = self.endpoint_deadline;
            let filler_deadline = self.filler_deadline;
            let barge_deadline = self.barge_in.as_ref().map(|b| b.deadline);

            tokio::select! {
                () = cancel.cancelled() => {
                    self.cleanup(EndReason::Shutdown).await;
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => {
                        self.cleanup(EndReason::MediaError("session event channel closed".into())).await;
                        break;
                    }
                },
                () = maybe_sleep(endpoint_deadline) => self.on_endpoint_timer().await,
                () = maybe_sleep(barge_deadline) => self.on_barge_in_timer().await,
                () = maybe_sleep(filler_deadline) => self.on_filler_timer().await,
            }
        }
        debug!(call_id = %self.session.call_id, "session task exiting");
    }

    async fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Stt(stt_event) => match stt_event {
                SttEvent::SpeechStarted => self.on_speech_started().await,
                SttEvent::SpeechEnded => self.on_speech_ended(),
                SttEvent::Transcript { text, is_final } => {
                    self.on_transcript(&text, is_final).await;
                }
                SttEvent::Error(e) => {
                    warn!(call_id = %self.session.call_id, "STT error: {e}");
                }
                SttEvent::Closed => {
                    warn!(call_id = %self.session.call_id, "STT stream closed");
                }
            },
            SessionEvent::TtsDone => self.on_tts_done().await,
            SessionEvent::TtsError(message) => self.on_tts_error(&message).await,
            SessionEvent::Llm { epoch, chunk } => {
                if epoch != self.epoch {
                    debug!(call_id = %self.session.call_id, "dropping chunk from stale LLM stream");
                    return;
                }
                self.on_llm_chunk(chunk).await;
            }
            SessionEvent::LlmClosed { epoch } => {
                if epoch == self.epoch && self.processing && !self.awaiting_tool {
                    // Stream ended without an explicit Done; close out the turn.
                    self.finish_response().await;
                }
            }
            SessionEvent::LlmFailed { epoch, message } => {
                if epoch == self.epoch {
                    self.turn_failed(&message).await;
                }
            }
            SessionEvent::ToolFinished {
                epoch,
                call_id,
                name,
                result,
            } => {
                if epoch == self.epoch {
                    self.on_tool_finished(call_id, name, result).await;
                }
            }
            SessionEvent::ToolFailed {
                epoch,
                call_id,
                name,
                message,
            } => {
                if epoch == self.epoch {
                    warn!(call_id = %self.session.call_id, tool = %name, "tool execution failed: {message}");
                    // Record the failure as the tool's result so history stays
                    // well-formed and the model can tell the caller.
                    self.on_tool_finished(call_id, name, format!("error: {message}"))
                        .await;
                }
            }
            SessionEvent::Hangup { reason } => self.cleanup(reason).await,
        }
    }

    // ── Caller speech ─────────────────────────────────────────

    async fn on_speech_started(&mut self) {
        self.session.is_speaking = true;

        if self.state == PipelineState::Processing {
            self.greedy_cancel().await;
        }

        match self.state {
            PipelineState::Listening => {
                // The caller is still talking; hold the endpointing timer.
                self.endpoint_deadline = None;
                self.turn.start_accumulation();
            }
            PipelineState::Speaking => {
                self.endpoint_deadline = None;
                let min_playback = Duration::from_millis(self.config.barge_in.min_playback_ms);
                let played_long_enough = self
                    .tts_started_at
                    .is_some_and(|started| started.elapsed() >= min_playback);
                if self.state.can_barge_in()
                    && played_long_enough
                    && self.barge_in.is_none()
                    && !self.barge_in_handled
                {
                    let wait = Duration::from_millis(self.config.barge_in.transcript_wait_ms);
                    info!(call_id = %self.session.call_id, "possible barge-in, waiting for transcript");
                    self.barge_in = Some(PendingBargeIn {
                        deadline: Instant::now() + wait,
                    });
                    self.barge_in_handled = true;
                    self.session.interrupt_requested = true;
                }
            }
            _ => {}
        }
    }

    fn on_speech_ended(&mut self) {
        self.session.is_speaking = false;
        if self.state == PipelineState::Listening {
            self.schedule_processing();
        }
    }

    async fn on_transcript(&mut self, text: &str, is_final: bool) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }
        if !is_final {
            self.turn.on_partial(text);
            return;
        }

        if self.barge_in.is_some() {
            if is_acknowledgement(text) {
                info!(call_id = %self.session.call_id, %text, "acknowledgement during playback, continuing");
                self.barge_in = None;
                self.barge_in_handled = false;
                self.session.interrupt_requested = false;
                self.emit(AgentEvent::BargeInSuppressed {
                    call_id: self.session.call_id.clone(),
                    text: text.to_owned(),
                });
                // The acknowledgement is discarded, not processed.
                return;
            }
            self.execute_barge_in().await;
        }

        self.turn.push_final(text);
        if self.state == PipelineState::Listening {
            self.schedule_processing();
        }
    }

    // ── Barge-in ──────────────────────────────────────────────

    async fn on_barge_in_timer(&mut self) {
        if self.barge_in.is_none() {
            return;
        }
        if !self.state.can_barge_in() {
            // Playback ended while the transcript was pending.
            self.barge_in = None;
            self.session.interrupt_requested = false;
            return;
        }
        info!(call_id = %self.session.call_id, "no transcript within barge-in window, interrupting");
        self.execute_barge_in().await;
    }

    async fn execute_barge_in(&mut self) {
        info!(call_id = %self.session.call_id, "barge-in confirmed, stopping playback");
        self.barge_in = None;
        self.session.interrupt_requested = false;
        self.abort_stream();
        self.processing = false;
        self.filler_deadline = None;
        self.deps.tts.cancel().await;
        if let Err(e) = self.deps.media.clear_audio().await {
            warn!(call_id = %self.session.call_id, "failed to clear media queue: {e}");
        }
        self.turn.bump_audio_queue();
        self.pending_tts_chunks = 0;
        self.response_stream_complete = false;
        if self.awaiting_tool {
            self.awaiting_tool = false;
            history::truncate_to_well_formed(&mut self.session.history);
        }
        self.apply(PipelineEvent::BargeIn);
        self.session.is_playing = false;
        self.tts_started_at = None;
        self.turn.restart_accumulation();
        self.session.metrics.barge_ins += 1;
        self.emit(AgentEvent::BargeInExecuted {
            call_id: self.session.call_id.clone(),
        });
    }

    // ── Greedy cancel ─────────────────────────────────────────

    /// The caller resumed while inference was running and nothing has been
    /// spoken yet: drop the speculative response, rewind the user message,
    /// and splice the already-heard transcript back so new speech appends
    /// to it.
    async fn greedy_cancel(&mut self) {
        info!(call_id = %self.session.call_id, "caller resumed during inference, greedy cancel");
        self.abort_stream();
        self.processing = false;
        self.filler_deadline = None;
        self.deps.tts.cancel().await;
        if let Err(e) = self.deps.media.clear_audio().await {
            warn!(call_id = %self.session.call_id, "failed to clear media queue: {e}");
        }
        self.turn.bump_audio_queue();
        self.pending_tts_chunks = 0;
        self.response_stream_complete = false;
        if self.awaiting_tool {
            self.awaiting_tool = false;
            history::truncate_to_well_formed(&mut self.session.history);
        }
        if history::pop_last_user(&mut self.session.history).is_none() {
            warn!(call_id = %self.session.call_id, "greedy cancel found no user message to rewind");
        }
        if let Some(saved) = self.saved_transcript.take() {
            self.turn.restore_front(&saved);
        }
        self.apply(PipelineEvent::GreedyCancel);
        self.session.is_playing = false;
        self.turn.restart_accumulation();
        self.session.metrics.greedy_cancels += 1;
        self.emit(AgentEvent::GreedyCancelled {
            call_id: self.session.call_id.clone(),
        });
    }

    // ── Endpointing ───────────────────────────────────────────

    /// (Re)arm the single endpointing timer from the layered wait policy.
    fn schedule_processing(&mut self) {
        let transcript = self.turn.transcript();
        if transcript.is_empty() {
            return;
        }
        let wait = endpointing::wait_for(
            &transcript,
            &self.last_assistant_prompt,
            &self.config.endpointing,
        );
        self.reschedule(wait);
    }

    fn reschedule(&mut self, wait: Duration) {
        // A single timer per session: arming replaces any earlier deadline.
        self.endpoint_deadline = Some(Instant::now() + wait);
        debug!(call_id = %self.session.call_id, wait_ms = wait.as_millis() as u64, "endpointing timer armed");
        self.emit(AgentEvent::EndpointingScheduled {
            call_id: self.session.call_id.clone(),
            wait_ms: wait.as_millis() as u64,
        });
    }

    async fn on_endpoint_timer(&mut self) {
        self.endpoint_deadline = None;
        if self.state != PipelineState::Listening {
            return;
        }
        self.process_user_turn().await;
    }

    // ── Turn processing ───────────────────────────────────────

    async fn process_user_turn(&mut self) {
        if self.processing || self.state == PipelineState::Speaking {
            self.pending_transcript = true;
            return;
        }
        if self.state != PipelineState::Listening {
            return;
        }

        let transcript = self.turn.transcript();
        if transcript.chars().count() < self.config.turn.min_transcript_len {
            self.turn.reset_accumulation();
            return;
        }

        let forced = self
            .turn
            .accumulation_elapsed()
            .is_some_and(|e| e >= Duration::from_millis(self.config.turn.max_accumulation_ms));
        if forced {
            info!(call_id = %self.session.call_id, "accumulation cap reached, force-processing");
        } else {
            match classifier::classify(&transcript) {
                Utterance::Filler => {
                    self.reschedule(Duration::from_millis(self.config.turn.filler_reschedule_ms));
                    return;
                }
                Utterance::Incomplete => {
                    self.reschedule(Duration::from_millis(
                        self.config.turn.incomplete_reschedule_ms,
                    ));
                    return;
                }
                Utterance::Maybe => {
                    let wait = endpointing::wait_for(
                        &transcript,
                        &self.last_assistant_prompt,
                        &self.config.endpointing,
                    );
                    self.reschedule(wait);
                    return;
                }
                Utterance::Complete => {}
            }
        }

        info!(call_id = %self.session.call_id, %transcript, "processing user turn");
        self.turn.reset_accumulation();
        self.saved_transcript = Some(transcript.clone());
        self.turn.clear();
        self.session.history.push(ChatMessage::user(transcript.clone()));
        self.abort_stream();
        self.apply(PipelineEvent::EndpointReached);
        self.processing = true;
        self.turn_started_at = Some(Instant::now());
        self.first_token_seen = false;
        self.segment_first_chunk = true;
        self.segment_filler_bias = false;
        self.segment_text.clear();
        self.response_text.clear();
        self.segmenter.clear();
        self.response_stream_complete = false;
        self.session.metrics.turns += 1;
        if self.config.filler.enabled {
            self.filler_deadline =
                Some(Instant::now() + Duration::from_millis(self.config.filler.delay_ms));
        }
        self.emit(AgentEvent::TurnStarted {
            call_id: self.session.call_id.clone(),
            transcript,
        });
        self.start_llm_stream();
    }

    /// Spawn the pump task that forwards one LLM stream into the session
    /// channel. Stale chunks are filtered by epoch when drained.
    fn start_llm_stream(&mut self) {
        let request = ChatRequest {
            history: self.session.history.clone(),
            system_prompt: self.config.llm.system_prompt.clone(),
            tools: self.deps.tool_definitions.clone(),
        };
        let llm = Arc::clone(&self.deps.llm);
        let events = self.events_tx.clone();
        let abort = self.llm_abort.clone();
        let epoch = self.epoch;
        tokio::spawn(async move {
            let mut stream = match llm.stream_chat(request, abort.clone()).await {
                Ok(stream) => stream,
                Err(e) => {
                    let _ = events
                        .send(SessionEvent::LlmFailed {
                            epoch,
                            message: e.to_string(),
                        })
                        .await;
                    return;
                }
            };
            loop {
                tokio::select! {
                    () = abort.cancelled() => break,
                    chunk = stream.next() => match chunk {
                        Some(chunk) => {
                            if events.send(SessionEvent::Llm { epoch, chunk }).await.is_err() {
                                break;
                            }
                        }
                        None => {
                            let _ = events.send(SessionEvent::LlmClosed { epoch }).await;
                            break;
                        }
                    }
                }
            }
        });
    }

    async fn on_llm_chunk(&mut self, chunk: LlmChunk) {
        match chunk {
            LlmChunk::Text { content, provider } => {
                if !self.first_token_seen {
                    self.first_token_seen = true;
                    self.filler_deadline = None;
                    if let Some(started) = self.turn_started_at {
                        let latency_ms = started.elapsed().as_millis() as u64;
                        self.session.metrics.record_first_token(latency_ms);
                        self.emit(AgentEvent::FirstToken {
                            call_id: self.session.call_id.clone(),
                            latency_ms,
                            provider,
                        });
                    }
                }
                self.segment_text.push_str(&content);
                self.response_text.push_str(&content);
                let sentences = self.segmenter.add(&content);
                for sentence in sentences {
                    self.speak_sentence(&sentence).await;
                }
            }
            LlmChunk::ToolCall {
                id,
                name,
                arguments,
            } => self.on_tool_call(id, name, arguments).await,
            LlmChunk::Error { message } => {
                // The adapter already fell back across providers; nothing to
                // do here but note it and keep consuming.
                warn!(call_id = %self.session.call_id, "LLM stream error chunk: {message}");
            }
            LlmChunk::Done => self.finish_response().await,
        }
    }

    // ── Tool interleaving ─────────────────────────────────────

    async fn on_tool_call(&mut self, id: String, name: String, arguments: serde_json::Value) {
        info!(call_id = %self.session.call_id, tool = %name, "model requested tool");
        self.filler_deadline = None;

        // Text already buffered belongs to this assistant message; say it
        // before the filler.
        if let Some(rest) = self.segmenter.flush() {
            self.speak_sentence(&rest).await;
        }
        let text = std::mem::take(&mut self.segment_text);
        self.session
            .history
            .push(ChatMessage::assistant_with_tool_calls(
                text.trim().to_owned(),
                vec![ToolCallRequest {
                    id: id.clone(),
                    name: name.clone(),
                    arguments: arguments.clone(),
                }],
            ));

        // Providers end the stream after emitting tool calls; stop consuming
        // it and continue from the tool result on a fresh stream.
        self.abort_stream();
        self.awaiting_tool = true;
        self.session.metrics.tool_calls += 1;
        self.emit(AgentEvent::ToolCalled {
            call_id: self.session.call_id.clone(),
            name: name.clone(),
        });

        // Mask tool latency immediately. Fresh chunk: the filler and the
        // post-tool answer are separate prosodic units.
        self.emit_tts_chunk(tool_filler(&name), false).await;

        let tools = Arc::clone(&self.deps.tools);
        let events = self.events_tx.clone();
        let epoch = self.epoch;
        let context = self.tool_context();
        tokio::spawn(async move {
            let event = match tools.execute(&name, arguments, &context).await {
                Ok(value) => SessionEvent::ToolFinished {
                    epoch,
                    call_id: id,
                    name,
                    result: coerce_result(&value),
                },
                Err(e) => SessionEvent::ToolFailed {
                    epoch,
                    call_id: id,
                    name,
                    message: e.to_string(),
                },
            };
            let _ = events.send(event).await;
        });
    }

    async fn on_tool_finished(&mut self, call_id: String, name: String, result: String) {
        if !self.awaiting_tool {
            return;
        }
        self.awaiting_tool = false;
        debug!(call_id = %self.session.call_id, tool = %name, "tool finished");
        self.session
            .history
            .push(ChatMessage::tool_result(call_id, name.clone(), result));

        if name == TRANSFER_TOOL {
            let phone = self
                .config
                .session
                .escalation_phone
                .clone()
                .unwrap_or_default();
            self.deps.callbacks.on_transfer_requested(&phone);
        }

        // Continue the response from the tool result. The first sentence of
        // the continuation is a fresh chunk (the tool filler was too).
        self.segment_first_chunk = true;
        self.segment_filler_bias = false;
        if !self.response_text.is_empty() && !self.response_text.ends_with(' ') {
            self.response_text.push(' ');
        }
        self.start_llm_stream();
    }

    // ── Response production ───────────────────────────────────

    async fn speak_sentence(&mut self, text: &str) {
        let continuation = if self.segment_first_chunk {
            self.segment_first_chunk = false;
            self.segment_filler_bias
        } else {
            true
        };
        self.emit_tts_chunk(text, continuation).await;
    }

    async fn emit_tts_chunk(&mut self, text: &str, continuation: bool) {
        if self.state == PipelineState::Processing {
            self.apply(PipelineEvent::ResponseStarted);
            self.session.is_playing = true;
            self.tts_started_at = Some(Instant::now());
            // New playback, new barge-in budget.
            self.barge_in_handled = false;
        }
        // Incremented before the dispatch so the done handler always
        // observes the chunk.
        self.pending_tts_chunks += 1;
        if let Err(e) = self.deps.tts.speak_chunk(text, continuation).await {
            error!(call_id = %self.session.call_id, "TTS chunk dispatch failed: {e}");
            self.pending_tts_chunks = self.pending_tts_chunks.saturating_sub(1);
        }
    }

    async fn finish_response(&mut self) {
        if let Some(rest) = self.segmenter.flush() {
            // Final flush closes prosody.
            self.emit_tts_chunk(&rest, false).await;
        }
        self.processing = false;
        self.response_stream_complete = true;
        self.filler_deadline = None;

        let text = std::mem::take(&mut self.segment_text);
        let text = text.trim().to_owned();
        if !text.is_empty() {
            self.session.history.push(ChatMessage::assistant(text));
        }
        let full = self.response_text.trim().to_owned();
        if !full.is_empty() {
            self.last_assistant_prompt = full.clone();
            self.deps.callbacks.on_response(&full);
            self.emit(AgentEvent::ResponseComplete {
                call_id: self.session.call_id.clone(),
                text: full,
            });
        }

        if self.pending_tts_chunks == 0 {
            // Nothing queued (or nothing was ever spoken): the floor goes
            // straight back to the caller.
            self.finish_playback().await;
        }
    }

    async fn on_tts_done(&mut self) {
        if self.state == PipelineState::Greeting {
            self.apply(PipelineEvent::GreetingFinished);
            // Speech that arrived during the greeting is already buffered.
            self.schedule_processing();
            return;
        }
        if self.pending_tts_chunks > 0 {
            self.pending_tts_chunks -= 1;
        }
        if self.pending_tts_chunks == 0 && self.response_stream_complete {
            self.finish_playback().await;
        }
    }

    async fn on_tts_error(&mut self, message: &str) {
        error!(call_id = %self.session.call_id, "TTS error: {message}");
        match self.state {
            PipelineState::Greeting => {
                self.apply(PipelineEvent::GreetingFailed);
                self.schedule_processing();
            }
            PipelineState::Speaking => {
                self.abort_stream();
                self.processing = false;
                self.filler_deadline = None;
                self.pending_tts_chunks = 0;
                self.response_stream_complete = false;
                if self.awaiting_tool {
                    self.awaiting_tool = false;
                    history::truncate_to_well_formed(&mut self.session.history);
                }
                self.apply(PipelineEvent::PlaybackFailed);
                self.session.is_playing = false;
                self.tts_started_at = None;
                self.barge_in = None;
                self.barge_in_handled = false;
            }
            _ => {}
        }
    }

    async fn finish_playback(&mut self) {
        self.apply(PipelineEvent::PlaybackFinished);
        self.session.is_playing = false;
        self.response_stream_complete = false;
        self.tts_started_at = None;
        self.barge_in = None;
        self.barge_in_handled = false;
        self.session.interrupt_requested = false;
        self.check_pending_response().await;
    }

    /// If a new transcript accumulated while the assistant held the floor,
    /// process it now.
    async fn check_pending_response(&mut self) {
        let has_buffer =
            self.turn.transcript().chars().count() >= self.config.turn.min_transcript_len;
        if (self.pending_transcript || has_buffer) && !self.session.is_speaking {
            self.pending_transcript = false;
            self.process_user_turn().await;
        }
    }

    // ── Failure ───────────────────────────────────────────────

    async fn turn_failed(&mut self, message: &str) {
        error!(call_id = %self.session.call_id, "turn failed: {message}");
        self.processing = false;
        self.filler_deadline = None;
        self.abort_stream();
        if self.awaiting_tool {
            self.awaiting_tool = false;
            history::truncate_to_well_formed(&mut self.session.history);
        }
        self.segment_text.clear();
        self.response_text.clear();
        self.segmenter.clear();

        let apology = self.config.llm.fallback_utterance.clone();
        match self.state {
            PipelineState::Processing => {
                // The apology is tracked playback like any response chunk:
                // the floor returns to the caller only once its own
                // completion is observed, never while it is still playing.
                self.response_stream_complete = true;
                self.pending_tts_chunks += 1;
                match self.deps.tts.speak(&apology).await {
                    Ok(()) => {
                        self.apply(PipelineEvent::ResponseStarted);
                        self.session.is_playing = true;
                        self.tts_started_at = Some(Instant::now());
                        self.barge_in_handled = false;
                        self.last_assistant_prompt = apology;
                    }
                    Err(e) => {
                        error!(call_id = %self.session.call_id, "failed to speak fallback: {e}");
                        self.pending_tts_chunks = self.pending_tts_chunks.saturating_sub(1);
                        self.response_stream_complete = false;
                        self.apply(PipelineEvent::TurnFailed);
                        self.check_pending_response().await;
                    }
                }
            }
            PipelineState::Speaking => {
                // Chunks already queued keep playing and the apology follows
                // them. It is counted in the playback accounting, so the
                // floor (and any buffered transcript) waits for its TtsDone.
                self.response_stream_complete = true;
                self.pending_tts_chunks += 1;
                match self.deps.tts.speak(&apology).await {
                    Ok(()) => {
                        self.last_assistant_prompt = apology;
                    }
                    Err(e) => {
                        error!(call_id = %self.session.call_id, "failed to speak fallback: {e}");
                        self.pending_tts_chunks = self.pending_tts_chunks.saturating_sub(1);
                        if self.pending_tts_chunks == 0 {
                            self.finish_playback().await;
                        }
                    }
                }
            }
            _ => {}
        }
    }

    // ── Cleanup ───────────────────────────────────────────────

    /// Idempotent teardown: runs at most once per session.
    async fn cleanup(&mut self, reason: EndReason) {
        if self.cleaned_up {
            return;
        }
        self.cleaned_up = true;
        info!(call_id = %self.session.call_id, %reason, "cleaning up session");

        self.abort_stream();
        self.endpoint_deadline = None;
        self.filler_deadline = None;
        self.barge_in = None;
        self.pending_transcript = false;

        tokio::join!(self.deps.stt.stop(), self.deps.tts.disconnect());

        self.apply(PipelineEvent::Hangup);
        let summary = self.session.summary(reason.clone());
        self.deps.callbacks.on_call_end(&summary);
        self.emit(AgentEvent::CallEnded {
            call_id: self.session.call_id.clone(),
            reason,
        });
    }

    // ── Plumbing ──────────────────────────────────────────────

    /// Abort the in-flight LLM stream and invalidate its events.
    fn abort_stream(&mut self) {
        self.llm_abort.cancel();
        self.llm_abort = self.cancel.child_token();
        self.epoch = self.epoch.wrapping_add(1);
    }

    fn tool_context(&self) -> ToolContext {
        ToolContext {
            tenant_id: self.session.tenant_id.clone(),
            call_id: self.session.call_id.clone(),
            caller_phone: self.session.caller_phone.clone(),
            escalation_phone: self.config.session.escalation_phone.clone(),
        }
    }

    /// Apply a pipeline event; illegal transitions are logged and dropped.
    fn apply(&mut self, event: PipelineEvent) {
        match fsm::transition(self.state, event) {
            Ok(next) => {
                if next != self.state {
                    debug!(call_id = %self.session.call_id, from = %self.state, to = %next, "pipeline state change");
                    self.emit(AgentEvent::StateChanged {
                        call_id: self.session.call_id.clone(),
                        from: self.state,
                        to: next,
                    });
                }
                self.state = next;
            }
            Err(illegal) => {
                warn!(call_id = %self.session.call_id, %illegal, "dropping illegal pipeline transition");
            }
        }
    }

    fn emit(&self, event: AgentEvent) {
        if let Some(tx) = &self.telemetry {
            let _ = tx.send(event);
        }
    }

    async fn on_filler_timer(&mut self) {
        self.filler_deadline = None;
        if !self.config.filler.enabled
            || self.state != PipelineState::Processing
            || self.first_token_seen
        {
            return;
        }
        let text = self.config.filler.text.clone();
        self.segment_filler_bias = true;
        self.emit_tts_chunk(&text, false).await;
    }
}

/// Sleep until the deadline, or forever when there is none. Deadlines are
/// absolute, so re-creating the future every loop iteration is harmless.
async fn maybe_sleep(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Whether a final transcript is a backchannel acknowledgement.
fn is_acknowledgement(text: &str) -> bool {
    let normalized = text
        .to_lowercase()
        .trim()
        .trim_end_matches(['.', '!', '?', ','])
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    ACKNOWLEDGEMENTS.contains(&normalized.as_str())
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    // ── Acknowledgement set ───────────────────────────────────

    #[test]
    fn bare_acknowledgements_match() {
        for text in [
            "yeah", "yes", "yep", "yup", "okay", "ok", "right", "uh-huh", "uh huh", "mm-hmm",
            "mm hmm", "mmhmm", "mhm", "got it", "sure", "alright", "correct", "that's right",
        ] {
            assert!(is_acknowledgement(text), "{text} should be an acknowledgement");
        }
    }

    #[test]
    fn punctuated_and_cased_acknowledgements_match() {
        assert!(is_acknowledgement("Uh-huh."));
        assert!(is_acknowledgement("OKAY!"));
        assert!(is_acknowledgement("  got it  "));
        assert!(is_acknowledgement("That's right."));
    }

    #[test]
    fn real_speech_is_not_an_acknowledgement() {
        assert!(!is_acknowledgement("wait, actually change that."));
        assert!(!is_acknowledgement("yes but make it two nights"));
        assert!(!is_acknowledgement("no"));
        assert!(!is_acknowledgement(""));
    }
}
