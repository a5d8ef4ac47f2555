//! Dispatcher lifecycle: stream start → session, audio forwarding, hangup
//! reaping the registry.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use parlance::config::AgentConfig;
use parlance::dispatch::{CallDispatcher, SessionFactory};
use parlance::error::Result;
use parlance::llm::{ChatRequest, LlmChunk, LlmChunkStream, LlmClient};
use parlance::media::{MediaEvent, MediaFormat, MediaSink, StreamStart};
use parlance::pipeline::events::{AgentEvent, SessionEvent};
use parlance::pipeline::manager::SessionDeps;
use parlance::session::{NoopCallbacks, SessionCallbacks};
use parlance::stt::{SttAdapter, SttEvent};
use parlance::tools::{ToolContext, ToolExecutor};
use parlance::tts::TtsAdapter;

#[derive(Default)]
struct NullStt {
    frames: AtomicUsize,
}

#[async_trait]
impl SttAdapter for NullStt {
    async fn start(&self) -> Result<()> {
        Ok(())
    }
    async fn stop(&self) {}
    fn send_audio(&self, _frame: Bytes) {
        self.frames.fetch_add(1, Ordering::SeqCst);
    }
}

struct NullTts;

#[async_trait]
impl TtsAdapter for NullTts {
    async fn connect(&self) -> Result<()> {
        Ok(())
    }
    async fn disconnect(&self) {}
    async fn speak(&self, _text: &str) -> Result<()> {
        Ok(())
    }
    async fn speak_chunk(&self, _text: &str, _continuation: bool) -> Result<()> {
        Ok(())
    }
    async fn cancel(&self) {}
}

struct NullLlm;

#[async_trait]
impl LlmClient for NullLlm {
    async fn stream_chat(
        &self,
        _request: ChatRequest,
        _abort: CancellationToken,
    ) -> Result<LlmChunkStream> {
        Ok(Box::pin(futures_util::stream::iter([LlmChunk::Done])))
    }
}

struct NullTools;

#[async_trait]
impl ToolExecutor for NullTools {
    async fn execute(
        &self,
        _name: &str,
        _arguments: serde_json::Value,
        _context: &ToolContext,
    ) -> Result<serde_json::Value> {
        Ok(serde_json::json!(null))
    }
}

struct NullMedia;

#[async_trait]
impl MediaSink for NullMedia {
    async fn send_audio(&self, _frame: Bytes) -> Result<()> {
        Ok(())
    }
    async fn clear_audio(&self) -> Result<()> {
        Ok(())
    }
}

struct NullFactory {
    stt: Arc<NullStt>,
}

impl SessionFactory for NullFactory {
    fn build(&self, _start: &StreamStart) -> Result<SessionDeps> {
        Ok(SessionDeps {
            stt: Arc::clone(&self.stt) as Arc<dyn SttAdapter>,
            tts: Arc::new(NullTts) as Arc<dyn TtsAdapter>,
            llm: Arc::new(NullLlm) as Arc<dyn LlmClient>,
            tools: Arc::new(NullTools) as Arc<dyn ToolExecutor>,
            media: Arc::new(NullMedia) as Arc<dyn MediaSink>,
            callbacks: Arc::new(NoopCallbacks) as Arc<dyn SessionCallbacks>,
            tool_definitions: Vec::new(),
        })
    }
}

fn stream_start(id: &str) -> StreamStart {
    StreamStart {
        stream_id: id.into(),
        caller_phone: None,
        format: MediaFormat {
            encoding: "audio/x-mulaw".into(),
            sample_rate: 8000,
        },
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

#[tokio::test(start_paused = true)]
async fn stream_lifecycle_creates_and_reaps_sessions() {
    let stt = Arc::new(NullStt::default());
    let dispatcher = CallDispatcher::new(
        AgentConfig::default(),
        Arc::new(NullFactory {
            stt: Arc::clone(&stt),
        }),
    );
    let mut telemetry = dispatcher.subscribe();

    let call_id = dispatcher
        .on_media_event(None, MediaEvent::Start(stream_start("MZ1")))
        .await
        .expect("session created")
        .expect("start yields a call id");
    settle().await;
    assert_eq!(dispatcher.registry().len().await, 1);

    // Inbound frames reach the session's STT adapter.
    dispatcher.on_audio(&call_id, Bytes::from_static(b"\x00\x01")).await;
    dispatcher.on_audio(&call_id, Bytes::from_static(b"\x02\x03")).await;
    assert_eq!(stt.frames.load(Ordering::SeqCst), 2);

    // Adapter callbacks route into the session by call id.
    dispatcher
        .deliver(&call_id, SessionEvent::Stt(SttEvent::SpeechStarted))
        .await
        .expect("event delivered");

    // Hangup tears the session down and reaps the registry entry.
    dispatcher
        .on_media_event(Some(&call_id), MediaEvent::Stop)
        .await
        .expect("stop accepted");
    settle().await;
    settle().await;
    assert_eq!(dispatcher.registry().len().await, 0);

    let mut saw_call_end = false;
    while let Ok(event) = telemetry.try_recv() {
        if matches!(event, AgentEvent::CallEnded { .. }) {
            saw_call_end = true;
        }
    }
    assert!(saw_call_end, "telemetry should report the call ending");

    // Events for the dead call are rejected, not silently dropped.
    assert!(
        dispatcher
            .deliver(&call_id, SessionEvent::TtsDone)
            .await
            .is_err()
    );
}

#[tokio::test(start_paused = true)]
async fn unknown_call_ids_are_ignored() {
    let dispatcher = CallDispatcher::new(
        AgentConfig::default(),
        Arc::new(NullFactory {
            stt: Arc::new(NullStt::default()),
        }),
    );
    dispatcher.on_audio("nope", Bytes::from_static(b"\x00")).await;
    dispatcher.on_stream_stop("nope").await;
    assert!(dispatcher.deliver("nope", SessionEvent::TtsDone).await.is_err());
    assert!(dispatcher.registry().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_all_sessions() {
    let dispatcher = CallDispatcher::new(
        AgentConfig::default(),
        Arc::new(NullFactory {
            stt: Arc::new(NullStt::default()),
        }),
    );
    dispatcher
        .on_stream_start(stream_start("MZ1"))
        .await
        .expect("first session");
    dispatcher
        .on_stream_start(stream_start("MZ2"))
        .await
        .expect("second session");
    settle().await;
    assert_eq!(dispatcher.registry().len().await, 2);

    dispatcher.shutdown().await;
    settle().await;
    settle().await;
    assert!(dispatcher.registry().is_empty().await);
}
