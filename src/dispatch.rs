//! Media entry point: maps provider stream events onto session lifecycles.
//!
//! The dispatcher owns the [`SessionRegistry`] and one telemetry broadcast
//! shared by all sessions. A host integration feeds it [`MediaEvent`]-shaped
//! callbacks: stream start creates and spawns a session, audio frames are
//! forwarded to that session's STT adapter, and stop/error trigger cleanup.
//! Adapter callbacks (STT transcripts, TTS completions) are delivered into a
//! session with [`CallDispatcher::deliver`].

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::AgentConfig;
use crate::error::{AgentError, Result};
use crate::media::{MediaEvent, StreamStart};
use crate::pipeline::events::{AgentEvent, SessionEvent, TELEMETRY_BUFFER};
use crate::pipeline::manager::{SessionDeps, TurnManager};
use crate::session::{CallId, EndReason, SessionRegistry};

/// Builds the per-call adapter set when a stream starts.
///
/// A host typically opens provider connections (STT socket, TTS socket)
/// here and wires their callbacks to [`CallDispatcher::deliver`].
pub trait SessionFactory: Send + Sync {
    /// Construct adapters for a new call.
    ///
    /// # Errors
    ///
    /// Returns an error if any adapter cannot be constructed; the stream is
    /// rejected and no session is created.
    fn build(&self, start: &StreamStart) -> Result<SessionDeps>;
}

/// Routes media-stream lifecycle events to per-call session tasks.
pub struct CallDispatcher {
    config: AgentConfig,
    registry: Arc<SessionRegistry>,
    factory: Arc<dyn SessionFactory>,
    telemetry: broadcast::Sender<AgentEvent>,
}

impl CallDispatcher {
    /// Create a dispatcher with the given config and adapter factory.
    pub fn new(config: AgentConfig, factory: Arc<dyn SessionFactory>) -> Self {
        let (telemetry, _) = broadcast::channel(TELEMETRY_BUFFER);
        Self {
            config,
            registry: Arc::new(SessionRegistry::new()),
            factory,
            telemetry,
        }
    }

    /// The process-wide session registry.
    pub fn registry(&self) -> Arc<SessionRegistry> {
        Arc::clone(&self.registry)
    }

    /// Subscribe to telemetry from all sessions.
    pub fn subscribe(&self) -> broadcast::Receiver<AgentEvent> {
        self.telemetry.subscribe()
    }

    /// Entry point for hosts that surface raw [`MediaEvent`]s.
    ///
    /// `call_id` is `None` only before [`MediaEvent::Start`] has produced
    /// one; the new call id is returned so the host can route subsequent
    /// events.
    ///
    /// # Errors
    ///
    /// Returns an error if a [`MediaEvent::Start`] is rejected by the
    /// adapter factory.
    pub async fn on_media_event(
        &self,
        call_id: Option<&str>,
        event: MediaEvent,
    ) -> Result<Option<CallId>> {
        match event {
            MediaEvent::Start(start) => self.on_stream_start(start).await.map(Some),
            MediaEvent::Audio(frame) => {
                if let Some(id) = call_id {
                    self.on_audio(id, frame).await;
                }
                Ok(None)
            }
            MediaEvent::Stop => {
                if let Some(id) = call_id {
                    self.on_stream_stop(id).await;
                }
                Ok(None)
            }
            MediaEvent::Error(message) => {
                if let Some(id) = call_id {
                    self.on_stream_error(id, message).await;
                }
                Ok(None)
            }
        }
    }

    /// A media stream opened: create and register a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter factory rejects the stream.
    pub async fn on_stream_start(&self, start: StreamStart) -> Result<CallId> {
        let deps = self.factory.build(&start)?;
        let (handle, join) =
            TurnManager::spawn(self.config.clone(), start, deps, Some(self.telemetry.clone()));
        let call_id = handle.call_id.clone();
        info!(%call_id, "session registered");
        self.registry.insert(handle).await;

        // Reap the registry entry when the session task exits.
        let registry = Arc::clone(&self.registry);
        let reap_id = call_id.clone();
        tokio::spawn(async move {
            let _ = join.await;
            registry.remove(&reap_id).await;
        });
        Ok(call_id)
    }

    /// An inbound audio frame for a call. Forwarded straight to STT.
    pub async fn on_audio(&self, call_id: &str, frame: Bytes) {
        if let Some(handle) = self.registry.get(call_id).await {
            handle.stt.send_audio(frame);
        }
    }

    /// The media stream stopped: the caller hung up.
    pub async fn on_stream_stop(&self, call_id: &str) {
        self.end(call_id, EndReason::CallerHangup).await;
    }

    /// The media transport failed.
    pub async fn on_stream_error(&self, call_id: &str, message: String) {
        self.end(call_id, EndReason::MediaError(message)).await;
    }

    /// Deliver an adapter callback event into a session.
    ///
    /// # Errors
    ///
    /// Returns an error if the call is unknown or its session has exited.
    pub async fn deliver(&self, call_id: &str, event: SessionEvent) -> Result<()> {
        let handle = self
            .registry
            .get(call_id)
            .await
            .ok_or_else(|| AgentError::Session(format!("unknown call: {call_id}")))?;
        handle
            .events
            .send(event)
            .await
            .map_err(|e| AgentError::Channel(format!("session event channel closed: {e}")))
    }

    /// Cancel every live session (process shutdown).
    pub async fn shutdown(&self) {
        for handle in self.registry.all().await {
            handle.cancel.cancel();
        }
    }

    async fn end(&self, call_id: &str, reason: EndReason) {
        match self.registry.get(call_id).await {
            Some(handle) => {
                if handle
                    .events
                    .send(SessionEvent::Hangup { reason })
                    .await
                    .is_err()
                {
                    // Session already exited; force the registry entry out.
                    self.registry.remove(call_id).await;
                }
            }
            None => warn!(%call_id, "stream event for unknown call"),
        }
    }
}
