//! Streaming LLM interface.
//!
//! Providers normalize their streaming APIs into a single sequence of
//! [`LlmChunk`]s. Cross-provider fallback happens inside the adapter: to the
//! Turn Manager a stream is one logical sequence that may silently switch
//! providers mid-response, with an optional `provider` tag for telemetry.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::history::ChatMessage;

/// A tool definition provided to the LLM for function calling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// The tool name (e.g. `"check_availability"`).
    pub name: String,
    /// Human-readable description of the tool's purpose.
    pub description: String,
    /// JSON Schema describing the tool's parameters.
    pub parameters: serde_json::Value,
}

impl ToolDefinition {
    /// Create a new tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters,
        }
    }
}

/// A normalized streaming chunk from any LLM provider.
#[derive(Debug, Clone)]
pub enum LlmChunk {
    /// A fragment of generated text.
    Text {
        /// The text fragment.
        content: String,
        /// Which provider produced it, when the adapter knows.
        provider: Option<String>,
    },
    /// The model requested a tool invocation.
    ToolCall {
        /// Unique identifier correlating the call with its result.
        id: String,
        /// The function name being called.
        name: String,
        /// Parsed JSON arguments.
        arguments: serde_json::Value,
    },
    /// The stream ended normally.
    Done,
    /// A recoverable stream error; the adapter keeps going (fallback).
    Error {
        /// Description of what went wrong.
        message: String,
    },
}

/// A completion request assembled by the Turn Manager.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Full conversation history, ending with the newest user message (or a
    /// tool result when continuing after a tool call).
    pub history: Vec<ChatMessage>,
    /// System prompt for this tenant.
    pub system_prompt: String,
    /// Tools the model may call.
    pub tools: Vec<ToolDefinition>,
}

/// A boxed stream of LLM chunks.
pub type LlmChunkStream = Pin<Box<dyn Stream<Item = LlmChunk> + Send>>;

/// Streaming LLM client with provider-level fallback.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Start a streaming completion.
    ///
    /// The `abort` token is tripped on greedy cancel, barge-in, and
    /// cleanup; implementations should stop generating promptly and may
    /// end the stream without a [`LlmChunk::Done`].
    ///
    /// # Errors
    ///
    /// Returns an error only when no provider could start a stream at all;
    /// per-provider failures are retried or surfaced as
    /// [`LlmChunk::Error`] chunks inside the stream.
    async fn stream_chat(
        &self,
        request: ChatRequest,
        abort: CancellationToken,
    ) -> Result<LlmChunkStream>;
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn tool_definition_new() {
        let tool = ToolDefinition::new(
            "check_availability",
            "Check room availability",
            serde_json::json!({
                "type": "object",
                "properties": {
                    "date": { "type": "string" }
                },
                "required": ["date"]
            }),
        );
        assert_eq!(tool.name, "check_availability");
        assert!(tool.parameters.is_object());
    }

    #[test]
    fn tool_definition_serde_round_trip() {
        let original = ToolDefinition::new(
            "create_booking",
            "Create a booking",
            serde_json::json!({ "type": "object" }),
        );
        let json = serde_json::to_string(&original).unwrap();
        let parsed: ToolDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.name, original.name);
        assert_eq!(parsed.parameters, original.parameters);
    }
}
