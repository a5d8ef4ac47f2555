//! Chat history types and well-formedness checks.
//!
//! History is an append-only list of role-tagged messages. The one structural
//! rule that matters to LLM providers: every tool result must answer a tool
//! call from a preceding assistant message, with no user turn in between, and
//! every tool call must be answered before the next assistant text. Messages
//! are a tagged variant so that rule is checkable by construction.
//!
//! # Examples
//!
//! ```
//! use parlance::history::{ChatMessage, ToolCallRequest, validate_sequence};
//!
//! let history = vec![
//!     ChatMessage::user("Do you have a room tonight?"),
//!     ChatMessage::assistant_with_tool_calls(
//!         String::new(),
//!         vec![ToolCallRequest {
//!             id: "call_1".into(),
//!             name: "check_availability".into(),
//!             arguments: serde_json::json!({"date": "tonight"}),
//!         }],
//!     ),
//!     ChatMessage::tool_result("call_1", "check_availability", "available"),
//!     ChatMessage::assistant("Yes, we have a room available."),
//! ];
//! assert!(validate_sequence(&history).is_ok());
//! ```

use serde::{Deserialize, Serialize};

/// The role of a message in a conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System instructions.
    System,
    /// Caller input (transcribed speech).
    User,
    /// Assistant (model) output.
    Assistant,
    /// Tool execution result.
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::System => write!(f, "system"),
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
            Self::Tool => write!(f, "tool"),
        }
    }
}

/// A tool invocation requested by the assistant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRequest {
    /// Unique identifier correlating the call with its result.
    pub id: String,
    /// The function name being called.
    pub name: String,
    /// JSON arguments as emitted by the model.
    pub arguments: serde_json::Value,
}

/// A message in the call's chat history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "lowercase")]
pub enum ChatMessage {
    /// System instructions.
    System {
        /// The instruction text.
        content: String,
    },
    /// Caller input.
    User {
        /// The transcribed text.
        content: String,
    },
    /// Assistant output, optionally carrying tool calls.
    Assistant {
        /// Spoken/visible text (may be empty for pure tool-call messages).
        content: String,
        /// Tool invocations requested alongside the text.
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        tool_calls: Vec<ToolCallRequest>,
    },
    /// Tool execution result.
    Tool {
        /// The tool call this result answers.
        call_id: String,
        /// The tool name, for provider APIs that want it echoed back.
        name: String,
        /// String-coerced result payload.
        content: String,
    },
}

impl ChatMessage {
    /// Create a system message.
    pub fn system(content: impl Into<String>) -> Self {
        Self::System {
            content: content.into(),
        }
    }

    /// Create a user message.
    pub fn user(content: impl Into<String>) -> Self {
        Self::User {
            content: content.into(),
        }
    }

    /// Create an assistant text message.
    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant {
            content: content.into(),
            tool_calls: Vec::new(),
        }
    }

    /// Create an assistant message carrying tool calls and optional text.
    pub fn assistant_with_tool_calls(content: String, tool_calls: Vec<ToolCallRequest>) -> Self {
        Self::Assistant {
            content,
            tool_calls,
        }
    }

    /// Create a tool result message.
    pub fn tool_result(
        call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::Tool {
            call_id: call_id.into(),
            name: name.into(),
            content: content.into(),
        }
    }

    /// The message's role tag.
    pub fn role(&self) -> Role {
        match self {
            Self::System { .. } => Role::System,
            Self::User { .. } => Role::User,
            Self::Assistant { .. } => Role::Assistant,
            Self::Tool { .. } => Role::Tool,
        }
    }

    /// The message's text content.
    pub fn content(&self) -> &str {
        match self {
            Self::System { content }
            | Self::User { content }
            | Self::Assistant { content, .. }
            | Self::Tool { content, .. } => content,
        }
    }
}

/// Validate the tool-call pairing and role ordering rules over a history.
///
/// Checks:
/// - system messages only appear before any other role;
/// - every tool result answers exactly one pending tool call from the most
///   recent assistant message;
/// - no user message lands while tool calls are still unanswered;
/// - every tool call is answered before the next assistant message and
///   before the history ends.
///
/// # Errors
///
/// Returns a description of the first violation found.
pub fn validate_sequence(messages: &[ChatMessage]) -> Result<(), String> {
    let mut seen_non_system = false;
    let mut pending: Vec<&str> = Vec::new();

    for (i, message) in messages.iter().enumerate() {
        match message {
            ChatMessage::System { .. } => {
                if seen_non_system {
                    return Err(format!("system message at index {i} after conversation start"));
                }
            }
            ChatMessage::User { .. } => {
                seen_non_system = true;
                if !pending.is_empty() {
                    return Err(format!(
                        "user message at index {i} while tool calls are unanswered: {pending:?}"
                    ));
                }
            }
            ChatMessage::Assistant { tool_calls, .. } => {
                seen_non_system = true;
                if !pending.is_empty() {
                    return Err(format!(
                        "assistant message at index {i} while tool calls are unanswered: {pending:?}"
                    ));
                }
                pending = tool_calls.iter().map(|tc| tc.id.as_str()).collect();
            }
            ChatMessage::Tool { call_id, .. } => {
                seen_non_system = true;
                let Some(pos) = pending.iter().position(|id| *id == call_id.as_str()) else {
                    return Err(format!(
                        "tool result at index {i} has no matching tool call: {call_id}"
                    ));
                };
                pending.remove(pos);
            }
        }
    }
    if !pending.is_empty() {
        return Err(format!("unanswered tool calls at end of history: {pending:?}"));
    }
    Ok(())
}

/// Drop trailing messages until the history validates again.
///
/// Used to recover from a turn that died between a tool call and its result:
/// the dangling `assistant(tool_calls)` message is removed so the next turn
/// starts from a well-formed boundary.
pub fn truncate_to_well_formed(messages: &mut Vec<ChatMessage>) {
    while validate_sequence(messages).is_err() {
        if messages.pop().is_none() {
            break;
        }
    }
}

/// Pop the last message if it is a user message, returning its content.
///
/// Greedy cancel rewinds exactly one user turn; anything else is left alone.
pub fn pop_last_user(messages: &mut Vec<ChatMessage>) -> Option<String> {
    match messages.last() {
        Some(ChatMessage::User { .. }) => match messages.pop() {
            Some(ChatMessage::User { content }) => Some(content),
            _ => None,
        },
        _ => None,
    }
}
