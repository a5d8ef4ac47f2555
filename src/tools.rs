//! Tool execution interface and spoken tool fillers.
//!
//! Tools are opaque to the core: the LLM names one, the executor runs it
//! (which may mean CRM lookups, booking APIs, anything), and the
//! string-coerced result goes back into history as a `tool` message. The
//! only tool the core recognizes by name is [`TRANSFER_TOOL`], which also
//! fires the transfer-requested callback.

use async_trait::async_trait;

use crate::error::Result;

/// Tool name that escalates the call to a human.
pub const TRANSFER_TOOL: &str = "transfer_to_human";

/// Call-scoped context handed to every tool invocation.
#[derive(Debug, Clone)]
pub struct ToolContext {
    /// Tenant this call belongs to.
    pub tenant_id: String,
    /// The call's unique identifier.
    pub call_id: String,
    /// Caller's phone number, when known.
    pub caller_phone: Option<String>,
    /// Number a human transfer should dial.
    pub escalation_phone: Option<String>,
}

/// Executes named tools on behalf of the model.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Run a tool and return its JSON result.
    ///
    /// # Errors
    ///
    /// Returns an error if the tool is unknown or its execution fails. The
    /// Turn Manager still records a `tool` message (carrying the error text)
    /// so history stays well-formed and the model can tell the caller.
    async fn execute(
        &self,
        name: &str,
        arguments: serde_json::Value,
        context: &ToolContext,
    ) -> Result<serde_json::Value>;
}

/// The canned phrase spoken the moment a tool call starts, masking its
/// latency. Always a fresh TTS chunk, never a continuation.
pub fn tool_filler(name: &str) -> &'static str {
    match name {
        "check_availability" => "Let me check that for you.",
        "create_booking" => "One moment while I book that.",
        "get_business_hours" => "Let me look that up.",
        TRANSFER_TOOL => "I'll connect you with someone right away.",
        _ => "One moment please.",
    }
}

/// String-coerce a tool result for the `tool` history message.
pub fn coerce_result(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
