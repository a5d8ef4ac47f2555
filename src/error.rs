//! Error types for the voice-agent core.

/// Top-level error type for the turn-taking core.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// Media stream transport error.
    #[error("media error: {0}")]
    Media(String),

    /// Speech-to-text adapter error.
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech adapter error.
    #[error("TTS error: {0}")]
    Tts(String),

    /// Language model streaming error.
    #[error("LLM error: {0}")]
    Llm(String),

    /// Tool execution error.
    #[error("tool error: {0}")]
    Tool(String),

    /// Call session lifecycle error.
    #[error("session error: {0}")]
    Session(String),

    /// Chat history well-formedness violation.
    #[error("history error: {0}")]
    History(String),

    /// Turn pipeline coordination error.
    #[error("pipeline error: {0}")]
    Pipeline(String),

    /// Configuration error.
    #[error("config error: {0}")]
    Config(String),

    /// Channel send/receive error.
    #[error("channel error: {0}")]
    Channel(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience result type.
pub type Result<T> = std::result::Result<T, AgentError>;
