//! Configuration types for the turn-taking core.
//!
//! Every timing constant the Turn Manager uses is surfaced here so deployments
//! can tune endpointing behavior per tenant without code changes. Defaults
//! match the reference tuning for phone audio.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level configuration for a voice-agent deployment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Per-call session settings (greeting, tenant identity).
    pub session: SessionConfig,
    /// Endpointing wait policy.
    pub endpointing: EndpointingConfig,
    /// Turn accumulation and serialization bounds.
    pub turn: TurnConfig,
    /// Barge-in (caller interrupts assistant audio) behavior.
    pub barge_in: BargeInConfig,
    /// Sentence segmentation for chunked TTS.
    pub segmenter: SegmenterConfig,
    /// Code-emitted thinking fillers (off by default; tool fillers are always on).
    pub filler: FillerConfig,
    /// LLM prompt and failure handling.
    pub llm: LlmConfig,
}

/// Per-call session settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Tenant identifier carried into tool execution context.
    pub tenant_id: String,
    /// Greeting spoken when the media stream starts.
    pub greeting: String,
    /// Phone number used when the caller is transferred to a human.
    pub escalation_phone: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tenant_id: "default".to_owned(),
            greeting: "Hello! Thanks for calling. How can I help you today?".to_owned(),
            escalation_phone: None,
        }
    }
}

/// Endpointing wait policy.
///
/// The wait is chosen by layered rules, highest priority first: context
/// (what the assistant just asked for), trailing filler, terminal
/// punctuation, trailing number, then the default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointingConfig {
    /// Wait after the assistant asked for structured data (name, phone, address...).
    ///
    /// Callers dictating letters or digits pause mid-item; this must be the
    /// longest wait or spelled names get chopped.
    pub structured_data_wait_ms: u64,
    /// Wait after the assistant asked for a date or time.
    pub date_time_wait_ms: u64,
    /// Wait when the transcript trails off in a filler ("um", "uh...").
    pub filler_wait_ms: u64,
    /// Wait when the transcript ends with terminal punctuation.
    pub punctuation_wait_ms: u64,
    /// Wait when the transcript ends in a digit or number word.
    pub number_wait_ms: u64,
    /// Wait when no other rule matches.
    pub default_wait_ms: u64,
}

impl Default for EndpointingConfig {
    fn default() -> Self {
        Self {
            structured_data_wait_ms: 3000,
            date_time_wait_ms: 2000,
            filler_wait_ms: 2000,
            punctuation_wait_ms: 400,
            number_wait_ms: 1000,
            default_wait_ms: 1500,
        }
    }
}

/// Turn accumulation and serialization bounds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    /// Minimum transcript length (chars) before a turn is processed at all.
    pub min_transcript_len: usize,
    /// Hard cap on accumulation time for one burst of speech (ms).
    ///
    /// Once exceeded, the turn is force-processed regardless of the
    /// completeness classification.
    pub max_accumulation_ms: u64,
    /// Reschedule delay when the classifier calls the transcript incomplete (ms).
    pub incomplete_reschedule_ms: u64,
    /// Reschedule delay when the classifier calls the transcript a filler (ms).
    pub filler_reschedule_ms: u64,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            min_transcript_len: 3,
            max_accumulation_ms: 12_000,
            incomplete_reschedule_ms: 1500,
            filler_reschedule_ms: 2000,
        }
    }
}

/// Barge-in behavior while the assistant is speaking.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BargeInConfig {
    /// How long to wait for a final transcript after VAD fires mid-playback (ms).
    ///
    /// If no final arrives in this window the barge-in executes
    /// unconditionally; the safety timer keeps a slow STT from letting the
    /// assistant talk over the caller.
    pub transcript_wait_ms: u64,
    /// Minimum assistant playback time before barge-in is eligible (ms).
    ///
    /// VAD events inside this window are ignored for barge-in purposes but
    /// still cancel any scheduled endpointing timer.
    pub min_playback_ms: u64,
}

impl Default for BargeInConfig {
    fn default() -> Self {
        Self {
            transcript_wait_ms: 350,
            min_playback_ms: 800,
        }
    }
}

/// Sentence segmentation for chunked TTS.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmenterConfig {
    /// Minimum chunk length (chars) before a sentence boundary is taken.
    pub min_chunk: usize,
    /// Maximum buffered length (chars) before a break is forced.
    pub max_chunk: usize,
    /// Whether forced breaks prefer the latest comma-space boundary.
    pub break_on_comma: bool,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            min_chunk: 8,
            max_chunk: 150,
            break_on_comma: true,
        }
    }
}

/// Code-emitted thinking fillers spoken while the LLM is slow to respond.
///
/// Disabled by default: prosody tags in the LLM output replaced them. Tool
/// fillers (spoken while a tool executes) are separate and always on.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FillerConfig {
    /// Whether the thinking-filler timer is armed at all.
    pub enabled: bool,
    /// Delay after processing starts before the filler is spoken (ms).
    pub delay_ms: u64,
    /// The filler utterance.
    pub text: String,
}

impl Default for FillerConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            delay_ms: 1500,
            text: "One moment.".to_owned(),
        }
    }
}

/// LLM prompt and failure handling.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// System prompt sent with every completion request.
    pub system_prompt: String,
    /// Apology spoken when a turn fails outright. Never a stack trace.
    pub fallback_utterance: String,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a helpful phone receptionist. Keep answers short \
                            and speakable; ask one question at a time."
                .to_owned(),
            fallback_utterance: "I'm sorry, I'm having trouble processing that. \
                                 Could you please repeat?"
                .to_owned(),
        }
    }
}

impl AgentConfig {
    /// Load configuration from a TOML file, falling back to defaults for missing fields.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content).map_err(|e| crate::error::AgentError::Config(e.to_string()))
    }

    /// Save configuration to a TOML file, creating parent directories as needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be written or the config cannot be serialized.
    pub fn save_to_file(&self, path: &Path) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::AgentError::Config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AgentConfig::default();
        assert!(config.endpointing.punctuation_wait_ms > 0);
        assert!(config.endpointing.structured_data_wait_ms > config.endpointing.default_wait_ms);
        assert!(config.turn.min_transcript_len > 0);
        assert!(config.turn.max_accumulation_ms > config.endpointing.default_wait_ms);
        assert!(config.barge_in.min_playback_ms > 0);
        assert!(config.segmenter.min_chunk < config.segmenter.max_chunk);
        assert!(!config.filler.enabled);
        assert!(!config.llm.fallback_utterance.is_empty());
        assert!(!config.session.greeting.is_empty());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("agent.toml");

        let mut config = AgentConfig::default();
        config.endpointing.punctuation_wait_ms = 250;
        config.session.tenant_id = "hotel-42".to_owned();
        config.save_to_file(&path).unwrap();

        let loaded = AgentConfig::from_file(&path).unwrap();
        assert_eq!(loaded.endpointing.punctuation_wait_ms, 250);
        assert_eq!(loaded.session.tenant_id, "hotel-42");
        // Untouched sections keep their defaults.
        assert_eq!(loaded.turn.max_accumulation_ms, 12_000);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let toml_str = r#"
            [barge_in]
            min_playback_ms = 600
        "#;
        let config: AgentConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.barge_in.min_playback_ms, 600);
        assert_eq!(config.barge_in.transcript_wait_ms, 350);
        assert_eq!(config.endpointing.punctuation_wait_ms, 400);
    }

    #[test]
    fn from_file_missing_is_error() {
        let result = AgentConfig::from_file(Path::new("/nonexistent/agent.toml"));
        assert!(result.is_err());
    }
}
