//! Audio pipeline state machine: who owns the conversational floor.
//!
//! The state is a tagged variant and [`transition`] is the only way to move
//! between states. Illegal transitions return an error the caller logs and
//! drops, so a late timer or a stale TTS callback can never corrupt the
//! floor arbitration.
//!
//! # Examples
//!
//! ```
//! use parlance::fsm::{PipelineEvent, PipelineState, transition};
//!
//! let state = transition(PipelineState::Idle, PipelineEvent::StartGreeting);
//! assert_eq!(state, Ok(PipelineState::Greeting));
//!
//! assert!(transition(PipelineState::Idle, PipelineEvent::BargeIn).is_err());
//! ```

/// The pipeline's position in the turn-taking cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineState {
    /// Session created, nothing started yet.
    Idle,
    /// Greeting audio is playing.
    Greeting,
    /// The floor is the caller's; transcripts accumulate.
    Listening,
    /// Endpointing fired; an LLM response is being generated.
    Processing,
    /// Assistant audio is playing.
    Speaking,
    /// Cleanup ran; the session is dead.
    Terminated,
}

impl PipelineState {
    /// Whether VAD events drive normal accumulation in this state.
    ///
    /// Greeting and Speaking handle VAD specially (ignored, or barge-in).
    pub fn should_process_vad(self) -> bool {
        matches!(self, Self::Listening)
    }

    /// Whether caller speech may interrupt assistant audio.
    pub fn can_barge_in(self) -> bool {
        matches!(self, Self::Speaking)
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Greeting => "greeting",
            Self::Listening => "listening",
            Self::Processing => "processing",
            Self::Speaking => "speaking",
            Self::Terminated => "terminated",
        };
        write!(f, "{name}")
    }
}

/// Events that drive the pipeline state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineEvent {
    /// The media stream started; play the greeting.
    StartGreeting,
    /// Greeting TTS finished.
    GreetingFinished,
    /// Greeting TTS failed; listen anyway.
    GreetingFailed,
    /// VAD detected caller speech.
    SpeechStarted,
    /// The endpointing timer fired on a complete utterance.
    EndpointReached,
    /// The first response chunk reached TTS.
    ResponseStarted,
    /// Caller resumed speaking before the assistant spoke; inference dropped.
    GreedyCancel,
    /// The turn failed; fall back and listen again.
    TurnFailed,
    /// Caller speech interrupted assistant audio.
    BargeIn,
    /// All TTS chunks played and the response stream is complete.
    PlaybackFinished,
    /// TTS failed mid-response.
    PlaybackFailed,
    /// The call is ending; release everything.
    Hangup,
}

impl std::fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// An event arrived in a state that has no transition for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("illegal transition: {event} in state {state}")]
pub struct IllegalTransition {
    /// The state the pipeline was in.
    pub state: PipelineState,
    /// The event that had no legal transition.
    pub event: PipelineEvent,
}

/// Apply an event to a state, returning the next state.
///
/// # Errors
///
/// Returns [`IllegalTransition`] when the pair is not in the legal table;
/// callers log and drop it, leaving the state unchanged.
pub fn transition(
    state: PipelineState,
    event: PipelineEvent,
) -> Result<PipelineState, IllegalTransition> {
    use PipelineEvent as E;
    use PipelineState as S;

    let next = match (state, event) {
        (S::Idle, E::StartGreeting) => S::Greeting,
        (S::Greeting, E::GreetingFinished | E::GreetingFailed) => S::Listening,
        // Accumulating more caller speech is a self-transition.
        (S::Listening, E::SpeechStarted) => S::Listening,
        (S::Listening, E::EndpointReached) => S::Processing,
        (S::Processing, E::ResponseStarted) => S::Speaking,
        (S::Processing, E::GreedyCancel | E::TurnFailed) => S::Listening,
        // A response stream that produced no speakable text drains straight
        // back to listening without ever entering Speaking.
        (S::Processing, E::PlaybackFinished) => S::Listening,
        (S::Speaking, E::BargeIn | E::PlaybackFinished | E::PlaybackFailed) => S::Listening,
        (_, E::Hangup) => S::Terminated,
        (state, event) => return Err(IllegalTransition { state, event }),
    };
    Ok(next)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use PipelineEvent as E;
    use PipelineState as S;

    // ── Legal table ───────────────────────────────────────────

    #[test]
    fn happy_path_round_trip() {
        let mut state = S::Idle;
        for (event, expected) in [
            (E::StartGreeting, S::Greeting),
            (E::GreetingFinished, S::Listening),
            (E::SpeechStarted, S::Listening),
            (E::EndpointReached, S::Processing),
            (E::ResponseStarted, S::Speaking),
            (E::PlaybackFinished, S::Listening),
            (E::EndpointReached, S::Processing),
            (E::GreedyCancel, S::Listening),
        ] {
            state = transition(state, event).unwrap();
            assert_eq!(state, expected);
        }
    }

    #[test]
    fn greeting_error_still_listens() {
        assert_eq!(transition(S::Greeting, E::GreetingFailed), Ok(S::Listening));
    }

    #[test]
    fn processing_failure_returns_to_listening() {
        assert_eq!(transition(S::Processing, E::TurnFailed), Ok(S::Listening));
    }

    #[test]
    fn barge_in_returns_to_listening() {
        assert_eq!(transition(S::Speaking, E::BargeIn), Ok(S::Listening));
        assert_eq!(transition(S::Speaking, E::PlaybackFailed), Ok(S::Listening));
    }

    #[test]
    fn hangup_terminates_from_anywhere() {
        for state in [S::Idle, S::Greeting, S::Listening, S::Processing, S::Speaking, S::Terminated] {
            assert_eq!(transition(state, E::Hangup), Ok(S::Terminated));
        }
    }

    // ── Illegal transitions ───────────────────────────────────

    #[test]
    fn illegal_transitions_are_errors() {
        let illegal = [
            (S::Idle, E::BargeIn),
            (S::Listening, E::PlaybackFinished),
            (S::Listening, E::BargeIn),
            (S::Speaking, E::EndpointReached),
            (S::Speaking, E::StartGreeting),
            (S::Terminated, E::SpeechStarted),
            (S::Processing, E::EndpointReached),
        ];
        for (state, event) in illegal {
            let result = transition(state, event);
            assert_eq!(result, Err(IllegalTransition { state, event }), "{state} + {event}");
        }
    }

    #[test]
    fn illegal_transition_displays_context() {
        let err = transition(S::Idle, E::BargeIn).unwrap_err();
        let text = err.to_string();
        assert!(text.contains("idle"));
        assert!(text.contains("BargeIn"));
    }

    // ── Predicates ────────────────────────────────────────────

    #[test]
    fn vad_processed_only_while_listening() {
        assert!(S::Listening.should_process_vad());
        for state in [S::Idle, S::Greeting, S::Processing, S::Speaking, S::Terminated] {
            assert!(!state.should_process_vad());
        }
    }

    #[test]
    fn barge_in_only_while_speaking() {
        assert!(S::Speaking.can_barge_in());
        for state in [S::Idle, S::Greeting, S::Listening, S::Processing, S::Terminated] {
            assert!(!state.can_barge_in());
        }
    }
}
