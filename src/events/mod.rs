//! In-process event catalogue and publish/subscribe bus.
//!
//! Events form a closed set: [`Event`] carries the payload, [`EventKind`] is
//! the payload-free key listeners subscribe to.  A listener registered for
//! [`EventKind::RecorderCallback`] can only ever receive
//! [`Event::RecorderCallback`], so payload mismatches are impossible.
//!
//! | Event | Payload | Emitted by |
//! |-------|---------|------------|
//! | `hotword_detected` | none | listening engine |
//! | `recorder_callback` | [`RecorderOutcome`] | listening engine |
//! | `timeout` | none | listening engine |
//! | `interaction_finished` | none | render surface |
//! | `loading_message` | status text | any long-running task |

pub mod bus;

pub use bus::{EventBus, Listener};

// ---------------------------------------------------------------------------
// RecorderOutcome
// ---------------------------------------------------------------------------

/// Result of a finished recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecorderOutcome {
    /// Transcribed utterance.  Empty when transcription failed or nothing
    /// intelligible was said.
    Transcript(String),
    /// Audio was being captured but the engine was stopped before the
    /// utterance ended.
    Cancelled,
}

// ---------------------------------------------------------------------------
// Event / EventKind
// ---------------------------------------------------------------------------

/// An event together with its payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    HotwordDetected,
    RecorderCallback(RecorderOutcome),
    Timeout,
    InteractionFinished,
    LoadingMessage(String),
}

/// Subscription key for an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    HotwordDetected,
    RecorderCallback,
    Timeout,
    InteractionFinished,
    LoadingMessage,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::HotwordDetected => EventKind::HotwordDetected,
            Event::RecorderCallback(_) => EventKind::RecorderCallback,
            Event::Timeout => EventKind::Timeout,
            Event::InteractionFinished => EventKind::InteractionFinished,
            Event::LoadingMessage(_) => EventKind::LoadingMessage,
        }
    }

    /// Convenience constructor for a transcript outcome.
    pub fn transcript(text: impl Into<String>) -> Self {
        Event::RecorderCallback(RecorderOutcome::Transcript(text.into()))
    }

    /// Convenience constructor for a progress message.
    pub fn loading(message: impl Into<String>) -> Self {
        Event::LoadingMessage(message.into())
    }
}

impl EventKind {
    /// Wire name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            EventKind::HotwordDetected => "hotword_detected",
            EventKind::RecorderCallback => "recorder_callback",
            EventKind::Timeout => "timeout",
            EventKind::InteractionFinished => "interaction_finished",
            EventKind::LoadingMessage => "loading_message",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_matches_variant() {
        assert_eq!(Event::HotwordDetected.kind(), EventKind::HotwordDetected);
        assert_eq!(Event::transcript("hi").kind(), EventKind::RecorderCallback);
        assert_eq!(
            Event::RecorderCallback(RecorderOutcome::Cancelled).kind(),
            EventKind::RecorderCallback
        );
        assert_eq!(Event::Timeout.kind(), EventKind::Timeout);
        assert_eq!(Event::InteractionFinished.kind(), EventKind::InteractionFinished);
        assert_eq!(Event::loading("x").kind(), EventKind::LoadingMessage);
    }

    #[test]
    fn kind_names_match_catalogue() {
        assert_eq!(EventKind::HotwordDetected.to_string(), "hotword_detected");
        assert_eq!(EventKind::RecorderCallback.name(), "recorder_callback");
        assert_eq!(EventKind::LoadingMessage.name(), "loading_message");
    }
}
