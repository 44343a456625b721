//! Runtime core of a voice-driven assistant device.
//!
//! A wake word opens an interaction, the following utterance is recorded
//! until the speaker pauses, transcribed, and answered.  Work is serialised
//! on a single [`scheduler::TaskScheduler`], components talk through a
//! synchronous [`events::EventBus`], and a separate request-serving process
//! sends commands back over the [`bridge`].

pub mod audio;
pub mod bridge;
pub mod config;
pub mod events;
pub mod listening;
pub mod orchestrator;
pub mod registry;
pub mod response;
pub mod scheduler;
pub mod stt;

use std::any::Any;

/// Best-effort text of a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn panic_message_reads_both_string_kinds() {
        let err = std::panic::catch_unwind(|| panic!("static text")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "static text");

        let n = 7;
        let err = std::panic::catch_unwind(|| panic!("formatted {n}")).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "formatted 7");

        let err = std::panic::catch_unwind(|| std::panic::panic_any(42_u8)).unwrap_err();
        assert_eq!(panic_message(err.as_ref()), "non-string panic payload");
    }
}
