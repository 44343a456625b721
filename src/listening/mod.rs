//! Wake-word listening and endpoint detection.
//!
//! - [`detector`]: frame classifiers behind [`WakeWordDetector`].
//! - [`session`]: the per-utterance state machine and adaptive threshold.
//! - [`engine`]: the capture thread tying source, detector, session and
//!   transcriber together and reporting through the event bus.

pub mod detector;
pub mod engine;
pub mod session;

pub use detector::{EnergyWakeDetector, WakeWordDetector};
pub use engine::{ListeningEngine, TRANSCRIBING_MESSAGE};
pub use session::{frame_amplitude, silence_threshold, ListeningSession, Phase};
