//! Speech-to-text: finished utterance (WAV) in, text out.
//!
//! ```text
//! ListeningEngine ──wav bytes──▶ Transcriber (trait)
//!                                   └─ WhisperTranscriber
//!                                        decode_wav → i16 → f32 → resample 16 kHz
//!                                        → whisper-rs full() → segments → text
//! ```
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ami_runtime::stt::{TranscribeParams, Transcriber, WhisperTranscriber};
//!
//! let stt = WhisperTranscriber::load("models/ggml-base.en.bin", TranscribeParams::default())
//!     .expect("model not found");
//! let wav = std::fs::read("utterance.wav").unwrap();
//! println!("{}", stt.transcribe(&wav).unwrap());
//! ```

pub mod engine;
pub mod transcribe;

pub use engine::{SttError, Transcriber, WhisperTranscriber};
pub use transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};

#[cfg(test)]
pub use engine::MockTranscriber;
