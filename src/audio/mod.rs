//! Audio plumbing: microphone capture → mono/resample → `i16` frames → WAV.
//!
//! # Pipeline
//!
//! ```text
//! Microphone (cpal callback, f32 interleaved)
//!   → downmix → resample → f32_to_i16 → AudioFrame (frame_size samples)
//!   → RingBuffer (pre-trigger context) / utterance buffer → encode_wav
//! ```

pub mod buffer;
pub mod capture;
pub mod resample;
pub mod wav;

pub use buffer::RingBuffer;
pub use capture::{AudioFrame, AudioInput, AudioSource, CaptureError, Microphone};
pub use resample::{downmix, f32_to_i16, i16_to_f32, resample};
pub use wav::{archive_recording, decode_wav, encode_wav, WavError};
