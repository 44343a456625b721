//! Transcriber trait and the Whisper implementation.
//!
//! # Overview
//!
//! [`Transcriber`] is the interface the listening engine calls once per
//! utterance.  It takes a complete WAV file and returns text.  It is
//! object-safe and `Send + Sync` so it can be held behind an
//! `Arc<dyn Transcriber>` and called from the capture thread.
//!
//! [`WhisperTranscriber`] is the production implementation that wraps a
//! `whisper_rs::WhisperContext`.  Construct it with [`WhisperTranscriber::load`].
//!
//! [`MockTranscriber`] (available under `#[cfg(test)]`) returns a
//! pre-configured response without loading a model.

use std::path::Path;

use thiserror::Error;
use whisper_rs::{FullParams, WhisperContext, WhisperContextParameters};

use crate::audio::{decode_wav, i16_to_f32, resample};
use crate::stt::transcribe::{SamplingStrategy, Segment, TranscribeParams, TranscriptionResult};

// ---------------------------------------------------------------------------
// SttError
// ---------------------------------------------------------------------------

/// All errors that can arise from the STT subsystem.
#[derive(Debug, Clone, Error)]
pub enum SttError {
    /// The GGML model file was not found at the given path.
    #[error("Model not found: {0}")]
    ModelNotFound(String),

    /// `whisper_rs` failed to initialise a `WhisperContext` or `WhisperState`.
    #[error("Whisper context initialisation failed: {0}")]
    ContextInit(String),

    /// The audio handed over was not a usable WAV file.
    #[error("Invalid audio: {0}")]
    InvalidAudio(String),

    /// An error occurred during the inference pass.
    #[error("Transcription error: {0}")]
    Transcription(String),

    /// Inference ran but produced no words.
    #[error("Speech was unintelligible")]
    Unintelligible,

    /// The utterance is shorter than the minimum 0.5 s.
    #[error("Audio too short: minimum 0.5 s (8 000 samples at 16 kHz)")]
    AudioTooShort,

    /// The utterance exceeds the maximum 60 s.
    #[error("Audio too long: maximum 60 s (960 000 samples at 16 kHz)")]
    AudioTooLong,
}

// ---------------------------------------------------------------------------
// Transcriber trait
// ---------------------------------------------------------------------------

/// Object-safe, thread-safe speech-to-text capability.
///
/// # Contract
///
/// - `wav` is a complete RIFF/WAVE file with 16-bit integer PCM samples.
/// - Errors are returned, never panicked; callers decide whether to degrade.
pub trait Transcriber: Send + Sync {
    /// Transcribe the utterance in `wav` and return its text.
    fn transcribe(&self, wav: &[u8]) -> Result<String, SttError>;
}

// Compile-time assertion: Box<dyn Transcriber> must be constructible.
const _: fn() = || {
    fn _assert_object_safe(_: Box<dyn Transcriber>) {}
};

// ---------------------------------------------------------------------------
// Audio length constants (16 kHz mono f32)
// ---------------------------------------------------------------------------

/// Whisper's native sample rate.
const WHISPER_RATE: u32 = 16_000;
/// Minimum audio length: 0.5 s × 16 000 Hz = 8 000 samples.
const MIN_AUDIO_SAMPLES: usize = 8_000;
/// Maximum audio length: 60 s × 16 000 Hz = 960 000 samples.
const MAX_AUDIO_SAMPLES: usize = 960_000;

/// Decode `wav` into the 16 kHz mono `f32` buffer Whisper expects.
fn whisper_input(wav: &[u8]) -> Result<Vec<f32>, SttError> {
    let (samples, rate) = decode_wav(wav).map_err(|e| SttError::InvalidAudio(e.to_string()))?;
    Ok(resample(&i16_to_f32(&samples), rate, WHISPER_RATE))
}

// ---------------------------------------------------------------------------
// WhisperTranscriber
// ---------------------------------------------------------------------------

/// Production transcriber that wraps a `whisper_rs::WhisperContext`.
///
/// A new `WhisperState` is created for every call so the transcriber can be
/// shared across threads without any locking.
pub struct WhisperTranscriber {
    ctx: WhisperContext,
    params: TranscribeParams,
}

impl std::fmt::Debug for WhisperTranscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WhisperTranscriber")
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

// SAFETY: WhisperContext is Send+Sync as declared by whisper-rs; the model
// weights are read-only after loading.
unsafe impl Send for WhisperTranscriber {}
unsafe impl Sync for WhisperTranscriber {}

impl WhisperTranscriber {
    /// Load a GGML model from `model_path` and prepare it for inference.
    ///
    /// # Errors
    ///
    /// - [`SttError::ModelNotFound`]: `model_path` does not exist.
    /// - [`SttError::ContextInit`]: whisper-rs failed to load the file.
    pub fn load(model_path: impl AsRef<Path>, params: TranscribeParams) -> Result<Self, SttError> {
        let path = model_path.as_ref();

        if !path.exists() {
            return Err(SttError::ModelNotFound(path.display().to_string()));
        }

        let path_str = path.to_str().ok_or_else(|| {
            SttError::ModelNotFound(format!(
                "model path contains non-UTF-8 characters: {}",
                path.display()
            ))
        })?;

        let mut ctx_params = WhisperContextParameters::default();
        ctx_params.use_gpu(params.use_gpu);
        let ctx = WhisperContext::new_with_params(path_str, ctx_params)
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        log::info!("stt: loaded whisper model {}", path.display());
        Ok(Self { ctx, params })
    }

    /// Transcribe 16 kHz mono `f32` samples and return a
    /// [`TranscriptionResult`] with per-segment timing information.
    pub fn transcribe_samples(&self, audio: &[f32]) -> Result<TranscriptionResult, SttError> {
        if audio.len() < MIN_AUDIO_SAMPLES {
            return Err(SttError::AudioTooShort);
        }
        if audio.len() > MAX_AUDIO_SAMPLES {
            return Err(SttError::AudioTooLong);
        }

        use whisper_rs::SamplingStrategy as WS;
        let ws = match self.params.strategy {
            SamplingStrategy::Greedy { best_of } => WS::Greedy { best_of },
            SamplingStrategy::BeamSearch { beam_size, patience } => {
                WS::BeamSearch { beam_size, patience }
            }
        };

        let mut fp = FullParams::new(ws);

        // The language borrow lives as long as `fp`, which is consumed by
        // `state.full()` below.
        let lang: Option<&str> = if self.params.language == "auto" {
            None
        } else {
            Some(self.params.language.as_str())
        };
        fp.set_language(lang);
        fp.set_n_threads(self.params.n_threads);

        if self.params.suppress_progress {
            fp.set_print_progress(false);
            fp.set_print_realtime(false);
        }

        let mut state = self
            .ctx
            .create_state()
            .map_err(|e| SttError::ContextInit(e.to_string()))?;

        let wall_start = std::time::Instant::now();

        state
            .full(fp, audio)
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let n_segments = state
            .full_n_segments()
            .map_err(|e| SttError::Transcription(e.to_string()))?;

        let mut text = String::new();
        let mut segments: Vec<Segment> = Vec::with_capacity(n_segments.max(0) as usize);

        for i in 0..n_segments {
            let seg_text = state
                .full_get_segment_text(i)
                .map_err(|e| SttError::Transcription(format!("segment {i}: {e}")))?;

            // Timestamps are in centiseconds.
            let t0 = state.full_get_segment_t0(i).unwrap_or(0).max(0) as u64 * 10;
            let t1 = state.full_get_segment_t1(i).unwrap_or(0).max(0) as u64 * 10;

            text.push_str(&seg_text);
            segments.push(Segment {
                text: seg_text,
                start_ms: t0,
                end_ms: t1,
            });
        }

        Ok(TranscriptionResult {
            text: text.trim().to_string(),
            segments,
            duration_ms: wall_start.elapsed().as_millis(),
        })
    }
}

impl Transcriber for WhisperTranscriber {
    fn transcribe(&self, wav: &[u8]) -> Result<String, SttError> {
        let audio = whisper_input(wav)?;
        let result = self.transcribe_samples(&audio)?;
        log::debug!(
            "stt: {} segment(s) in {} ms",
            result.segments.len(),
            result.duration_ms
        );
        if result.text.is_empty() {
            return Err(SttError::Unintelligible);
        }
        Ok(result.text)
    }
}

// ---------------------------------------------------------------------------
// MockTranscriber  (test-only)
// ---------------------------------------------------------------------------

/// A test double that returns a pre-configured response without loading any
/// model file, and counts how often it was asked.
#[cfg(test)]
pub struct MockTranscriber {
    response: Result<String, SttError>,
    calls: std::sync::atomic::AtomicUsize,
}

#[cfg(test)]
impl MockTranscriber {
    /// Create a mock that always returns `Ok(text)`.
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: Default::default(),
        }
    }

    /// Create a mock that always returns `Err(error)`.
    pub fn err(error: SttError) -> Self {
        Self {
            response: Err(error),
            calls: Default::default(),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl Transcriber for MockTranscriber {
    fn transcribe(&self, wav: &[u8]) -> Result<String, SttError> {
        self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        // Enforce the WAV contract even in the mock so that callers are
        // tested against it.
        whisper_input(wav)?;
        self.response.clone()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::encode_wav;

    fn one_second_wav() -> Vec<u8> {
        encode_wav(&vec![0_i16; 16_000], 16_000).unwrap()
    }

    #[test]
    fn mock_ok_returns_configured_text() {
        let stt = MockTranscriber::ok("turn on the lights");
        assert_eq!(stt.transcribe(&one_second_wav()).unwrap(), "turn on the lights");
        assert_eq!(stt.calls(), 1);
    }

    #[test]
    fn mock_err_returns_configured_error() {
        let stt = MockTranscriber::err(SttError::Transcription("boom".into()));
        let err = stt.transcribe(&one_second_wav()).unwrap_err();
        assert!(matches!(err, SttError::Transcription(_)));
    }

    #[test]
    fn non_wav_input_is_invalid_audio() {
        let stt = MockTranscriber::ok("never");
        let err = stt.transcribe(b"garbage").unwrap_err();
        assert!(matches!(err, SttError::InvalidAudio(_)));
    }

    #[test]
    fn whisper_input_resamples_to_16k() {
        let wav = encode_wav(&vec![1000_i16; 8_000], 8_000).unwrap();
        let audio = whisper_input(&wav).unwrap();
        assert_eq!(audio.len(), 16_000);
        assert!(audio.iter().all(|s| (s - 1000.0 / 32767.0).abs() < 1e-4));
    }

    #[test]
    fn load_missing_model_returns_model_not_found() {
        let result = WhisperTranscriber::load("/nonexistent/model.bin", TranscribeParams::default());
        assert!(
            matches!(result, Err(SttError::ModelNotFound(_))),
            "expected ModelNotFound, got: {result:?}"
        );
    }

    #[test]
    fn box_dyn_transcriber_compiles() {
        let stt: Box<dyn Transcriber> = Box::new(MockTranscriber::ok("ok"));
        assert!(stt.transcribe(&one_second_wav()).is_ok());
    }

    #[test]
    fn stt_error_display() {
        assert!(SttError::ModelNotFound("/some/path.bin".into())
            .to_string()
            .contains("/some/path.bin"));
        assert!(SttError::AudioTooShort.to_string().contains("short"));
        assert!(SttError::Unintelligible.to_string().contains("unintelligible"));
    }
}
