//! One detection-to-transcript cycle as a pure state machine.
//!
//! ```text
//! Idle ──wake word──▶ Detected ──first frame──▶ Recording ─┬─ silence > patience ─▶ Done
//!                                                         ├─ elapsed > timeout  ─▶ TimedOut
//!                                                         └─ capture failure    ─▶ Failed
//! ```
//!
//! The session never touches a device: the engine feeds it frames and acts
//! on the phase it reports.  All durations are counted in samples of audio
//! consumed, so a session replayed from recorded frames behaves exactly as
//! it did live.

use std::time::Duration;

use crate::audio::RingBuffer;
use crate::config::ListeningConfig;

// ---------------------------------------------------------------------------
// Phase
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the wake word; no session exists yet.
    Idle,
    /// Wake word heard, threshold computed, no post-trigger audio yet.
    Detected,
    /// Accumulating the utterance.
    Recording,
    /// Speech ended normally after the patience period.
    Done,
    /// The absolute listening timeout elapsed first.
    TimedOut,
    /// Capture broke mid-session.
    Failed,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Phase::Done | Phase::TimedOut | Phase::Failed)
    }
}

// ---------------------------------------------------------------------------
// Adaptive threshold
// ---------------------------------------------------------------------------

/// Amplitude cutoff derived from ambient noise:
/// `max(2·min|x| + stddev|x|, floor)`, using the population standard
/// deviation of the absolute sample values.
///
/// An empty history yields `floor`.
pub fn silence_threshold(samples: impl IntoIterator<Item = i16>, floor: i16) -> f64 {
    let mut count = 0u64;
    let mut min = f64::INFINITY;
    let mut sum = 0.0f64;
    let mut sum_sq = 0.0f64;

    for s in samples {
        let a = (s as i32).abs() as f64;
        count += 1;
        min = min.min(a);
        sum += a;
        sum_sq += a * a;
    }

    let floor = floor as f64;
    if count == 0 {
        return floor;
    }

    let n = count as f64;
    let mean = sum / n;
    let variance = (sum_sq / n - mean * mean).max(0.0);
    (2.0 * min + variance.sqrt()).max(floor)
}

/// Peak absolute amplitude of a frame.
pub fn frame_amplitude(frame: &[i16]) -> i32 {
    frame
        .iter()
        .map(|&s| (s as i32).abs())
        .max()
        .unwrap_or(0)
}

// ---------------------------------------------------------------------------
// ListeningSession
// ---------------------------------------------------------------------------

/// Mutable state of one active session.
#[derive(Debug, Clone)]
pub struct ListeningSession {
    phase: Phase,
    threshold: f64,
    recording: Vec<i16>,
    sample_rate: u32,
    grace: u64,
    patience: u64,
    timeout: u64,
    elapsed: u64,
    silence: u64,
    speech_started: bool,
}

impl ListeningSession {
    /// Start a session at the moment of detection.  The silence threshold is
    /// computed once here from the pre-trigger history and never revised.
    pub fn begin(config: &ListeningConfig, pre_trigger: &RingBuffer<i16>) -> Self {
        let threshold = silence_threshold(pre_trigger.iter(), config.noise_floor);
        Self::with_threshold(config, threshold)
    }

    /// Start a session with an explicit threshold.
    pub fn with_threshold(config: &ListeningConfig, threshold: f64) -> Self {
        let rate = config.sample_rate;
        let to_samples = |d: Duration| (d.as_secs_f64() * rate as f64).round() as u64;
        Self {
            phase: Phase::Detected,
            threshold,
            recording: Vec::new(),
            sample_rate: rate,
            grace: to_samples(config.grace_period()),
            patience: to_samples(config.patience()),
            timeout: to_samples(config.timeout()),
            elapsed: 0,
            silence: 0,
            speech_started: false,
        }
    }

    /// Consume one post-trigger frame and return the resulting phase.
    ///
    /// The timeout is checked before silence, so a frame that crosses both
    /// limits ends the session as [`Phase::TimedOut`].  Frames pushed after
    /// a terminal phase are ignored.
    pub fn push_frame(&mut self, frame: &[i16]) -> Phase {
        if self.phase.is_terminal() {
            return self.phase;
        }
        self.phase = Phase::Recording;

        let len = frame.len() as u64;
        self.recording.extend_from_slice(frame);
        self.elapsed += len;

        if self.elapsed > self.timeout {
            self.phase = Phase::TimedOut;
            return self.phase;
        }

        let loud = frame_amplitude(frame) as f64 > self.threshold;

        if !self.speech_started {
            // Nothing counts as silence until the user has started talking,
            // and the tail of the wake word itself is ignored.
            if loud && self.elapsed > self.grace {
                self.speech_started = true;
                self.silence = 0;
            }
        } else if loud {
            self.silence = 0;
        } else {
            self.silence += len;
            if self.silence > self.patience {
                self.phase = Phase::Done;
            }
        }

        self.phase
    }

    /// Mark the session as broken.  A no-op once terminal.
    pub fn fail(&mut self) {
        if !self.phase.is_terminal() {
            self.phase = Phase::Failed;
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn speech_started(&self) -> bool {
        self.speech_started
    }

    /// Audio time consumed since detection.
    pub fn elapsed(&self) -> Duration {
        self.samples_to_duration(self.elapsed)
    }

    /// Current run of sub-threshold audio since speech started.
    pub fn silence(&self) -> Duration {
        self.samples_to_duration(self.silence)
    }

    pub fn recording(&self) -> &[i16] {
        &self.recording
    }

    pub fn into_recording(self) -> Vec<i16> {
        self.recording
    }

    fn samples_to_duration(&self, samples: u64) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(samples as f64 / self.sample_rate as f64)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
