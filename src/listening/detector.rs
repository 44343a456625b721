//! Wake-word classifiers.
//!
//! A [`WakeWordDetector`] scores each audio frame in `[0, 1]`; the listening
//! engine compares the latest score against `listening.detection_threshold`.
//! Detectors may keep state across frames, so the engine calls
//! [`reset`](WakeWordDetector::reset) at the end of every session.

use std::collections::VecDeque;

use crate::config::WakeWordConfig;

/// Number of trailing scores kept by [`EnergyWakeDetector`].
const PREDICTION_HISTORY: usize = 30;

/// Frame classifier for the wake word.
pub trait WakeWordDetector: Send {
    /// Score `frame`; higher is more confident.  Returns the latest entry of
    /// the detector's trailing prediction buffer.
    fn predict(&mut self, frame: &[i16]) -> f32;

    /// Forget all state accumulated from earlier frames.
    fn reset(&mut self);
}

// ---------------------------------------------------------------------------
// EnergyWakeDetector
// ---------------------------------------------------------------------------

/// Energy-spike detector: fires when a frame's RMS jumps well above the
/// smoothed background level.
///
/// This is a stand-in for a trained keyword-spotting model.  It treats any
/// sharp onset of sound after a stretch of steady background as the wake
/// word.
#[derive(Debug, Clone)]
pub struct EnergyWakeDetector {
    spike_ratio: f32,
    min_energy: f32,
    smoothing: f32,
    background: f32,
    scores: VecDeque<f32>,
}

impl EnergyWakeDetector {
    pub fn new(config: &WakeWordConfig) -> Self {
        Self {
            spike_ratio: config.spike_ratio.max(1.0),
            min_energy: config.min_energy,
            smoothing: config.smoothing.clamp(0.0, 1.0),
            background: 0.0,
            scores: VecDeque::with_capacity(PREDICTION_HISTORY),
        }
    }

    /// Trailing scores, oldest first.
    pub fn recent_scores(&self) -> impl Iterator<Item = f32> + '_ {
        self.scores.iter().copied()
    }

    fn score(&self, rms: f32) -> f32 {
        if self.background <= self.min_energy || rms <= self.background * self.spike_ratio {
            return 0.0;
        }
        let ratio = rms / self.background;
        ((ratio - self.spike_ratio) / self.spike_ratio).clamp(0.0, 1.0)
    }
}

impl WakeWordDetector for EnergyWakeDetector {
    fn predict(&mut self, frame: &[i16]) -> f32 {
        if frame.is_empty() {
            return 0.0;
        }
        let rms = rms(frame);
        let score = self.score(rms);
        self.background = self.background * self.smoothing + rms * (1.0 - self.smoothing);

        if self.scores.len() == PREDICTION_HISTORY {
            self.scores.pop_front();
        }
        self.scores.push_back(score);
        score
    }

    fn reset(&mut self) {
        self.background = 0.0;
        self.scores.clear();
    }
}

fn rms(frame: &[i16]) -> f32 {
    let sum_sq: f64 = frame.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (sum_sq / frame.len() as f64).sqrt() as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> EnergyWakeDetector {
        EnergyWakeDetector::new(&WakeWordConfig::default())
    }

    fn feed(det: &mut EnergyWakeDetector, level: i16, frames: usize) -> f32 {
        let frame = vec![level; 1280];
        let mut last = 0.0;
        for _ in 0..frames {
            last = det.predict(&frame);
        }
        last
    }

    #[test]
    fn steady_background_never_fires() {
        let mut det = detector();
        assert_eq!(feed(&mut det, 500, 200), 0.0);
    }

    #[test]
    fn sharp_onset_after_background_fires() {
        let mut det = detector();
        feed(&mut det, 500, 100);
        let score = det.predict(&vec![20_000_i16; 1280]);
        assert!(score >= 0.5, "score {score}");
    }

    #[test]
    fn silence_below_min_energy_cannot_fire() {
        let mut det = detector();
        feed(&mut det, 10, 100);
        assert_eq!(det.predict(&vec![5_000_i16; 1280]), 0.0);
    }

    #[test]
    fn prediction_history_is_bounded_and_reset_clears_it() {
        let mut det = detector();
        feed(&mut det, 500, PREDICTION_HISTORY + 10);
        assert_eq!(det.recent_scores().count(), PREDICTION_HISTORY);

        det.reset();
        assert_eq!(det.recent_scores().count(), 0);
        // Background was forgotten too, so a loud first frame cannot fire.
        assert_eq!(det.predict(&vec![20_000_i16; 1280]), 0.0);
    }

    #[test]
    fn empty_frame_scores_zero() {
        let mut det = detector();
        assert_eq!(det.predict(&[]), 0.0);
    }
}
