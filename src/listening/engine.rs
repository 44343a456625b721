//! The capture thread: wake-word detection, recording and transcription.
//!
//! # Session lifecycle
//!
//! ```text
//! start_listening()
//!   └─ spawn "listening" thread
//!        open AudioInput ─▶ detection loop (pre-trigger ring buffer + detector)
//!                              │ score > detection_threshold
//!                              ▼
//!                       publish hotword_detected
//!                       ListeningSession::begin (adaptive threshold)
//!                       recording loop ─▶ Done | TimedOut | Failed | stopped
//!        drop source, reset detector
//!        Done → loading_message, encode WAV, (archive), transcribe
//!        clear `running`
//!        publish recorder_callback | timeout
//! ```
//!
//! At most one session exists at a time: `running` is claimed atomically by
//! [`ListeningEngine::start_listening`] and released by the capture thread
//! just before it publishes the session outcome, so a listener may re-arm
//! the engine straight from that event.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::{archive_recording, encode_wav, AudioInput, AudioSource, CaptureError, RingBuffer};
use crate::config::ListeningConfig;
use crate::events::{Event, EventBus, RecorderOutcome};
use crate::stt::Transcriber;

use super::detector::WakeWordDetector;
use super::session::{ListeningSession, Phase};

/// Back-off before reopening an input that failed while idle.
const REOPEN_DELAY: Duration = Duration::from_secs(1);

/// Progress text published before transcription starts.
pub const TRANSCRIBING_MESSAGE: &str = "Transcribing audio";

/// How a capture run ended.
enum Capture {
    /// Stopped (or input exhausted) before the wake word.
    Idle,
    Utterance(Vec<i16>),
    TimedOut,
    Cancelled,
    Failed,
}

// ---------------------------------------------------------------------------
// ListeningEngine
// ---------------------------------------------------------------------------

struct Shared {
    config: ListeningConfig,
    bus: EventBus,
    input: Arc<dyn AudioInput>,
    detector: Mutex<Box<dyn WakeWordDetector>>,
    transcriber: Arc<dyn Transcriber>,
    running: AtomicBool,
}

/// Owns the capture thread and the single-session invariant.
pub struct ListeningEngine {
    shared: Arc<Shared>,
    /// Also serialises starting against stopping.
    thread: Mutex<Option<JoinHandle<()>>>,
    /// Set once by [`ListeningEngine::shutdown`]; never cleared.
    shut_down: AtomicBool,
}

impl ListeningEngine {
    pub fn new(
        config: &ListeningConfig,
        bus: EventBus,
        input: Arc<dyn AudioInput>,
        detector: Box<dyn WakeWordDetector>,
        transcriber: Arc<dyn Transcriber>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                config: config.clone(),
                bus,
                input,
                detector: Mutex::new(detector),
                transcriber,
                running: AtomicBool::new(false),
            }),
            thread: Mutex::new(None),
            shut_down: AtomicBool::new(false),
        }
    }

    /// `true` while a capture thread owns the session.
    pub fn is_listening(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Begin a new session on a fresh capture thread.
    ///
    /// Returns `false` without side effects when a session is already
    /// active or the engine has been shut down.
    pub fn start_listening(&self) -> bool {
        let mut slot = self.thread_slot();
        if self.shut_down.load(Ordering::SeqCst) {
            log::debug!("listening: engine shut down, not starting");
            return false;
        }
        if self.shared.running.swap(true, Ordering::SeqCst) {
            log::debug!("listening: session already active");
            return false;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = std::thread::Builder::new()
            .name("listening".into())
            .spawn(move || shared.run_session());

        match spawned {
            Ok(handle) => {
                // A previous thread may still be finishing its publish; it
                // has already released `running`, so detaching it is safe.
                *slot = Some(handle);
                log::info!("listening: waiting for wake word");
                true
            }
            Err(e) => {
                log::error!("listening: failed to spawn capture thread: {e}");
                self.shared.running.store(false, Ordering::SeqCst);
                false
            }
        }
    }

    /// Ask the capture thread to finish and wait for it.
    ///
    /// The capture loop checks the flag once per frame.  A session stopped
    /// mid-recording reports [`RecorderOutcome::Cancelled`]; one stopped
    /// while idle reports nothing.  A no-op when not listening.
    pub fn stop(&self) {
        self.halt(false);
    }

    /// Stop for good: every later [`start_listening`](Self::start_listening)
    /// is refused, so no capture thread can open the device again.
    pub fn shutdown(&self) {
        self.halt(true);
    }

    fn halt(&self, terminal: bool) {
        let handle = {
            let mut slot = self.thread_slot();
            if terminal {
                self.shut_down.store(true, Ordering::SeqCst);
            }
            self.shared.running.store(false, Ordering::SeqCst);
            slot.take()
        };

        let Some(handle) = handle else {
            return;
        };
        if handle.thread().id() == std::thread::current().id() {
            // Called from a listener on the capture thread itself.
            return;
        }
        if handle.join().is_err() {
            log::error!("listening: capture thread panicked");
        }
        log::info!("listening: stopped");
    }

    fn thread_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.thread.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for ListeningEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ---------------------------------------------------------------------------
// Capture thread
// ---------------------------------------------------------------------------

impl Shared {
    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn detector(&self) -> MutexGuard<'_, Box<dyn WakeWordDetector>> {
        self.detector.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: Event) {
        let kind = event.kind();
        if let Err(e) = self.bus.publish(event) {
            log::error!("listening: `{kind}` listener failed: {e:#}");
        }
    }

    /// Body of the capture thread.  Every exit path resets the detector and
    /// releases `running` before the outcome is published.
    fn run_session(&self) {
        let mut detected = false;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let capture = self.capture(&mut detected);
            self.outcome(capture)
        }));

        self.detector().reset();

        let event = match result {
            Ok(event) => event,
            Err(payload) => {
                log::error!(
                    "listening: session panicked: {}",
                    crate::panic_message(payload.as_ref())
                );
                // Close any interaction the wake word opened.
                detected.then(|| Event::transcript(""))
            }
        };

        self.running.store(false, Ordering::SeqCst);

        if let Some(event) = event {
            self.publish(event);
        }
    }

    /// Open the input, wait for the wake word and record the utterance.
    /// The source is dropped (and the device released) before returning.
    fn capture(&self, detected: &mut bool) -> Capture {
        let mut pre_trigger = RingBuffer::new(self.config.pre_trigger_samples().max(1));

        loop {
            if !self.is_running() {
                return Capture::Idle;
            }

            let mut source = match self.input.open() {
                Ok(source) => source,
                Err(e) => {
                    log::error!("listening: cannot open audio input: {e}");
                    if !self.pause(REOPEN_DELAY) {
                        return Capture::Idle;
                    }
                    continue;
                }
            };

            match self.wait_for_wake_word(source.as_mut(), &mut pre_trigger) {
                Ok(true) => {
                    *detected = true;
                    return self.record(source.as_mut(), &pre_trigger);
                }
                Ok(false) => return Capture::Idle,
                Err(e) => {
                    log::warn!("listening: audio input failed while idle: {e}; reopening");
                    drop(source);
                    if !self.pause(REOPEN_DELAY) {
                        return Capture::Idle;
                    }
                }
            }
        }
    }

    /// Detection phase.  `Ok(true)` once the wake word scores above the
    /// threshold, `Ok(false)` when stopped or the input ran dry.
    fn wait_for_wake_word(
        &self,
        source: &mut dyn AudioSource,
        pre_trigger: &mut RingBuffer<i16>,
    ) -> Result<bool, CaptureError> {
        while self.is_running() {
            let Some(frame) = source.read_frame()? else {
                log::info!("listening: audio input ended");
                return Ok(false);
            };
            pre_trigger.push_slice(&frame);

            let score = self.detector().predict(&frame);
            if score > self.config.detection_threshold {
                log::info!("listening: wake word detected (score {score:.2})");
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Recording phase, from detection to a terminal session phase.
    fn record(&self, source: &mut dyn AudioSource, pre_trigger: &RingBuffer<i16>) -> Capture {
        self.publish(Event::HotwordDetected);

        let mut session = ListeningSession::begin(&self.config, pre_trigger);
        log::debug!(
            "listening: silence threshold {:.0} from {:.1}s of ambient audio",
            session.threshold(),
            pre_trigger.duration_secs(self.config.sample_rate)
        );
        let started = Instant::now();

        loop {
            if !self.is_running() {
                log::info!("listening: stopped mid-recording");
                return Capture::Cancelled;
            }

            let frame = match source.read_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    session.fail();
                    log::error!("listening: audio input ended mid-recording");
                    return Capture::Failed;
                }
                Err(e) => {
                    session.fail();
                    log::error!("listening: capture failed mid-recording: {e}");
                    return Capture::Failed;
                }
            };

            match session.push_frame(&frame) {
                Phase::Done => {
                    log::info!(
                        "listening: utterance complete ({:.1}s audio, {:.1}s wall)",
                        session.elapsed().as_secs_f32(),
                        started.elapsed().as_secs_f32()
                    );
                    return Capture::Utterance(session.into_recording());
                }
                Phase::TimedOut => {
                    log::info!(
                        "listening: timed out after {:.1}s (speech started: {})",
                        session.elapsed().as_secs_f32(),
                        session.speech_started()
                    );
                    return Capture::TimedOut;
                }
                _ => {}
            }
        }
    }

    /// Turn a capture result into the event to publish, transcribing a
    /// finished utterance on the way.
    fn outcome(&self, capture: Capture) -> Option<Event> {
        match capture {
            Capture::Idle => None,
            Capture::Utterance(samples) => Some(Event::transcript(self.transcribe(&samples))),
            Capture::TimedOut => Some(Event::Timeout),
            Capture::Cancelled => Some(Event::RecorderCallback(RecorderOutcome::Cancelled)),
            Capture::Failed => Some(Event::transcript("")),
        }
    }

    /// Encode, optionally archive, and transcribe.  Every failure degrades
    /// to an empty transcript.
    fn transcribe(&self, samples: &[i16]) -> String {
        self.publish(Event::loading(TRANSCRIBING_MESSAGE));

        let wav = match encode_wav(samples, self.config.sample_rate) {
            Ok(wav) => wav,
            Err(e) => {
                log::error!("listening: failed to encode utterance: {e}");
                return String::new();
            }
        };

        if let Some(dir) = &self.config.recordings_dir {
            match archive_recording(dir, &wav) {
                Ok(path) => log::info!("listening: saved {}", path.display()),
                Err(e) => log::warn!("listening: could not save recording: {e}"),
            }
        }

        match self.transcriber.transcribe(&wav) {
            Ok(text) => {
                log::info!("listening: transcript {text:?}");
                text
            }
            Err(e) => {
                log::warn!("listening: transcription failed: {e}");
                String::new()
            }
        }
    }

    /// Sleep up to `delay` in short slices.  Returns `false` if stopped
    /// meanwhile.
    fn pause(&self, delay: Duration) -> bool {
        let deadline = Instant::now() + delay;
        while Instant::now() < deadline {
            if !self.is_running() {
                return false;
            }
            std::thread::sleep(Duration::from_millis(50));
        }
        self.is_running()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
