//! Audio sources and the cpal microphone.
//!
//! The listening engine reads fixed-length mono `i16` [`AudioFrame`]s from an
//! [`AudioSource`].  Sources are produced by an [`AudioInput`], which the
//! engine asks for a fresh source at the start of every session and drops at
//! the end, so the device is only held while a session is live.
//!
//! `cpal::Stream` is not `Send` on every platform, so sources are opened on
//! the thread that reads them; only the [`AudioInput`] factory crosses
//! threads.

use std::collections::VecDeque;
use std::sync::mpsc;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use thiserror::Error;

use crate::config::ListeningConfig;

use super::resample::{downmix, f32_to_i16, resample};

/// One fixed-length buffer of mono signed 16-bit samples.
pub type AudioFrame = Vec<i16>;

/// How long a read may wait for the device before the stream is considered
/// dead.
const STALL_TIMEOUT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// CaptureError
// ---------------------------------------------------------------------------

/// Errors that can occur while opening or reading an audio source.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("no input device found on the default audio host")]
    NoDevice,

    #[error("input device `{0}` not found")]
    DeviceNotFound(String),

    #[error("failed to enumerate input devices: {0}")]
    Devices(#[from] cpal::DevicesError),

    #[error("failed to query default input config: {0}")]
    DefaultConfig(#[from] cpal::DefaultStreamConfigError),

    #[error("failed to build input stream: {0}")]
    BuildStream(#[from] cpal::BuildStreamError),

    #[error("failed to start audio stream: {0}")]
    PlayStream(#[from] cpal::PlayStreamError),

    #[error("audio device delivered nothing for {0:?}")]
    Stalled(Duration),

    #[error("audio stream closed")]
    Closed,
}

// ---------------------------------------------------------------------------
// Traits
// ---------------------------------------------------------------------------

/// A live stream of audio frames, read from a single thread.
pub trait AudioSource {
    /// Block until the next frame is available.
    ///
    /// `Ok(None)` means the source is exhausted and will produce nothing
    /// more.
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, CaptureError>;
}

/// Factory for [`AudioSource`]s, shared with the capture thread.
pub trait AudioInput: Send + Sync {
    /// Open the device and start streaming.  Dropping the returned source
    /// stops the stream and releases the device.
    fn open(&self) -> Result<Box<dyn AudioSource>, CaptureError>;
}

// ---------------------------------------------------------------------------
// Microphone
// ---------------------------------------------------------------------------

/// System microphone input built on `cpal`.
///
/// Audio arrives from the device in whatever rate and channel layout it
/// prefers; [`MicrophoneStream`] converts it to mono `i16` at the configured
/// rate and slices it into `frame_size` frames.
#[derive(Debug, Clone)]
pub struct Microphone {
    device_name: Option<String>,
    frame_size: usize,
    sample_rate: u32,
}

impl Microphone {
    pub fn new(config: &ListeningConfig) -> Self {
        Self {
            device_name: config.audio_device.clone(),
            frame_size: config.frame_size,
            sample_rate: config.sample_rate,
        }
    }

    /// Check that the configured device exists without opening a stream.
    ///
    /// Used at startup so a missing microphone fails the process instead of
    /// every session.
    pub fn probe(&self) -> Result<String, CaptureError> {
        let device = self.resolve_device()?;
        Ok(device.name().unwrap_or_else(|_| "<unnamed>".into()))
    }

    fn resolve_device(&self) -> Result<cpal::Device, CaptureError> {
        let host = cpal::default_host();
        match &self.device_name {
            None => host.default_input_device().ok_or(CaptureError::NoDevice),
            Some(wanted) => host
                .input_devices()?
                .find(|d| d.name().map(|n| &n == wanted).unwrap_or(false))
                .ok_or_else(|| CaptureError::DeviceNotFound(wanted.clone())),
        }
    }
}

impl AudioInput for Microphone {
    fn open(&self) -> Result<Box<dyn AudioSource>, CaptureError> {
        let device = self.resolve_device()?;
        let supported = device.default_input_config()?;

        let channels = supported.channels();
        let device_rate = supported.sample_rate().0;
        let config: cpal::StreamConfig = supported.into();

        let (tx, rx) = mpsc::channel::<Vec<f32>>();
        let stream = device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                // The receiver is gone once the session ends.
                let _ = tx.send(data.to_vec());
            },
            |err: cpal::StreamError| {
                log::error!("listening: cpal stream error: {err}");
            },
            None,
        )?;
        stream.play()?;

        log::debug!(
            "listening: microphone open ({} Hz, {} ch → {} Hz mono)",
            device_rate,
            channels,
            self.sample_rate
        );

        Ok(Box::new(MicrophoneStream {
            _stream: stream,
            rx,
            device_rate,
            channels,
            target_rate: self.sample_rate,
            frame_size: self.frame_size,
            pending: VecDeque::new(),
        }))
    }
}

/// An open microphone stream.  Dropping it stops the cpal stream.
pub struct MicrophoneStream {
    _stream: cpal::Stream,
    rx: mpsc::Receiver<Vec<f32>>,
    device_rate: u32,
    channels: u16,
    target_rate: u32,
    frame_size: usize,
    pending: VecDeque<i16>,
}

impl AudioSource for MicrophoneStream {
    fn read_frame(&mut self) -> Result<Option<AudioFrame>, CaptureError> {
        while self.pending.len() < self.frame_size {
            let chunk = match self.rx.recv_timeout(STALL_TIMEOUT) {
                Ok(chunk) => chunk,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    return Err(CaptureError::Stalled(STALL_TIMEOUT))
                }
                Err(mpsc::RecvTimeoutError::Disconnected) => return Err(CaptureError::Closed),
            };
            let mono = downmix(&chunk, self.channels);
            let resampled = resample(&mono, self.device_rate, self.target_rate);
            self.pending.extend(f32_to_i16(&resampled));
        }
        Ok(Some(self.pending.drain(..self.frame_size).collect()))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
