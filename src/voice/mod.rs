//! Voice input
//!
//! The session depends only on the [`AudioRecorder`] capability. The bundled
//! [`MicrophoneRecorder`] drives the default input device through `cpal` and
//! hands back WAV bytes ready for upload.

mod capture;

use capture::AudioCapture;
pub use capture::{SAMPLE_RATE, samples_to_wav};

use crate::{Error, Result};

/// Token for one active recording
#[derive(Debug, PartialEq, Eq)]
pub struct CaptureHandle(u64);

impl CaptureHandle {
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Exclusive access to a recording device
///
/// At most one capture is active at a time; implementations reject a second
/// `start_capture` until the first handle is stopped.
pub trait AudioRecorder {
    /// Begin recording
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the device cannot start
    fn start_capture(&mut self) -> Result<CaptureHandle>;

    /// Stop recording and return the encoded audio
    ///
    /// Empty bytes mean nothing was captured.
    ///
    /// # Errors
    ///
    /// Returns `Error::Device` if the handle is stale or encoding fails
    fn stop_capture(&mut self, handle: CaptureHandle) -> Result<Vec<u8>>;
}

/// Records from the default microphone
///
/// The device is opened on first use so a client without a microphone can
/// still run instant actions.
#[derive(Default)]
pub struct MicrophoneRecorder {
    capture: Option<AudioCapture>,
    active: Option<u64>,
    next_id: u64,
}

impl MicrophoneRecorder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioRecorder for MicrophoneRecorder {
    fn start_capture(&mut self) -> Result<CaptureHandle> {
        if self.active.is_some() {
            return Err(Error::Device("recording already active".to_string()));
        }

        let capture = match self.capture.take() {
            Some(capture) => capture,
            None => AudioCapture::new()?,
        };
        let capture = self.capture.insert(capture);
        capture.start()?;

        self.next_id += 1;
        self.active = Some(self.next_id);
        tracing::debug!(recording = self.next_id, "recording started");
        Ok(CaptureHandle(self.next_id))
    }

    fn stop_capture(&mut self, handle: CaptureHandle) -> Result<Vec<u8>> {
        if self.active != Some(handle.0) {
            return Err(Error::Device(format!("recording {} is not active", handle.0)));
        }
        self.active = None;

        let samples = self
            .capture
            .as_mut()
            .map(AudioCapture::stop)
            .unwrap_or_default();

        tracing::debug!(recording = handle.0, samples = samples.len(), "recording stopped");
        samples_to_wav(&samples, SAMPLE_RATE)
    }
}
