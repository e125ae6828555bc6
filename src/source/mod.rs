//! Audio device boundary.
//!
//! The capture engine never talks to hardware directly. It opens an
//! [`InputStream`] through an [`AudioBackend`] and performs blocking reads of
//! one buffer at a time. Playback goes through a [`PlaybackBackend`].
//!
//! Backends:
//! - [`MockBackend`]: scripted synthetic device for tests and CI
//! - `CpalBackend` / `CpalPlayback`: host audio via CPAL (feature `cpal`)

#[cfg(feature = "cpal")]
mod device;
mod mock;
mod playback;

#[cfg(feature = "cpal")]
pub use device::{default_input_device_name, list_input_devices, CpalBackend, CpalPlayback};
pub use mock::{MockBackend, MockSignal, MockStats};
pub use playback::{playback_format, validate_payload, PlaybackBackend};

use crate::{CaptureConfig, CaptureError, StreamSpec};

/// Opens capture streams on one physical (or simulated) device.
pub trait AudioBackend: Send + Sync {
    /// Human-readable device name for logs and errors.
    fn name(&self) -> String;

    /// Opens and starts an input stream.
    ///
    /// On failure, anything partially acquired must be released before
    /// returning.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceInit`] if the device cannot be opened or
    /// its stream cannot be started.
    fn open_input(&self, config: &CaptureConfig) -> Result<Box<dyn InputStream>, CaptureError>;
}

/// A started input stream.
pub trait InputStream: Send {
    /// The format and buffer size the device actually negotiated.
    fn spec(&self) -> StreamSpec;

    /// Blocks until `buffer` is completely filled with interleaved samples.
    ///
    /// `buffer.len()` is always [`StreamSpec::samples_per_buffer()`].
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceRead`]; the session treats it as fatal.
    fn read(&mut self, buffer: &mut [f32]) -> Result<(), CaptureError>;

    /// Stops the stream and releases the device. Called exactly once.
    fn close(&mut self);
}
