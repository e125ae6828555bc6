//! Error types for relay-audio.
//!
//! Errors follow the lifetime of the thing that failed:
//! - **Capture errors** ([`CaptureError`]): the device could not be opened, is
//!   busy, or failed mid-session
//! - **Transport errors** ([`TransportError`]): a stream could not be written or read
//! - **Relay errors** ([`RelayError`]): a relay call failed as a whole
//!
//! A remote hang-up is deliberately absent from all of these. Disconnects are a
//! normal way for a stream to end and are reported as a successful outcome.

use std::path::PathBuf;

/// Errors raised by the capture engine.
///
/// `DeviceInit` and `DeviceBusy` are returned synchronously from
/// [`AudioCapturer::start_capture()`]. `DeviceRead` is delivered at most once,
/// asynchronously, on the session's error channel.
///
/// [`AudioCapturer::start_capture()`]: crate::AudioCapturer::start_capture
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaptureError {
    /// The device could not be opened or its stream could not be started.
    #[error("failed to open capture device '{device}' ({format}): {reason}")]
    DeviceInit {
        /// Name of the device that failed.
        device: String,
        /// The format that was requested, for diagnosis.
        format: String,
        /// What went wrong.
        reason: String,
    },

    /// A read failed after the session started. The session is unusable afterwards.
    #[error("failed to read from capture device: {reason}")]
    DeviceRead {
        /// What went wrong.
        reason: String,
    },

    /// Another session already holds the device.
    #[error("capture device '{device}' is busy with another session")]
    DeviceBusy {
        /// Name of the busy device.
        device: String,
    },
}

impl CaptureError {
    /// Creates a device initialization error.
    pub fn device_init(
        device: impl Into<String>,
        format: impl std::fmt::Display,
        reason: impl Into<String>,
    ) -> Self {
        Self::DeviceInit {
            device: device.into(),
            format: format.to_string(),
            reason: reason.into(),
        }
    }

    /// Creates a device read error.
    pub fn read(reason: impl Into<String>) -> Self {
        Self::DeviceRead {
            reason: reason.into(),
        }
    }
}

/// Errors writing to or reading from a network stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Sending a message on the stream failed.
    #[error("failed to send on stream: {reason}")]
    SendFailed {
        /// What went wrong.
        reason: String,
    },

    /// Receiving a message from the stream failed.
    #[error("failed to receive from stream: {reason}")]
    ReceiveFailed {
        /// What went wrong.
        reason: String,
    },

    /// The remote side ended the call with an error status.
    #[error("remote call failed: {message}")]
    Status {
        /// The status message sent by the remote side.
        message: String,
    },

    /// The stream is closed.
    #[error("stream closed")]
    Closed,
}

impl TransportError {
    /// Creates a send failure.
    pub fn send_failed(reason: impl Into<String>) -> Self {
        Self::SendFailed {
            reason: reason.into(),
        }
    }

    /// Creates a receive failure.
    pub fn receive_failed(reason: impl Into<String>) -> Self {
        Self::ReceiveFailed {
            reason: reason.into(),
        }
    }

    /// Creates an error status carrying the remote message.
    pub fn status(message: impl Into<String>) -> Self {
        Self::Status {
            message: message.into(),
        }
    }
}

/// Errors from a playback request.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlaybackError {
    /// The payload or its format metadata is not playable.
    #[error("cannot play {codec} audio at {sample_rate}Hz/{channels}ch: {reason}")]
    InvalidFormat {
        /// Codec name from the request.
        codec: String,
        /// Requested sample rate.
        sample_rate: i64,
        /// Requested channel count.
        channels: i64,
        /// Why the request was rejected.
        reason: String,
    },

    /// The resource has no playback device.
    #[error("playback is not available on this resource")]
    Unavailable,

    /// The output device failed.
    #[error("playback device error: {0}")]
    Device(String),
}

/// Errors returned by a relay call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RelayError {
    /// No resource is registered under the requested name.
    #[error("audio resource not found: {name}")]
    ResourceNotFound {
        /// The name that was looked up.
        name: String,
    },

    /// The request was malformed.
    #[error("invalid request: {reason}")]
    InvalidRequest {
        /// Why the request was rejected.
        reason: String,
    },

    /// The capture session failed to start or failed mid-stream.
    #[error("audio capture error: {0}")]
    Capture(#[from] CaptureError),

    /// The network stream failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Playback failed.
    #[error("playback error: {0}")]
    Playback(#[from] PlaybackError),
}

impl RelayError {
    /// Creates an invalid-request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

/// Errors that can occur within a [`Sink`](crate::Sink) implementation.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// A write operation failed.
    #[error("write failed: {reason}")]
    WriteFailed {
        /// Description of what went wrong.
        reason: String,
    },

    /// File I/O error.
    #[error("file error: {path}: {source}")]
    FileError {
        /// Path to the file.
        path: PathBuf,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The sink was used before [`on_start`](crate::Sink::on_start).
    #[error("sink not initialized (call on_start first)")]
    NotInitialized,

    /// Custom error for user-implemented sinks.
    #[error("{0}")]
    Custom(String),
}

impl SinkError {
    /// Creates a custom sink error with the given message.
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Creates a write failed error with the given reason.
    pub fn write_failed(reason: impl Into<String>) -> Self {
        Self::WriteFailed {
            reason: reason.into(),
        }
    }

    /// Creates a file error for the given path.
    pub fn file_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileError {
            path: path.into(),
            source,
        }
    }
}

/// Errors from [`record()`](crate::record).
#[derive(Debug, thiserror::Error)]
pub enum RecordError {
    /// The capture session could not start or failed mid-recording.
    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    /// A sink failed to start, write, or finalize.
    #[error("sink '{sink_name}' failed: {source}")]
    Sink {
        /// Name of the failing sink.
        sink_name: String,
        /// The sink's error.
        #[source]
        source: SinkError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_init_carries_format_context() {
        let err = CaptureError::device_init("USB Mic", "pcm16 44100Hz/1ch", "no such device");
        assert_eq!(
            err.to_string(),
            "failed to open capture device 'USB Mic' (pcm16 44100Hz/1ch): no such device"
        );
    }

    #[test]
    fn test_device_busy_display() {
        let err = CaptureError::DeviceBusy {
            device: "default".to_string(),
        };
        assert!(err.to_string().contains("busy"));
    }

    #[test]
    fn test_relay_error_wraps_capture_error() {
        let err: RelayError = CaptureError::read("overrun").into();
        assert_eq!(
            err.to_string(),
            "audio capture error: failed to read from capture device: overrun"
        );
    }

    #[test]
    fn test_transport_status_display() {
        let err = TransportError::status("resource not found");
        assert_eq!(err.to_string(), "remote call failed: resource not found");
    }

    #[test]
    fn test_playback_error_mentions_requested_format() {
        let err = PlaybackError::InvalidFormat {
            codec: "opus".to_string(),
            sample_rate: 48000,
            channels: 2,
            reason: "unsupported codec".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("opus"));
        assert!(msg.contains("48000Hz/2ch"));
    }

    #[test]
    fn test_sink_error_file_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = SinkError::file_error("/tmp/test.wav", io_err);
        assert!(err.to_string().contains("/tmp/test.wav"));
    }
}
