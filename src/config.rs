//! Audio format descriptors and runtime configuration.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Audio codecs understood by the relay.
///
/// Only raw 16-bit little-endian PCM is carried; anything else is rejected at
/// the request boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Codec {
    /// Signed 16-bit little-endian PCM.
    #[default]
    Pcm16,
}

impl Codec {
    /// Parses a codec name as sent by clients.
    ///
    /// Matching is case-insensitive. An empty name selects the default codec.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "" | "pcm" | "pcm16" | "pcm_s16le" => Some(Self::Pcm16),
            _ => None,
        }
    }

    /// Canonical wire name of this codec.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pcm16 => "pcm16",
        }
    }

    /// Bits per encoded sample.
    pub fn bits_per_sample(&self) -> u16 {
        match self {
            Self::Pcm16 => 16,
        }
    }
}

impl fmt::Display for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Describes an audio stream: `{sample_rate, channels, bits_per_sample, codec}`.
///
/// Fixed for the lifetime of a capture session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    /// Sample rate in Hz.
    pub sample_rate: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Bits per sample in the encoded payload.
    pub bits_per_sample: u16,
    /// Payload codec.
    pub codec: Codec,
}

impl AudioFormat {
    /// 16-bit PCM at the given rate and channel count.
    pub const fn pcm16(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
            bits_per_sample: 16,
            codec: Codec::Pcm16,
        }
    }

    /// Size of one frame (one sample per channel) in bytes.
    pub fn bytes_per_frame(&self) -> usize {
        usize::from(self.channels) * usize::from(self.bits_per_sample / 8)
    }

    /// Encoded bytes per second of audio.
    pub fn byte_rate(&self) -> u32 {
        self.sample_rate * u32::from(self.channels) * u32::from(self.bits_per_sample / 8)
    }
}

impl Default for AudioFormat {
    /// 44.1kHz mono 16-bit PCM.
    fn default() -> Self {
        Self::pcm16(44_100, 1)
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}Hz/{}ch",
            self.codec, self.sample_rate, self.channels
        )
    }
}

/// The format a device actually negotiated, plus its buffer size.
///
/// Every duration-to-chunk calculation goes through this type so it always
/// reflects the opened device rather than the requested configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSpec {
    /// Negotiated format.
    pub format: AudioFormat,
    /// Frames delivered by each device read.
    pub frames_per_buffer: usize,
}

impl StreamSpec {
    /// Creates a spec for the given format and buffer size.
    pub fn new(format: AudioFormat, frames_per_buffer: usize) -> Self {
        Self {
            format,
            frames_per_buffer,
        }
    }

    /// Interleaved samples per device read.
    pub fn samples_per_buffer(&self) -> usize {
        self.frames_per_buffer * usize::from(self.format.channels)
    }

    /// Wall-clock duration covered by one chunk.
    pub fn chunk_duration(&self) -> Duration {
        if self.format.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames_per_buffer as f64 / f64::from(self.format.sample_rate))
    }

    /// Number of whole chunks covering `duration`.
    ///
    /// Rounds down, but never below one chunk for a non-zero duration.
    pub fn chunks_for(&self, duration: Duration) -> u64 {
        if duration.is_zero() || self.frames_per_buffer == 0 {
            return 0;
        }
        let frames = duration.as_micros() * u128::from(self.format.sample_rate) / 1_000_000;
        let chunks = frames / self.frames_per_buffer as u128;
        u64::try_from(chunks).unwrap_or(u64::MAX).max(1)
    }
}

/// Configuration for the capture engine.
///
/// Use [`CaptureConfig::default()`] for sensible defaults, or customize as needed.
///
/// # Example
///
/// ```
/// use relay_audio::{AudioFormat, CaptureConfig};
///
/// let config = CaptureConfig {
///     format: AudioFormat::pcm16(16_000, 1),
///     frames_per_buffer: 320,
///     ..Default::default()
/// };
/// assert_eq!(config.chunk_channel_capacity, 10);
/// ```
#[derive(Debug, Clone)]
pub struct CaptureConfig {
    /// Requested capture format.
    ///
    /// Default: 44.1kHz mono 16-bit PCM
    pub format: AudioFormat,

    /// Frames per device read; each read becomes one chunk.
    ///
    /// Default: 1024
    pub frames_per_buffer: usize,

    /// Capacity of the chunk channel between the producer and its consumer.
    ///
    /// A full channel stalls the producer (backpressure).
    /// Default: 10
    pub chunk_channel_capacity: usize,

    /// How long a device read may wait for samples before it fails.
    ///
    /// Default: 2 seconds
    pub read_timeout: Duration,

    /// Audio the device layer may buffer ahead of the producer loop.
    ///
    /// Default: 2 seconds
    pub device_buffer_duration: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            format: AudioFormat::default(),
            frames_per_buffer: 1024,
            chunk_channel_capacity: 10,
            read_timeout: Duration::from_secs(2),
            device_buffer_duration: Duration::from_secs(2),
        }
    }
}

/// Configuration for the client side of the relay.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Capacity of the application-facing chunk channel.
    ///
    /// When full, the receiver task stops pulling from the network until the
    /// application catches up.
    /// Default: 32
    pub channel_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 32,
        }
    }
}
