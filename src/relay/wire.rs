//! Wire-level messages exchanged by the relay.
//!
//! Field names and integer widths follow the RPC schema, so any transport can
//! encode them directly.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::source::playback_format;
use crate::{AudioChunk, AudioFormat, AudioProperties, Codec, PlaybackError};

/// One chunk of audio on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct WireChunk {
    /// Little-endian 16-bit PCM.
    pub audio_data: Vec<u8>,
    /// Position within the capture session.
    pub sequence: i64,
    /// Capture time, microseconds since the Unix epoch.
    pub timestamp: i64,
}

impl From<&AudioChunk> for WireChunk {
    fn from(chunk: &AudioChunk) -> Self {
        Self {
            audio_data: chunk.payload.to_vec(),
            sequence: i64::try_from(chunk.sequence).unwrap_or(i64::MAX),
            timestamp: chunk.timestamp_us,
        }
    }
}

impl From<WireChunk> for AudioChunk {
    fn from(wire: WireChunk) -> Self {
        AudioChunk::new(
            u64::try_from(wire.sequence).unwrap_or_default(),
            wire.timestamp,
            wire.audio_data,
        )
    }
}

/// Request for a stream of audio from a named resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GetAudioRequest {
    /// Resource name.
    pub name: String,
    /// Requested codec; empty selects PCM.
    pub codec: String,
    /// Seconds to stream; zero or negative streams until disconnect.
    pub duration_seconds: i32,
    /// Upper bound on the streamed duration; zero or negative means no bound.
    pub max_duration_seconds: i32,
    /// Skip audio captured at or before this instant (µs since the Unix epoch).
    pub previous_timestamp: i64,
}

impl GetAudioRequest {
    /// A PCM request for `duration_seconds` of audio with no cap or resume point.
    pub fn record(name: impl Into<String>, duration_seconds: i32) -> Self {
        Self {
            name: name.into(),
            codec: Codec::Pcm16.as_str().to_string(),
            duration_seconds,
            ..Default::default()
        }
    }

    /// The duration actually streamed: the requested duration capped by the
    /// maximum. `None` means unbounded.
    pub fn effective_duration(&self) -> Option<Duration> {
        let seconds = |value: i32| u64::try_from(value).ok().filter(|&s| s > 0);
        match (seconds(self.duration_seconds), seconds(self.max_duration_seconds)) {
            (Some(duration), Some(max)) => Some(Duration::from_secs(duration.min(max))),
            (Some(duration), None) => Some(Duration::from_secs(duration)),
            (None, Some(max)) => Some(Duration::from_secs(max)),
            (None, None) => None,
        }
    }
}

/// Format metadata of a playback request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioInfo {
    /// Codec name.
    pub codec: String,
    /// Sample rate in Hz.
    pub sample_rate: i32,
    /// Interleaved channel count.
    pub num_channels: i32,
}

impl AudioInfo {
    /// Validates the metadata and converts it to an [`AudioFormat`].
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::InvalidFormat`] naming the requested codec and format.
    pub fn to_format(&self) -> Result<AudioFormat, PlaybackError> {
        playback_format(
            &self.codec,
            i64::from(self.sample_rate),
            i64::from(self.num_channels),
        )
    }
}

impl From<&AudioFormat> for AudioInfo {
    fn from(format: &AudioFormat) -> Self {
        Self {
            codec: format.codec.as_str().to_string(),
            sample_rate: i32::try_from(format.sample_rate).unwrap_or(i32::MAX),
            num_channels: i32::from(format.channels),
        }
    }
}

/// Request to play a complete payload on a named resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayRequest {
    /// Resource name.
    pub name: String,
    /// Encoded audio.
    pub audio_data: Vec<u8>,
    /// Format of `audio_data`.
    pub info: AudioInfo,
}

/// Reply to a properties request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropertiesResponse {
    /// Capture format.
    pub info: AudioInfo,
    /// Frames per streamed chunk.
    pub frames_per_buffer: i64,
}

impl From<AudioProperties> for PropertiesResponse {
    fn from(properties: AudioProperties) -> Self {
        Self {
            info: AudioInfo::from(&properties.format),
            frames_per_buffer: i64::try_from(properties.frames_per_buffer).unwrap_or(i64::MAX),
        }
    }
}
