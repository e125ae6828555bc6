//! Playback boundary and request validation.

use crate::format::PCM16_SAMPLE_BYTES;
use crate::{AudioFormat, Codec, PlaybackError};

/// Upper bound accepted for a playback sample rate.
const MAX_PLAYBACK_SAMPLE_RATE: i64 = 384_000;

/// Upper bound accepted for a playback channel count.
const MAX_PLAYBACK_CHANNELS: i64 = 32;

/// Plays decoded audio on an output device.
pub trait PlaybackBackend: Send + Sync {
    /// Human-readable device name.
    fn name(&self) -> String;

    /// Plays interleaved samples and blocks until they have been handed to the device.
    ///
    /// # Errors
    ///
    /// Returns [`PlaybackError::Device`] if the output device fails.
    fn play(&self, samples: &[f32], format: &AudioFormat) -> Result<(), PlaybackError>;
}

/// Resolves the format metadata of a playback request.
///
/// # Errors
///
/// Returns [`PlaybackError::InvalidFormat`] for unknown codecs and for
/// sample rates or channel counts that are zero, negative, or implausibly large.
pub fn playback_format(
    codec: &str,
    sample_rate: i64,
    channels: i64,
) -> Result<AudioFormat, PlaybackError> {
    let invalid = |reason: &str| PlaybackError::InvalidFormat {
        codec: codec.to_string(),
        sample_rate,
        channels,
        reason: reason.to_string(),
    };

    let codec = Codec::parse(codec).ok_or_else(|| invalid("unsupported codec"))?;
    if !(1..=MAX_PLAYBACK_SAMPLE_RATE).contains(&sample_rate) {
        return Err(invalid("sample rate out of range"));
    }
    if !(1..=MAX_PLAYBACK_CHANNELS).contains(&channels) {
        return Err(invalid("channel count out of range"));
    }

    let sample_rate = u32::try_from(sample_rate).map_err(|_| invalid("sample rate out of range"))?;
    let channels = u16::try_from(channels).map_err(|_| invalid("channel count out of range"))?;

    Ok(AudioFormat {
        sample_rate,
        channels,
        bits_per_sample: codec.bits_per_sample(),
        codec,
    })
}

/// Checks that `audio` holds whole frames of `format`.
///
/// # Errors
///
/// Returns [`PlaybackError::InvalidFormat`] for an empty payload or one that
/// ends mid-frame.
pub fn validate_payload(audio: &[u8], format: &AudioFormat) -> Result<(), PlaybackError> {
    let invalid = |reason: String| PlaybackError::InvalidFormat {
        codec: format.codec.to_string(),
        sample_rate: i64::from(format.sample_rate),
        channels: i64::from(format.channels),
        reason,
    };

    if audio.is_empty() {
        return Err(invalid("empty audio payload".to_string()));
    }
    let frame_bytes = format.bytes_per_frame().max(PCM16_SAMPLE_BYTES);
    if audio.len() % frame_bytes != 0 {
        return Err(invalid(format!(
            "payload of {} bytes is not a whole number of {frame_bytes}-byte frames",
            audio.len()
        )));
    }
    Ok(())
}
