//! Sample conversion between float and 16-bit PCM.

/// Scale applied to a clamped float sample.
///
/// Uses 32767 (not 32768) for symmetric scaling: -1.0 maps to -32767.
const PCM16_SCALE: f32 = 32767.0;

/// Bytes per encoded 16-bit sample.
pub const PCM16_SAMPLE_BYTES: usize = 2;

/// Converts one float sample to i16.
///
/// The sample is clamped to [-1.0, 1.0] first, then scaled and truncated
/// toward zero. NaN maps to 0.
#[inline]
pub fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * PCM16_SCALE) as i16
}

/// Converts i16 samples to f32.
///
/// Output will be in the range [-1.0, 1.0).
#[inline]
pub fn i16_to_f32(sample: i16) -> f32 {
    f32::from(sample) / 32768.0
}

/// Encodes float samples as little-endian 16-bit PCM.
///
/// The output is always exactly `2 * samples.len()` bytes. Out-of-range input
/// is clamped, never rejected.
pub fn f32_to_pcm16le(samples: &[f32]) -> Vec<u8> {
    let mut pcm = Vec::with_capacity(samples.len() * PCM16_SAMPLE_BYTES);
    for &sample in samples {
        pcm.extend_from_slice(&f32_to_i16(sample).to_le_bytes());
    }
    pcm
}

/// Decodes little-endian 16-bit PCM into i16 samples.
///
/// A trailing odd byte is ignored.
pub fn pcm16le_to_i16(pcm: &[u8]) -> Vec<i16> {
    pcm.chunks_exact(PCM16_SAMPLE_BYTES)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect()
}

/// Decodes little-endian 16-bit PCM into float samples for playback.
pub fn pcm16le_to_f32(pcm: &[u8]) -> Vec<f32> {
    pcm.chunks_exact(PCM16_SAMPLE_BYTES)
        .map(|pair| i16_to_f32(i16::from_le_bytes([pair[0], pair[1]])))
        .collect()
}
