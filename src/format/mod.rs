//! Audio format conversion utilities.
//!
//! - Sample conversion (f32 → little-endian 16-bit PCM, and back for playback)
//! - The canonical WAV header used by file capture

mod convert;
mod wav;

pub use convert::{
    f32_to_i16, f32_to_pcm16le, i16_to_f32, pcm16le_to_f32, pcm16le_to_i16, PCM16_SAMPLE_BYTES,
};
pub use wav::{riff_size, wav_header, WAV_DATA_SIZE_OFFSET, WAV_FILE_SIZE_OFFSET, WAV_HEADER_SIZE};
