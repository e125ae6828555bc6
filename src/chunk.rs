//! Audio data chunk with sequence and timing metadata.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::format::PCM16_SAMPLE_BYTES;
use crate::{AudioFormat, TransportError};

/// A discrete, sequenced, timestamped buffer of PCM audio.
///
/// `AudioChunk` is the unit of transport through the pipeline. The capture
/// engine assigns `sequence` (starting at 0 for every session) and stamps the
/// wall-clock time at which the samples were read.
///
/// The payload is stored in an `Arc<Vec<u8>>` so clones share the bytes.
///
/// A chunk with `error` set is a *sentinel*: it carries no audio and is the
/// last chunk a client-side channel delivers before closing.
///
/// # Example
///
/// ```
/// use relay_audio::AudioChunk;
///
/// let chunk = AudioChunk::new(0, 1_700_000_000_000_000, vec![0u8; 2048]);
/// assert_eq!(chunk.sample_count(), 1024);
/// assert!(!chunk.is_sentinel());
///
/// let copy = chunk.clone(); // shares payload bytes
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    /// Position of this chunk within its capture session.
    pub sequence: u64,

    /// Capture time in microseconds since the Unix epoch.
    pub timestamp_us: i64,

    /// Little-endian 16-bit PCM bytes.
    pub payload: Arc<Vec<u8>>,

    /// Terminal error; set only on sentinel chunks.
    pub error: Option<TransportError>,
}

impl AudioChunk {
    /// Creates a data chunk.
    pub fn new(sequence: u64, timestamp_us: i64, payload: Vec<u8>) -> Self {
        Self {
            sequence,
            timestamp_us,
            payload: Arc::new(payload),
            error: None,
        }
    }

    /// Creates a sentinel chunk reporting abnormal stream termination.
    pub fn sentinel(error: TransportError) -> Self {
        Self {
            sequence: 0,
            timestamp_us: now_micros(),
            payload: Arc::new(Vec::new()),
            error: Some(error),
        }
    }

    /// Returns `true` if this chunk reports an error instead of carrying audio.
    pub fn is_sentinel(&self) -> bool {
        self.error.is_some()
    }

    /// Number of 16-bit samples in the payload (all channels).
    pub fn sample_count(&self) -> usize {
        self.payload.len() / PCM16_SAMPLE_BYTES
    }

    /// Returns `true` if this chunk carries no audio bytes.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Duration of the audio in this chunk when interpreted as `format`.
    pub fn duration(&self, format: &AudioFormat) -> Duration {
        let frame_bytes = format.bytes_per_frame();
        if format.sample_rate == 0 || frame_bytes == 0 {
            return Duration::ZERO;
        }
        let frames = self.payload.len() / frame_bytes;
        Duration::from_secs_f64(frames as f64 / f64::from(format.sample_rate))
    }

    /// Capture time as a `SystemTime`.
    pub fn captured_at(&self) -> SystemTime {
        let micros = Duration::from_micros(self.timestamp_us.unsigned_abs());
        if self.timestamp_us >= 0 {
            UNIX_EPOCH + micros
        } else {
            UNIX_EPOCH - micros
        }
    }
}

/// Current wall-clock time in microseconds since the Unix epoch.
pub fn now_micros() -> i64 {
    match SystemTime::now().duration_since(UNIX_EPOCH) {
        Ok(elapsed) => i64::try_from(elapsed.as_micros()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_micros()).unwrap_or(i64::MAX),
    }
}
