//! Local destinations for captured audio.
//!
//! A [`Sink`] receives the chunks of one capture session, in order, through
//! [`record()`](crate::record). The crate ships [`FileSink`], which writes a
//! WAV file; implement the trait for anything else.

mod file;

pub use file::FileSink;

use crate::{AudioChunk, AudioFormat, SinkError};
use async_trait::async_trait;

/// A destination for audio data.
///
/// # Implementation Notes
///
/// - Methods take `&self`; use interior mutability if needed
/// - `on_start` is called once, with the session's negotiated format, before
///   any chunk is written
/// - `on_stop` is called once when the session ends, even after an error
///
/// # Example
///
/// ```
/// use relay_audio::{AudioChunk, Sink, SinkError};
/// use async_trait::async_trait;
///
/// struct PrintSink;
///
/// #[async_trait]
/// impl Sink for PrintSink {
///     fn name(&self) -> &str {
///         "print"
///     }
///
///     async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
///         println!("chunk #{}: {} bytes", chunk.sequence, chunk.payload.len());
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Sink: Send + Sync {
    /// Human-readable name for logging and error messages.
    fn name(&self) -> &str;

    /// Called once before the first chunk.
    ///
    /// Default implementation does nothing.
    async fn on_start(&self, _format: &AudioFormat) -> Result<(), SinkError> {
        Ok(())
    }

    /// Writes one chunk of PCM audio.
    async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError>;

    /// Called once after the last chunk.
    ///
    /// Default implementation does nothing.
    async fn on_stop(&self) -> Result<(), SinkError> {
        Ok(())
    }
}
