//! WAV file sink implementation.

use crate::format::{riff_size, wav_header, WAV_DATA_SIZE_OFFSET, WAV_FILE_SIZE_OFFSET};
use crate::sink::Sink;
use crate::{AudioChunk, AudioFormat, SinkError};
use async_trait::async_trait;
use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

/// A sink that writes a canonical 16-bit PCM WAV file.
///
/// The file and its header are created in `on_start()`, using the session's
/// negotiated sample rate and channel count. `on_stop()` patches the RIFF and
/// data sizes. All file I/O runs on the blocking thread pool.
///
/// # Example
///
/// ```no_run
/// use relay_audio::FileSink;
///
/// let sink = FileSink::wav("recording.wav");
/// ```
pub struct FileSink {
    name: String,
    path: Arc<PathBuf>,
    state: Arc<Mutex<FileState>>,
}

#[derive(Default)]
struct FileState {
    writer: Option<BufWriter<File>>,
    bytes_written: u64,
}

impl FileSink {
    /// Creates a sink that writes WAV to `path`.
    pub fn wav(path: impl AsRef<Path>) -> Self {
        Self {
            name: format!("file:{}", path.as_ref().display()),
            path: Arc::new(path.as_ref().to_path_buf()),
            state: Arc::new(Mutex::new(FileState::default())),
        }
    }

    /// Path of the output file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Audio bytes written so far (excluding the header).
    pub async fn bytes_written(&self) -> u64 {
        self.state.lock().await.bytes_written
    }

    /// Flushes buffered data to disk without finalizing the header.
    pub async fn flush(&self) -> Result<(), SinkError> {
        self.blocking("flush", |state, path| {
            if let Some(writer) = state.writer.as_mut() {
                writer.flush().map_err(|e| SinkError::file_error(path, e))?;
            }
            Ok(())
        })
        .await
    }

    /// Runs `op` against the file state on the blocking pool.
    async fn blocking<F>(&self, what: &'static str, op: F) -> Result<(), SinkError>
    where
        F: FnOnce(&mut FileState, &Path) -> Result<(), SinkError> + Send + 'static,
    {
        let state = Arc::clone(&self.state);
        let path = Arc::clone(&self.path);

        tokio::task::spawn_blocking(move || {
            let mut state = state.blocking_lock();
            op(&mut *state, path.as_path())
        })
        .await
        .map_err(|e| SinkError::custom(format!("{what} task panicked: {e}")))?
    }

    fn create_blocking(
        state: &mut FileState,
        path: &Path,
        format: &AudioFormat,
    ) -> Result<(), SinkError> {
        let file = File::create(path).map_err(|e| SinkError::file_error(path, e))?;
        let mut writer = BufWriter::new(file);
        // Placeholder sizes, patched in on_stop.
        writer
            .write_all(&wav_header(format, 0))
            .map_err(|e| SinkError::file_error(path, e))?;

        state.writer = Some(writer);
        state.bytes_written = 0;
        Ok(())
    }

    fn finalize_blocking(state: &mut FileState, path: &Path) -> Result<(), SinkError> {
        let Some(mut writer) = state.writer.take() else {
            return Ok(());
        };

        let data_size = u32::try_from(state.bytes_written).unwrap_or(u32::MAX);
        let patch = |writer: &mut BufWriter<File>| -> std::io::Result<()> {
            writer.seek(SeekFrom::Start(WAV_FILE_SIZE_OFFSET))?;
            writer.write_all(&riff_size(data_size).to_le_bytes())?;
            writer.seek(SeekFrom::Start(WAV_DATA_SIZE_OFFSET))?;
            writer.write_all(&data_size.to_le_bytes())?;
            writer.seek(SeekFrom::End(0))?;
            writer.flush()
        };
        patch(&mut writer).map_err(|e| SinkError::file_error(path, e))
    }
}

#[async_trait]
impl Sink for FileSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn on_start(&self, format: &AudioFormat) -> Result<(), SinkError> {
        tracing::debug!(sink = %self.name, %format, "Creating WAV file");
        let format = *format;
        self.blocking("create", move |state, path| {
            Self::create_blocking(state, path, &format)
        })
        .await
    }

    async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
        tracing::trace!(
            sink = %self.name,
            sequence = chunk.sequence,
            bytes = chunk.payload.len(),
            "Writing chunk"
        );

        let payload = Arc::clone(&chunk.payload);
        self.blocking("write", move |state, path| {
            let writer = state.writer.as_mut().ok_or(SinkError::NotInitialized)?;
            writer
                .write_all(&payload)
                .map_err(|e| SinkError::file_error(path, e))?;
            state.bytes_written += payload.len() as u64;
            Ok(())
        })
        .await
    }

    async fn on_stop(&self) -> Result<(), SinkError> {
        self.blocking("finalize", Self::finalize_blocking).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::WAV_HEADER_SIZE;
    use tempfile::tempdir;

    fn u32_at(data: &[u8], offset: usize) -> u32 {
        u32::from_le_bytes([data[offset], data[offset + 1], data[offset + 2], data[offset + 3]])
    }

    #[tokio::test]
    async fn test_file_sink_writes_payload_after_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");

        let sink = FileSink::wav(&path);
        sink.on_start(&AudioFormat::pcm16(16_000, 1)).await.unwrap();
        sink.write(&AudioChunk::new(0, 0, vec![0x34, 0x12, 0x78, 0x56]))
            .await
            .unwrap();
        sink.on_stop().await.unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(&data[0..4], b"RIFF");
        assert_eq!(&data[8..12], b"WAVE");
        assert_eq!(&data[WAV_HEADER_SIZE..], &[0x34, 0x12, 0x78, 0x56]);
    }

    #[tokio::test]
    async fn test_file_sink_patches_sizes() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");

        let sink = FileSink::wav(&path);
        sink.on_start(&AudioFormat::pcm16(44_100, 2)).await.unwrap();
        for sequence in 0..3 {
            sink.write(&AudioChunk::new(sequence, 0, vec![0u8; 4]))
                .await
                .unwrap();
        }
        assert_eq!(sink.bytes_written().await, 12);
        sink.on_stop().await.unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), WAV_HEADER_SIZE + 12);
        assert_eq!(u32_at(&data, 40), 12);
        assert_eq!(u32_at(&data, 4), 36 + 12);
        assert_eq!(u32_at(&data, 24), 44_100);
        assert_eq!(u16::from_le_bytes([data[22], data[23]]), 2);
    }

    #[tokio::test]
    async fn test_file_sink_empty_recording() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("empty.wav");

        let sink = FileSink::wav(&path);
        sink.on_start(&AudioFormat::default()).await.unwrap();
        sink.on_stop().await.unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(data.len(), WAV_HEADER_SIZE);
        assert_eq!(u32_at(&data, 40), 0);
    }

    #[tokio::test]
    async fn test_file_sink_write_before_start() {
        let dir = tempdir().unwrap();
        let sink = FileSink::wav(dir.path().join("never.wav"));

        let err = sink
            .write(&AudioChunk::new(0, 0, vec![0u8; 2]))
            .await
            .unwrap_err();
        assert!(matches!(err, SinkError::NotInitialized));
    }

    #[tokio::test]
    async fn test_file_sink_invalid_path_error() {
        let sink = FileSink::wav("/nonexistent/directory/test.wav");
        let err = sink.on_start(&AudioFormat::default()).await.unwrap_err();
        assert!(err.to_string().contains("nonexistent"));
    }

    #[tokio::test]
    async fn test_file_sink_flush() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.wav");

        let sink = FileSink::wav(&path);
        sink.flush().await.unwrap();

        sink.on_start(&AudioFormat::default()).await.unwrap();
        sink.write(&AudioChunk::new(0, 0, vec![1, 0])).await.unwrap();
        sink.flush().await.unwrap();
        assert_eq!(
            std::fs::metadata(&path).unwrap().len(),
            WAV_HEADER_SIZE as u64 + 2
        );
        sink.on_stop().await.unwrap();
    }

    #[test]
    fn test_file_sink_name() {
        let sink = FileSink::wav("/path/to/audio.wav");
        assert_eq!(sink.name(), "file:/path/to/audio.wav");
    }
}
