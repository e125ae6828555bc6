//! Records one capture session into local sinks.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::pipeline::{AudioCapturer, Delivery};
use crate::sink::Sink;
use crate::{AudioFormat, RecordError, SinkError};

/// Outcome of a [`record()`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordSummary {
    /// Chunks written to every sink.
    pub chunks: u64,
    /// Audio bytes written to each sink.
    pub bytes: u64,
    /// Format the sinks were started with.
    pub format: AudioFormat,
}

/// Captures audio into `sinks` for `duration`, then finalizes them.
///
/// The chunk count is derived from `duration` and the device's negotiated
/// rate and buffer size, the same way the streaming relay bounds a stream.
/// A zero duration records until `cancel` fires or the device fails.
///
/// Every sink sees the chunks in sequence order. `on_stop` is called on all
/// sinks on every exit path after a successful `on_start`, including capture
/// failures.
///
/// # Errors
///
/// - [`RecordError::Capture`] if the session cannot start or fails mid-recording
/// - [`RecordError::Sink`] if a sink fails; recording stops at that chunk
///
/// # Example
///
/// ```ignore
/// let sink: Arc<dyn Sink> = Arc::new(FileSink::wav("take.wav"));
/// let summary = record(&capturer, vec![sink], Duration::from_secs(5), &cancel).await?;
/// println!("wrote {} bytes", summary.bytes);
/// ```
pub async fn record(
    capturer: &AudioCapturer,
    sinks: Vec<Arc<dyn Sink>>,
    duration: Duration,
    cancel: &CancellationToken,
) -> Result<RecordSummary, RecordError> {
    let mut session = capturer.start_capture(cancel)?;
    let spec = session.spec();
    let limit = spec.chunks_for(duration);

    tracing::info!(
        device = %session.handle().device_name(),
        sinks = sinks.len(),
        ?duration,
        chunk_limit = limit,
        "Recording started"
    );

    if let Err(e) = each_sink(&sinks, |sink| sink.on_start(&spec.format)).await {
        session.handle().shutdown().await;
        return Err(e);
    }

    let mut summary = RecordSummary {
        chunks: 0,
        bytes: 0,
        format: spec.format,
    };

    let outcome = loop {
        if limit > 0 && summary.chunks >= limit {
            break Ok(());
        }
        match session.next(cancel).await {
            Delivery::Chunk(chunk) => {
                if let Err(e) = each_sink(&sinks, |sink| sink.write(&chunk)).await {
                    break Err(e);
                }
                summary.chunks += 1;
                summary.bytes += chunk.payload.len() as u64;
            }
            Delivery::Failed(error) => break Err(RecordError::Capture(error)),
            Delivery::End | Delivery::Cancelled => break Ok(()),
        }
    };

    session.handle().shutdown().await;
    let finalized = each_sink(&sinks, |sink| sink.on_stop()).await;

    match (&outcome, &finalized) {
        (Ok(()), Ok(())) => tracing::info!(
            chunks = summary.chunks,
            bytes = summary.bytes,
            "Recording finished"
        ),
        _ => tracing::warn!(chunks = summary.chunks, "Recording ended with errors"),
    }

    outcome?;
    finalized?;
    Ok(summary)
}

/// Runs `op` on every sink concurrently and reports the first failure.
async fn each_sink<'a, F, Fut>(sinks: &'a [Arc<dyn Sink>], op: F) -> Result<(), RecordError>
where
    F: Fn(&'a Arc<dyn Sink>) -> Fut,
    Fut: Future<Output = Result<(), SinkError>>,
{
    let results = futures::future::join_all(sinks.iter().map(op)).await;
    for (sink, result) in sinks.iter().zip(results) {
        result.map_err(|source| RecordError::Sink {
            sink_name: sink.name().to_string(),
            source,
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MockBackend;
    use crate::{AudioChunk, CaptureError, FileSink};
    use async_trait::async_trait;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectingSink {
        started: Mutex<Option<AudioFormat>>,
        sequences: Mutex<Vec<u64>>,
        stopped: Mutex<bool>,
        fail_at: Option<u64>,
    }

    #[async_trait]
    impl Sink for CollectingSink {
        fn name(&self) -> &str {
            "collecting"
        }

        async fn on_start(&self, format: &AudioFormat) -> Result<(), SinkError> {
            *self.started.lock() = Some(*format);
            Ok(())
        }

        async fn write(&self, chunk: &AudioChunk) -> Result<(), SinkError> {
            if self.fail_at == Some(chunk.sequence) {
                return Err(SinkError::write_failed("disk full"));
            }
            self.sequences.lock().push(chunk.sequence);
            Ok(())
        }

        async fn on_stop(&self) -> Result<(), SinkError> {
            *self.stopped.lock() = true;
            Ok(())
        }
    }

    fn capturer(backend: MockBackend) -> AudioCapturer {
        AudioCapturer::builder(backend)
            .format(AudioFormat::pcm16(8_000, 1))
            .frames_per_buffer(800)
            .build()
    }

    #[tokio::test]
    async fn test_record_stops_at_duration() {
        let capturer = capturer(MockBackend::new("mock"));
        let sink = Arc::new(CollectingSink::default());

        let summary = record(
            &capturer,
            vec![sink.clone() as Arc<dyn Sink>],
            Duration::from_millis(500),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(summary.chunks, 5);
        assert_eq!(summary.bytes, 5 * 1600);
        assert_eq!(*sink.sequences.lock(), vec![0, 1, 2, 3, 4]);
        assert_eq!(*sink.started.lock(), Some(AudioFormat::pcm16(8_000, 1)));
        assert!(*sink.stopped.lock());
        assert!(!capturer.is_busy());
    }

    #[tokio::test]
    async fn test_record_capture_failure_finalizes_sinks() {
        let capturer = capturer(MockBackend::new("mock").failing_after(2));
        let sink = Arc::new(CollectingSink::default());

        let err = record(
            &capturer,
            vec![sink.clone() as Arc<dyn Sink>],
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(
            err,
            RecordError::Capture(CaptureError::DeviceRead { .. })
        ));
        assert_eq!(*sink.sequences.lock(), vec![0, 1]);
        assert!(*sink.stopped.lock());
    }

    #[tokio::test]
    async fn test_record_sink_failure_names_sink() {
        let capturer = capturer(MockBackend::new("mock"));
        let sink = Arc::new(CollectingSink {
            fail_at: Some(1),
            ..Default::default()
        });

        let err = record(
            &capturer,
            vec![sink.clone() as Arc<dyn Sink>],
            Duration::from_secs(1),
            &CancellationToken::new(),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, RecordError::Sink { ref sink_name, .. } if sink_name == "collecting"));
        assert_eq!(*sink.sequences.lock(), vec![0]);
        assert!(!capturer.is_busy());
    }

    #[tokio::test]
    async fn test_record_to_wav_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("take.wav");
        let capturer = capturer(MockBackend::new("mock"));

        let summary = record(
            &capturer,
            vec![Arc::new(FileSink::wav(&path)) as Arc<dyn Sink>],
            Duration::from_millis(300),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let data = std::fs::read(&path).unwrap();
        assert_eq!(summary.chunks, 3);
        assert_eq!(data.len() as u64, 44 + summary.bytes);
    }

    #[tokio::test]
    async fn test_record_unbounded_until_cancel() {
        let capturer =
            capturer(MockBackend::new("mock").with_read_delay(Duration::from_millis(2)));
        let cancel = CancellationToken::new();
        let stopper = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            stopper.cancel();
        });

        let summary = record(&capturer, Vec::new(), Duration::ZERO, &cancel)
            .await
            .unwrap();
        assert!(summary.chunks > 0);
        assert!(!capturer.is_busy());
    }
}
