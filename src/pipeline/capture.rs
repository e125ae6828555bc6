//! Capture engine: opens the device and runs the producer loop.
//!
//! The producer task reads one buffer at a time from the device (on the
//! blocking pool), converts it to 16-bit PCM, stamps it, and sends it on a
//! bounded channel:
//!
//! ```text
//! Device ──read──→ f32 buffer ──convert──→ AudioChunk ──send──→ chunk channel
//!                      │                                           │
//!                      └── read error ──→ error channel (once) ────┘
//! ```
//!
//! Every send races the session's cancellation token and cancellation wins, so
//! a consumer that stops draining can never keep the producer (and the device)
//! alive.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::chunk::now_micros;
use crate::format::f32_to_pcm16le;
use crate::pipeline::{CaptureSession, ChunkStream};
use crate::session::{DeviceSlot, SessionHandle, SessionShared};
use crate::source::AudioBackend;
use crate::{AudioChunk, AudioFormat, CaptureConfig, CaptureError};

/// How often the producer logs progress, in chunks.
const PROGRESS_LOG_INTERVAL: u64 = 50;

/// Why the producer loop ended.
#[derive(Debug)]
enum ExitReason {
    /// `stop()` was called or the cancellation token fired.
    Stopped,
    /// The consumer dropped the chunk receiver.
    ConsumerGone,
    /// A device read failed.
    Failed(CaptureError),
}

/// Captures audio from one device, one session at a time.
///
/// The capturer owns the device lease: while a session holds the device,
/// further calls to [`start_capture()`](Self::start_capture) fail with
/// [`CaptureError::DeviceBusy`].
///
/// # Example
///
/// ```ignore
/// use relay_audio::{AudioCapturer, Delivery};
/// use relay_audio::source::MockBackend;
/// use tokio_util::sync::CancellationToken;
///
/// let capturer = AudioCapturer::new(MockBackend::new("mic"));
/// let cancel = CancellationToken::new();
/// let mut session = capturer.start_capture(&cancel)?;
///
/// while let Delivery::Chunk(chunk) = session.next(&cancel).await {
///     println!("chunk #{} ({} bytes)", chunk.sequence, chunk.payload.len());
/// #   break;
/// }
/// session.handle().shutdown().await;
/// ```
pub struct AudioCapturer {
    backend: Arc<dyn AudioBackend>,
    config: CaptureConfig,
    lease: Arc<AtomicBool>,
    active: Mutex<Option<SessionHandle>>,
}

impl AudioCapturer {
    /// Creates a capturer with the default configuration.
    pub fn new(backend: impl AudioBackend + 'static) -> Self {
        Self::from_backend(Arc::new(backend), CaptureConfig::default())
    }

    /// Creates a capturer from a shared backend and configuration.
    pub fn from_backend(backend: Arc<dyn AudioBackend>, config: CaptureConfig) -> Self {
        Self {
            backend,
            config,
            lease: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    /// Returns a builder for customizing the capture configuration.
    pub fn builder(backend: impl AudioBackend + 'static) -> AudioCapturerBuilder {
        AudioCapturerBuilder {
            backend: Arc::new(backend),
            config: CaptureConfig::default(),
        }
    }

    /// The configuration used for new sessions.
    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Name of the underlying device.
    pub fn device_name(&self) -> String {
        self.backend.name()
    }

    /// Returns `true` while a session holds the device.
    pub fn is_busy(&self) -> bool {
        self.lease.load(Ordering::SeqCst)
    }

    /// Opens the device and starts a capture session.
    ///
    /// The session's cancellation token is a child of `cancel`: cancelling
    /// `cancel` stops the session, while stopping the session leaves `cancel`
    /// untouched.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`CaptureError::DeviceBusy`] if another session holds the device
    /// - [`CaptureError::DeviceInit`] if the device cannot be opened or started;
    ///   nothing is left acquired in that case
    pub fn start_capture(&self, cancel: &CancellationToken) -> Result<CaptureSession, CaptureError> {
        let device = self.backend.name();

        if self
            .lease
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            tracing::warn!(device = %device, "Rejected capture start: device busy");
            return Err(CaptureError::DeviceBusy { device });
        }

        let mut stream = match self.backend.open_input(&self.config) {
            Ok(stream) => stream,
            Err(e) => {
                self.lease.store(false, Ordering::SeqCst);
                tracing::warn!(device = %device, error = %e, "Failed to open capture device");
                return Err(e);
            }
        };

        let spec = stream.spec();
        if spec.samples_per_buffer() == 0 {
            stream.close();
            self.lease.store(false, Ordering::SeqCst);
            return Err(CaptureError::device_init(
                &device,
                spec.format,
                "device negotiated an empty buffer",
            ));
        }

        let slot = DeviceSlot::new(device.clone(), stream, Arc::clone(&self.lease));
        let shared = Arc::new(SessionShared::new(slot, spec, cancel.child_token()));
        let handle = SessionHandle::new(Arc::clone(&shared));

        let (chunk_tx, chunk_rx) = mpsc::channel(self.config.chunk_channel_capacity.max(1));
        let (error_tx, error_rx) = oneshot::channel();

        shared.mark_running();
        handle.attach(tokio::spawn(run_producer(shared, chunk_tx, error_tx)));
        *self.active.lock() = Some(handle.clone());

        tracing::info!(
            device = %device,
            format = %spec.format,
            frames_per_buffer = spec.frames_per_buffer,
            "Capture session started"
        );

        Ok(CaptureSession::new(ChunkStream::new(chunk_rx, error_rx), handle))
    }

    /// The most recently started session, if it has not closed yet.
    pub fn active_session(&self) -> Option<SessionHandle> {
        let mut active = self.active.lock();
        if active
            .as_ref()
            .is_some_and(|handle| handle.state() == crate::SessionState::Closed)
        {
            *active = None;
        }
        active.clone()
    }

    /// Stops the active session, if any. Returns `true` if one was running.
    pub fn stop_active(&self) -> bool {
        match self.active_session() {
            Some(handle) => {
                handle.stop();
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for AudioCapturer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioCapturer")
            .field("device", &self.backend.name())
            .field("config", &self.config)
            .field("busy", &self.is_busy())
            .finish()
    }
}

/// Builder for [`AudioCapturer`].
///
/// ```
/// use std::time::Duration;
/// use relay_audio::{AudioCapturer, AudioFormat};
/// use relay_audio::source::MockBackend;
///
/// let capturer = AudioCapturer::builder(MockBackend::new("mic"))
///     .format(AudioFormat::pcm16(16_000, 1))
///     .frames_per_buffer(320)
///     .channel_capacity(4)
///     .read_timeout(Duration::from_millis(500))
///     .build();
/// assert_eq!(capturer.config().frames_per_buffer, 320);
/// ```
#[must_use]
pub struct AudioCapturerBuilder {
    backend: Arc<dyn AudioBackend>,
    config: CaptureConfig,
}

impl AudioCapturerBuilder {
    /// Sets the requested capture format.
    pub fn format(mut self, format: AudioFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Sets the frames per device read (one chunk per read).
    pub fn frames_per_buffer(mut self, frames: usize) -> Self {
        self.config.frames_per_buffer = frames;
        self
    }

    /// Sets the chunk channel capacity.
    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.chunk_channel_capacity = capacity;
        self
    }

    /// Sets how long a device read may wait for samples.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: CaptureConfig) -> Self {
        self.config = config;
        self
    }

    /// Builds the capturer.
    pub fn build(self) -> AudioCapturer {
        AudioCapturer::from_backend(self.backend, self.config)
    }
}

/// The producer loop. Owns both channel senders.
async fn run_producer(
    shared: Arc<SessionShared>,
    chunk_tx: mpsc::Sender<AudioChunk>,
    error_tx: oneshot::Sender<CaptureError>,
) {
    let spec = shared.spec;
    let mut buffer = vec![0.0f32; spec.samples_per_buffer()];
    let mut sequence: u64 = 0;

    let exit = loop {
        if shared.cancel.is_cancelled() || !shared.running.load(Ordering::SeqCst) {
            break ExitReason::Stopped;
        }

        let reader = Arc::clone(&shared);
        let mut pending = tokio::task::spawn_blocking(move || {
            let result = reader.device.read(&mut buffer);
            (buffer, result)
        });

        // The read cannot be interrupted, but the session starts draining as
        // soon as cancellation fires.
        let read = tokio::select! {
            biased;
            read = &mut pending => read,
            () = shared.cancel.cancelled() => {
                shared.begin_draining();
                pending.await
            }
        };

        let result = match read {
            Ok((returned, result)) => {
                buffer = returned;
                result
            }
            Err(e) => break ExitReason::Failed(CaptureError::read(format!("read task failed: {e}"))),
        };

        match result {
            Ok(true) => {}
            Ok(false) => break ExitReason::Stopped,
            Err(e) => break ExitReason::Failed(e),
        }

        // A stop that landed during the read discards that buffer.
        if shared.cancel.is_cancelled() {
            break ExitReason::Stopped;
        }

        let chunk = AudioChunk::new(sequence, now_micros(), f32_to_pcm16le(&buffer));

        tokio::select! {
            biased;
            () = shared.cancel.cancelled() => break ExitReason::Stopped,
            sent = chunk_tx.send(chunk) => {
                if sent.is_err() {
                    break ExitReason::ConsumerGone;
                }
            }
        }

        sequence += 1;
        shared.chunks_produced.fetch_add(1, Ordering::SeqCst);
        shared
            .samples_captured
            .fetch_add(buffer.len() as u64, Ordering::SeqCst);

        if sequence % PROGRESS_LOG_INTERVAL == 0 {
            tracing::trace!(device = %shared.device.name(), chunks = sequence, "Capture progress");
        }
    };

    shared.begin_draining();
    let releaser = Arc::clone(&shared);
    if tokio::task::spawn_blocking(move || releaser.device.release())
        .await
        .is_err()
    {
        shared.device.release();
    }
    shared.mark_closed();

    match exit {
        ExitReason::Failed(error) => {
            tracing::warn!(
                device = %shared.device.name(),
                chunks = sequence,
                error = %error,
                "Capture session failed"
            );
            let _ = error_tx.send(error);
        }
        ExitReason::Stopped => {
            tracing::info!(device = %shared.device.name(), chunks = sequence, "Capture session stopped");
        }
        ExitReason::ConsumerGone => {
            tracing::debug!(
                device = %shared.device.name(),
                chunks = sequence,
                "Chunk consumer went away; ending capture session"
            );
        }
    }

    drop(chunk_tx);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Delivery;
    use crate::source::MockBackend;
    use crate::SessionState;

    fn capturer(backend: MockBackend) -> AudioCapturer {
        AudioCapturer::builder(backend)
            .format(AudioFormat::pcm16(8_000, 1))
            .frames_per_buffer(80)
            .build()
    }

    #[tokio::test]
    async fn test_sequences_are_contiguous() {
        let capturer = capturer(MockBackend::new("mock").failing_after(5));
        let cancel = CancellationToken::new();
        let mut session = capturer.start_capture(&cancel).unwrap();

        let mut sequences = Vec::new();
        loop {
            match session.next(&cancel).await {
                Delivery::Chunk(chunk) => {
                    assert_eq!(chunk.payload.len(), 160);
                    sequences.push(chunk.sequence);
                }
                Delivery::Failed(_) => break,
                other => panic!("unexpected delivery: {other:?}"),
            }
        }
        assert_eq!(sequences, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_busy_device_rejected() {
        let capturer = capturer(MockBackend::new("mock").with_read_delay(Duration::from_millis(5)));
        let cancel = CancellationToken::new();
        let session = capturer.start_capture(&cancel).unwrap();

        let err = capturer.start_capture(&cancel).err().unwrap();
        assert_eq!(
            err,
            CaptureError::DeviceBusy {
                device: "mock".to_string()
            }
        );

        session.handle().shutdown().await;
        assert!(!capturer.is_busy());
        assert!(capturer.start_capture(&cancel).is_ok());
    }

    #[tokio::test]
    async fn test_open_failure_frees_lease() {
        let backend = MockBackend::new("mock").failing_open("no such device");
        let stats = backend.stats();
        let capturer = capturer(backend);

        let err = capturer
            .start_capture(&CancellationToken::new())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::DeviceInit { .. }));
        assert!(err.to_string().contains("pcm16 8000Hz/1ch"));
        assert!(!capturer.is_busy());
        assert_eq!(stats.opens(), 0);
    }

    #[tokio::test]
    async fn test_parent_cancel_stops_session() {
        let backend = MockBackend::new("mock").with_read_delay(Duration::from_millis(2));
        let stats = backend.stats();
        let capturer = capturer(backend);
        let parent = CancellationToken::new();
        let session = capturer.start_capture(&parent).unwrap();
        let handle = session.handle().clone();

        parent.cancel();
        handle.shutdown().await;

        assert_eq!(handle.state(), SessionState::Closed);
        assert_eq!(stats.closes(), 1);
        assert!(capturer.active_session().is_none());
    }

    #[tokio::test]
    async fn test_parent_cancel_drains_during_read() {
        let capturer = capturer(MockBackend::new("mock").with_read_delay(Duration::from_millis(200)));
        let parent = CancellationToken::new();
        let session = capturer.start_capture(&parent).unwrap();
        let handle = session.handle().clone();

        // Let the first read start, then cancel while it is in flight.
        tokio::time::sleep(Duration::from_millis(20)).await;
        parent.cancel();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(!handle.is_running());
        assert_eq!(handle.state(), SessionState::Draining);

        handle.shutdown().await;
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_read_failure_drains_before_close() {
        let backend = MockBackend::new("mock")
            .failing_after(0)
            .with_close_delay(Duration::from_millis(200));
        let capturer = capturer(backend);
        let cancel = CancellationToken::new();
        let mut session = capturer.start_capture(&cancel).unwrap();
        let handle = session.handle().clone();

        let state = tokio::time::timeout(Duration::from_secs(1), async {
            loop {
                let state = handle.state();
                if state != SessionState::Running {
                    break state;
                }
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        assert_eq!(state, SessionState::Draining);
        assert!(!handle.is_running());

        assert!(matches!(session.next(&cancel).await, Delivery::Failed(_)));
        assert_eq!(handle.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn test_stop_before_first_chunk() {
        let backend = MockBackend::new("mock").with_read_delay(Duration::from_millis(50));
        let stats = backend.stats();
        let capturer = capturer(backend);
        let cancel = CancellationToken::new();
        let mut session = capturer.start_capture(&cancel).unwrap();

        session.stop();

        assert_eq!(session.next(&cancel).await, Delivery::End);
        let handle = session.handle();
        handle.shutdown().await;
        assert_eq!(handle.stats().chunks_produced, 0);
        assert_eq!(handle.state(), SessionState::Closed);
        assert_eq!(stats.closes(), 1);
        assert!(!capturer.is_busy());
    }

    #[tokio::test]
    async fn test_cancel_with_full_undrained_channel() {
        let backend = MockBackend::new("mock");
        let stats = backend.stats();
        let capturer = AudioCapturer::builder(backend)
            .format(AudioFormat::pcm16(8_000, 1))
            .frames_per_buffer(80)
            .channel_capacity(2)
            .build();
        let parent = CancellationToken::new();
        let session = capturer.start_capture(&parent).unwrap();
        let handle = session.handle().clone();

        // Nothing drains: the producer fills the channel and parks on send.
        tokio::time::timeout(Duration::from_secs(1), async {
            while handle.stats().chunks_produced < 2 {
                tokio::time::sleep(Duration::from_millis(1)).await;
            }
        })
        .await
        .unwrap();

        parent.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle.shutdown())
            .await
            .unwrap();

        assert_eq!(handle.state(), SessionState::Closed);
        assert_eq!(stats.closes(), 1);
        assert!(!capturer.is_busy());
        drop(session);
    }

    #[tokio::test]
    async fn test_stop_active() {
        let capturer = capturer(MockBackend::new("mock").with_read_delay(Duration::from_millis(2)));
        assert!(!capturer.stop_active());

        let session = capturer.start_capture(&CancellationToken::new()).unwrap();
        assert!(capturer.stop_active());
        session.handle().shutdown().await;
        assert!(!capturer.is_busy());
    }

    #[tokio::test]
    async fn test_dropping_consumer_ends_session() {
        let backend = MockBackend::new("mock");
        let stats = backend.stats();
        let capturer = capturer(backend);
        let session = capturer.start_capture(&CancellationToken::new()).unwrap();
        let (stream, handle) = session.into_parts();

        drop(stream);
        handle.shutdown().await;
        assert_eq!(handle.state(), SessionState::Closed);
        assert!(!stats.is_open());
    }

    #[tokio::test]
    async fn test_stats_track_chunks() {
        let capturer = capturer(MockBackend::new("mock").failing_after(3));
        let cancel = CancellationToken::new();
        let mut session = capturer.start_capture(&cancel).unwrap();
        while let Delivery::Chunk(_) = session.next(&cancel).await {}

        let stats = session.handle().stats();
        assert_eq!(stats.chunks_produced, 3);
        assert_eq!(stats.samples_captured, 240);
    }
}
