//! Capture session lifecycle and control handle.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::source::InputStream;
use crate::{CaptureError, StreamSpec};

/// Lifecycle of a capture session.
///
/// ```text
/// Idle → Running → Draining → Closed
/// ```
///
/// `Draining` means the session is ending (stop requested, cancellation
/// fired, device read failed, or consumer gone) but the device is not yet
/// released. Every session passes through it on the way to `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Created but not yet producing.
    Idle = 0,
    /// Producing chunks.
    Running = 1,
    /// Stop requested; the producer is winding down.
    Draining = 2,
    /// The producer has exited and the device is released.
    Closed = 3,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Draining => "draining",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Statistics about a capture session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Chunks handed to the consumer.
    pub chunks_produced: u64,
    /// Interleaved samples captured.
    pub samples_captured: u64,
}

/// An open input stream plus the device lease it holds.
///
/// The stream is closed and the lease freed exactly once, by whichever of
/// [`release`](Self::release) or [`try_release`](Self::try_release) gets to it
/// first.
pub(crate) struct DeviceSlot {
    name: String,
    stream: Mutex<Option<Box<dyn InputStream>>>,
    lease: Arc<AtomicBool>,
}

impl DeviceSlot {
    pub(crate) fn new(name: String, stream: Box<dyn InputStream>, lease: Arc<AtomicBool>) -> Self {
        Self {
            name,
            stream: Mutex::new(Some(stream)),
            lease,
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Blocking read of one buffer.
    ///
    /// Returns `Ok(false)` if the device was already released.
    pub(crate) fn read(&self, buffer: &mut [f32]) -> Result<bool, CaptureError> {
        match self.stream.lock().as_mut() {
            Some(stream) => stream.read(buffer).map(|()| true),
            None => Ok(false),
        }
    }

    /// Closes the stream and frees the lease, waiting for an in-flight read.
    pub(crate) fn release(&self) -> bool {
        let stream = self.stream.lock().take();
        self.close(stream)
    }

    /// Like [`release`](Self::release), but gives up if a read is in flight.
    ///
    /// The producer releases the device itself once that read returns.
    pub(crate) fn try_release(&self) -> bool {
        let stream = self.stream.try_lock().and_then(|mut slot| slot.take());
        self.close(stream)
    }

    fn close(&self, stream: Option<Box<dyn InputStream>>) -> bool {
        let Some(mut stream) = stream else {
            return false;
        };
        stream.close();
        self.lease.store(false, Ordering::SeqCst);
        tracing::debug!(device = %self.name, "Capture device released");
        true
    }
}

/// State shared between a session's handles and its producer task.
pub(crate) struct SessionShared {
    pub running: AtomicBool,
    state: AtomicU8,
    pub chunks_produced: AtomicU64,
    pub samples_captured: AtomicU64,
    pub cancel: CancellationToken,
    pub device: DeviceSlot,
    pub spec: StreamSpec,
}

impl SessionShared {
    pub(crate) fn new(device: DeviceSlot, spec: StreamSpec, cancel: CancellationToken) -> Self {
        Self {
            running: AtomicBool::new(false),
            state: AtomicU8::new(SessionState::Idle as u8),
            chunks_produced: AtomicU64::new(0),
            samples_captured: AtomicU64::new(0),
            cancel,
            device,
            spec,
        }
    }

    pub(crate) fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn mark_running(&self) {
        self.running.store(true, Ordering::SeqCst);
        self.state
            .store(SessionState::Running as u8, Ordering::SeqCst);
    }

    pub(crate) fn mark_closed(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
    }

    /// Clears `running` and moves `Running` to `Draining`. Idempotent.
    pub(crate) fn begin_draining(&self) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.state.compare_exchange(
            SessionState::Running as u8,
            SessionState::Draining as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }
}

/// Control handle for a running capture session.
///
/// Handles are cheap to clone; every clone controls the same session. The
/// session keeps producing until [`stop()`](Self::stop) is called on any of
/// them, the parent cancellation token fires, the chunk consumer goes away,
/// or the device fails.
///
/// # Example
///
/// ```ignore
/// let session = capturer.start_capture(&CancellationToken::new())?;
/// let handle = session.handle().clone();
///
/// // From any task:
/// handle.stop();
/// handle.stop(); // no-op
///
/// // Or wait for the producer to exit and the device to close:
/// handle.shutdown().await;
/// ```
#[derive(Clone)]
pub struct SessionHandle {
    shared: Arc<SessionShared>,
    task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl SessionHandle {
    pub(crate) fn new(shared: Arc<SessionShared>) -> Self {
        Self {
            shared,
            task: Arc::new(Mutex::new(None)),
        }
    }

    pub(crate) fn attach(&self, task: JoinHandle<()>) {
        *self.task.lock() = Some(task);
    }

    /// Requests the session to stop.
    ///
    /// Safe to call any number of times from any task, including concurrently.
    /// Never blocks: if a device read is in flight, the producer releases the
    /// device when it returns.
    pub fn stop(&self) {
        if self.shared.running.swap(false, Ordering::SeqCst) {
            self.shared.begin_draining();
            tracing::info!(device = %self.shared.device.name(), "Stopping capture session");
        }
        self.shared.cancel.cancel();
        self.shared.device.try_release();
    }

    /// Stops the session and waits for its producer to exit.
    ///
    /// On return the device has been released and both of the session's
    /// channels are closed.
    pub async fn shutdown(&self) {
        self.stop();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }

    /// Returns `true` while the producer is running and no stop was requested.
    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.shared.state()
    }

    /// Current session statistics.
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            chunks_produced: self.shared.chunks_produced.load(Ordering::SeqCst),
            samples_captured: self.shared.samples_captured.load(Ordering::SeqCst),
        }
    }

    /// The format and buffer size negotiated with the device.
    pub fn spec(&self) -> StreamSpec {
        self.shared.spec
    }

    /// Name of the captured device.
    pub fn device_name(&self) -> &str {
        self.shared.device.name()
    }

    /// Token cancelled when this session is stopped.
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.cancel.clone()
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("device", &self.shared.device.name())
            .field("state", &self.state())
            .field("stats", &self.stats())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{AudioBackend, MockBackend};
    use crate::CaptureConfig;

    fn shared(backend: &MockBackend) -> (Arc<SessionShared>, Arc<AtomicBool>) {
        let stream = backend.open_input(&CaptureConfig::default()).unwrap();
        let spec = stream.spec();
        let lease = Arc::new(AtomicBool::new(true));
        let slot = DeviceSlot::new(backend.name(), stream, Arc::clone(&lease));
        let shared = SessionShared::new(slot, spec, CancellationToken::new());
        (Arc::new(shared), lease)
    }

    #[test]
    fn test_device_released_once() {
        let backend = MockBackend::new("mock");
        let (shared, lease) = shared(&backend);

        assert!(shared.device.release());
        assert!(!shared.device.release());
        assert!(!shared.device.try_release());

        assert_eq!(backend.stats().closes(), 1);
        assert!(!lease.load(Ordering::SeqCst));
    }

    #[test]
    fn test_read_after_release() {
        let backend = MockBackend::new("mock");
        let (shared, _lease) = shared(&backend);
        let mut buffer = vec![0.0; shared.spec.samples_per_buffer()];

        assert!(shared.device.read(&mut buffer).unwrap());
        shared.device.release();
        assert!(!shared.device.read(&mut buffer).unwrap());
    }

    #[test]
    fn test_stop_is_idempotent() {
        let backend = MockBackend::new("mock");
        let (shared, lease) = shared(&backend);
        shared.mark_running();
        let handle = SessionHandle::new(Arc::clone(&shared));
        let other = handle.clone();

        handle.stop();
        other.stop();
        handle.stop();

        assert!(!handle.is_running());
        assert_eq!(handle.state(), SessionState::Draining);
        assert!(shared.cancel.is_cancelled());
        assert_eq!(backend.stats().closes(), 1);
        assert!(!lease.load(Ordering::SeqCst));
    }

    #[test]
    fn test_state_transitions() {
        let backend = MockBackend::new("mock");
        let (shared, _lease) = shared(&backend);
        assert_eq!(shared.state(), SessionState::Idle);

        shared.mark_running();
        assert_eq!(shared.state(), SessionState::Running);

        shared.mark_closed();
        shared.begin_draining();
        assert_eq!(shared.state(), SessionState::Closed);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_stops_release_once() {
        let backend = MockBackend::new("mock");
        let (shared, lease) = shared(&backend);
        shared.mark_running();
        let handle = SessionHandle::new(Arc::clone(&shared));

        let stops: Vec<_> = (0..8)
            .map(|_| {
                let handle = handle.clone();
                tokio::spawn(async move { handle.stop() })
            })
            .collect();
        for stop in futures::future::join_all(stops).await {
            stop.unwrap();
        }
        shared.device.release();

        assert_eq!(backend.stats().closes(), 1);
        assert_eq!(handle.state(), SessionState::Draining);
        assert!(!lease.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_shutdown_without_task() {
        let backend = MockBackend::new("mock");
        let (shared, _lease) = shared(&backend);
        let handle = SessionHandle::new(shared);
        handle.shutdown().await;
        assert!(!backend.stats().is_open());
    }

    #[test]
    fn test_session_stats_default() {
        let stats = SessionStats::default();
        assert_eq!(stats.chunks_produced, 0);
        assert_eq!(stats.samples_captured, 0);
    }
}
