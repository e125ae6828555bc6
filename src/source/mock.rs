//! Mock capture device for testing without hardware.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::source::{AudioBackend, InputStream};
use crate::{CaptureConfig, CaptureError, StreamSpec};

/// What a [`MockBackend`] produces on each read.
#[derive(Debug, Clone, PartialEq)]
pub enum MockSignal {
    /// All-zero buffers.
    Silence,
    /// A continuous sine wave, same value on every channel.
    Sine {
        /// Frequency in Hz.
        frequency: f64,
        /// Peak amplitude in [0.0, 1.0].
        amplitude: f32,
    },
    /// The given interleaved samples, then silence once they run out.
    Samples(Vec<f32>),
}

/// Open/close/read counters shared by a [`MockBackend`] and its streams.
#[derive(Debug, Clone, Default)]
pub struct MockStats {
    opens: Arc<AtomicUsize>,
    closes: Arc<AtomicUsize>,
    reads: Arc<AtomicU64>,
}

impl MockStats {
    /// Streams successfully opened.
    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Streams closed (device releases).
    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    /// Successful reads across all streams.
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }

    /// Returns `true` while a stream is open.
    pub fn is_open(&self) -> bool {
        self.opens() > self.closes()
    }
}

/// A scripted audio device that generates synthetic samples.
///
/// This allows testing the full capture and relay pipeline without audio
/// hardware, making it suitable for CI environments.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use relay_audio::source::{MockBackend, MockSignal};
///
/// let backend = MockBackend::new("test-mic")
///     .with_signal(MockSignal::Sine { frequency: 440.0, amplitude: 0.5 })
///     .with_read_delay(Duration::from_millis(5))
///     .failing_after(100);
/// let stats = backend.stats();
/// assert_eq!(stats.opens(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct MockBackend {
    name: String,
    signal: MockSignal,
    frames_per_buffer: Option<usize>,
    read_delay: Duration,
    close_delay: Duration,
    fail_open: Option<String>,
    fail_after: Option<u64>,
    stats: MockStats,
}

impl MockBackend {
    /// Creates a silent mock device.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signal: MockSignal::Silence,
            frames_per_buffer: None,
            read_delay: Duration::ZERO,
            close_delay: Duration::ZERO,
            fail_open: None,
            fail_after: None,
            stats: MockStats::default(),
        }
    }

    /// Sets the generated signal.
    #[must_use]
    pub fn with_signal(mut self, signal: MockSignal) -> Self {
        self.signal = signal;
        self
    }

    /// Negotiates a buffer size different from the one requested.
    #[must_use]
    pub fn with_frames_per_buffer(mut self, frames: usize) -> Self {
        self.frames_per_buffer = Some(frames);
        self
    }

    /// Makes every read block for `delay`, simulating a real-time device.
    #[must_use]
    pub fn with_read_delay(mut self, delay: Duration) -> Self {
        self.read_delay = delay;
        self
    }

    /// Makes closing the stream block for `delay`, like a driver tearing down.
    #[must_use]
    pub fn with_close_delay(mut self, delay: Duration) -> Self {
        self.close_delay = delay;
        self
    }

    /// Makes `open_input` fail with the given reason.
    #[must_use]
    pub fn failing_open(mut self, reason: impl Into<String>) -> Self {
        self.fail_open = Some(reason.into());
        self
    }

    /// Makes the read after `reads` successful reads fail.
    #[must_use]
    pub fn failing_after(mut self, reads: u64) -> Self {
        self.fail_after = Some(reads);
        self
    }

    /// Counters shared with every stream this backend opens.
    pub fn stats(&self) -> MockStats {
        self.stats.clone()
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn open_input(&self, config: &CaptureConfig) -> Result<Box<dyn InputStream>, CaptureError> {
        if let Some(reason) = &self.fail_open {
            return Err(CaptureError::device_init(
                &self.name,
                config.format,
                reason.clone(),
            ));
        }

        let spec = StreamSpec::new(
            config.format,
            self.frames_per_buffer.unwrap_or(config.frames_per_buffer),
        );

        let prefill = match &self.signal {
            MockSignal::Samples(samples) => {
                let ring_buffer = HeapRb::<f32>::new(samples.len().max(1));
                let (mut producer, consumer) = ring_buffer.split();
                producer.push_slice(samples);
                Some(consumer)
            }
            _ => None,
        };

        self.stats.opens.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(device = %self.name, ?spec, "mock input stream opened");

        Ok(Box::new(MockStream {
            spec,
            signal: self.signal.clone(),
            prefill,
            frames_generated: 0,
            reads_done: 0,
            read_delay: self.read_delay,
            close_delay: self.close_delay,
            fail_after: self.fail_after,
            stats: self.stats.clone(),
            closed: false,
        }))
    }
}

struct MockStream {
    spec: StreamSpec,
    signal: MockSignal,
    prefill: Option<ringbuf::HeapCons<f32>>,
    frames_generated: u64,
    reads_done: u64,
    read_delay: Duration,
    close_delay: Duration,
    fail_after: Option<u64>,
    stats: MockStats,
    closed: bool,
}

impl MockStream {
    fn fill(&mut self, buffer: &mut [f32]) {
        let channels = usize::from(self.spec.format.channels.max(1));
        match &self.signal {
            MockSignal::Silence => buffer.fill(0.0),
            MockSignal::Sine {
                frequency,
                amplitude,
            } => {
                let sample_rate = f64::from(self.spec.format.sample_rate.max(1));
                for (i, frame) in buffer.chunks_mut(channels).enumerate() {
                    let t = (self.frames_generated + i as u64) as f64 / sample_rate;
                    let value = (2.0 * std::f64::consts::PI * frequency * t).sin() as f32;
                    frame.fill(value * amplitude);
                }
            }
            MockSignal::Samples(_) => {
                let filled = match self.prefill.as_mut() {
                    Some(consumer) => consumer.pop_slice(buffer),
                    None => 0,
                };
                buffer[filled..].fill(0.0);
            }
        }
        self.frames_generated += (buffer.len() / channels) as u64;
    }
}

impl InputStream for MockStream {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn read(&mut self, buffer: &mut [f32]) -> Result<(), CaptureError> {
        if !self.read_delay.is_zero() {
            std::thread::sleep(self.read_delay);
        }

        if self.fail_after.is_some_and(|limit| self.reads_done >= limit) {
            return Err(CaptureError::read(format!(
                "mock device failed after {} reads",
                self.reads_done
            )));
        }

        self.fill(buffer);
        self.reads_done += 1;
        self.stats.reads.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            if !self.close_delay.is_zero() {
                std::thread::sleep(self.close_delay);
            }
            self.stats.closes.fetch_add(1, Ordering::SeqCst);
            tracing::debug!(reads = self.reads_done, "mock input stream closed");
        }
    }
}

impl Drop for MockStream {
    fn drop(&mut self) {
        self.close();
    }
}
