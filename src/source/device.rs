//! CPAL device wrapper for audio capture and playback.
//!
//! CPAL streams are not `Send`, so each input stream lives on its own thread.
//! The device callback pushes samples into a lock-free ring buffer and the
//! capture engine drains it from a blocking read.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, SizedSample, Stream, StreamConfig as CpalStreamConfig};
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::HeapRb;

use crate::format::i16_to_f32;
use crate::source::{AudioBackend, InputStream, PlaybackBackend};
use crate::{AudioFormat, CaptureConfig, CaptureError, PlaybackError, StreamSpec};

/// Shortest sleep between ring buffer polls.
const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Extra time a playback waits beyond the audio's own duration.
const PLAYBACK_GRACE: Duration = Duration::from_secs(2);

/// Device error reported by the stream's error callback.
type ErrorSlot = Arc<Mutex<Option<String>>>;

/// Which input device to open.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DeviceSelector {
    Default,
    Named(String),
}

impl DeviceSelector {
    fn label(&self) -> &str {
        match self {
            Self::Default => "default",
            Self::Named(name) => name,
        }
    }

    fn find_input(&self) -> Result<Device, String> {
        let host = cpal::default_host();
        match self {
            Self::Default => host
                .default_input_device()
                .ok_or_else(|| "no default input device".to_string()),
            Self::Named(name) => host
                .input_devices()
                .map_err(|e| e.to_string())?
                .find(|device| device.name().is_ok_and(|n| &n == name))
                .ok_or_else(|| format!("input device '{name}' not found")),
        }
    }
}

/// Capture backend for a host input device.
#[derive(Debug, Clone)]
pub struct CpalBackend {
    selector: DeviceSelector,
}

impl CpalBackend {
    /// The host's default input device.
    pub fn default_device() -> Self {
        Self {
            selector: DeviceSelector::Default,
        }
    }

    /// The input device with the given name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            selector: DeviceSelector::Named(name.into()),
        }
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> String {
        self.selector.label().to_string()
    }

    fn open_input(&self, config: &CaptureConfig) -> Result<Box<dyn InputStream>, CaptureError> {
        let format = config.format;
        let device_name = self.name();
        let init_error = |reason: String| CaptureError::device_init(&device_name, format, reason);

        let capacity = ring_capacity(&format, config.device_buffer_duration)
            .max(config.frames_per_buffer * usize::from(format.channels));
        let (producer, consumer) = HeapRb::<f32>::new(capacity).split();

        let error: ErrorSlot = Arc::new(Mutex::new(None));
        let dropped = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let selector = self.selector.clone();
        let thread_error = Arc::clone(&error);
        let thread_dropped = Arc::clone(&dropped);
        let thread = std::thread::Builder::new()
            .name("relay-audio-capture".to_string())
            .spawn(move || {
                let stream = match start_input_stream(
                    &selector,
                    &format,
                    producer,
                    thread_error,
                    thread_dropped,
                ) {
                    Ok(stream) => stream,
                    Err(reason) => {
                        let _ = ready_tx.send(Err(reason));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                // Keep the stream alive until close() or the handle is dropped.
                let _ = stop_rx.recv();
                drop(stream);
            })
            .map_err(|e| init_error(e.to_string()))?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => {
                let _ = thread.join();
                return Err(init_error(reason));
            }
            Err(_) => {
                let _ = thread.join();
                return Err(init_error("capture thread exited during setup".to_string()));
            }
        }

        tracing::info!(device = %device_name, %format, "Opened capture device");

        Ok(Box::new(CpalInput {
            spec: StreamSpec::new(format, config.frames_per_buffer),
            consumer,
            error,
            dropped,
            read_timeout: config.read_timeout,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
        }))
    }
}

fn ring_capacity(format: &AudioFormat, duration: Duration) -> usize {
    let samples = duration.as_secs_f64() * f64::from(format.sample_rate) * f64::from(format.channels);
    samples.ceil() as usize
}

fn start_input_stream(
    selector: &DeviceSelector,
    format: &AudioFormat,
    producer: ringbuf::HeapProd<f32>,
    error: ErrorSlot,
    dropped: Arc<AtomicU64>,
) -> Result<Stream, String> {
    let device = selector.find_input()?;
    let sample_format = device
        .default_input_config()
        .map_err(|e| e.to_string())?
        .sample_format();

    let config = CpalStreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(&device, &config, producer, |s| s, error, dropped),
        SampleFormat::I16 => build_input::<i16>(&device, &config, producer, i16_to_f32, error, dropped),
        other => return Err(format!("unsupported device sample format {other:?}")),
    }
    .map_err(|e| e.to_string())?;

    stream.play().map_err(|e| e.to_string())?;
    Ok(stream)
}

fn build_input<T: SizedSample>(
    device: &Device,
    config: &CpalStreamConfig,
    mut producer: ringbuf::HeapProd<f32>,
    convert: fn(T) -> f32,
    error: ErrorSlot,
    dropped: Arc<AtomicU64>,
) -> Result<Stream, cpal::BuildStreamError> {
    device.build_input_stream(
        config,
        move |data: &[T], _: &cpal::InputCallbackInfo| {
            for &sample in data {
                // Non-blocking push; a full buffer drops the newest samples.
                if producer.try_push(convert(sample)).is_err() {
                    dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
        },
        move |err| {
            tracing::error!("Audio stream error: {}", err);
            error.lock().get_or_insert_with(|| err.to_string());
        },
        None,
    )
}

/// A running CPAL input stream drained by blocking reads.
struct CpalInput {
    spec: StreamSpec,
    consumer: ringbuf::HeapCons<f32>,
    error: ErrorSlot,
    dropped: Arc<AtomicU64>,
    read_timeout: Duration,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl InputStream for CpalInput {
    fn spec(&self) -> StreamSpec {
        self.spec
    }

    fn read(&mut self, buffer: &mut [f32]) -> Result<(), CaptureError> {
        let poll = (self.spec.chunk_duration() / 4).max(MIN_POLL_INTERVAL);
        let deadline = Instant::now() + self.read_timeout;
        let mut filled = 0;

        loop {
            if let Some(reason) = self.error.lock().take() {
                return Err(CaptureError::read(reason));
            }
            filled += self.consumer.pop_slice(&mut buffer[filled..]);
            if filled == buffer.len() {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(CaptureError::read(format!(
                    "timed out after {:?} with {filled}/{} samples",
                    self.read_timeout,
                    buffer.len()
                )));
            }
            std::thread::sleep(poll);
        }
    }

    fn close(&mut self) {
        if let Some(stop) = self.stop_tx.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
            let dropped = self.dropped.load(Ordering::Relaxed);
            if dropped > 0 {
                tracing::warn!(dropped, "Capture ring buffer overflowed");
            }
            tracing::debug!("Capture device closed");
        }
    }
}

impl Drop for CpalInput {
    fn drop(&mut self) {
        self.close();
    }
}

/// Playback backend for the host's default output device.
#[derive(Debug, Clone, Default)]
pub struct CpalPlayback;

impl CpalPlayback {
    /// Creates a playback backend for the default output device.
    pub fn new() -> Self {
        Self
    }
}

impl PlaybackBackend for CpalPlayback {
    fn name(&self) -> String {
        "default".to_string()
    }

    fn play(&self, samples: &[f32], format: &AudioFormat) -> Result<(), PlaybackError> {
        let device = cpal::default_host()
            .default_output_device()
            .ok_or_else(|| PlaybackError::Device("no default output device".to_string()))?;

        let (mut producer, mut consumer) = HeapRb::<f32>::new(samples.len().max(1)).split();
        producer.push_slice(samples);

        let drained = Arc::new(AtomicBool::new(false));
        let callback_drained = Arc::clone(&drained);
        let config = CpalStreamConfig {
            channels: format.channels,
            sample_rate: cpal::SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let written = consumer.pop_slice(data);
                    data[written..].fill(0.0);
                    if written < data.len() {
                        callback_drained.store(true, Ordering::SeqCst);
                    }
                },
                |err| tracing::error!("Audio output error: {}", err),
                None,
            )
            .map_err(|e| PlaybackError::Device(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PlaybackError::Device(e.to_string()))?;

        let frames = samples.len() / usize::from(format.channels.max(1));
        let length = Duration::from_secs_f64(frames as f64 / f64::from(format.sample_rate.max(1)));
        let deadline = Instant::now() + length + PLAYBACK_GRACE;
        while !drained.load(Ordering::SeqCst) && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        tracing::debug!(frames, ?length, "Playback finished");
        Ok(())
    }
}

/// Names of all input devices on the default host.
///
/// # Errors
///
/// Returns [`CaptureError::DeviceInit`] if the host cannot enumerate devices.
pub fn list_input_devices() -> Result<Vec<String>, CaptureError> {
    let devices = cpal::default_host()
        .input_devices()
        .map_err(|e| CaptureError::device_init("*", AudioFormat::default(), e.to_string()))?;
    Ok(devices.filter_map(|device| device.name().ok()).collect())
}

/// Name of the default input device, if any.
pub fn default_input_device_name() -> Option<String> {
    cpal::default_host()
        .default_input_device()
        .and_then(|device| device.name().ok())
}
