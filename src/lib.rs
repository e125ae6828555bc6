//! # relay-audio
//!
//! **Note:** This crate is under active development. The API may change before 1.0.
//!
//! Live audio capture streamed as sequenced PCM chunks over a
//! server-streaming relay.
//!
//! `relay-audio` captures fixed-size buffers from an input device, converts
//! them to little-endian 16-bit PCM and hands them to a consumer as an ordered
//! stream of [`AudioChunk`]s. The same stream can be recorded to a WAV file or
//! relayed to remote clients, which see it as a plain channel of chunks.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use relay_audio::{
//!     single_resource, AudioCapturer, AudioClient, AudioService, DeviceResource,
//!     LoopbackTransport,
//! };
//! use relay_audio::source::CpalBackend;
//!
//! let capturer = Arc::new(AudioCapturer::new(CpalBackend::default_device()));
//! let resource = DeviceResource::new("mic", capturer);
//! let service = Arc::new(AudioService::new(single_resource(Arc::new(resource))));
//!
//! let client = AudioClient::new("mic", Arc::new(LoopbackTransport::new(service)));
//! let mut chunks = client.record(5).await?;
//! while let Some(chunk) = chunks.recv().await {
//!     if let Some(error) = &chunk.error {
//!         eprintln!("stream failed: {error}");
//!         break;
//!     }
//!     // Send to a speech recognizer, a file, another peer...
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Source**: a blocking [`InputStream`](source::InputStream) read on a
//!   blocking-pool thread, so device I/O never stalls the async runtime
//! - **Capture**: a producer task per session converts buffers to chunks and
//!   delivers them over a bounded channel, with a one-slot error channel
//!   carrying the terminal failure
//! - **Relay**: [`AudioService`] streams a session to a client and stops it on
//!   every exit path; [`AudioClient`] turns the inbound stream back into a
//!   channel, ending a failed stream with exactly one error sentinel
//!
//! A device belongs to at most one session at a time. Stopping a session
//! releases the device exactly once, whichever side stops it first.

#![warn(missing_docs)]
// Audio code requires intentional numeric casts between sample formats
#![allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_possible_wrap,
    clippy::cast_lossless
)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]
#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

mod chunk;
mod config;
mod error;
pub mod format;
mod pipeline;
mod relay;
mod resource;
mod session;
mod sink;
pub mod source;

pub use chunk::{now_micros, AudioChunk};
pub use config::{AudioFormat, CaptureConfig, ClientConfig, Codec, StreamSpec};
pub use error::{CaptureError, PlaybackError, RecordError, RelayError, SinkError, TransportError};
pub use pipeline::{
    record, AudioCapturer, AudioCapturerBuilder, CaptureSession, ChunkStream, Delivery,
    RecordSummary,
};
pub use relay::{
    spawn_receiver, AudioClient, AudioInfo, AudioService, AudioTransport, ChunkReceiver,
    GetAudioRequest, LoopbackTransport, PlayRequest, PropertiesResponse, ServerStream, StreamEnd,
    StreamSummary, WireChunk,
};
pub use resource::{
    resource_lookup, resource_registry, single_resource, AudioProperties, AudioResource,
    DeviceResource, ResourceLookup,
};
pub use session::{SessionHandle, SessionState, SessionStats};
pub use sink::{FileSink, Sink};
