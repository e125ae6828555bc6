//! Server side of the relay: turns capture sessions into outbound streams.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::pipeline::Delivery;
use crate::relay::wire::{GetAudioRequest, PlayRequest, PropertiesResponse, WireChunk};
use crate::resource::{AudioResource, ResourceLookup};
use crate::session::SessionHandle;
use crate::{Codec, RelayError, TransportError};

/// Outbound half of a server-streaming call.
#[async_trait]
pub trait ServerStream: Send {
    /// Sends one chunk to the client.
    async fn send(&mut self, chunk: WireChunk) -> Result<(), TransportError>;

    /// Token that fires when the client hangs up.
    fn cancellation(&self) -> CancellationToken;
}

/// How a successful stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The requested duration was sent.
    DurationReached,
    /// The client disconnected.
    Disconnected,
    /// The capture session ended cleanly (e.g. it was stopped).
    CaptureEnded,
}

impl fmt::Display for StreamEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::DurationReached => "duration reached",
            Self::Disconnected => "client disconnected",
            Self::CaptureEnded => "capture ended",
        };
        f.write_str(reason)
    }
}

/// Outcome of a completed [`AudioService::get_audio`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    /// Chunks sent to the client.
    pub chunks_sent: u64,
    /// Chunks dropped because they predate the request's `previous_timestamp`.
    pub chunks_skipped: u64,
    /// Why the stream ended.
    pub end: StreamEnd,
}

/// Stops the capture session when the relay call exits, on every path.
struct StopGuard(SessionHandle);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// The relay's RPC surface, independent of any transport.
///
/// Resources are resolved per call through the injected lookup, so the service
/// itself holds no devices.
///
/// # Example
///
/// ```ignore
/// let service = AudioService::new(single_resource(Arc::new(resource)));
/// let summary = service.get_audio(GetAudioRequest::record("mic", 5), &mut stream).await?;
/// ```
pub struct AudioService {
    lookup: ResourceLookup,
}

impl AudioService {
    /// Creates a service resolving resources through `lookup`.
    pub fn new(lookup: ResourceLookup) -> Self {
        Self { lookup }
    }

    fn resolve(&self, name: &str) -> Result<Arc<dyn AudioResource>, RelayError> {
        (self.lookup)(name).ok_or_else(|| RelayError::ResourceNotFound {
            name: name.to_string(),
        })
    }

    /// Streams audio from the requested resource into `stream`.
    ///
    /// Returns `Ok` when the requested duration has been sent, the capture
    /// ends cleanly, or the client hangs up. The capture session is stopped
    /// on every exit path.
    ///
    /// # Errors
    ///
    /// - [`RelayError::InvalidRequest`] for an unsupported codec
    /// - [`RelayError::ResourceNotFound`] if the name does not resolve
    /// - [`RelayError::Capture`] if the capture fails to start or fails mid-stream
    /// - [`RelayError::Transport`] if a send fails
    pub async fn get_audio(
        &self,
        request: GetAudioRequest,
        stream: &mut dyn ServerStream,
    ) -> Result<StreamSummary, RelayError> {
        let codec = Codec::parse(&request.codec).ok_or_else(|| {
            RelayError::invalid_request(format!("unsupported codec '{}'", request.codec))
        })?;
        let resource = self.resolve(&request.name)?;
        let cancel = stream.cancellation();

        let session = resource.get_audio(codec, &cancel).await?;
        let (mut chunks, handle) = session.into_parts();
        let _stop = StopGuard(handle.clone());

        let spec = handle.spec();
        let limit = request
            .effective_duration()
            .map(|duration| spec.chunks_for(duration));

        tracing::info!(
            resource = %request.name,
            format = %spec.format,
            duration_seconds = request.duration_seconds,
            max_duration_seconds = request.max_duration_seconds,
            chunk_limit = ?limit,
            "Starting audio stream"
        );

        let mut chunks_sent = 0u64;
        let mut chunks_skipped = 0u64;

        let end = loop {
            if limit.is_some_and(|limit| chunks_sent >= limit) {
                break StreamEnd::DurationReached;
            }

            let chunk = match chunks.next(&cancel).await {
                Delivery::Chunk(chunk) => chunk,
                Delivery::Cancelled => break StreamEnd::Disconnected,
                Delivery::End => break StreamEnd::CaptureEnded,
                Delivery::Failed(error) => {
                    tracing::warn!(
                        resource = %request.name,
                        chunks_sent,
                        error = %error,
                        "Audio capture failed, aborting stream"
                    );
                    return Err(error.into());
                }
            };

            if request.previous_timestamp > 0 && chunk.timestamp_us <= request.previous_timestamp {
                chunks_skipped += 1;
                continue;
            }

            // A send that has started always runs to completion.
            if cancel.is_cancelled() {
                break StreamEnd::Disconnected;
            }
            if let Err(error) = stream.send(WireChunk::from(&chunk)).await {
                if cancel.is_cancelled() {
                    break StreamEnd::Disconnected;
                }
                tracing::warn!(
                    resource = %request.name,
                    chunks_sent,
                    error = %error,
                    "Failed to send audio chunk"
                );
                return Err(error.into());
            }
            chunks_sent += 1;
        };

        tracing::info!(
            resource = %request.name,
            chunks_sent,
            chunks_skipped,
            "Audio stream finished: {end}"
        );

        Ok(StreamSummary {
            chunks_sent,
            chunks_skipped,
            end,
        })
    }

    /// Plays a complete payload on the requested resource.
    ///
    /// # Errors
    ///
    /// [`RelayError::ResourceNotFound`], or [`RelayError::Playback`] carrying
    /// the requested codec and format.
    pub async fn play(&self, request: PlayRequest) -> Result<(), RelayError> {
        let resource = self.resolve(&request.name)?;
        let format = request.info.to_format()?;
        let result = resource.play(&request.audio_data, &format).await;
        if let Err(error) = &result {
            tracing::warn!(resource = %request.name, %format, error = %error, "Playback failed");
        }
        result
    }

    /// Reports the resource's capture format.
    pub async fn properties(&self, name: &str) -> Result<PropertiesResponse, RelayError> {
        let properties = self.resolve(name)?.properties().await?;
        Ok(properties.into())
    }

    /// Stops the resource's active capture session.
    pub async fn stop_record(&self, name: &str) -> Result<(), RelayError> {
        self.resolve(name)?.stop_record().await
    }

    /// Stops playback on the resource.
    pub async fn stop_play(&self, name: &str) -> Result<(), RelayError> {
        self.resolve(name)?.stop_play().await
    }
}
