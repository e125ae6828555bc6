//! Client side of the relay: turns an inbound stream into a chunk channel.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::relay::wire::{AudioInfo, GetAudioRequest, PlayRequest, PropertiesResponse, WireChunk};
use crate::{AudioChunk, AudioFormat, ClientConfig, Codec, RelayError, TransportError};

/// Inbound half of a server-streaming call.
#[async_trait]
pub trait ChunkReceiver: Send {
    /// Receives the next chunk. `Ok(None)` is a clean end of stream.
    async fn recv(&mut self) -> Result<Option<WireChunk>, TransportError>;
}

/// A connection to a relay server.
#[async_trait]
pub trait AudioTransport: Send + Sync {
    /// Opens a server-streaming audio call.
    async fn get_audio(
        &self,
        request: GetAudioRequest,
    ) -> Result<Box<dyn ChunkReceiver>, TransportError>;

    /// Sends a complete payload for playback.
    async fn play(&self, request: PlayRequest) -> Result<(), TransportError>;

    /// Fetches the resource's capture format.
    async fn properties(&self, name: &str) -> Result<PropertiesResponse, TransportError>;

    /// Stops the resource's active capture.
    async fn stop_record(&self, name: &str) -> Result<(), TransportError>;

    /// Stops playback on the resource.
    async fn stop_play(&self, name: &str) -> Result<(), TransportError>;
}

/// Spawns the receiver task for one inbound stream.
///
/// The returned channel yields the stream's chunks in order and then closes.
/// If the stream ends with anything other than a clean end-of-stream, exactly
/// one sentinel chunk carrying the error is delivered before the close.
///
/// The task also exits, without a sentinel, when `cancel` fires or the
/// application drops the returned receiver, so a full channel can never park
/// it forever.
pub fn spawn_receiver(
    mut receiver: Box<dyn ChunkReceiver>,
    capacity: usize,
    cancel: CancellationToken,
) -> (mpsc::Receiver<AudioChunk>, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(capacity.max(1));

    let task = tokio::spawn(async move {
        let mut received = 0u64;
        loop {
            let next = tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    tracing::debug!(received, "Audio stream cancelled");
                    return;
                }
                () = tx.closed() => {
                    tracing::debug!(received, "Audio consumer dropped, closing stream");
                    return;
                }
                next = receiver.recv() => next,
            };

            let chunk = match next {
                Ok(Some(wire)) => AudioChunk::from(wire),
                Ok(None) => {
                    tracing::debug!(received, "Audio stream ended");
                    return;
                }
                Err(error) => {
                    tracing::warn!(received, error = %error, "Audio stream failed");
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => {}
                        _ = tx.send(AudioChunk::sentinel(error)) => {}
                    }
                    return;
                }
            };

            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                sent = tx.send(chunk) => {
                    if sent.is_err() {
                        return;
                    }
                }
            }
            received += 1;
        }
    });

    (rx, task)
}

/// Client for one named audio resource behind a relay.
///
/// # Example
///
/// ```ignore
/// let client = AudioClient::new("mic", transport);
/// let mut chunks = client.record(5).await?;
/// while let Some(chunk) = chunks.recv().await {
///     if let Some(error) = chunk.error {
///         eprintln!("stream failed: {error}");
///         break;
///     }
///     handle(chunk.payload);
/// }
/// ```
pub struct AudioClient {
    name: String,
    transport: Arc<dyn AudioTransport>,
    config: ClientConfig,
    cancel: CancellationToken,
}

impl AudioClient {
    /// Creates a client for the resource `name`.
    pub fn new(name: impl Into<String>, transport: Arc<dyn AudioTransport>) -> Self {
        Self {
            name: name.into(),
            transport,
            config: ClientConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Sets the client configuration.
    #[must_use]
    pub fn with_config(mut self, config: ClientConfig) -> Self {
        self.config = config;
        self
    }

    /// Name of the remote resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opens an audio stream.
    ///
    /// See [`GetAudioRequest`] for the meaning of the arguments. The returned
    /// channel follows the [`spawn_receiver`] contract.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the call cannot be opened.
    pub async fn get_audio(
        &self,
        codec: Codec,
        duration_seconds: i32,
        max_duration_seconds: i32,
        previous_timestamp: i64,
    ) -> Result<mpsc::Receiver<AudioChunk>, RelayError> {
        let request = GetAudioRequest {
            name: self.name.clone(),
            codec: codec.as_str().to_string(),
            duration_seconds,
            max_duration_seconds,
            previous_timestamp,
        };
        self.open(request).await
    }

    /// Opens a PCM stream of `duration_seconds` (zero or negative: unbounded).
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`] if the call cannot be opened.
    pub async fn record(
        &self,
        duration_seconds: i32,
    ) -> Result<mpsc::Receiver<AudioChunk>, RelayError> {
        self.open(GetAudioRequest::record(self.name.clone(), duration_seconds))
            .await
    }

    async fn open(
        &self,
        request: GetAudioRequest,
    ) -> Result<mpsc::Receiver<AudioChunk>, RelayError> {
        tracing::debug!(
            resource = %self.name,
            duration_seconds = request.duration_seconds,
            "Opening audio stream"
        );
        let receiver = self.transport.get_audio(request).await?;
        let (chunks, _task) =
            spawn_receiver(receiver, self.config.channel_capacity, self.cancel.child_token());
        Ok(chunks)
    }

    /// Plays `audio` on the remote resource.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::Transport`]; a rejection by the server arrives as
    /// [`TransportError::Status`] with the server's message.
    pub async fn play(&self, audio: Vec<u8>, format: &AudioFormat) -> Result<(), RelayError> {
        let request = PlayRequest {
            name: self.name.clone(),
            audio_data: audio,
            info: AudioInfo::from(format),
        };
        Ok(self.transport.play(request).await?)
    }

    /// Fetches the remote capture format.
    pub async fn properties(&self) -> Result<PropertiesResponse, RelayError> {
        Ok(self.transport.properties(&self.name).await?)
    }

    /// Stops the remote resource's active capture.
    pub async fn stop_record(&self) -> Result<(), RelayError> {
        Ok(self.transport.stop_record(&self.name).await?)
    }

    /// Stops playback on the remote resource.
    pub async fn stop_play(&self) -> Result<(), RelayError> {
        Ok(self.transport.stop_play(&self.name).await?)
    }

    /// Stops every stream opened by this client. Their channels close without
    /// a sentinel.
    ///
    /// Dropping the client does not stop its streams; each one runs until it
    /// ends, its receiver is dropped, or `close` is called.
    pub fn close(&self) {
        self.cancel.cancel();
    }
}
