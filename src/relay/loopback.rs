//! In-process transport connecting an [`AudioClient`](super::AudioClient)
//! directly to an [`AudioService`].

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::relay::client::{AudioTransport, ChunkReceiver};
use crate::relay::server::{AudioService, ServerStream, StreamSummary};
use crate::relay::wire::{GetAudioRequest, PlayRequest, PropertiesResponse, WireChunk};
use crate::{RelayError, TransportError};

const DEFAULT_BUFFER: usize = 16;

/// Runs each call against a local [`AudioService`].
///
/// Streaming calls run the service on a spawned task and carry chunks over a
/// bounded channel. A service error surfaces as [`TransportError::Status`]
/// after the chunks sent before it, the way a remote call's trailing status
/// would. Dropping the receiver counts as the client hanging up.
#[derive(Clone)]
pub struct LoopbackTransport {
    service: Arc<AudioService>,
    buffer: usize,
}

impl LoopbackTransport {
    /// Creates a transport for `service`.
    pub fn new(service: Arc<AudioService>) -> Self {
        Self {
            service,
            buffer: DEFAULT_BUFFER,
        }
    }

    /// Sets the in-flight chunk buffer.
    #[must_use]
    pub fn with_buffer(mut self, buffer: usize) -> Self {
        self.buffer = buffer.max(1);
        self
    }
}

struct ChannelStream {
    tx: mpsc::Sender<WireChunk>,
    cancel: CancellationToken,
}

#[async_trait]
impl ServerStream for ChannelStream {
    async fn send(&mut self, chunk: WireChunk) -> Result<(), TransportError> {
        self.tx.send(chunk).await.map_err(|_| TransportError::Closed)
    }

    fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

struct LoopbackReceiver {
    // Fires the server-side token when the client lets go.
    _hang_up: DropGuard,
    chunks: mpsc::Receiver<WireChunk>,
    outcome: Option<JoinHandle<Result<StreamSummary, RelayError>>>,
}

#[async_trait]
impl ChunkReceiver for LoopbackReceiver {
    async fn recv(&mut self) -> Result<Option<WireChunk>, TransportError> {
        if let Some(chunk) = self.chunks.recv().await {
            return Ok(Some(chunk));
        }
        let Some(outcome) = self.outcome.take() else {
            return Ok(None);
        };
        match outcome.await {
            Ok(Ok(_summary)) => Ok(None),
            Ok(Err(error)) => Err(TransportError::status(error.to_string())),
            Err(join) => Err(TransportError::status(format!("stream task failed: {join}"))),
        }
    }
}

fn status(error: RelayError) -> TransportError {
    match error {
        RelayError::Transport(inner) => inner,
        other => TransportError::status(other.to_string()),
    }
}

#[async_trait]
impl AudioTransport for LoopbackTransport {
    async fn get_audio(
        &self,
        request: GetAudioRequest,
    ) -> Result<Box<dyn ChunkReceiver>, TransportError> {
        let (tx, chunks) = mpsc::channel(self.buffer);
        let cancel = CancellationToken::new();
        let mut stream = ChannelStream {
            tx,
            cancel: cancel.clone(),
        };

        let service = Arc::clone(&self.service);
        let outcome = tokio::spawn(async move { service.get_audio(request, &mut stream).await });

        Ok(Box::new(LoopbackReceiver {
            _hang_up: cancel.drop_guard(),
            chunks,
            outcome: Some(outcome),
        }))
    }

    async fn play(&self, request: PlayRequest) -> Result<(), TransportError> {
        self.service.play(request).await.map_err(status)
    }

    async fn properties(&self, name: &str) -> Result<PropertiesResponse, TransportError> {
        self.service.properties(name).await.map_err(status)
    }

    async fn stop_record(&self, name: &str) -> Result<(), TransportError> {
        self.service.stop_record(name).await.map_err(status)
    }

    async fn stop_play(&self, name: &str) -> Result<(), TransportError> {
        self.service.stop_play(name).await.map_err(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::AudioClient;
    use crate::resource::{single_resource, DeviceResource};
    use crate::source::MockBackend;
    use crate::{AudioCapturer, AudioFormat};
    use std::time::Duration;

    fn transport(backend: MockBackend) -> (Arc<dyn AudioTransport>, Arc<AudioCapturer>) {
        let capturer = Arc::new(
            AudioCapturer::builder(backend)
                .format(AudioFormat::pcm16(8_000, 1))
                .frames_per_buffer(800)
                .build(),
        );
        let resource = DeviceResource::new("mic", Arc::clone(&capturer));
        let service = Arc::new(AudioService::new(single_resource(Arc::new(resource))));
        (Arc::new(LoopbackTransport::new(service)), capturer)
    }

    #[tokio::test]
    async fn test_stream_ends_cleanly() {
        let (transport, _capturer) = transport(MockBackend::new("mock"));
        let mut receiver = transport
            .get_audio(GetAudioRequest::record("mic", 1))
            .await
            .unwrap();

        let mut sequences = Vec::new();
        while let Some(chunk) = receiver.recv().await.unwrap() {
            sequences.push(chunk.sequence);
        }
        assert_eq!(sequences, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_start_error_arrives_as_status() {
        let (transport, _capturer) = transport(MockBackend::new("mock"));
        let mut receiver = transport
            .get_audio(GetAudioRequest::record("speaker", 1))
            .await
            .unwrap();

        let err = receiver.recv().await.unwrap_err();
        assert!(matches!(err, TransportError::Status { ref message } if message.contains("speaker")));
    }

    #[tokio::test]
    async fn test_dropping_receiver_releases_device() {
        let (transport, capturer) = transport(
            MockBackend::new("mock").with_read_delay(Duration::from_millis(2)),
        );
        let mut receiver = transport
            .get_audio(GetAudioRequest::record("mic", 0))
            .await
            .unwrap();
        assert!(receiver.recv().await.unwrap().is_some());

        drop(receiver);
        tokio::time::timeout(Duration::from_secs(2), async {
            while capturer.is_busy() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_unary_calls_map_errors() {
        let (transport, _capturer) = transport(MockBackend::new("mock"));
        let client = AudioClient::new("mic", Arc::clone(&transport));

        let properties = client.properties().await.unwrap();
        assert_eq!(properties.info.sample_rate, 8_000);
        assert_eq!(properties.frames_per_buffer, 800);
        client.stop_record().await.unwrap();

        let err = client
            .play(vec![0, 0], &AudioFormat::pcm16(8_000, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Transport(TransportError::Status { .. })
        ));

        let missing = AudioClient::new("nowhere", transport);
        assert!(missing.stop_play().await.is_err());
    }
}
