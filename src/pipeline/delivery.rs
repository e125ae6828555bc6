//! Consumer side of the chunk/error channel pair.

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use crate::session::SessionHandle;
use crate::{AudioChunk, CaptureError, StreamSpec};

/// One step of a capture session, as seen by its consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// The next chunk, in sequence order.
    Chunk(AudioChunk),
    /// The session ended abnormally. No further chunks follow.
    Failed(CaptureError),
    /// The session ended cleanly and every chunk has been delivered.
    End,
    /// The caller's cancellation token fired first.
    Cancelled,
}

/// Receiving half of a capture session: the chunk channel plus the
/// single-slot error channel.
///
/// [`next()`](Self::next) folds both channels and a cancellation token into
/// one [`Delivery`] with a fixed priority:
///
/// 1. cancellation
/// 2. queued chunks
/// 3. the terminal error, or clean end
///
/// The producer closes the chunk channel only after its last chunk, so a
/// session that fails after K chunks always delivers those K chunks before
/// [`Delivery::Failed`].
#[derive(Debug)]
pub struct ChunkStream {
    chunks: mpsc::Receiver<AudioChunk>,
    errors: Option<oneshot::Receiver<CaptureError>>,
}

impl ChunkStream {
    pub(crate) fn new(
        chunks: mpsc::Receiver<AudioChunk>,
        errors: oneshot::Receiver<CaptureError>,
    ) -> Self {
        Self {
            chunks,
            errors: Some(errors),
        }
    }

    /// Waits for the next delivery.
    ///
    /// After [`Delivery::End`] or [`Delivery::Failed`], every further call
    /// returns [`Delivery::End`].
    pub async fn next(&mut self, cancel: &CancellationToken) -> Delivery {
        tokio::select! {
            biased;
            () = cancel.cancelled() => return Delivery::Cancelled,
            chunk = self.chunks.recv() => {
                if let Some(chunk) = chunk {
                    return Delivery::Chunk(chunk);
                }
            }
        }

        // Chunk channel closed: the producer has exited and already settled
        // the error channel.
        match self.errors.take() {
            Some(errors) => match errors.await {
                Ok(error) => Delivery::Failed(error),
                Err(_) => Delivery::End,
            },
            None => Delivery::End,
        }
    }

    /// Splits into the raw chunk and error receivers.
    ///
    /// Returns `None` for the error receiver if a terminal delivery was
    /// already observed through [`next()`](Self::next).
    pub fn into_parts(
        self,
    ) -> (
        mpsc::Receiver<AudioChunk>,
        Option<oneshot::Receiver<CaptureError>>,
    ) {
        (self.chunks, self.errors)
    }
}

/// A started capture session: its delivery channels plus a control handle.
///
/// Dropping a `CaptureSession` drops the chunk receiver, which ends the
/// producer at its next send.
#[derive(Debug)]
pub struct CaptureSession {
    stream: ChunkStream,
    handle: SessionHandle,
}

impl CaptureSession {
    pub(crate) fn new(stream: ChunkStream, handle: SessionHandle) -> Self {
        Self { stream, handle }
    }

    /// Waits for the next delivery. See [`ChunkStream::next()`].
    pub async fn next(&mut self, cancel: &CancellationToken) -> Delivery {
        self.stream.next(cancel).await
    }

    /// Control handle for this session.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// The format and buffer size negotiated with the device.
    pub fn spec(&self) -> StreamSpec {
        self.handle.spec()
    }

    /// Requests the session to stop. Idempotent.
    pub fn stop(&self) {
        self.handle.stop();
    }

    /// Splits into the delivery stream and the control handle.
    pub fn into_parts(self) -> (ChunkStream, SessionHandle) {
        (self.stream, self.handle)
    }
}
