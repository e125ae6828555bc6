//! Named audio resources exposed to the relay.
//!
//! The relay never owns devices. It resolves a resource by name through an
//! injected [`ResourceLookup`] and calls the operations below on it.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::format::pcm16le_to_f32;
use crate::pipeline::{AudioCapturer, CaptureSession};
use crate::source::{validate_payload, PlaybackBackend};
use crate::{AudioFormat, Codec, PlaybackError, RelayError};

/// Format information a resource reports about its capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioProperties {
    /// Capture format.
    pub format: AudioFormat,
    /// Frames per chunk.
    pub frames_per_buffer: usize,
}

/// A named audio endpoint: something that can capture and, optionally, play.
#[async_trait]
pub trait AudioResource: Send + Sync {
    /// Registry name of this resource.
    fn name(&self) -> &str;

    /// Starts a capture session producing `codec` chunks.
    ///
    /// The session stops when `cancel` fires.
    async fn get_audio(
        &self,
        codec: Codec,
        cancel: &CancellationToken,
    ) -> Result<CaptureSession, RelayError>;

    /// Plays a complete PCM payload.
    async fn play(&self, audio: &[u8], format: &AudioFormat) -> Result<(), RelayError>;

    /// Reports the capture format.
    async fn properties(&self) -> Result<AudioProperties, RelayError>;

    /// Stops the active capture session, if any.
    async fn stop_record(&self) -> Result<(), RelayError>;

    /// Stops playback. Playback runs to completion, so this succeeds by default.
    async fn stop_play(&self) -> Result<(), RelayError> {
        Ok(())
    }
}

/// Resolves a resource name to a resource.
pub type ResourceLookup = Arc<dyn Fn(&str) -> Option<Arc<dyn AudioResource>> + Send + Sync>;

/// Wraps a closure as a [`ResourceLookup`].
pub fn resource_lookup<F>(lookup: F) -> ResourceLookup
where
    F: Fn(&str) -> Option<Arc<dyn AudioResource>> + Send + Sync + 'static,
{
    Arc::new(lookup)
}

/// A lookup that resolves only `resource`'s own name.
pub fn single_resource(resource: Arc<dyn AudioResource>) -> ResourceLookup {
    let name = resource.name().to_string();
    Arc::new(move |requested: &str| (requested == name).then(|| Arc::clone(&resource)))
}

/// A lookup over a fixed set of resources, keyed by their names.
pub fn resource_registry(
    resources: impl IntoIterator<Item = Arc<dyn AudioResource>>,
) -> ResourceLookup {
    let by_name: HashMap<String, Arc<dyn AudioResource>> = resources
        .into_iter()
        .map(|resource| (resource.name().to_string(), resource))
        .collect();
    Arc::new(move |requested: &str| by_name.get(requested).cloned())
}

/// An [`AudioResource`] backed by a local capture device and an optional
/// playback device.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use relay_audio::{AudioCapturer, DeviceResource};
/// use relay_audio::source::MockBackend;
///
/// let capturer = Arc::new(AudioCapturer::new(MockBackend::new("mic")));
/// let resource = DeviceResource::new("desk-mic", capturer);
/// ```
pub struct DeviceResource {
    name: String,
    capturer: Arc<AudioCapturer>,
    playback: Option<Arc<dyn PlaybackBackend>>,
}

impl DeviceResource {
    /// Creates a capture-only resource.
    pub fn new(name: impl Into<String>, capturer: Arc<AudioCapturer>) -> Self {
        Self {
            name: name.into(),
            capturer,
            playback: None,
        }
    }

    /// Adds a playback device.
    #[must_use]
    pub fn with_playback(mut self, playback: Arc<dyn PlaybackBackend>) -> Self {
        self.playback = Some(playback);
        self
    }

    /// The capturer behind this resource.
    pub fn capturer(&self) -> &Arc<AudioCapturer> {
        &self.capturer
    }
}

#[async_trait]
impl AudioResource for DeviceResource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn get_audio(
        &self,
        codec: Codec,
        cancel: &CancellationToken,
    ) -> Result<CaptureSession, RelayError> {
        let device_codec = self.capturer.config().format.codec;
        if codec != device_codec {
            return Err(RelayError::invalid_request(format!(
                "resource '{}' captures {device_codec}, not {codec}",
                self.name
            )));
        }
        Ok(self.capturer.start_capture(cancel)?)
    }

    async fn play(&self, audio: &[u8], format: &AudioFormat) -> Result<(), RelayError> {
        validate_payload(audio, format)?;
        let playback = self.playback.clone().ok_or(PlaybackError::Unavailable)?;

        let samples = pcm16le_to_f32(audio);
        let format = *format;
        tracing::debug!(
            resource = %self.name,
            device = %playback.name(),
            %format,
            samples = samples.len(),
            "Playing audio"
        );

        tokio::task::spawn_blocking(move || playback.play(&samples, &format))
            .await
            .map_err(|e| PlaybackError::Device(format!("playback task panicked: {e}")))??;
        Ok(())
    }

    async fn properties(&self) -> Result<AudioProperties, RelayError> {
        let spec = match self.capturer.active_session() {
            Some(session) => session.spec(),
            None => {
                let config = self.capturer.config();
                crate::StreamSpec::new(config.format, config.frames_per_buffer)
            }
        };
        Ok(AudioProperties {
            format: spec.format,
            frames_per_buffer: spec.frames_per_buffer,
        })
    }

    async fn stop_record(&self) -> Result<(), RelayError> {
        if self.capturer.stop_active() {
            tracing::info!(resource = %self.name, "Stopped active recording");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::Delivery;
    use crate::source::MockBackend;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct RecordingPlayback {
        played: Mutex<Vec<(Vec<f32>, AudioFormat)>>,
    }

    impl PlaybackBackend for RecordingPlayback {
        fn name(&self) -> String {
            "recording".to_string()
        }

        fn play(&self, samples: &[f32], format: &AudioFormat) -> Result<(), PlaybackError> {
            self.played.lock().push((samples.to_vec(), *format));
            Ok(())
        }
    }

    fn resource(backend: MockBackend) -> DeviceResource {
        let capturer = AudioCapturer::builder(backend)
            .format(AudioFormat::pcm16(8_000, 1))
            .frames_per_buffer(800)
            .build();
        DeviceResource::new("mic", Arc::new(capturer))
    }

    #[tokio::test]
    async fn test_get_audio_streams_chunks() {
        let resource = resource(MockBackend::new("mock").failing_after(1));
        let cancel = CancellationToken::new();
        let mut session = resource.get_audio(Codec::Pcm16, &cancel).await.unwrap();

        assert!(matches!(session.next(&cancel).await, Delivery::Chunk(_)));
        assert!(matches!(session.next(&cancel).await, Delivery::Failed(_)));
    }

    #[tokio::test]
    async fn test_play_decodes_and_forwards() {
        let playback = Arc::new(RecordingPlayback::default());
        let resource = resource(MockBackend::new("mock")).with_playback(playback.clone());
        let format = AudioFormat::pcm16(16_000, 1);

        resource.play(&[0x00, 0x40, 0x00, 0xC0], &format).await.unwrap();

        let played = playback.played.lock();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].0, vec![0.5, -0.5]);
        assert_eq!(played[0].1, format);
    }

    #[tokio::test]
    async fn test_play_without_device() {
        let resource = resource(MockBackend::new("mock"));
        let err = resource
            .play(&[0, 0], &AudioFormat::default())
            .await
            .unwrap_err();
        assert_eq!(err, RelayError::Playback(PlaybackError::Unavailable));
    }

    #[tokio::test]
    async fn test_play_rejects_partial_frame() {
        let playback = Arc::new(RecordingPlayback::default());
        let resource = resource(MockBackend::new("mock")).with_playback(playback.clone());

        let err = resource
            .play(&[0, 0, 0], &AudioFormat::pcm16(44_100, 1))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RelayError::Playback(PlaybackError::InvalidFormat { .. })
        ));
        assert!(playback.played.lock().is_empty());
    }

    #[tokio::test]
    async fn test_properties_report_negotiated_frames() {
        let resource = resource(MockBackend::new("mock").with_frames_per_buffer(400));
        let idle = resource.properties().await.unwrap();
        assert_eq!(idle.frames_per_buffer, 800);

        let cancel = CancellationToken::new();
        let session = resource.get_audio(Codec::Pcm16, &cancel).await.unwrap();
        let active = resource.properties().await.unwrap();
        assert_eq!(active.frames_per_buffer, 400);
        assert_eq!(active.format, AudioFormat::pcm16(8_000, 1));

        session.handle().shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_record_stops_session() {
        let resource =
            resource(MockBackend::new("mock").with_read_delay(std::time::Duration::from_millis(2)));
        let cancel = CancellationToken::new();
        let mut session = resource.get_audio(Codec::Pcm16, &cancel).await.unwrap();

        resource.stop_record().await.unwrap();
        resource.stop_play().await.unwrap();

        loop {
            match session.next(&cancel).await {
                Delivery::Chunk(_) => {}
                other => {
                    assert_eq!(other, Delivery::End);
                    break;
                }
            }
        }
        assert!(!resource.capturer().is_busy());
    }

    #[test]
    fn test_lookups() {
        let mic: Arc<dyn AudioResource> = Arc::new(resource(MockBackend::new("a")));
        let single = single_resource(Arc::clone(&mic));
        assert!(single("mic").is_some());
        assert!(single("speaker").is_none());

        let registry = resource_registry(vec![mic]);
        assert_eq!(registry("mic").map(|r| r.name().to_string()), Some("mic".to_string()));
        assert!(registry("other").is_none());

        let custom = resource_lookup(|_: &str| None);
        assert!(custom("mic").is_none());
    }
}
