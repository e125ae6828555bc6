//! Relay round-trip example.
//!
//! Serves a synthetic 440Hz tone as resource "tone" and streams two seconds
//! of it to a client over the in-process transport.
//!
//! Run with: RUST_LOG=relay_audio=debug cargo run --example loopback_relay

use std::sync::Arc;

use relay_audio::source::{MockBackend, MockSignal};
use relay_audio::{
    single_resource, AudioCapturer, AudioClient, AudioFormat, AudioService, DeviceResource,
    LoopbackTransport,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let backend = MockBackend::new("tone").with_signal(MockSignal::Sine {
        frequency: 440.0,
        amplitude: 0.25,
    });
    let capturer = AudioCapturer::builder(backend)
        .format(AudioFormat::pcm16(16_000, 1))
        .frames_per_buffer(320)
        .build();
    let resource = DeviceResource::new("tone", Arc::new(capturer));
    let service = Arc::new(AudioService::new(single_resource(Arc::new(resource))));

    let client = AudioClient::new("tone", Arc::new(LoopbackTransport::new(service)));
    let properties = client.properties().await?;
    println!(
        "Streaming {} at {}Hz/{}ch, {} frames per chunk",
        properties.info.codec,
        properties.info.sample_rate,
        properties.info.num_channels,
        properties.frames_per_buffer
    );

    let mut chunks = client.record(2).await?;
    let mut received = 0usize;
    let mut bytes = 0usize;
    while let Some(chunk) = chunks.recv().await {
        if let Some(error) = &chunk.error {
            eprintln!("Stream failed: {error}");
            break;
        }
        received += 1;
        bytes += chunk.payload.len();
    }

    println!("Received {received} chunks ({bytes} bytes)");
    Ok(())
}
