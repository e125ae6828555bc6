//! WAV recording example.
//!
//! Records audio from the default input device to a WAV file.
//!
//! Run with: cargo run --example record_wav --features cpal

use std::sync::Arc;
use std::time::Duration;

use relay_audio::source::{default_input_device_name, CpalBackend};
use relay_audio::{record, AudioCapturer, AudioFormat, FileSink, Sink};
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let device = default_input_device_name().unwrap_or_else(|| "<none>".to_string());
    println!("Recording from {device} to recording.wav for 5 seconds...");
    println!("Press Ctrl+C to stop early.");

    let capturer = AudioCapturer::builder(CpalBackend::default_device())
        .format(AudioFormat::pcm16(16_000, 1))
        .frames_per_buffer(1_600)
        .build();

    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let sink: Arc<dyn Sink> = Arc::new(FileSink::wav("recording.wav"));
    let summary = record(&capturer, vec![sink], Duration::from_secs(5), &cancel).await?;

    println!("Recording saved to recording.wav");
    println!(
        "Wrote {} chunks ({} bytes) as {}",
        summary.chunks, summary.bytes, summary.format
    );

    Ok(())
}
