//! Capture pipeline.
//!
//! ```text
//! Device ──→ Producer task ──→ chunk channel (bounded) ──→ consumer
//!                  └────────→ error channel (one slot) ──↗
//! ```
//!
//! - **Capture**: opens the device and runs the producer loop
//! - **Delivery**: the consumer side of the two channels
//! - **Record**: drives a session into local sinks

mod capture;
mod delivery;
mod record;

pub use capture::{AudioCapturer, AudioCapturerBuilder};
pub use delivery::{CaptureSession, ChunkStream, Delivery};
pub use record::{record, RecordSummary};
