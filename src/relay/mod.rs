//! Server-streaming relay.
//!
//! ```text
//! resource ──→ AudioService ──ServerStream──→ transport ──ChunkReceiver──→ AudioClient ──→ mpsc<AudioChunk>
//! ```
//!
//! The service and client are written against small transport traits, so any
//! RPC layer can carry them. [`LoopbackTransport`] wires the two together in
//! process.

mod client;
mod loopback;
mod server;
mod wire;

pub use client::{spawn_receiver, AudioClient, AudioTransport, ChunkReceiver};
pub use loopback::LoopbackTransport;
pub use server::{AudioService, ServerStream, StreamEnd, StreamSummary};
pub use wire::{AudioInfo, GetAudioRequest, PlayRequest, PropertiesResponse, WireChunk};
