//! # vellum-proto
//!
//! Wire-level protocol definitions for the Vellum sync core.
//!
//! This crate provides:
//! - The versioned [`Envelope`] and tagged [`Payload`] codec
//! - [`Capabilities`] and the handshake negotiation rule
//! - [`VectorClock`] for causal ordering summaries
//! - Protocol error codes with `retryable` flags
//!
//! The codec is transport-agnostic: sessions produce and consume envelopes,
//! and how the bytes move between peers is someone else's problem.

mod capabilities;
mod clock;
mod error;
mod message;

pub use capabilities::Capabilities;
pub use clock::VectorClock;
pub use error::{ErrorCode, ProtoError, Result};
pub use message::{
    Change, Checkpoint, CheckpointAck, CheckpointUpdate, Envelope, Handshake, HandshakeAck,
    HandshakeReject, Payload, PullRequest, PullResponse, PushBatch, WireError, PROTOCOL_VERSION,
};
