//! The versioned message envelope and payload codec.
//!
//! Every message on the wire is an [`Envelope`] carrying a tagged
//! [`Payload`]. The codec is strict at the boundary: unknown message types
//! fail decoding, and unknown fields inside a payload are rejected rather
//! than silently ignored. `version`, `type`, `message_id`, `sender_id`, and
//! `payload` round-trip exactly.

use crate::capabilities::Capabilities;
use crate::clock::VectorClock;
use crate::error::{ErrorCode, ProtoError, Result};
use serde::{Deserialize, Serialize};

/// The protocol version this implementation speaks.
///
/// A mismatch is fatal to the session; versions are never negotiated.
pub const PROTOCOL_VERSION: u32 = 1;

/// An opaque position marker letting a peer resume pulls without
/// re-enumerating prior changes.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Checkpoint(pub String);

impl Checkpoint {
    pub fn new(marker: impl Into<String>) -> Self {
        Checkpoint(marker.into())
    }
}

/// A single document change; the payload bytes are opaque to the core.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Change {
    pub collection: String,
    pub document_id: String,
    pub payload: Vec<u8>,
}

/// Opening message of a session, sent by the initiator.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Handshake {
    pub capabilities: Capabilities,
    pub collections: Vec<String>,
    pub last_checkpoint: Option<Checkpoint>,
}

/// Responder's acceptance: the negotiated capabilities and session ID.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandshakeAck {
    pub session_id: String,
    pub capabilities: Capabilities,
}

/// Responder's refusal; fatal for the initiating session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HandshakeReject {
    pub reason: String,
}

/// A batch of outgoing changes plus the sender's full vector clock.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PushBatch {
    pub changes: Vec<Change>,
    pub clock: VectorClock,
}

/// Request for changes since a checkpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullRequest {
    pub collections: Vec<String>,
    pub checkpoint: Option<Checkpoint>,
    pub clock: VectorClock,
    pub limit: Option<u64>,
}

/// Response to a pull: a change batch and the position to resume from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PullResponse {
    pub changes: Vec<Change>,
    pub has_more: bool,
    pub checkpoint: Checkpoint,
    pub clock: VectorClock,
}

/// Out-of-band fast-forward of a peer's position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointUpdate {
    pub checkpoint: Checkpoint,
    pub clock: VectorClock,
}

/// Acknowledgement of a checkpoint fast-forward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CheckpointAck {
    pub clock: VectorClock,
}

/// On-wire error report.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WireError {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

/// The tagged message payload. The tag is the envelope's `type` field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum Payload {
    Handshake(Handshake),
    HandshakeAck(HandshakeAck),
    HandshakeReject(HandshakeReject),
    Push(PushBatch),
    Ack,
    Pull(PullRequest),
    PullResponse(PullResponse),
    Checkpoint(CheckpointUpdate),
    CheckpointAck(CheckpointAck),
    Ping,
    Pong,
    Error(WireError),
}

impl Payload {
    /// The wire name of this payload's type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Handshake(_) => "handshake",
            Payload::HandshakeAck(_) => "handshake-ack",
            Payload::HandshakeReject(_) => "handshake-reject",
            Payload::Push(_) => "push",
            Payload::Ack => "ack",
            Payload::Pull(_) => "pull",
            Payload::PullResponse(_) => "pull-response",
            Payload::Checkpoint(_) => "checkpoint",
            Payload::CheckpointAck(_) => "checkpoint-ack",
            Payload::Ping => "ping",
            Payload::Pong => "pong",
            Payload::Error(_) => "error",
        }
    }
}

/// The versioned message envelope.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub version: u32,
    pub message_id: String,
    pub sender_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlates_with: Option<String>,
    #[serde(flatten)]
    pub payload: Payload,
}

impl Envelope {
    /// Create an envelope at the current protocol version.
    pub fn new(message_id: impl Into<String>, sender_id: impl Into<String>, payload: Payload) -> Self {
        Envelope {
            version: PROTOCOL_VERSION,
            message_id: message_id.into(),
            sender_id: sender_id.into(),
            correlates_with: None,
            payload,
        }
    }

    /// Mark this envelope as a reply to another message.
    pub fn correlated_with(mut self, message_id: impl Into<String>) -> Self {
        self.correlates_with = Some(message_id.into());
        self
    }

    /// Encode to wire bytes.
    pub fn encode(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ProtoError::Malformed(e.to_string()))
    }

    /// Decode from wire bytes, enforcing the version gate first.
    ///
    /// The version is checked before the payload is parsed, so a mismatched
    /// message reports [`ProtoError::ProtocolMismatch`] even when its
    /// payload would not decode.
    pub fn decode(bytes: &[u8]) -> Result<Envelope> {
        let version = Self::peek_version(bytes)?;
        if version != PROTOCOL_VERSION {
            return Err(ProtoError::ProtocolMismatch {
                expected: PROTOCOL_VERSION,
                actual: version,
            });
        }
        serde_json::from_slice(bytes).map_err(|e| ProtoError::Malformed(e.to_string()))
    }

    /// Read only the `version` field of an encoded envelope.
    pub fn peek_version(bytes: &[u8]) -> Result<u32> {
        #[derive(Deserialize)]
        struct Header {
            version: u32,
        }
        let header: Header =
            serde_json::from_slice(bytes).map_err(|e| ProtoError::Malformed(e.to_string()))?;
        Ok(header.version)
    }
}
