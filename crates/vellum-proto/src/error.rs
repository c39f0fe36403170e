//! Protocol error codes.
//!
//! Every error that crosses the session boundary carries a wire code and a
//! `retryable` flag so callers can tell fatal protocol errors from
//! transient ones.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error codes surfaced across the protocol boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "PROTOCOL_MISMATCH")]
    ProtocolMismatch,
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

/// Errors raised by the codec and version gate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtoError {
    /// Version mismatch is never negotiated, only capabilities are.
    #[error("Protocol version mismatch: expected {expected}, got {actual}")]
    ProtocolMismatch { expected: u32, actual: u32 },

    /// Undecodable envelope or unknown message type.
    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl ProtoError {
    /// The wire code for this error.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProtoError::ProtocolMismatch { .. } => ErrorCode::ProtocolMismatch,
            ProtoError::Malformed(_) => ErrorCode::InternalError,
        }
    }

    /// Both codec errors are fatal to the session.
    pub fn retryable(&self) -> bool {
        false
    }
}

pub type Result<T> = std::result::Result<T, ProtoError>;
