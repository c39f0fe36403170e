//! Error types for sync sessions.

use crate::session::SessionState;
use thiserror::Error;
use vellum_proto::{ErrorCode, ProtoError};

/// Errors raised by session operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Operation called in a state that does not permit it.
    #[error("Operation '{operation}' invalid in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },

    /// Codec or version-gate failure; fatal to the session.
    #[error(transparent)]
    Protocol(#[from] ProtoError),

    /// The remote refused our handshake.
    #[error("Handshake rejected: {0}")]
    HandshakeRejected(String),

    /// A message arrived that is not valid in the current state.
    #[error("Unexpected '{kind}' message in state {state:?}")]
    UnexpectedMessage {
        kind: &'static str,
        state: SessionState,
    },

    /// The transport failed to deliver a message.
    #[error("Transport error: {0}")]
    Transport(String),
}

impl SessionError {
    /// Wire code for errors that cross the protocol boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            SessionError::Protocol(e) => e.code(),
            _ => ErrorCode::InternalError,
        }
    }

    /// Whether the caller may retry. Transport hiccups are transient;
    /// everything else requires a new session or a caller-side fix.
    pub fn retryable(&self) -> bool {
        matches!(self, SessionError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, SessionError>;
