//! # vellum-session
//!
//! Peer-to-peer sync sessions for the Vellum sync core.
//!
//! A [`SyncSession`] drives one connection through the protocol lifecycle:
//! handshake and capability negotiation, change push/pull with vector-clock
//! merging, checkpoint fast-forwards, and liveness probes. The session is
//! transport-agnostic ([`MessageTransport`]) and delegates document state to
//! external collaborators ([`ChangeLog`], [`ChangeApplier`]).
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use vellum_session::{
//!     MemoryApplier, MemoryChangeLog, MemoryTransport, SessionState, SyncSession,
//! };
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), vellum_session::SessionError> {
//! let (to_peer, at_peer) = MemoryTransport::pair();
//! let mut session = SyncSession::new(
//!     "node-a",
//!     Arc::new(to_peer),
//!     Arc::new(MemoryChangeLog::new()),
//!     Arc::new(MemoryApplier::new()),
//! );
//!
//! session.connect(vec!["notes".to_string()]).await?;
//! assert_eq!(session.state(), SessionState::Handshaking);
//! assert!(at_peer.try_recv().is_some());
//! # Ok(())
//! # }
//! ```

mod collaborators;
mod error;
mod session;
mod transport;

pub use collaborators::{ChangeApplier, ChangeBatch, ChangeLog, MemoryApplier, MemoryChangeLog};
pub use error::{Result, SessionError};
pub use session::{SessionEvent, SessionState, SyncSession};
pub use transport::{MemoryTransport, MessageTransport, TransportError};
