//! The peer-to-peer sync session state machine.
//!
//! A session drives one connection: handshake, push, pull, checkpoint,
//! error. It owns its mutable state (`vector clock`, checkpoint, negotiated
//! capabilities) exclusively; sessions are never shared across connections.
//! Inbound messages are processed one at a time through
//! [`SyncSession::handle_message`]; the session does not queue or
//! interleave in-flight requests itself.

use crate::collaborators::{ChangeApplier, ChangeLog};
use crate::error::{Result, SessionError};
use crate::transport::MessageTransport;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};
use ulid::Ulid;
use vellum_proto::{
    Capabilities, Change, Checkpoint, CheckpointAck, CheckpointUpdate, Envelope, ErrorCode,
    Handshake, HandshakeAck, Payload, PullRequest, PushBatch, VectorClock, WireError,
};

/// Session lifecycle states.
///
/// `Error` is terminal: recovery requires creating a new session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Handshaking,
    Syncing,
    Closed,
    Error,
}

impl SessionState {
    /// Closed and Error accept no further messages.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Closed | SessionState::Error)
    }
}

/// Events emitted by a session.
///
/// Network-level failures surface here rather than as call-site errors, so
/// the caller can decide to retry while the session stays alive.
#[derive(Clone, Debug)]
pub enum SessionEvent {
    /// The session moved to a new state.
    StateChanged {
        from: SessionState,
        to: SessionState,
    },
    /// An inbound batch was forwarded to the change applier.
    ChangesApplied { count: usize },
    /// The local checkpoint advanced.
    CheckpointAdvanced(Checkpoint),
    /// The remote refused our handshake.
    HandshakeRejected { reason: String },
    /// A sync failure, with the wire code and whether a retry could help.
    SyncFailed {
        code: ErrorCode,
        retryable: bool,
        reason: String,
    },
}

/// A single peer-to-peer sync session.
pub struct SyncSession<T, L, A>
where
    T: MessageTransport,
    L: ChangeLog,
    A: ChangeApplier,
{
    node_id: String,
    local_caps: Capabilities,

    state: SessionState,
    session_id: Option<String>,
    clock: VectorClock,
    last_checkpoint: Option<Checkpoint>,
    negotiated: Option<Capabilities>,

    transport: Arc<T>,
    change_log: Arc<L>,
    applier: Arc<A>,
    event_tx: broadcast::Sender<SessionEvent>,
}

impl<T, L, A> SyncSession<T, L, A>
where
    T: MessageTransport,
    L: ChangeLog,
    A: ChangeApplier,
{
    /// Create an idle session with default local capabilities.
    pub fn new(
        node_id: impl Into<String>,
        transport: Arc<T>,
        change_log: Arc<L>,
        applier: Arc<A>,
    ) -> Self {
        Self::with_capabilities(node_id, Capabilities::default(), transport, change_log, applier)
    }

    /// Create an idle session declaring the given local capabilities.
    pub fn with_capabilities(
        node_id: impl Into<String>,
        local_caps: Capabilities,
        transport: Arc<T>,
        change_log: Arc<L>,
        applier: Arc<A>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(100);
        SyncSession {
            node_id: node_id.into(),
            local_caps,
            state: SessionState::Idle,
            session_id: None,
            clock: VectorClock::new(),
            last_checkpoint: None,
            negotiated: None,
            transport,
            change_log,
            applier,
            event_tx,
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Session ID allocated by the responder; `None` before the handshake
    /// completes.
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn clock(&self) -> &VectorClock {
        &self.clock
    }

    pub fn last_checkpoint(&self) -> Option<&Checkpoint> {
        self.last_checkpoint.as_ref()
    }

    /// Capabilities agreed during the handshake; identical on both peers.
    pub fn negotiated_capabilities(&self) -> Option<&Capabilities> {
        self.negotiated.as_ref()
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.event_tx.subscribe()
    }

    /// Open the session: send a handshake for the given collections.
    pub async fn connect(&mut self, collections: Vec<String>) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(SessionError::InvalidState {
                operation: "connect",
                state: self.state,
            });
        }

        self.send(Payload::Handshake(Handshake {
            capabilities: self.local_caps.clone(),
            collections,
            last_checkpoint: self.last_checkpoint.clone(),
        }))
        .await?;
        self.set_state(SessionState::Handshaking);
        Ok(())
    }

    /// Push a batch of local changes to the peer.
    ///
    /// Valid only while syncing. Increments this node's vector-clock
    /// counter exactly once and sends the full current clock alongside the
    /// batch. Returns the outgoing message ID.
    pub async fn push(&mut self, changes: Vec<Change>) -> Result<String> {
        if self.state != SessionState::Syncing {
            return Err(SessionError::InvalidState {
                operation: "push",
                state: self.state,
            });
        }

        // The tick is committed only once the batch has left the node, so a
        // delivery failure does not burn a counter value.
        let mut clock = self.clock.clone();
        clock.increment(&self.node_id);
        let message_id = self
            .send(Payload::Push(PushBatch {
                changes,
                clock: clock.clone(),
            }))
            .await?;
        self.clock = clock;
        Ok(message_id)
    }

    /// Request changes the peer has recorded since our last checkpoint.
    pub async fn pull(&mut self, collections: Vec<String>, limit: Option<u64>) -> Result<String> {
        if self.state != SessionState::Syncing {
            return Err(SessionError::InvalidState {
                operation: "pull",
                state: self.state,
            });
        }

        self.send(Payload::Pull(PullRequest {
            collections,
            checkpoint: self.last_checkpoint.clone(),
            clock: self.clock.clone(),
            limit,
        }))
        .await
    }

    /// Announce a checkpoint out-of-band, fast-forwarding the peer's view
    /// of our position without enumerating intervening changes.
    pub async fn checkpoint(&mut self, checkpoint: Checkpoint) -> Result<String> {
        if self.state != SessionState::Syncing {
            return Err(SessionError::InvalidState {
                operation: "checkpoint",
                state: self.state,
            });
        }

        self.last_checkpoint = Some(checkpoint.clone());
        self.send(Payload::Checkpoint(CheckpointUpdate {
            checkpoint,
            clock: self.clock.clone(),
        }))
        .await
    }

    /// Liveness probe; valid in any non-terminal state.
    pub async fn ping(&mut self) -> Result<String> {
        if self.state.is_terminal() {
            return Err(SessionError::InvalidState {
                operation: "ping",
                state: self.state,
            });
        }
        self.send(Payload::Ping).await
    }

    /// Close the session and terminate its event stream.
    pub fn close(&mut self) {
        if self.state != SessionState::Closed {
            self.set_state(SessionState::Closed);
        }
        // Replacing the sender ends every outstanding receiver once the
        // queued events are drained.
        let (fresh, _) = broadcast::channel(1);
        self.event_tx = fresh;
    }

    /// Process one inbound message.
    ///
    /// The protocol version is enforced before the payload is inspected:
    /// a mismatched version is a non-retryable failure regardless of the
    /// message type, and the session enters the error state.
    pub async fn handle_message(&mut self, bytes: &[u8]) -> Result<()> {
        if self.state.is_terminal() {
            return Err(SessionError::InvalidState {
                operation: "handle_message",
                state: self.state,
            });
        }

        let envelope = match Envelope::decode(bytes) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(node_id = %self.node_id, %err, "rejecting inbound message");
                let _ = self
                    .send(Payload::Error(WireError {
                        code: err.code(),
                        message: err.to_string(),
                        retryable: false,
                    }))
                    .await;
                self.fail(err.code(), err.to_string());
                return Err(err.into());
            }
        };

        debug!(
            node_id = %self.node_id,
            kind = envelope.payload.kind(),
            sender = %envelope.sender_id,
            "inbound message"
        );

        let message_id = envelope.message_id.clone();
        match envelope.payload {
            Payload::Ping => {
                self.reply(Payload::Pong, &message_id).await?;
                Ok(())
            }
            Payload::Pong => Ok(()),
            Payload::Error(err) => {
                let _ = self.event_tx.send(SessionEvent::SyncFailed {
                    code: err.code,
                    retryable: err.retryable,
                    reason: err.message.clone(),
                });
                if !err.retryable {
                    self.set_state(SessionState::Error);
                }
                Ok(())
            }
            Payload::Handshake(handshake) if self.state == SessionState::Idle => {
                self.accept_handshake(handshake, &message_id).await
            }
            Payload::HandshakeAck(ack) if self.state == SessionState::Handshaking => {
                self.session_id = Some(ack.session_id);
                self.negotiated = Some(ack.capabilities);
                self.set_state(SessionState::Syncing);
                Ok(())
            }
            Payload::HandshakeReject(reject) if self.state == SessionState::Handshaking => {
                let _ = self.event_tx.send(SessionEvent::HandshakeRejected {
                    reason: reject.reason.clone(),
                });
                self.fail(ErrorCode::InternalError, reject.reason.clone());
                Err(SessionError::HandshakeRejected(reject.reason))
            }
            Payload::Push(batch) if self.state == SessionState::Syncing => {
                self.clock.merge(&batch.clock);
                let count = batch.changes.len();
                self.applier.apply(batch.changes).await;
                let _ = self.event_tx.send(SessionEvent::ChangesApplied { count });
                self.reply(Payload::Ack, &message_id).await?;
                Ok(())
            }
            Payload::Ack if self.state == SessionState::Syncing => Ok(()),
            Payload::Pull(request) if self.state == SessionState::Syncing => {
                self.clock.merge(&request.clock);
                let batch = self
                    .change_log
                    .changes_since(
                        request.checkpoint.as_ref(),
                        &request.collections,
                        request.limit,
                    )
                    .await;
                self.reply(
                    Payload::PullResponse(vellum_proto::PullResponse {
                        changes: batch.changes,
                        has_more: batch.has_more,
                        checkpoint: batch.checkpoint,
                        clock: self.clock.clone(),
                    }),
                    &message_id,
                )
                .await?;
                Ok(())
            }
            Payload::PullResponse(response) if self.state == SessionState::Syncing => {
                self.clock.merge(&response.clock);
                self.last_checkpoint = Some(response.checkpoint.clone());
                let count = response.changes.len();
                self.applier.apply(response.changes).await;
                let _ = self.event_tx.send(SessionEvent::ChangesApplied { count });
                let _ = self
                    .event_tx
                    .send(SessionEvent::CheckpointAdvanced(response.checkpoint));
                Ok(())
            }
            Payload::Checkpoint(update) if self.state == SessionState::Syncing => {
                self.clock.merge(&update.clock);
                self.last_checkpoint = Some(update.checkpoint.clone());
                let _ = self
                    .event_tx
                    .send(SessionEvent::CheckpointAdvanced(update.checkpoint));
                self.reply(
                    Payload::CheckpointAck(CheckpointAck {
                        clock: self.clock.clone(),
                    }),
                    &message_id,
                )
                .await?;
                Ok(())
            }
            Payload::CheckpointAck(ack) if self.state == SessionState::Syncing => {
                self.clock.merge(&ack.clock);
                Ok(())
            }
            other => {
                let kind = other.kind();
                warn!(node_id = %self.node_id, kind, state = ?self.state, "unexpected message");
                let reason = format!("'{kind}' not valid in state {:?}", self.state);
                let _ = self
                    .send(Payload::Error(WireError {
                        code: ErrorCode::InternalError,
                        message: reason.clone(),
                        retryable: false,
                    }))
                    .await;
                self.fail(ErrorCode::InternalError, reason);
                Err(SessionError::UnexpectedMessage {
                    kind,
                    state: self.state,
                })
            }
        }
    }

    /// Responder side of the handshake: negotiate, allocate a session ID,
    /// start syncing.
    async fn accept_handshake(&mut self, handshake: Handshake, message_id: &str) -> Result<()> {
        let negotiated = self.local_caps.negotiate(&handshake.capabilities);
        let session_id = Ulid::new().to_string();

        self.negotiated = Some(negotiated.clone());
        self.session_id = Some(session_id.clone());
        self.set_state(SessionState::Syncing);

        self.reply(
            Payload::HandshakeAck(HandshakeAck {
                session_id,
                capabilities: negotiated,
            }),
            message_id,
        )
        .await?;
        Ok(())
    }

    async fn send(&self, payload: Payload) -> Result<String> {
        let message_id = Ulid::new().to_string();
        let envelope = Envelope::new(message_id.clone(), self.node_id.clone(), payload);
        self.send_envelope(envelope).await?;
        Ok(message_id)
    }

    async fn reply(&self, payload: Payload, correlates_with: &str) -> Result<String> {
        let message_id = Ulid::new().to_string();
        let envelope = Envelope::new(message_id.clone(), self.node_id.clone(), payload)
            .correlated_with(correlates_with);
        self.send_envelope(envelope).await?;
        Ok(message_id)
    }

    async fn send_envelope(&self, envelope: Envelope) -> Result<()> {
        let bytes = envelope.encode().map_err(SessionError::Protocol)?;
        self.transport
            .send(bytes)
            .await
            .map_err(|e| SessionError::Transport(e.to_string()))
    }

    fn set_state(&mut self, to: SessionState) {
        let from = self.state;
        if from == to {
            return;
        }
        debug!(node_id = %self.node_id, ?from, ?to, "session state change");
        self.state = to;
        let _ = self.event_tx.send(SessionEvent::StateChanged { from, to });
    }

    fn fail(&mut self, code: ErrorCode, reason: String) {
        let _ = self.event_tx.send(SessionEvent::SyncFailed {
            code,
            retryable: false,
            reason,
        });
        self.set_state(SessionState::Error);
    }
}
