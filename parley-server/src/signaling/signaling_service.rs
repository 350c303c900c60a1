use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::{CloseFrame, Message};
use dashmap::DashMap;
use parley_core::{ParticipantId, SignalMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, warn};
use uuid::Uuid;

/// Identifies one WebSocket connection; a participant may reconnect with a new one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

struct Connection {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Message>,
}

struct SignalingInner {
    connections: DashMap<ParticipantId, Connection>,
}

/// Live WebSocket connections keyed by participant.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                connections: DashMap::new(),
            }),
        }
    }

    /// Registers a connection for `participant`. A previous connection of the same
    /// participant is closed with `close_code` and returned `true`.
    pub fn attach(
        &self,
        participant: ParticipantId,
        tx: mpsc::UnboundedSender<Message>,
        close_code: u16,
    ) -> (ConnectionId, bool) {
        let id = ConnectionId::new();
        let previous = self
            .inner
            .connections
            .insert(participant.clone(), Connection { id, tx });

        let superseded = match previous {
            Some(old) => {
                warn!(participant = %participant, "Superseding previous connection");
                let _ = old.tx.send(Message::Close(Some(CloseFrame {
                    code: close_code,
                    reason: "superseded by a newer connection".into(),
                })));
                true
            }
            None => false,
        };

        (id, superseded)
    }

    /// Removes the connection if it is still the current one for `participant`.
    /// Returns `false` when a newer connection already took over.
    pub fn detach(&self, participant: &ParticipantId, id: ConnectionId) -> bool {
        self.inner
            .connections
            .remove_if(participant, |_, conn| conn.id == id)
            .is_some()
    }

    pub fn is_connected(&self, participant: &ParticipantId) -> bool {
        self.inner.connections.contains_key(participant)
    }

    pub fn send_signal(&self, participant: &ParticipantId, msg: &SignalMessage) -> bool {
        let Some(conn) = self.inner.connections.get(participant) else {
            warn!(
                participant = %participant,
                kind = msg.kind(),
                "Attempted to send signal to disconnected participant"
            );
            return false;
        };

        match serde_json::to_string(msg) {
            Ok(json) => {
                if let Err(e) = conn.tx.send(Message::Text(json.into())) {
                    error!(participant = %participant, "Failed to queue WS message: {:?}", e);
                    return false;
                }
                true
            }
            Err(e) => {
                error!("Failed to serialize signal message: {}", e);
                false
            }
        }
    }
}

impl Default for SignalingService {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn deliver(&self, participant: &ParticipantId, message: SignalMessage) -> bool {
        self.send_signal(participant, &message)
    }
}
