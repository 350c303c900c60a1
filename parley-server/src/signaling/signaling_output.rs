use async_trait::async_trait;
use parley_core::{ParticipantId, SignalMessage};

/// Outbound side of the relay: how a room reaches a participant's connection.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Queue `message` for `participant`. Returns `false` if the participant has no live connection.
    async fn deliver(&self, participant: &ParticipantId, message: SignalMessage) -> bool;
}
