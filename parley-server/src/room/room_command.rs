use crate::error::RegistryError;
use parley_core::{MediaState, ParticipantId, ParticipantInfo, SignalMessage};
use tokio::sync::oneshot;

/// Commands processed by a room actor, one at a time.
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a participant. The reply carries everyone already present, in arrival order.
    Join {
        participant: ParticipantId,
        media: MediaState,
        reply: oneshot::Sender<Result<Vec<ParticipantInfo>, RegistryError>>,
    },

    /// Remove a participant (explicit leave or lost connection).
    Leave {
        participant: ParticipantId,
        reason: Option<String>,
        reply: oneshot::Sender<()>,
    },

    /// Peer-directed message (offer, answer, candidate).
    Relay { message: SignalMessage },

    /// Fan a message out to everyone except its sender.
    Broadcast { message: SignalMessage },

    /// Store a participant's new media state and fan it out.
    UpdateMedia {
        participant: ParticipantId,
        media: MediaState,
    },

    Snapshot {
        reply: oneshot::Sender<Vec<ParticipantInfo>>,
    },
}
