use crate::error::MediaError;
use crate::peer::{PeerState, RemoteTrack};
use parley_core::{ErrorCode, MediaState, ParticipantId};

/// What the application observes from a running session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    ParticipantJoined {
        participant: ParticipantId,
        media: MediaState,
    },
    ParticipantLeft {
        participant: ParticipantId,
    },
    RemoteStreamAdded {
        participant: ParticipantId,
        tracks: Vec<RemoteTrack>,
    },
    ConnectionStateChanged {
        participant: ParticipantId,
        state: PeerState,
    },
    RemoteMediaStateChanged {
        participant: ParticipantId,
        media: MediaState,
    },
    /// The connection to this participant is gone; its record was removed.
    PeerFailed {
        participant: ParticipantId,
    },
    MediaError(MediaError),
    /// A message we relayed could not be delivered; the participant already left.
    TargetNotFound {
        participant: ParticipantId,
    },
    ServerError {
        code: ErrorCode,
        message: String,
    },
    /// Signaling is gone for good (reconnects exhausted or closed by the relay).
    /// The room has to be joined again.
    RejoinRequired {
        reason: String,
    },
}
