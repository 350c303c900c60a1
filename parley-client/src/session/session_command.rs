use crate::error::SessionError;
use crate::peer::PeerState;
use parley_core::{MediaState, ParticipantId, RoomId};
use tokio::sync::oneshot;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    ToggleVideo,
    ToggleAudio,
    StartScreenShare,
    StopScreenShare,
    StartRecording,
    StopRecording,
}

/// Requests from a [`crate::Session`] handle to its actor.
#[derive(Debug)]
pub(crate) enum SessionCommand {
    Join {
        room: RoomId,
        participant: ParticipantId,
        auth_token: Option<String>,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },

    Leave {
        reply: oneshot::Sender<()>,
    },

    Media {
        action: MediaAction,
        reply: oneshot::Sender<Result<MediaState, SessionError>>,
    },

    PeerState {
        participant: ParticipantId,
        reply: oneshot::Sender<Option<PeerState>>,
    },

    Peers {
        reply: oneshot::Sender<Vec<(ParticipantId, PeerState)>>,
    },

    /// Leave, then close the signaling channel and stop the actor.
    Close {
        reply: oneshot::Sender<()>,
    },
}
