mod media;
mod participant;
mod room;
mod signaling;

pub use media::{MediaState, ParticipantInfo, TrackKind};
pub use participant::ParticipantId;
pub use room::RoomId;
pub use signaling::{
    CLOSE_DELIBERATE, CLOSE_SUPERSEDED, CLOSE_UNAUTHORIZED, ErrorCode, IceCandidate,
    SignalBody, SignalMessage, is_deliberate_close,
};
