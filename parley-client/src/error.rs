use crate::peer::PeerState;
use parley_core::RoomId;
use thiserror::Error;

/// Transport-level failure. Drives the reconnect policy; not surfaced per message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    #[error("failed to open signaling transport: {0}")]
    Open(String),

    #[error("signaling channel is closed")]
    Closed,
}

/// The first connection attempt failed; nothing is retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("initial signaling connection failed: {0}")]
pub struct ConnectError(#[from] pub ChannelError);

#[derive(Debug, Error)]
pub enum PeerError {
    #[error("invalid peer transition {from:?} -> {to:?}")]
    InvalidTransition { from: PeerState, to: PeerState },

    /// Out-of-order negotiation message; dropped by the caller.
    #[error("stale negotiation message: seq {received}, expected {expected}")]
    NegotiationStale { received: u64, expected: u64 },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MediaError {
    #[error("media acquisition failed: {0}")]
    AcquisitionFailed(String),

    #[error("screen capture failed: {0}")]
    ScreenCaptureFailed(String),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("already joined room {0}")]
    AlreadyJoined(RoomId),

    #[error("not in a room")]
    NotJoined,

    #[error("session is closed")]
    Closed,
}
