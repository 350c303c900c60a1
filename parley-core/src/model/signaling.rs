use crate::model::media::{MediaState, ParticipantInfo};
use crate::model::participant::ParticipantId;
use crate::model::room::RoomId;
use serde::{Deserialize, Serialize};

/// Close code used when the relay ends a connection on purpose (shutdown, kick).
pub const CLOSE_DELIBERATE: u16 = 4000;
/// A newer connection of the same participant replaced this one.
pub const CLOSE_SUPERSEDED: u16 = 4001;
/// The auth token presented at connect time was rejected.
pub const CLOSE_UNAUTHORIZED: u16 = 4003;

/// Close codes in the 4000-4099 range are issued deliberately by the relay.
/// Clients must not reconnect after one of them.
pub fn is_deliberate_close(code: u16) -> bool {
    (4000..4100).contains(&code)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_m_line_index: Option<u16>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Relay target already left the room. Informational only.
    TargetNotFound,
    NotInRoom,
    NotEnrolled,
    BadRequest,
    RoomClosed,
}

/// Kind-specific part of a signaling envelope, serialized as
/// `"type": ..., "payload": {...}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum SignalBody {
    /// Client -> relay: request membership. Relay -> others: someone joined.
    Join { media: MediaState },
    /// Relay -> joiner: everyone already in the room, in arrival order.
    /// `resumed` is set when the joiner was still a member (signaling reconnect)
    /// and the others kept their connections to it.
    ParticipantList {
        participants: Vec<ParticipantInfo>,
        #[serde(default)]
        resumed: bool,
    },
    Offer { sdp: String },
    Answer { sdp: String },
    Candidate(IceCandidate),
    MediaStateChanged { media: MediaState },
    Leave {
        #[serde(default)]
        reason: Option<String>,
    },
    Error { code: ErrorCode, message: String },
}

impl SignalBody {
    pub fn kind(&self) -> &'static str {
        match self {
            SignalBody::Join { .. } => "join",
            SignalBody::ParticipantList { .. } => "participant_list",
            SignalBody::Offer { .. } => "offer",
            SignalBody::Answer { .. } => "answer",
            SignalBody::Candidate(_) => "candidate",
            SignalBody::MediaStateChanged { .. } => "media_state_changed",
            SignalBody::Leave { .. } => "leave",
            SignalBody::Error { .. } => "error",
        }
    }

    /// Offers, answers and candidates are addressed to a single participant.
    pub fn is_peer_directed(&self) -> bool {
        matches!(
            self,
            SignalBody::Offer { .. } | SignalBody::Answer { .. } | SignalBody::Candidate(_)
        )
    }
}

/// Envelope exchanged over the signaling channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalMessage {
    pub room_id: RoomId,
    #[serde(default)]
    pub from_participant: ParticipantId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_participant: Option<ParticipantId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(flatten)]
    pub body: SignalBody,
}

impl SignalMessage {
    pub fn new(room_id: RoomId, from: ParticipantId, body: SignalBody) -> Self {
        Self {
            room_id,
            from_participant: from,
            to_participant: None,
            seq: None,
            body,
        }
    }

    pub fn to(mut self, participant: ParticipantId) -> Self {
        self.to_participant = Some(participant);
        self
    }

    pub fn with_seq(mut self, seq: u64) -> Self {
        self.seq = Some(seq);
        self
    }

    pub fn error(room_id: RoomId, code: ErrorCode, message: impl Into<String>) -> Self {
        Self::new(
            room_id,
            ParticipantId::default(),
            SignalBody::Error {
                code,
                message: message.into(),
            },
        )
    }

    pub fn kind(&self) -> &'static str {
        self.body.kind()
    }
}
