use crate::model::participant::ParticipantId;
use serde::{Deserialize, Serialize};

/// Capture state a participant advertises to the rest of the room.
///
/// `recording` has no effect on the media pipeline; it is carried so that
/// observers can render a recording indicator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaState {
    pub video_enabled: bool,
    pub audio_enabled: bool,
    pub screen_sharing: bool,
    #[serde(default)]
    pub recording: bool,
}

impl Default for MediaState {
    fn default() -> Self {
        Self {
            video_enabled: true,
            audio_enabled: true,
            screen_sharing: false,
            recording: false,
        }
    }
}

/// Entry of a `participant_list` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantInfo {
    pub participant_id: ParticipantId,
    pub media: MediaState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackKind {
    Audio,
    Video,
    Screen,
}
