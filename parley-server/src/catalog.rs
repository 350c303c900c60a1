use anyhow::{Context, Result};
use async_trait::async_trait;
use parley_core::{ParticipantId, RoomId};
use std::collections::HashMap;
use std::path::Path;

/// Source of participant identities per room (course enrollment).
#[async_trait]
pub trait RoomCatalog: Send + Sync {
    /// `None` means the room is open to any authenticated participant.
    async fn participants_of(&self, room_id: &RoomId) -> Option<Vec<ParticipantId>>;
}

/// Every room is open.
#[derive(Debug, Default, Clone)]
pub struct OpenCatalog;

#[async_trait]
impl RoomCatalog for OpenCatalog {
    async fn participants_of(&self, _room_id: &RoomId) -> Option<Vec<ParticipantId>> {
        None
    }
}

/// Fixed enrollment table. Rooms missing from the table are open.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    rooms: HashMap<RoomId, Vec<ParticipantId>>,
}

impl StaticCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_room<I, P>(mut self, room_id: impl Into<RoomId>, participants: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<ParticipantId>,
    {
        self.rooms.insert(
            room_id.into(),
            participants.into_iter().map(Into::into).collect(),
        );
        self
    }

    /// Loads `{ "room": ["participant", ...], ... }`.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read enrollment file {}", path.display()))?;
        let rooms: HashMap<RoomId, Vec<ParticipantId>> =
            serde_json::from_str(&raw).context("Failed to parse enrollment file")?;
        Ok(Self { rooms })
    }
}

#[async_trait]
impl RoomCatalog for StaticCatalog {
    async fn participants_of(&self, room_id: &RoomId) -> Option<Vec<ParticipantId>> {
        self.rooms.get(room_id).cloned()
    }
}
