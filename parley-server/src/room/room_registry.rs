use crate::catalog::RoomCatalog;
use crate::error::RegistryError;
use crate::room::{Room, RoomCommand};
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use parley_core::{MediaState, ParticipantId, ParticipantInfo, RoomId, SignalMessage};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

const DEFAULT_QUEUE_CAPACITY: usize = 100;
const MAX_JOIN_ATTEMPTS: usize = 8;

/// Sender side of a running room actor. `generation` tells apart successive
/// actors created for the same room id.
#[derive(Clone)]
pub struct RoomHandle {
    pub(crate) tx: mpsc::Sender<RoomCommand>,
    pub(crate) generation: u64,
}

/// Server-side registry of live rooms.
///
/// Each room is an actor task; rooms are created on first join and remove
/// themselves when the last participant leaves. Different rooms run in parallel.
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<DashMap<RoomId, RoomHandle>>,
    signaling: Arc<dyn SignalingOutput>,
    catalog: Arc<dyn RoomCatalog>,
    next_generation: Arc<AtomicU64>,
    queue_capacity: usize,
}

impl RoomRegistry {
    pub fn new(signaling: Arc<dyn SignalingOutput>, catalog: Arc<dyn RoomCatalog>) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            signaling,
            catalog,
            next_generation: Arc::new(AtomicU64::new(1)),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    /// Joins `participant` to `room_id` and returns everyone who was already there.
    ///
    /// The joiner gets a `participant_list` and the others a `join` notification,
    /// both from the same room-actor step.
    pub async fn join(
        &self,
        room_id: &RoomId,
        participant: &ParticipantId,
        media: MediaState,
    ) -> Result<Vec<ParticipantInfo>, RegistryError> {
        if let Some(enrolled) = self.catalog.participants_of(room_id).await {
            if !enrolled.contains(participant) {
                warn!(room = %room_id, participant = %participant, "Join rejected: not enrolled");
                return Err(RegistryError::NotEnrolled {
                    room: room_id.to_string(),
                    participant: participant.to_string(),
                });
            }
        }

        for _ in 0..MAX_JOIN_ATTEMPTS {
            let handle = self.room_handle(room_id);
            let (reply, rx) = oneshot::channel();
            let cmd = RoomCommand::Join {
                participant: participant.clone(),
                media,
                reply,
            };

            if handle.tx.send(cmd).await.is_err() {
                self.forget(room_id, handle.generation);
                continue;
            }

            match rx.await {
                Ok(Ok(snapshot)) => return Ok(snapshot),
                Ok(Err(RegistryError::RoomClosed)) | Err(_) => {
                    debug!(room = %room_id, "Room closed while joining, retrying");
                    self.forget(room_id, handle.generation);
                }
                Ok(Err(e)) => return Err(e),
            }
        }

        Err(RegistryError::RoomClosed)
    }

    /// Removes `participant` from `room_id`. Unknown rooms and non-members are a no-op.
    pub async fn leave(&self, room_id: &RoomId, participant: &ParticipantId, reason: Option<String>) {
        let Some(handle) = self.existing(room_id) else {
            return;
        };
        let (reply, rx) = oneshot::channel();
        let cmd = RoomCommand::Leave {
            participant: participant.clone(),
            reason,
            reply,
        };
        if handle.tx.send(cmd).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Delivers a peer-directed message to `message.to_participant`.
    ///
    /// A target that already left is not an error for the caller: the room logs
    /// `TargetNotFound` and informs the sender.
    pub async fn relay(&self, message: SignalMessage) {
        let room_id = message.room_id.clone();
        match self.existing(&room_id) {
            Some(handle) => {
                if handle.tx.send(RoomCommand::Relay { message }).await.is_err() {
                    debug!(room = %room_id, "Relay dropped, room closed");
                }
            }
            None => self.reply_unknown_room(&message).await,
        }
    }

    /// Sends `message` to every member except `message.from_participant`.
    pub async fn broadcast(&self, message: SignalMessage) {
        let room_id = message.room_id.clone();
        match self.existing(&room_id) {
            Some(handle) => {
                let _ = handle.tx.send(RoomCommand::Broadcast { message }).await;
            }
            None => self.reply_unknown_room(&message).await,
        }
    }

    pub async fn update_media(&self, room_id: &RoomId, participant: &ParticipantId, media: MediaState) {
        let Some(handle) = self.existing(room_id) else {
            return;
        };
        let cmd = RoomCommand::UpdateMedia {
            participant: participant.clone(),
            media,
        };
        let _ = handle.tx.send(cmd).await;
    }

    /// Current members of a room, or `None` if the room does not exist.
    pub async fn snapshot(&self, room_id: &RoomId) -> Option<Vec<ParticipantInfo>> {
        let handle = self.existing(room_id)?;
        let (reply, rx) = oneshot::channel();
        handle.tx.send(RoomCommand::Snapshot { reply }).await.ok()?;
        rx.await.ok()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    fn existing(&self, room_id: &RoomId) -> Option<RoomHandle> {
        self.rooms.get(room_id).map(|entry| entry.value().clone())
    }

    fn room_handle(&self, room_id: &RoomId) -> RoomHandle {
        self.rooms
            .entry(room_id.clone())
            .or_insert_with(|| {
                let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
                info!(room = %room_id, generation, "Creating new room");

                let (tx, rx) = mpsc::channel(self.queue_capacity);
                let room = Room::new(
                    room_id.clone(),
                    generation,
                    rx,
                    self.rooms.clone(),
                    self.signaling.clone(),
                );
                tokio::spawn(room.run());

                RoomHandle { tx, generation }
            })
            .value()
            .clone()
    }

    fn forget(&self, room_id: &RoomId, generation: u64) {
        self.rooms
            .remove_if(room_id, |_, handle| handle.generation == generation);
    }

    async fn reply_unknown_room(&self, message: &SignalMessage) {
        warn!(room = %message.room_id, from = %message.from_participant, kind = message.kind(), "Message for unknown room");
        let error = SignalMessage::error(
            message.room_id.clone(),
            parley_core::ErrorCode::NotInRoom,
            "room does not exist",
        )
        .to(message.from_participant.clone());
        self.signaling.deliver(&message.from_participant, error).await;
    }
}
