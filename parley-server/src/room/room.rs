use crate::error::RegistryError;
use crate::room::room_command::RoomCommand;
use crate::room::room_registry::RoomHandle;
use crate::signaling::SignalingOutput;
use dashmap::DashMap;
use parley_core::{
    ErrorCode, MediaState, ParticipantId, ParticipantInfo, RoomId, SignalBody, SignalMessage,
};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct Participant {
    id: ParticipantId,
    media: MediaState,
}

/// Room actor.
/// Owns the membership of a single room; every mutation goes through its command queue,
/// so joins and leaves in one room are totally ordered.
pub struct Room {
    id: RoomId,
    generation: u64,

    /// Members in arrival order.
    participants: Vec<Participant>,

    command_rx: mpsc::Receiver<RoomCommand>,

    /// Registry map the actor removes itself from once empty.
    rooms: Arc<DashMap<RoomId, RoomHandle>>,

    signaling: Arc<dyn SignalingOutput>,

    closing: bool,
}

impl Room {
    pub(crate) fn new(
        id: RoomId,
        generation: u64,
        command_rx: mpsc::Receiver<RoomCommand>,
        rooms: Arc<DashMap<RoomId, RoomHandle>>,
        signaling: Arc<dyn SignalingOutput>,
    ) -> Self {
        Self {
            id,
            generation,
            participants: Vec::new(),
            command_rx,
            rooms,
            signaling,
            closing: false,
        }
    }

    /// Event loop of the room. Must be spawned with `tokio::spawn`.
    pub async fn run(mut self) {
        info!(room = %self.id, "Room event loop started");

        while let Some(cmd) = self.command_rx.recv().await {
            self.handle_command(cmd).await;

            if self.participants.is_empty() && !self.closing {
                self.begin_shutdown();
            }
        }

        info!(room = %self.id, "Room event loop finished");
    }

    /// Unregisters the room and stops accepting commands. Commands already queued
    /// are still drained; joins among them are bounced with `RoomClosed`.
    fn begin_shutdown(&mut self) {
        self.closing = true;
        let generation = self.generation;
        self.rooms
            .remove_if(&self.id, |_, handle| handle.generation == generation);
        self.command_rx.close();
        debug!(room = %self.id, "Room is empty, shutting down");
    }

    async fn handle_command(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                participant,
                media,
                reply,
            } => {
                if self.closing {
                    let _ = reply.send(Err(RegistryError::RoomClosed));
                    return;
                }
                let snapshot = self.join(participant, media).await;
                let _ = reply.send(Ok(snapshot));
            }

            RoomCommand::Leave {
                participant,
                reason,
                reply,
            } => {
                self.leave(&participant, reason).await;
                let _ = reply.send(());
            }

            RoomCommand::Relay { message } => self.relay(message).await,

            RoomCommand::Broadcast { message } => {
                if !self.require_member(&message.from_participant).await {
                    return;
                }
                self.broadcast(&message).await;
            }

            RoomCommand::UpdateMedia { participant, media } => {
                if !self.require_member(&participant).await {
                    return;
                }
                if let Some(p) = self.participants.iter_mut().find(|p| p.id == participant) {
                    p.media = media;
                }
                let message = SignalMessage::new(
                    self.id.clone(),
                    participant,
                    SignalBody::MediaStateChanged { media },
                );
                self.broadcast(&message).await;
            }

            RoomCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot_excluding(None));
            }
        }
    }

    async fn join(&mut self, participant: ParticipantId, media: MediaState) -> Vec<ParticipantInfo> {
        let snapshot = self.snapshot_excluding(Some(&participant));

        let resumed = match self.participants.iter_mut().find(|p| p.id == participant) {
            Some(existing) => {
                // Signaling reconnect: the others still consider this participant present.
                existing.media = media;
                true
            }
            None => {
                self.participants.push(Participant {
                    id: participant.clone(),
                    media,
                });
                false
            }
        };

        info!(
            room = %self.id,
            participant = %participant,
            existing = snapshot.len(),
            resumed,
            "Participant joined"
        );

        // The list goes out before any broadcast so the joiner sees it first.
        let list = SignalMessage::new(
            self.id.clone(),
            ParticipantId::default(),
            SignalBody::ParticipantList {
                participants: snapshot.clone(),
                resumed,
            },
        )
        .to(participant.clone());
        self.signaling.deliver(&participant, list).await;

        if !resumed {
            let joined = SignalMessage::new(self.id.clone(), participant, SignalBody::Join { media });
            self.broadcast(&joined).await;
        }

        snapshot
    }

    async fn leave(&mut self, participant: &ParticipantId, reason: Option<String>) {
        let Some(index) = self.participants.iter().position(|p| &p.id == participant) else {
            debug!(room = %self.id, participant = %participant, "Leave for non-member ignored");
            return;
        };
        self.participants.remove(index);

        info!(
            room = %self.id,
            participant = %participant,
            remaining = self.participants.len(),
            "Participant left"
        );

        let left = SignalMessage::new(
            self.id.clone(),
            participant.clone(),
            SignalBody::Leave { reason },
        );
        self.broadcast(&left).await;
    }

    async fn relay(&mut self, message: SignalMessage) {
        let sender = message.from_participant.clone();
        if !self.require_member(&sender).await {
            return;
        }

        let Some(target) = message.to_participant.clone() else {
            self.reply_error(&sender, ErrorCode::BadRequest, None, "relay without target")
                .await;
            return;
        };

        if !self.is_member(&target) {
            warn!(
                room = %self.id,
                from = %sender,
                to = %target,
                kind = message.kind(),
                "TargetNotFound: relay target is not in the room"
            );
            self.reply_error(
                &sender,
                ErrorCode::TargetNotFound,
                Some(target),
                "target is not in the room",
            )
            .await;
            return;
        }

        debug!(room = %self.id, from = %sender, to = %target, kind = message.kind(), "Relaying");
        self.signaling.deliver(&target, message).await;
    }

    async fn broadcast(&self, message: &SignalMessage) {
        for p in self
            .participants
            .iter()
            .filter(|p| p.id != message.from_participant)
        {
            let outgoing = message.clone().to(p.id.clone());
            self.signaling.deliver(&p.id, outgoing).await;
        }
    }

    async fn require_member(&self, participant: &ParticipantId) -> bool {
        if self.is_member(participant) {
            return true;
        }
        warn!(room = %self.id, participant = %participant, "Message from non-member rejected");
        self.reply_error(participant, ErrorCode::NotInRoom, None, "not a member of this room")
            .await;
        false
    }

    /// Errors about a specific participant name it in `fromParticipant`.
    async fn reply_error(
        &self,
        to: &ParticipantId,
        code: ErrorCode,
        about: Option<ParticipantId>,
        message: &str,
    ) {
        let mut error = SignalMessage::error(self.id.clone(), code, message).to(to.clone());
        if let Some(about) = about {
            error.from_participant = about;
        }
        self.signaling.deliver(to, error).await;
    }

    fn is_member(&self, participant: &ParticipantId) -> bool {
        self.participants.iter().any(|p| &p.id == participant)
    }

    fn snapshot_excluding(&self, excluded: Option<&ParticipantId>) -> Vec<ParticipantInfo> {
        self.participants
            .iter()
            .filter(|p| Some(&p.id) != excluded)
            .map(|p| ParticipantInfo {
                participant_id: p.id.clone(),
                media: p.media,
            })
            .collect()
    }
}
