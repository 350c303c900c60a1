use crate::channel::SignalingTransport;
use crate::config::ClientConfig;
use crate::error::SessionError;
use crate::media::{MediaCapability, MediaStateController};
use crate::peer::{PeerBackendFactory, PeerState};
use crate::session::session_actor::SessionActor;
use crate::session::session_command::{MediaAction, SessionCommand};
use crate::session::session_event::SessionEvent;
use parley_core::{MediaState, ParticipantId, RoomId};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};

/// Handle to a running session.
///
/// Every call is a message to the session actor; handles are cheap to clone.
/// Once every handle is dropped the actor leaves the room and stops.
#[derive(Clone)]
pub struct Session {
    tx: mpsc::UnboundedSender<SessionCommand>,
}

impl Session {
    /// Spawns the session actor. Must be called from within a tokio runtime.
    pub fn start(
        config: ClientConfig,
        transport: Arc<dyn SignalingTransport>,
        backends: Arc<dyn PeerBackendFactory>,
        media: Box<dyn MediaCapability>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        let actor = SessionActor::new(
            config,
            transport,
            backends,
            MediaStateController::new(media),
            rx,
            event_tx,
        );
        tokio::spawn(actor.run());

        (Self { tx }, event_rx)
    }

    /// Acquires media, connects signaling if needed and sends `join`.
    ///
    /// Returns once the join is on its way; the participant list and peer
    /// connections follow as [`SessionEvent`]s.
    pub async fn join_room(
        &self,
        room: RoomId,
        participant: ParticipantId,
        auth_token: Option<String>,
    ) -> Result<(), SessionError> {
        self.request(|reply| SessionCommand::Join {
            room,
            participant,
            auth_token,
            reply,
        })
        .await?
    }

    /// Closes every peer connection, sends `leave` and releases media.
    /// Safe to call at any time, repeatedly.
    pub async fn leave_room(&self) {
        let _ = self.request(|reply| SessionCommand::Leave { reply }).await;
    }

    pub async fn toggle_video(&self) -> Result<MediaState, SessionError> {
        self.media(MediaAction::ToggleVideo).await
    }

    pub async fn toggle_audio(&self) -> Result<MediaState, SessionError> {
        self.media(MediaAction::ToggleAudio).await
    }

    /// Swaps the outgoing video for a screen capture and renegotiates live peers.
    pub async fn start_screen_share(&self) -> Result<MediaState, SessionError> {
        self.media(MediaAction::StartScreenShare).await
    }

    pub async fn stop_screen_share(&self) -> Result<MediaState, SessionError> {
        self.media(MediaAction::StopScreenShare).await
    }

    pub async fn start_recording(&self) -> Result<MediaState, SessionError> {
        self.media(MediaAction::StartRecording).await
    }

    pub async fn stop_recording(&self) -> Result<MediaState, SessionError> {
        self.media(MediaAction::StopRecording).await
    }

    pub async fn peer_state(&self, participant: &ParticipantId) -> Option<PeerState> {
        self.request(|reply| SessionCommand::PeerState {
            participant: participant.clone(),
            reply,
        })
        .await
        .ok()
        .flatten()
    }

    /// Every live record with its state, ordered by participant id.
    pub async fn peers(&self) -> Vec<(ParticipantId, PeerState)> {
        self.request(|reply| SessionCommand::Peers { reply })
            .await
            .unwrap_or_default()
    }

    /// Leaves the room, closes the signaling channel and stops the actor.
    pub async fn close(&self) {
        let _ = self.request(|reply| SessionCommand::Close { reply }).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    async fn media(&self, action: MediaAction) -> Result<MediaState, SessionError> {
        self.request(|reply| SessionCommand::Media { action, reply })
            .await?
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> Result<T, SessionError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .map_err(|_| SessionError::Closed)?;
        rx.await.map_err(|_| SessionError::Closed)
    }
}
