use crate::media::{LocalTrack, LocalTrackSet};
use async_trait::async_trait;
use parley_core::{IceCandidate, ParticipantId, TrackKind};
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A track received from a remote participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
}

/// Reports from the peer-connection machinery.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendEvent {
    LocalCandidate(IceCandidate),
    Connected,
    Disconnected,
    RemoteTracks(Vec<RemoteTrack>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerEvent {
    pub participant: ParticipantId,
    /// Generation of the record the backend belongs to. Events of replaced records are stale.
    pub generation: u64,
    pub event: BackendEvent,
}

/// Where a backend reports its events, tagged with the owning record.
#[derive(Debug, Clone)]
pub struct PeerEventSink {
    participant: ParticipantId,
    generation: u64,
    tx: mpsc::UnboundedSender<PeerEvent>,
}

impl PeerEventSink {
    pub fn new(
        participant: ParticipantId,
        generation: u64,
        tx: mpsc::UnboundedSender<PeerEvent>,
    ) -> Self {
        Self {
            participant,
            generation,
            tx,
        }
    }

    pub fn participant(&self) -> &ParticipantId {
        &self.participant
    }

    /// Returns `false` once the session is gone.
    pub fn emit(&self, event: BackendEvent) -> bool {
        self.tx
            .send(PeerEvent {
                participant: self.participant.clone(),
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// The peer-connection machinery a manager drives.
#[async_trait]
pub trait PeerBackend: Send {
    /// Creates an offer and installs it as the local description.
    async fn create_offer(&mut self) -> anyhow::Result<String>;

    /// Applies a remote description. A remote offer over a pending local offer
    /// rolls the local one back first.
    async fn set_remote_description(&mut self, kind: SdpKind, sdp: String) -> anyhow::Result<()>;

    /// Creates an answer to the applied remote offer and installs it locally.
    async fn create_answer(&mut self) -> anyhow::Result<String>;

    async fn add_candidate(&mut self, candidate: IceCandidate) -> anyhow::Result<()>;

    async fn attach_tracks(&mut self, tracks: &LocalTrackSet) -> anyhow::Result<()>;

    /// Swaps the outgoing video source (camera <-> screen).
    async fn replace_video_track(&mut self, track: &LocalTrack) -> anyhow::Result<()>;

    async fn close(&mut self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait PeerBackendFactory: Send + Sync {
    async fn create(
        &self,
        remote: &ParticipantId,
        events: PeerEventSink,
    ) -> anyhow::Result<Box<dyn PeerBackend>>;
}
