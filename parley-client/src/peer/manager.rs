use crate::error::PeerError;
use crate::media::{LocalTrack, LocalTrackSet};
use crate::peer::backend::{PeerBackend, SdpKind};
use crate::peer::state::{NegotiationRole, PeerState};
use parley_core::{IceCandidate, MediaState, ParticipantId, RoomId, SignalBody, SignalMessage};
use std::collections::VecDeque;
use tracing::{debug, info, warn};

/// Result of feeding a remote offer to a record.
#[derive(Debug, Clone, PartialEq)]
pub enum OfferOutcome {
    /// Send this answer, then call [`PeerConnectionManager::mark_answer_sent`].
    Answer(SignalMessage),
    /// Glare that we win: our own offer stands and the remote one is ignored.
    Ignored,
}

/// Connection record for one remote participant.
///
/// Owns the negotiation state machine and the backend. It never sends anything
/// itself: outgoing offers and answers are returned to the caller.
pub struct PeerConnectionManager {
    room: RoomId,
    local: ParticipantId,
    remote: ParticipantId,
    generation: u64,
    role: NegotiationRole,
    state: PeerState,
    backend: Box<dyn PeerBackend>,

    /// Candidates that arrived before any remote description, in arrival order.
    pending_candidates: VecDeque<IceCandidate>,
    remote_description_set: bool,

    /// `seq` of the latest offer we sent.
    local_seq: u64,
    /// Highest remote offer `seq` accepted.
    remote_seq: u64,
    awaiting_answer: bool,

    transport_connected: bool,

    /// Bumped on every state change; grace timers compare against it.
    epoch: u64,
    /// Bumped whenever an offer/answer cycle starts; negotiation timers compare against it.
    negotiation: u64,

    remote_media: Option<MediaState>,
}

impl PeerConnectionManager {
    pub fn new(
        room: RoomId,
        local: ParticipantId,
        remote: ParticipantId,
        generation: u64,
        role: NegotiationRole,
        backend: Box<dyn PeerBackend>,
    ) -> Self {
        Self {
            room,
            local,
            remote,
            generation,
            role,
            state: PeerState::New,
            backend,
            pending_candidates: VecDeque::new(),
            remote_description_set: false,
            local_seq: 0,
            remote_seq: 0,
            awaiting_answer: false,
            transport_connected: false,
            epoch: 0,
            negotiation: 0,
            remote_media: None,
        }
    }

    pub fn remote(&self) -> &ParticipantId {
        &self.remote
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> PeerState {
        self.state
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn negotiation(&self) -> u64 {
        self.negotiation
    }

    pub fn local_seq(&self) -> u64 {
        self.local_seq
    }

    pub fn remote_seq(&self) -> u64 {
        self.remote_seq
    }

    pub fn pending_candidates(&self) -> usize {
        self.pending_candidates.len()
    }

    pub fn remote_media(&self) -> Option<MediaState> {
        self.remote_media
    }

    pub fn set_remote_media(&mut self, media: MediaState) {
        self.remote_media = Some(media);
    }

    /// `New -> OfferSent`.
    pub async fn start_offer(&mut self) -> Result<SignalMessage, PeerError> {
        self.ensure(PeerState::OfferSent)?;

        let sdp = self.backend.create_offer().await?;
        self.local_seq += 1;
        self.awaiting_answer = true;
        self.negotiation += 1;
        self.transition(PeerState::OfferSent)?;

        Ok(self.signal(SignalBody::Offer { sdp }).with_seq(self.local_seq))
    }

    /// Applies a remote offer: initial (`New -> AnswerSent`), renegotiation
    /// (`Connected -> Connecting`) or glare (`OfferSent -> AnswerSent` when we lose).
    /// While `Disconnected` the offer is answered without a state change; the
    /// transport coming back or the grace timer decides what happens next.
    pub async fn handle_offer(
        &mut self,
        sdp: String,
        seq: Option<u64>,
    ) -> Result<OfferOutcome, PeerError> {
        let seq = seq.unwrap_or(self.remote_seq + 1);
        if seq <= self.remote_seq {
            return Err(PeerError::NegotiationStale {
                received: seq,
                expected: self.remote_seq + 1,
            });
        }

        if self.awaiting_answer {
            if self.local < self.remote {
                info!(local = %self.local, remote = %self.remote, "Glare: keeping our offer");
                return Ok(OfferOutcome::Ignored);
            }
            info!(local = %self.local, remote = %self.remote, "Glare: yielding to remote offer");
        }

        let next = match self.state {
            PeerState::New | PeerState::OfferSent => PeerState::AnswerSent,
            PeerState::Connecting | PeerState::Connected => PeerState::Connecting,
            PeerState::Disconnected => PeerState::Disconnected,
            from => {
                return Err(PeerError::InvalidTransition {
                    from,
                    to: PeerState::AnswerSent,
                });
            }
        };
        if next != self.state {
            self.ensure(next)?;
        }

        self.backend
            .set_remote_description(SdpKind::Offer, sdp)
            .await?;
        self.remote_seq = seq;
        self.awaiting_answer = false;
        self.remote_description_set = true;
        self.flush_candidates().await;

        let answer = self.backend.create_answer().await?;

        if next == PeerState::AnswerSent {
            self.role = NegotiationRole::Responder;
        }
        if next != self.state {
            self.transition(next)?;
        }
        self.negotiation += 1;

        Ok(OfferOutcome::Answer(
            self.signal(SignalBody::Answer { sdp: answer }).with_seq(seq),
        ))
    }

    /// `AnswerSent -> Connecting`, and on to `Connected` if the transport is already up.
    pub fn mark_answer_sent(&mut self) -> Result<(), PeerError> {
        if self.state == PeerState::AnswerSent {
            self.transition(PeerState::Connecting)?;
        }
        self.settle_if_connected()
    }

    /// Applies the answer to our latest offer. Answers to older offers are stale.
    /// An answer landing while `Disconnected` is applied without a state change.
    pub async fn handle_answer(&mut self, sdp: String, seq: Option<u64>) -> Result<(), PeerError> {
        let seq = seq.unwrap_or(self.local_seq);
        if !self.awaiting_answer || seq != self.local_seq {
            return Err(PeerError::NegotiationStale {
                received: seq,
                expected: self.local_seq,
            });
        }

        match self.state {
            PeerState::OfferSent => self.ensure(PeerState::Connecting)?,
            PeerState::Connecting | PeerState::Connected | PeerState::Disconnected => {}
            from => {
                return Err(PeerError::InvalidTransition {
                    from,
                    to: PeerState::Connecting,
                });
            }
        }

        self.backend
            .set_remote_description(SdpKind::Answer, sdp)
            .await?;
        self.awaiting_answer = false;
        self.remote_description_set = true;
        self.flush_candidates().await;

        if self.state == PeerState::OfferSent {
            self.transition(PeerState::Connecting)?;
        }
        self.settle_if_connected()
    }

    /// Queues the candidate until a remote description exists, else applies it.
    pub async fn handle_candidate(&mut self, candidate: IceCandidate) -> Result<(), PeerError> {
        if self.state.is_terminal() {
            return Ok(());
        }

        if !self.remote_description_set {
            debug!(remote = %self.remote, queued = self.pending_candidates.len() + 1, "Queueing early candidate");
            self.pending_candidates.push_back(candidate);
            return Ok(());
        }

        self.backend.add_candidate(candidate).await?;
        Ok(())
    }

    /// Returns `true` if the record moved to `Connected`.
    pub fn on_transport_connected(&mut self) -> Result<bool, PeerError> {
        self.transport_connected = true;

        match self.state {
            PeerState::Disconnected => {
                self.transition(PeerState::Connected)?;
                Ok(true)
            }
            PeerState::Connecting if !self.awaiting_answer => {
                self.transition(PeerState::Connected)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Returns `true` if the record moved to `Disconnected`; the caller starts the grace timer.
    pub fn on_transport_disconnected(&mut self) -> Result<bool, PeerError> {
        self.transport_connected = false;

        match self.state {
            PeerState::Connecting | PeerState::Connected => {
                self.transition(PeerState::Disconnected)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Grace timer fired. Returns `true` if the record failed; stale timers do nothing.
    pub fn grace_elapsed(&mut self, epoch: u64) -> bool {
        if epoch != self.epoch || self.state != PeerState::Disconnected {
            return false;
        }
        match self.transition(PeerState::Failed) {
            Ok(()) => true,
            Err(e) => {
                debug!(remote = %self.remote, "Grace expiry ignored: {}", e);
                false
            }
        }
    }

    /// Negotiation timer fired. A stuck renegotiation on a live transport falls
    /// back to `Connected`; anything else fails.
    pub fn negotiation_timed_out(&mut self, negotiation: u64) -> Option<PeerState> {
        if negotiation != self.negotiation || !self.state.is_negotiating() {
            return None;
        }

        self.awaiting_answer = false;
        let next = if self.state == PeerState::Connecting && self.transport_connected {
            PeerState::Connected
        } else {
            PeerState::Failed
        };

        warn!(remote = %self.remote, from = ?self.state, to = ?next, "Negotiation timed out");
        self.transition(next).ok().map(|_| next)
    }

    /// Starts a new offer/answer cycle on this same record. Only from `Connected`.
    pub async fn renegotiate(&mut self) -> Result<SignalMessage, PeerError> {
        if self.state != PeerState::Connected {
            return Err(PeerError::InvalidTransition {
                from: self.state,
                to: PeerState::Connecting,
            });
        }

        let sdp = self.backend.create_offer().await?;
        self.local_seq += 1;
        self.awaiting_answer = true;
        self.negotiation += 1;
        self.transition(PeerState::Connecting)?;

        Ok(self.signal(SignalBody::Offer { sdp }).with_seq(self.local_seq))
    }

    pub async fn attach_tracks(&mut self, tracks: &LocalTrackSet) -> Result<(), PeerError> {
        self.backend.attach_tracks(tracks).await?;
        Ok(())
    }

    pub async fn replace_video_track(&mut self, track: &LocalTrack) -> Result<(), PeerError> {
        self.backend.replace_video_track(track).await?;
        Ok(())
    }

    /// Tears the record down. Returns `false` if it was already closed.
    pub async fn close(&mut self) -> bool {
        if self.state == PeerState::Closed {
            return false;
        }

        if let Err(e) = self.backend.close().await {
            warn!(remote = %self.remote, "Failed to close peer connection: {:#}", e);
        }
        self.pending_candidates.clear();
        self.awaiting_answer = false;
        let _ = self.transition(PeerState::Closed);
        true
    }

    async fn flush_candidates(&mut self) {
        if !self.pending_candidates.is_empty() {
            debug!(remote = %self.remote, count = self.pending_candidates.len(), "Flushing queued candidates");
        }
        while let Some(candidate) = self.pending_candidates.pop_front() {
            if let Err(e) = self.backend.add_candidate(candidate).await {
                warn!(remote = %self.remote, "Failed to apply queued candidate: {:#}", e);
            }
        }
    }

    fn settle_if_connected(&mut self) -> Result<(), PeerError> {
        if self.state == PeerState::Connecting && self.transport_connected && !self.awaiting_answer {
            self.transition(PeerState::Connected)?;
        }
        Ok(())
    }

    fn ensure(&self, next: PeerState) -> Result<(), PeerError> {
        if self.state.can_transition_to(next) {
            Ok(())
        } else {
            Err(PeerError::InvalidTransition {
                from: self.state,
                to: next,
            })
        }
    }

    fn transition(&mut self, next: PeerState) -> Result<(), PeerError> {
        self.ensure(next)?;
        debug!(room = %self.room, remote = %self.remote, from = ?self.state, to = ?next, "Peer state");
        self.state = next;
        self.epoch += 1;
        Ok(())
    }

    fn signal(&self, body: SignalBody) -> SignalMessage {
        SignalMessage::new(self.room.clone(), self.local.clone(), body).to(self.remote.clone())
    }
}
