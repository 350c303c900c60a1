use crate::channel::{ChannelEvent, SignalingChannel, SignalingTransport};
use crate::config::ClientConfig;
use crate::error::{PeerError, SessionError};
use crate::media::MediaStateController;
use crate::peer::{
    BackendEvent, NegotiationRole, OfferOutcome, PeerBackendFactory, PeerConnectionManager,
    PeerEvent, PeerEventSink, PeerState,
};
use crate::session::pending_candidates::PendingCandidates;
use crate::session::session_command::{MediaAction, SessionCommand};
use crate::session::session_event::SessionEvent;
use crate::session::timers::{Expired, Timer, Timers};
use parley_core::{
    ErrorCode, IceCandidate, MediaState, ParticipantId, ParticipantInfo, RoomId, SignalBody,
    SignalMessage,
};
use std::collections::{HashMap, HashSet};
use std::future::pending;
use std::ops::ControlFlow;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

struct Membership {
    room: RoomId,
    local: ParticipantId,
}

/// Session actor.
/// Owns the signaling subscription, every peer record, the candidate buffer,
/// the media controller and the timers. All of them are only touched from
/// [`SessionActor::run`], so records are never mutated concurrently.
pub(crate) struct SessionActor {
    config: ClientConfig,
    transport: Arc<dyn SignalingTransport>,
    backends: Arc<dyn PeerBackendFactory>,
    media: MediaStateController,

    commands: mpsc::UnboundedReceiver<SessionCommand>,
    events: mpsc::UnboundedSender<SessionEvent>,

    channel: Option<SignalingChannel>,
    channel_events: Option<mpsc::UnboundedReceiver<ChannelEvent>>,
    membership: Option<Membership>,

    peers: HashMap<ParticipantId, PeerConnectionManager>,
    next_generation: u64,
    peer_tx: mpsc::UnboundedSender<PeerEvent>,
    peer_rx: mpsc::UnboundedReceiver<PeerEvent>,

    pending: PendingCandidates,
    timers: Timers,
    timer_rx: mpsc::UnboundedReceiver<Expired>,
}

impl SessionActor {
    pub fn new(
        config: ClientConfig,
        transport: Arc<dyn SignalingTransport>,
        backends: Arc<dyn PeerBackendFactory>,
        media: MediaStateController,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        let (peer_tx, peer_rx) = mpsc::unbounded_channel();
        let (timers, timer_rx) = Timers::new();

        Self {
            config,
            transport,
            backends,
            media,
            commands,
            events,
            channel: None,
            channel_events: None,
            membership: None,
            peers: HashMap::new(),
            next_generation: 0,
            peer_tx,
            peer_rx,
            pending: PendingCandidates::default(),
            timers,
            timer_rx,
        }
    }

    /// Event loop of the session. Must be spawned with `tokio::spawn`.
    pub async fn run(mut self) {
        debug!("Session event loop started");

        loop {
            tokio::select! {
                cmd = self.commands.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        self.shutdown().await;
                        break;
                    }
                },

                event = next_channel_event(&mut self.channel_events) => match event {
                    Some(event) => self.handle_channel_event(event).await,
                    None => self.channel_events = None,
                },

                Some(event) = self.peer_rx.recv() => self.handle_peer_event(event).await,

                Some(expired) = self.timer_rx.recv() => {
                    if let Some(timer) = self.timers.expired(expired) {
                        self.handle_timer(timer).await;
                    }
                }
            }
        }

        debug!("Session event loop finished");
    }

    async fn handle_command(&mut self, cmd: SessionCommand) -> ControlFlow<()> {
        match cmd {
            SessionCommand::Join {
                room,
                participant,
                auth_token,
                reply,
            } => {
                let result = self.join(room, participant, auth_token).await;
                let _ = reply.send(result);
            }

            SessionCommand::Leave { reply } => {
                self.leave().await;
                let _ = reply.send(());
            }

            SessionCommand::Media { action, reply } => {
                let result = self.apply_media(action).await;
                let _ = reply.send(result);
            }

            SessionCommand::PeerState { participant, reply } => {
                let _ = reply.send(self.peers.get(&participant).map(|p| p.state()));
            }

            SessionCommand::Peers { reply } => {
                let mut peers: Vec<_> = self
                    .peers
                    .iter()
                    .map(|(id, p)| (id.clone(), p.state()))
                    .collect();
                peers.sort_by(|a, b| a.0.cmp(&b.0));
                let _ = reply.send(peers);
            }

            SessionCommand::Close { reply } => {
                self.shutdown().await;
                let _ = reply.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    // ---------------------------------------------------------------------
    // Membership
    // ---------------------------------------------------------------------

    async fn join(
        &mut self,
        room: RoomId,
        participant: ParticipantId,
        auth_token: Option<String>,
    ) -> Result<(), SessionError> {
        if let Some(membership) = &self.membership {
            return Err(SessionError::AlreadyJoined(membership.room.clone()));
        }

        let constraints = self.config.constraints;
        if let Err(e) = self.media.acquire(&constraints).await {
            self.emit(SessionEvent::MediaError(e.clone()));
            return Err(e.into());
        }

        let reusable = self
            .channel
            .as_ref()
            .is_some_and(|c| !c.is_closed() && c.participant() == &participant);
        if !reusable {
            if let Some(old) = self.channel.take() {
                old.close();
            }

            let channel = match SignalingChannel::connect(
                self.transport.clone(),
                participant.clone(),
                auth_token,
                self.config.backoff,
            )
            .await
            {
                Ok(channel) => channel,
                Err(e) => {
                    warn!(room = %room, participant = %participant, "Join failed: {}", e);
                    self.media.release().await;
                    return Err(e.into());
                }
            };
            self.channel_events = Some(channel.subscribe());
            self.channel = Some(channel);
        }

        info!(room = %room, participant = %participant, "Joining room");
        self.send(SignalMessage::new(
            room.clone(),
            participant.clone(),
            SignalBody::Join {
                media: self.media.state(),
            },
        ));
        self.membership = Some(Membership {
            room,
            local: participant,
        });
        Ok(())
    }

    /// Closes every record, sends `Leave` and releases media. No-op when not in a room.
    async fn leave(&mut self) {
        let Some(membership) = self.membership.take() else {
            return;
        };

        self.close_all_peers().await;
        self.send(SignalMessage::new(
            membership.room.clone(),
            membership.local.clone(),
            SignalBody::Leave { reason: None },
        ));
        self.media.release().await;

        info!(room = %membership.room, participant = %membership.local, "Left room");
    }

    async fn shutdown(&mut self) {
        self.leave().await;
        self.media.release().await;
        if let Some(channel) = self.channel.take() {
            channel.close();
        }
        self.channel_events = None;
    }

    /// Signaling is unrecoverable: drop all local state without talking to the relay.
    async fn abandon(&mut self, reason: String) {
        warn!(reason = %reason, "Rejoin required");

        self.close_all_peers().await;
        self.media.release().await;
        self.membership = None;
        self.channel = None;
        self.channel_events = None;
        self.emit(SessionEvent::RejoinRequired { reason });
    }

    async fn close_all_peers(&mut self) {
        let peers: Vec<_> = self.peers.drain().collect();
        for (_, mut peer) in peers {
            peer.close().await;
        }
        self.pending.clear();
        self.timers.clear();
    }

    // ---------------------------------------------------------------------
    // Media
    // ---------------------------------------------------------------------

    async fn apply_media(&mut self, action: MediaAction) -> Result<MediaState, SessionError> {
        let change = match action {
            MediaAction::ToggleVideo => Some(self.media.toggle_video()),
            MediaAction::ToggleAudio => Some(self.media.toggle_audio()),
            MediaAction::StartScreenShare => match self.media.start_screen_share().await {
                Ok(change) => change,
                Err(e) => {
                    self.emit(SessionEvent::MediaError(e.clone()));
                    return Err(e.into());
                }
            },
            MediaAction::StopScreenShare => self.media.stop_screen_share().await,
            MediaAction::StartRecording => self.media.start_recording(),
            MediaAction::StopRecording => self.media.stop_recording(),
        };

        let Some(change) = change else {
            return Ok(self.media.state());
        };

        if let Some(membership) = &self.membership {
            let message = SignalMessage::new(
                membership.room.clone(),
                membership.local.clone(),
                SignalBody::MediaStateChanged {
                    media: change.state,
                },
            );
            self.send(message);
        }

        if let (true, Some(track)) = (change.needs_renegotiation, &change.video_track) {
            let ids: Vec<_> = self.peers.keys().cloned().collect();
            for id in ids {
                let Some(mut peer) = self.peers.remove(&id) else {
                    continue;
                };
                let before = snapshot(&peer);

                if let Err(e) = peer.replace_video_track(track).await {
                    self.fail_peer(peer, e).await;
                    continue;
                }

                if peer.state() == PeerState::Connected {
                    match peer.renegotiate().await {
                        Ok(offer) => self.send(offer),
                        Err(e) => {
                            self.fail_peer(peer, e).await;
                            continue;
                        }
                    }
                }
                self.settle(peer, before).await;
            }
        }

        Ok(change.state)
    }

    // ---------------------------------------------------------------------
    // Signaling
    // ---------------------------------------------------------------------

    async fn handle_channel_event(&mut self, event: ChannelEvent) {
        match event {
            ChannelEvent::Message(message) => self.handle_signal(message).await,
            ChannelEvent::Reconnecting { attempt, delay } => {
                debug!(attempt, ?delay, "Signaling reconnecting");
            }
            ChannelEvent::Reconnected => info!("Signaling reconnected"),
            ChannelEvent::MaxReconnectAttemptsReached => {
                self.abandon("signaling reconnect attempts exhausted".to_owned())
                    .await;
            }
            ChannelEvent::ClosedByServer { code, reason } => {
                self.abandon(format!("closed by relay ({}): {}", code, reason))
                    .await;
            }
            ChannelEvent::Closed => self.channel_events = None,
        }
    }

    async fn handle_signal(&mut self, message: SignalMessage) {
        let Some(membership) = &self.membership else {
            debug!(kind = message.kind(), "Dropping signal outside a room");
            return;
        };
        if message.room_id != membership.room {
            debug!(room = %message.room_id, kind = message.kind(), "Dropping signal for another room");
            return;
        }
        let local = membership.local.clone();
        let from = message.from_participant.clone();

        match message.body {
            SignalBody::ParticipantList {
                participants,
                resumed,
            } => self.handle_participant_list(&local, participants, resumed).await,

            SignalBody::Join { media } => {
                if from == local {
                    return;
                }
                if let Some(mut stale) = self.peers.remove(&from) {
                    debug!(participant = %from, "Replacing record of rejoined participant");
                    self.timers.cancel_peer(&from);
                    stale.close().await;
                }
                info!(participant = %from, "Participant joined");
                self.emit(SessionEvent::ParticipantJoined {
                    participant: from,
                    media,
                });
            }

            SignalBody::Offer { sdp } => self.handle_offer(from, sdp, message.seq).await,

            SignalBody::Answer { sdp } => {
                let Some(mut peer) = self.peers.remove(&from) else {
                    debug!(participant = %from, "Answer without a record");
                    return;
                };
                let before = snapshot(&peer);
                match peer.handle_answer(sdp, message.seq).await {
                    Ok(()) => self.settle(peer, before).await,
                    Err(e) => self.reject(peer, e).await,
                }
            }

            SignalBody::Candidate(candidate) => self.handle_candidate(from, candidate).await,

            SignalBody::MediaStateChanged { media } => {
                if let Some(peer) = self.peers.get_mut(&from) {
                    peer.set_remote_media(media);
                }
                self.emit(SessionEvent::RemoteMediaStateChanged {
                    participant: from,
                    media,
                });
            }

            SignalBody::Leave { reason } => {
                if from == local {
                    return;
                }
                if let Some(mut peer) = self.peers.remove(&from) {
                    self.timers.cancel_peer(&from);
                    peer.close().await;
                }
                self.pending.take(&from);
                self.timers.cancel_candidate_expiry(&from);

                info!(participant = %from, reason = ?reason, "Participant left");
                self.emit(SessionEvent::ParticipantLeft { participant: from });
            }

            SignalBody::Error { code, message } => match code {
                ErrorCode::TargetNotFound => {
                    warn!(participant = %from, "Relay target not found: {}", message);
                    self.emit(SessionEvent::TargetNotFound { participant: from });
                }
                ErrorCode::NotEnrolled | ErrorCode::RoomClosed => {
                    warn!(?code, "Join rejected: {}", message);
                    self.leave().await;
                    self.emit(SessionEvent::ServerError { code, message });
                }
                _ => {
                    warn!(?code, "Relay error: {}", message);
                    self.emit(SessionEvent::ServerError { code, message });
                }
            },
        }
    }

    /// Fresh list: every record from a previous membership is stale and the
    /// listed participants are offered to anew. Resumed list: live records stay,
    /// missing ones are created and records of unlisted participants are dropped.
    async fn handle_participant_list(
        &mut self,
        local: &ParticipantId,
        participants: Vec<ParticipantInfo>,
        resumed: bool,
    ) {
        info!(count = participants.len(), resumed, "Received participant list");

        let listed: HashSet<_> = participants
            .iter()
            .map(|p| p.participant_id.clone())
            .collect();

        let existing: Vec<_> = self.peers.keys().cloned().collect();
        for id in existing {
            let still_listed = listed.contains(&id);
            if resumed && still_listed {
                continue;
            }
            if let Some(mut peer) = self.peers.remove(&id) {
                self.timers.cancel_peer(&id);
                peer.close().await;
            }
            if !still_listed {
                self.emit(SessionEvent::ParticipantLeft { participant: id });
            }
        }

        for info in participants {
            if &info.participant_id == local {
                continue;
            }
            if let Some(peer) = self.peers.get_mut(&info.participant_id) {
                peer.set_remote_media(info.media);
                continue;
            }

            self.emit(SessionEvent::ParticipantJoined {
                participant: info.participant_id.clone(),
                media: info.media,
            });
            self.open_initiator(info.participant_id, info.media).await;
        }
    }

    async fn open_initiator(&mut self, remote: ParticipantId, media: MediaState) {
        let Some(mut peer) = self.create_peer(&remote, NegotiationRole::Initiator).await else {
            return;
        };
        peer.set_remote_media(media);
        let before = snapshot(&peer);

        match peer.start_offer().await {
            Ok(offer) => {
                self.send(offer);
                self.settle(peer, before).await;
            }
            Err(e) => self.fail_peer(peer, e).await,
        }
    }

    async fn handle_offer(&mut self, from: ParticipantId, sdp: String, seq: Option<u64>) {
        let mut peer = match self.peers.remove(&from) {
            Some(peer) => peer,
            None => {
                let Some(mut peer) = self.create_peer(&from, NegotiationRole::Responder).await
                else {
                    return;
                };
                self.timers.cancel_candidate_expiry(&from);
                for candidate in self.pending.take(&from) {
                    if let Err(e) = peer.handle_candidate(candidate).await {
                        warn!(participant = %from, "Failed to queue buffered candidate: {}", e);
                    }
                }
                peer
            }
        };
        let before = snapshot(&peer);

        match peer.handle_offer(sdp, seq).await {
            Ok(OfferOutcome::Answer(answer)) => {
                self.send(answer);
                match peer.mark_answer_sent() {
                    Ok(()) => self.settle(peer, before).await,
                    Err(e) => self.fail_peer(peer, e).await,
                }
            }
            Ok(OfferOutcome::Ignored) => self.settle(peer, before).await,
            Err(e) => self.reject(peer, e).await,
        }
    }

    async fn handle_candidate(&mut self, from: ParticipantId, candidate: IceCandidate) {
        let Some(mut peer) = self.peers.remove(&from) else {
            if let Some(token) = self.pending.push(&from, candidate) {
                self.timers.schedule(
                    self.config.pending_candidate_ttl,
                    Timer::CandidateExpiry {
                        participant: from.clone(),
                        token,
                    },
                );
            }
            debug!(participant = %from, buffered = self.pending.len(&from), "Buffering candidate without a record");
            return;
        };

        let before = snapshot(&peer);
        match peer.handle_candidate(candidate).await {
            Ok(()) => self.settle(peer, before).await,
            Err(e) => self.fail_peer(peer, e).await,
        }
    }

    // ---------------------------------------------------------------------
    // Backend events and timers
    // ---------------------------------------------------------------------

    async fn handle_peer_event(&mut self, event: PeerEvent) {
        let PeerEvent {
            participant,
            generation,
            event,
        } = event;

        let current = self
            .peers
            .get(&participant)
            .is_some_and(|p| p.generation() == generation);
        if !current {
            debug!(participant = %participant, generation, "Dropping event of a replaced record");
            return;
        }

        match event {
            BackendEvent::LocalCandidate(candidate) => {
                let Some(membership) = &self.membership else {
                    return;
                };
                let message = SignalMessage::new(
                    membership.room.clone(),
                    membership.local.clone(),
                    SignalBody::Candidate(candidate),
                )
                .to(participant);
                self.send(message);
            }

            BackendEvent::RemoteTracks(tracks) => {
                self.emit(SessionEvent::RemoteStreamAdded {
                    participant,
                    tracks,
                });
            }

            BackendEvent::Connected => self.transport_changed(participant, true).await,
            BackendEvent::Disconnected => self.transport_changed(participant, false).await,
        }
    }

    async fn transport_changed(&mut self, participant: ParticipantId, connected: bool) {
        let Some(mut peer) = self.peers.remove(&participant) else {
            return;
        };
        let before = snapshot(&peer);
        let result = if connected {
            peer.on_transport_connected()
        } else {
            peer.on_transport_disconnected()
        };
        match result {
            Ok(_) => self.settle(peer, before).await,
            Err(e) => self.fail_peer(peer, e).await,
        }
    }

    async fn handle_timer(&mut self, timer: Timer) {
        match timer {
            Timer::Grace {
                participant,
                generation,
                epoch,
            } => {
                let Some(mut peer) = self.take_current(&participant, generation) else {
                    return;
                };
                let before = snapshot(&peer);
                if peer.grace_elapsed(epoch) {
                    warn!(participant = %participant, "Grace period elapsed");
                }
                self.settle(peer, before).await;
            }

            Timer::Negotiation {
                participant,
                generation,
                negotiation,
            } => {
                let Some(mut peer) = self.take_current(&participant, generation) else {
                    return;
                };
                let before = snapshot(&peer);
                peer.negotiation_timed_out(negotiation);
                self.settle(peer, before).await;
            }

            Timer::CandidateExpiry { participant, token } => {
                let dropped = self.pending.expire(&participant, token);
                if dropped > 0 {
                    debug!(participant = %participant, dropped, "Discarded expired candidates");
                }
            }
        }
    }

    // ---------------------------------------------------------------------
    // Records
    // ---------------------------------------------------------------------

    async fn create_peer(
        &mut self,
        remote: &ParticipantId,
        role: NegotiationRole,
    ) -> Option<PeerConnectionManager> {
        let membership = self.membership.as_ref()?;
        let (room, local) = (membership.room.clone(), membership.local.clone());

        self.next_generation += 1;
        let generation = self.next_generation;
        let sink = PeerEventSink::new(remote.clone(), generation, self.peer_tx.clone());

        let backend = match self.backends.create(remote, sink).await {
            Ok(backend) => backend,
            Err(e) => {
                warn!(participant = %remote, "Failed to create peer connection: {:#}", e);
                self.emit(SessionEvent::PeerFailed {
                    participant: remote.clone(),
                });
                return None;
            }
        };

        let mut peer =
            PeerConnectionManager::new(room, local, remote.clone(), generation, role, backend);

        let tracks = self.media.outgoing_tracks();
        if !tracks.is_empty() {
            if let Err(e) = peer.attach_tracks(&tracks).await {
                self.fail_peer(peer, e).await;
                return None;
            }
        }

        debug!(participant = %remote, generation, ?role, "Peer record created");
        Some(peer)
    }

    fn take_current(
        &mut self,
        participant: &ParticipantId,
        generation: u64,
    ) -> Option<PeerConnectionManager> {
        if self
            .peers
            .get(participant)
            .is_some_and(|p| p.generation() == generation)
        {
            self.peers.remove(participant)
        } else {
            None
        }
    }

    /// Puts a record back after an operation: reports state changes, arms or
    /// disarms its timers, and removes it for good if it failed.
    async fn settle(&mut self, mut peer: PeerConnectionManager, before: Snapshot) {
        let id = peer.remote().clone();
        let state = peer.state();

        if state != before.state {
            self.emit(SessionEvent::ConnectionStateChanged {
                participant: id.clone(),
                state,
            });
        }

        if state == PeerState::Failed {
            warn!(participant = %id, "Peer failed");
            self.timers.cancel_peer(&id);
            peer.close().await;
            self.emit(SessionEvent::PeerFailed { participant: id });
            return;
        }

        if state.is_negotiating() {
            if peer.negotiation() != before.negotiation {
                self.timers.schedule(
                    self.config.negotiation_timeout,
                    Timer::Negotiation {
                        participant: id.clone(),
                        generation: peer.generation(),
                        negotiation: peer.negotiation(),
                    },
                );
            }
        } else {
            self.timers.cancel_negotiation(&id);
        }

        if state != PeerState::Disconnected {
            self.timers.cancel_grace(&id);
        } else if before.state != PeerState::Disconnected {
            self.timers.schedule(
                self.config.grace_period,
                Timer::Grace {
                    participant: id.clone(),
                    generation: peer.generation(),
                    epoch: peer.epoch(),
                },
            );
        }

        self.peers.insert(id, peer);
    }

    /// Stale negotiation messages are dropped; anything else fails the record.
    async fn reject(&mut self, peer: PeerConnectionManager, error: PeerError) {
        if let PeerError::NegotiationStale { received, expected } = error {
            debug!(participant = %peer.remote(), received, expected, "Ignoring stale negotiation message");
            let before = snapshot(&peer);
            self.settle(peer, before).await;
            return;
        }
        self.fail_peer(peer, error).await;
    }

    async fn fail_peer(&mut self, mut peer: PeerConnectionManager, error: PeerError) {
        let id = peer.remote().clone();
        warn!(participant = %id, state = ?peer.state(), "Peer failed: {}", error);

        self.timers.cancel_peer(&id);
        peer.close().await;
        self.emit(SessionEvent::PeerFailed { participant: id });
    }

    fn send(&self, message: SignalMessage) {
        match &self.channel {
            Some(channel) => {
                if let Err(e) = channel.send(message) {
                    warn!("Failed to queue signal: {}", e);
                }
            }
            None => debug!(kind = message.kind(), "No signaling channel, dropping signal"),
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}

#[derive(Debug, Clone, Copy)]
struct Snapshot {
    state: PeerState,
    negotiation: u64,
}

fn snapshot(peer: &PeerConnectionManager) -> Snapshot {
    Snapshot {
        state: peer.state(),
        negotiation: peer.negotiation(),
    }
}

async fn next_channel_event(
    events: &mut Option<mpsc::UnboundedReceiver<ChannelEvent>>,
) -> Option<ChannelEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => pending().await,
    }
}
