use anyhow::Result;
use async_trait::async_trait;
use parley_client::{
    BackendEvent, LocalTrack, LocalTrackSet, PeerBackend, PeerBackendFactory, PeerEventSink,
    SdpKind,
};
use parley_core::{IceCandidate, ParticipantId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// One call made on a [`FakeBackend`].
#[derive(Debug, Clone, PartialEq)]
pub enum BackendCall {
    CreateOffer,
    SetRemote(SdpKind, String),
    CreateAnswer,
    AddCandidate(String),
    AttachTracks(Vec<String>),
    ReplaceVideo(String),
    Close,
}

pub type CallLog = Arc<Mutex<Vec<BackendCall>>>;

/// Backend that records every call. With an event sink attached it behaves like
/// a transport that connects as soon as both descriptions are in place.
pub struct FakeBackend {
    calls: CallLog,
    events: Option<PeerEventSink>,
    sdp_counter: u32,
}

impl FakeBackend {
    /// Silent backend for driving a manager by hand.
    pub fn new() -> (Self, CallLog) {
        let calls = CallLog::default();
        let backend = Self {
            calls: calls.clone(),
            events: None,
            sdp_counter: 0,
        };
        (backend, calls)
    }

    fn record(&self, call: BackendCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn emit(&self, event: BackendEvent) {
        if let Some(events) = &self.events {
            events.emit(event);
        }
    }

    fn local_candidate(&self) -> BackendEvent {
        BackendEvent::LocalCandidate(IceCandidate {
            candidate: format!("candidate:{} 1 udp 2122260223 127.0.0.1 5000 typ host", self.sdp_counter),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        })
    }
}

#[async_trait]
impl PeerBackend for FakeBackend {
    async fn create_offer(&mut self) -> Result<String> {
        self.record(BackendCall::CreateOffer);
        self.sdp_counter += 1;
        self.emit(self.local_candidate());
        Ok(format!("offer-{}", self.sdp_counter))
    }

    async fn set_remote_description(&mut self, kind: SdpKind, sdp: String) -> Result<()> {
        self.record(BackendCall::SetRemote(kind, sdp));
        if kind == SdpKind::Answer {
            self.emit(BackendEvent::Connected);
        }
        Ok(())
    }

    async fn create_answer(&mut self) -> Result<String> {
        self.record(BackendCall::CreateAnswer);
        self.sdp_counter += 1;
        self.emit(self.local_candidate());
        self.emit(BackendEvent::Connected);
        Ok(format!("answer-{}", self.sdp_counter))
    }

    async fn add_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        self.record(BackendCall::AddCandidate(candidate.candidate));
        Ok(())
    }

    async fn attach_tracks(&mut self, tracks: &LocalTrackSet) -> Result<()> {
        self.record(BackendCall::AttachTracks(
            tracks.iter().map(|t| t.id.clone()).collect(),
        ));
        Ok(())
    }

    async fn replace_video_track(&mut self, track: &LocalTrack) -> Result<()> {
        self.record(BackendCall::ReplaceVideo(track.id.clone()));
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.record(BackendCall::Close);
        Ok(())
    }
}

/// Hands out [`FakeBackend`]s and keeps their call logs and event sinks per
/// remote participant, so tests can inspect calls and inject transport events.
#[derive(Clone, Default)]
pub struct FakeBackendFactory {
    created: Arc<Mutex<HashMap<ParticipantId, Vec<(CallLog, PeerEventSink)>>>>,
}

impl FakeBackendFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many backends were built for `remote`.
    pub fn created_for(&self, remote: &ParticipantId) -> usize {
        self.created
            .lock()
            .unwrap()
            .get(remote)
            .map_or(0, |b| b.len())
    }

    /// Calls made on the latest backend built for `remote`.
    pub fn calls_for(&self, remote: &ParticipantId) -> Vec<BackendCall> {
        self.created
            .lock()
            .unwrap()
            .get(remote)
            .and_then(|b| b.last())
            .map(|(calls, _)| calls.lock().unwrap().clone())
            .unwrap_or_default()
    }

    /// Injects a transport event into the latest backend built for `remote`.
    pub fn emit(&self, remote: &ParticipantId, event: BackendEvent) -> bool {
        let created = self.created.lock().unwrap();
        match created.get(remote).and_then(|b| b.last()) {
            Some((_, sink)) => sink.emit(event),
            None => false,
        }
    }
}

#[async_trait]
impl PeerBackendFactory for FakeBackendFactory {
    async fn create(
        &self,
        remote: &ParticipantId,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerBackend>> {
        let calls = CallLog::default();
        self.created
            .lock()
            .unwrap()
            .entry(remote.clone())
            .or_default()
            .push((calls.clone(), events.clone()));

        Ok(Box::new(FakeBackend {
            calls,
            events: Some(events),
            sdp_counter: 0,
        }))
    }
}
