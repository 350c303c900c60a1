use crate::config::ClientConfig;
use crate::media::{LocalTrack, LocalTrackSet};
use crate::peer::backend::{
    BackendEvent, PeerBackend, PeerBackendFactory, PeerEventSink, RemoteTrack, SdpKind,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parley_core::{IceCandidate, ParticipantId, TrackKind};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use webrtc::api::APIBuilder;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MIME_TYPE_OPUS, MIME_TYPE_VP8, MediaEngine};
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::sdp_type::RTCSdpType;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::signaling_state::RTCSignalingState;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_remote::TrackRemote;

/// Builds one `webrtc` peer connection per remote participant.
#[derive(Debug, Clone)]
pub struct RtcBackendFactory {
    ice_servers: Vec<String>,
}

impl RtcBackendFactory {
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            ice_servers: config.ice_servers.clone(),
        }
    }
}

#[async_trait]
impl PeerBackendFactory for RtcBackendFactory {
    async fn create(
        &self,
        remote: &ParticipantId,
        events: PeerEventSink,
    ) -> Result<Box<dyn PeerBackend>> {
        let backend = RtcBackend::new(remote.clone(), &self.ice_servers, events).await?;
        Ok(Box::new(backend))
    }
}

pub struct RtcBackend {
    remote: ParticipantId,
    peer_connection: Arc<RTCPeerConnection>,
    /// Outgoing tracks by local track id. The capture pipeline writes samples into them.
    tracks: HashMap<String, Arc<TrackLocalStaticSample>>,
    video_sender: Option<Arc<RTCRtpSender>>,
}

impl RtcBackend {
    pub async fn new(
        remote: ParticipantId,
        ice_servers: &[String],
        events: PeerEventSink,
    ) -> Result<Self> {
        let mut m = MediaEngine::default();
        m.register_default_codecs()?;
        let registry = register_default_interceptors(Registry::new(), &mut m)?;

        let api = APIBuilder::new()
            .with_media_engine(m)
            .with_interceptor_registry(registry)
            .build();

        let rtc_config = RTCConfiguration {
            ice_servers: if ice_servers.is_empty() {
                vec![]
            } else {
                vec![RTCIceServer {
                    urls: ice_servers.to_vec(),
                    ..Default::default()
                }]
            },
            ..Default::default()
        };

        let peer_connection = Arc::new(
            api.new_peer_connection(rtc_config)
                .await
                .context("Failed to create peer connection")?,
        );

        let state_events = events.clone();
        peer_connection.on_peer_connection_state_change(Box::new(
            move |s: RTCPeerConnectionState| {
                let events = state_events.clone();
                Box::pin(async move {
                    info!(remote = %events.participant(), "Peer connection state: {:?}", s);
                    match s {
                        RTCPeerConnectionState::Connected => {
                            events.emit(BackendEvent::Connected);
                        }
                        RTCPeerConnectionState::Disconnected | RTCPeerConnectionState::Failed => {
                            events.emit(BackendEvent::Disconnected);
                        }
                        _ => {}
                    }
                })
            },
        ));

        let ice_events = events.clone();
        peer_connection.on_ice_candidate(Box::new(move |c: Option<RTCIceCandidate>| {
            let events = ice_events.clone();
            Box::pin(async move {
                let Some(candidate) = c else { return };
                let Ok(init) = candidate.to_json() else {
                    return;
                };
                events.emit(BackendEvent::LocalCandidate(IceCandidate {
                    candidate: init.candidate,
                    sdp_mid: init.sdp_mid,
                    sdp_m_line_index: init.sdp_mline_index,
                }));
            })
        }));

        let track_events = events;
        peer_connection.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let events = track_events.clone();
                Box::pin(async move {
                    let kind = match track.kind() {
                        RTPCodecType::Audio => TrackKind::Audio,
                        _ => TrackKind::Video,
                    };
                    debug!(remote = %events.participant(), id = %track.id(), ?kind, "Remote track");
                    events.emit(BackendEvent::RemoteTracks(vec![RemoteTrack {
                        id: track.id(),
                        kind,
                    }]));
                })
            },
        ));

        Ok(Self {
            remote,
            peer_connection,
            tracks: HashMap::new(),
            video_sender: None,
        })
    }

    /// Outgoing track for a local track id, for the capture pipeline to write samples into.
    pub fn local_track(&self, id: &str) -> Option<Arc<TrackLocalStaticSample>> {
        self.tracks.get(id).cloned()
    }

    fn sample_track(&mut self, track: &LocalTrack) -> Arc<TrackLocalStaticSample> {
        self.tracks
            .entry(track.id.clone())
            .or_insert_with(|| {
                let mime_type = match track.kind {
                    TrackKind::Audio => MIME_TYPE_OPUS,
                    TrackKind::Video | TrackKind::Screen => MIME_TYPE_VP8,
                };
                Arc::new(TrackLocalStaticSample::new(
                    RTCRtpCodecCapability {
                        mime_type: mime_type.to_owned(),
                        ..Default::default()
                    },
                    track.id.clone(),
                    track.label.clone(),
                ))
            })
            .clone()
    }
}

#[async_trait]
impl PeerBackend for RtcBackend {
    async fn create_offer(&mut self) -> Result<String> {
        let offer = self
            .peer_connection
            .create_offer(None)
            .await
            .context("Failed to create offer")?;
        self.peer_connection
            .set_local_description(offer.clone())
            .await
            .context("Failed to set local offer")?;
        Ok(offer.sdp)
    }

    async fn set_remote_description(&mut self, kind: SdpKind, sdp: String) -> Result<()> {
        let desc = match kind {
            SdpKind::Offer => {
                if self.peer_connection.signaling_state() == RTCSignalingState::HaveLocalOffer {
                    debug!(remote = %self.remote, "Rolling back local offer");
                    let mut rollback = RTCSessionDescription::default();
                    rollback.sdp_type = RTCSdpType::Rollback;
                    self.peer_connection
                        .set_local_description(rollback)
                        .await
                        .context("Failed to roll back local offer")?;
                }
                RTCSessionDescription::offer(sdp)?
            }
            SdpKind::Answer => RTCSessionDescription::answer(sdp)?,
        };

        self.peer_connection
            .set_remote_description(desc)
            .await
            .context("Failed to set remote description")?;
        Ok(())
    }

    async fn create_answer(&mut self) -> Result<String> {
        let answer = self
            .peer_connection
            .create_answer(None)
            .await
            .context("Failed to create answer")?;
        self.peer_connection
            .set_local_description(answer.clone())
            .await
            .context("Failed to set local answer")?;
        Ok(answer.sdp)
    }

    async fn add_candidate(&mut self, candidate: IceCandidate) -> Result<()> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_m_line_index,
            username_fragment: None,
        };
        self.peer_connection
            .add_ice_candidate(init)
            .await
            .context("Failed to add ICE candidate")?;
        Ok(())
    }

    async fn attach_tracks(&mut self, tracks: &LocalTrackSet) -> Result<()> {
        for track in tracks.iter() {
            let local = self.sample_track(track);
            let sender = self
                .peer_connection
                .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
                .await
                .with_context(|| format!("Failed to add {:?} track", track.kind))?;

            if track.kind != TrackKind::Audio {
                self.video_sender = Some(sender);
            }
        }
        Ok(())
    }

    async fn replace_video_track(&mut self, track: &LocalTrack) -> Result<()> {
        let local = self.sample_track(track);

        match &self.video_sender {
            Some(sender) => {
                sender
                    .replace_track(Some(local as Arc<dyn TrackLocal + Send + Sync>))
                    .await
                    .context("Failed to replace video track")?;
            }
            None => {
                let sender = self
                    .peer_connection
                    .add_track(local as Arc<dyn TrackLocal + Send + Sync>)
                    .await
                    .context("Failed to add video track")?;
                self.video_sender = Some(sender);
            }
        }
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        self.peer_connection
            .close()
            .await
            .context("Failed to close peer connection")?;
        Ok(())
    }
}
