use crate::error::MediaError;
use crate::media::capability::{LocalTrack, LocalTrackSet, MediaCapability, MediaConstraints};
use parley_core::{MediaState, TrackKind};
use tracing::{debug, warn};

/// A local media change to broadcast as `media_state_changed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaChange {
    pub state: MediaState,
    /// Screen-share start/stop: the outgoing video source changed and every
    /// connected peer must renegotiate.
    pub needs_renegotiation: bool,
    /// The new outgoing video source, set together with `needs_renegotiation`.
    pub video_track: Option<LocalTrack>,
}

/// Owns the session's capture capability and the advertised [`MediaState`].
///
/// Every change is applied locally before it is returned for broadcast.
pub struct MediaStateController {
    capability: Box<dyn MediaCapability>,
    state: MediaState,
    tracks: Option<LocalTrackSet>,
    screen: Option<LocalTrack>,
}

impl MediaStateController {
    pub fn new(capability: Box<dyn MediaCapability>) -> Self {
        Self {
            capability,
            state: MediaState::default(),
            tracks: None,
            screen: None,
        }
    }

    pub fn state(&self) -> MediaState {
        self.state
    }

    pub fn is_acquired(&self) -> bool {
        self.tracks.is_some()
    }

    /// Tracks to attach to a new peer connection: camera or screen as video.
    pub fn outgoing_tracks(&self) -> LocalTrackSet {
        let mut tracks = self.tracks.clone().unwrap_or_default();
        if let Some(screen) = &self.screen {
            tracks.video = Some(screen.clone());
        }
        tracks
    }

    /// Acquires capture devices. Already acquired tracks are reused.
    pub async fn acquire(&mut self, constraints: &MediaConstraints) -> Result<LocalTrackSet, MediaError> {
        if let Some(tracks) = &self.tracks {
            return Ok(tracks.clone());
        }

        let tracks = self.capability.acquire(constraints).await.inspect_err(|e| {
            warn!("Media acquisition failed: {}", e);
        })?;

        self.state.audio_enabled = constraints.audio && tracks.audio.is_some();
        self.state.video_enabled = constraints.video && tracks.video.is_some();
        debug!(audio = self.state.audio_enabled, video = self.state.video_enabled, "Media acquired");

        self.tracks = Some(tracks.clone());
        Ok(tracks)
    }

    pub fn toggle_video(&mut self) -> MediaChange {
        self.state.video_enabled = !self.state.video_enabled;
        self.capability
            .set_enabled(TrackKind::Video, self.state.video_enabled);
        self.flag_change()
    }

    pub fn toggle_audio(&mut self) -> MediaChange {
        self.state.audio_enabled = !self.state.audio_enabled;
        self.capability
            .set_enabled(TrackKind::Audio, self.state.audio_enabled);
        self.flag_change()
    }

    /// `Ok(None)` when already sharing.
    pub async fn start_screen_share(&mut self) -> Result<Option<MediaChange>, MediaError> {
        if self.screen.is_some() {
            return Ok(None);
        }

        let track = self.capability.acquire_screen().await?;
        self.screen = Some(track.clone());
        self.state.screen_sharing = true;

        Ok(Some(MediaChange {
            state: self.state,
            needs_renegotiation: true,
            video_track: Some(track),
        }))
    }

    /// `None` when not sharing. The camera track becomes the video source again.
    pub async fn stop_screen_share(&mut self) -> Option<MediaChange> {
        self.screen.take()?;
        self.capability.release_screen().await;
        self.state.screen_sharing = false;

        let camera = self.tracks.as_ref().and_then(|t| t.video.clone());
        Some(MediaChange {
            state: self.state,
            needs_renegotiation: camera.is_some(),
            video_track: camera,
        })
    }

    pub fn start_recording(&mut self) -> Option<MediaChange> {
        if self.state.recording {
            return None;
        }
        self.state.recording = true;
        Some(self.flag_change())
    }

    pub fn stop_recording(&mut self) -> Option<MediaChange> {
        if !self.state.recording {
            return None;
        }
        self.state.recording = false;
        Some(self.flag_change())
    }

    /// Releases every capture device. Safe to call when nothing is held.
    pub async fn release(&mut self) {
        if self.screen.take().is_some() {
            self.capability.release_screen().await;
        }
        if self.tracks.take().is_some() {
            self.capability.release().await;
        }
        self.state.screen_sharing = false;
        self.state.recording = false;
    }

    fn flag_change(&self) -> MediaChange {
        MediaChange {
            state: self.state,
            needs_renegotiation: false,
            video_track: None,
        }
    }
}
