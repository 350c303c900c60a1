use crate::error::MediaError;
use async_trait::async_trait;
use parley_core::TrackKind;

/// Reference to a captured local track. Cloned into every peer connection that sends it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
    /// Stream label announced to remote peers.
    pub label: String,
}

impl LocalTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind, label: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            label: label.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LocalTrackSet {
    pub audio: Option<LocalTrack>,
    pub video: Option<LocalTrack>,
}

impl LocalTrackSet {
    pub fn iter(&self) -> impl Iterator<Item = &LocalTrack> {
        self.audio.iter().chain(self.video.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.video.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl Default for MediaConstraints {
    fn default() -> Self {
        Self {
            audio: true,
            video: true,
        }
    }
}

/// Local capture device access. Exactly one per session.
#[async_trait]
pub trait MediaCapability: Send {
    async fn acquire(&mut self, constraints: &MediaConstraints) -> Result<LocalTrackSet, MediaError>;

    async fn acquire_screen(&mut self) -> Result<LocalTrack, MediaError>;

    async fn release_screen(&mut self);

    /// Mute/unmute or camera on/off without releasing the device.
    fn set_enabled(&mut self, kind: TrackKind, enabled: bool);

    async fn release(&mut self);
}

/// Capability with no devices: joins receive-only. Used by probes and tests.
#[derive(Debug, Default, Clone)]
pub struct NullMedia;

#[async_trait]
impl MediaCapability for NullMedia {
    async fn acquire(&mut self, _constraints: &MediaConstraints) -> Result<LocalTrackSet, MediaError> {
        Ok(LocalTrackSet::default())
    }

    async fn acquire_screen(&mut self) -> Result<LocalTrack, MediaError> {
        Err(MediaError::ScreenCaptureFailed("no capture device".into()))
    }

    async fn release_screen(&mut self) {}

    fn set_enabled(&mut self, _kind: TrackKind, _enabled: bool) {}

    async fn release(&mut self) {}
}
