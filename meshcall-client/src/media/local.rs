use crate::error::MediaAcquisitionError;
use crate::media::{AudioLevel, TrackKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::info;

/// Provider of the participant's own camera and microphone.
#[async_trait]
pub trait LocalMediaSource: Send + Sync {
    async fn acquire(&self) -> Result<LocalMedia, MediaAcquisitionError>;
}

#[derive(Debug, Clone)]
pub struct LocalTrack {
    pub id: String,
    pub kind: TrackKind,
    pub stream_id: String,
    enabled: Arc<AtomicBool>,
    stopped: Arc<AtomicBool>,
}

impl LocalTrack {
    pub fn new(id: impl Into<String>, kind: TrackKind, stream_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind,
            stream_id: stream_id.into(),
            enabled: Arc::new(AtomicBool::new(true)),
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire) && !self.is_stopped()
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    fn stop(&self) {
        self.stopped.store(true, Ordering::Release);
    }
}

/// Acquired local stream. Cloned tracks share their enabled/stopped flags,
/// so toggling here is seen by every connection the track was added to.
pub struct LocalMedia {
    tracks: Vec<LocalTrack>,
    audio_level: Option<Arc<dyn AudioLevel>>,
}

impl LocalMedia {
    pub fn new(tracks: Vec<LocalTrack>, audio_level: Option<Arc<dyn AudioLevel>>) -> Self {
        Self {
            tracks,
            audio_level,
        }
    }

    pub fn tracks(&self) -> &[LocalTrack] {
        &self.tracks
    }

    pub fn audio_level(&self) -> Option<Arc<dyn AudioLevel>> {
        self.audio_level.clone()
    }

    /// Flips every audio track; returns whether audio is now enabled.
    pub fn toggle_audio(&self) -> bool {
        self.toggle(TrackKind::Audio)
    }

    /// Flips every video track; returns whether video is now enabled.
    pub fn toggle_video(&self) -> bool {
        self.toggle(TrackKind::Video)
    }

    pub fn is_enabled(&self, kind: TrackKind) -> bool {
        self.tracks
            .iter()
            .filter(|t| t.kind == kind)
            .any(LocalTrack::is_enabled)
    }

    pub fn release(&self) {
        for track in &self.tracks {
            track.stop();
        }
        info!("Released {} local tracks", self.tracks.len());
    }

    fn toggle(&self, kind: TrackKind) -> bool {
        let enable = !self.is_enabled(kind);
        for track in self.tracks.iter().filter(|t| t.kind == kind) {
            track.set_enabled(enable);
        }
        enable
    }
}
