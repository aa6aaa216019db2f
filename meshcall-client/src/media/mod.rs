//! Seam to the media primitive.
//!
//! A [`MediaConnection`] is one direct connection to one remote participant.
//! It reports everything asynchronous through [`MediaEvent`]s on the channel
//! it was created with; the owning peer session consumes them in order.

mod local;
#[cfg(feature = "rtc")]
mod rtc;

pub use local::*;
#[cfg(feature = "rtc")]
pub use rtc::*;

use async_trait::async_trait;
use meshcall_core::{ConnectionId, IceCandidate, IceServerConfig, SessionDescription};
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalingState {
    Stable,
    HaveLocalOffer,
    HaveRemoteOffer,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Sampled loudness of one audio source, 0..=255.
pub trait AudioLevel: Send + Sync {
    fn energy(&self) -> u8;
}

#[derive(Clone)]
pub struct RemoteTrack {
    pub id: String,
    pub kind: TrackKind,
    pub enabled: bool,
    pub audio_level: Option<Arc<dyn AudioLevel>>,
}

impl std::fmt::Debug for RemoteTrack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteTrack")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("enabled", &self.enabled)
            .field("audio_level", &self.audio_level.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum MediaEvent {
    NegotiationNeeded,
    LocalCandidate(IceCandidate),
    ConnectionState(PeerConnectionState),
    Track(RemoteTrack),
    TrackMuted { kind: TrackKind, muted: bool },
}

#[async_trait]
pub trait MediaConnection: Send + Sync {
    async fn add_local_tracks(&self, media: &LocalMedia) -> anyhow::Result<()>;

    async fn create_offer(&self, ice_restart: bool) -> anyhow::Result<SessionDescription>;

    async fn create_answer(&self) -> anyhow::Result<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> anyhow::Result<()>;

    async fn add_candidate(&self, candidate: IceCandidate) -> anyhow::Result<()>;

    async fn signaling_state(&self) -> SignalingState;

    async fn has_remote_description(&self) -> bool;

    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait MediaConnectionFactory: Send + Sync {
    async fn create(
        &self,
        remote: ConnectionId,
        ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> anyhow::Result<Arc<dyn MediaConnection>>;
}
