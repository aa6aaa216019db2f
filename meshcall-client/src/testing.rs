//! In-memory media doubles for state-machine tests.

use crate::error::MediaAcquisitionError;
use crate::media::{
    LocalMedia, LocalMediaSource, LocalTrack, MediaConnection, MediaConnectionFactory,
    MediaEvent, PeerConnectionState, SignalingState, TrackKind,
};
use anyhow::{Result, anyhow, bail};
use async_trait::async_trait;
use meshcall_core::{
    ClientMessage, ConnectionId, IceCandidate, IceServerConfig, SdpKind, SessionDescription,
    SignalPayload,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Default)]
struct FakeState {
    signaling: Option<SignalingState>,
    pending_local: Option<String>,
    current_local: Option<String>,
    pending_remote: Option<String>,
    current_remote: Option<String>,
    offers_made: u32,
    rollbacks: u32,
    applied: Vec<IceCandidate>,
    tracks: usize,
    close_calls: u32,
    connected: bool,
}

/// Signaling-state machine with the same transitions as a real peer
/// connection: stable, have-local-offer, have-remote-offer, rollback.
pub struct FakeConnection {
    name: String,
    state: Mutex<FakeState>,
    events: mpsc::UnboundedSender<MediaEvent>,
}

impl FakeConnection {
    pub fn new(name: impl Into<String>, events: mpsc::UnboundedSender<MediaEvent>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            state: Mutex::new(FakeState::default()),
            events,
        })
    }

    pub fn emit(&self, event: MediaEvent) {
        let _ = self.events.send(event);
    }

    pub fn signaling(&self) -> SignalingState {
        self.lock().signaling.unwrap_or(SignalingState::Stable)
    }

    /// Local and remote descriptions both ends settled on.
    pub fn agreed(&self) -> Option<(String, String)> {
        let state = self.lock();
        Some((state.current_local.clone()?, state.current_remote.clone()?))
    }

    pub fn offers_made(&self) -> u32 {
        self.lock().offers_made
    }

    pub fn rollbacks(&self) -> u32 {
        self.lock().rollbacks
    }

    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.lock().applied.clone()
    }

    pub fn tracks(&self) -> usize {
        self.lock().tracks
    }

    pub fn close_calls(&self) -> u32 {
        self.lock().close_calls
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    fn transition(&self, state: &mut FakeState, next: SignalingState) {
        state.signaling = Some(next);
        if next == SignalingState::Stable
            && !state.connected
            && state.current_local.is_some()
            && state.current_remote.is_some()
        {
            state.connected = true;
            self.emit(MediaEvent::ConnectionState(PeerConnectionState::Connecting));
            self.emit(MediaEvent::ConnectionState(PeerConnectionState::Connected));
        }
    }
}

#[async_trait]
impl MediaConnection for FakeConnection {
    async fn add_local_tracks(&self, media: &LocalMedia) -> Result<()> {
        self.lock().tracks += media.tracks().len();
        self.emit(MediaEvent::NegotiationNeeded);
        Ok(())
    }

    async fn create_offer(&self, _ice_restart: bool) -> Result<SessionDescription> {
        let mut state = self.lock();
        if state.signaling == Some(SignalingState::Closed) {
            bail!("closed");
        }
        state.offers_made += 1;
        Ok(SessionDescription::offer(format!(
            "offer:{}:{}",
            self.name, state.offers_made
        )))
    }

    async fn create_answer(&self) -> Result<SessionDescription> {
        let state = self.lock();
        if state.signaling != Some(SignalingState::HaveRemoteOffer) {
            bail!("no remote offer to answer");
        }
        let remote = state.pending_remote.clone().unwrap_or_default();
        Ok(SessionDescription::answer(format!(
            "answer:{}:{}",
            self.name, remote
        )))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> Result<()> {
        let mut state = self.lock();
        let current = state.signaling.unwrap_or(SignalingState::Stable);

        match (desc.kind, current) {
            (SdpKind::Offer, SignalingState::Stable) => {
                state.pending_local = Some(desc.sdp);
                self.transition(&mut state, SignalingState::HaveLocalOffer);
            }
            (SdpKind::Answer, SignalingState::HaveRemoteOffer) => {
                state.current_remote = state.pending_remote.take();
                state.current_local = Some(desc.sdp);
                self.transition(&mut state, SignalingState::Stable);
            }
            (SdpKind::Rollback, SignalingState::HaveLocalOffer) => {
                state.pending_local = None;
                state.rollbacks += 1;
                self.transition(&mut state, SignalingState::Stable);
            }
            (kind, current) => bail!("cannot set local {:?} in {:?}", kind, current),
        }
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> Result<()> {
        let mut state = self.lock();
        let current = state.signaling.unwrap_or(SignalingState::Stable);

        match (desc.kind, current) {
            (SdpKind::Offer, SignalingState::Stable) => {
                state.pending_remote = Some(desc.sdp);
                self.transition(&mut state, SignalingState::HaveRemoteOffer);
            }
            (SdpKind::Answer, SignalingState::HaveLocalOffer) => {
                state.current_local = state.pending_local.take();
                state.current_remote = Some(desc.sdp);
                self.transition(&mut state, SignalingState::Stable);
            }
            (kind, current) => bail!("cannot set remote {:?} in {:?}", kind, current),
        }
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        let mut state = self.lock();
        if state.pending_remote.is_none() && state.current_remote.is_none() {
            return Err(anyhow!("no remote description"));
        }
        state.applied.push(candidate);
        Ok(())
    }

    async fn signaling_state(&self) -> SignalingState {
        self.signaling()
    }

    async fn has_remote_description(&self) -> bool {
        let state = self.lock();
        state.pending_remote.is_some() || state.current_remote.is_some()
    }

    async fn close(&self) -> Result<()> {
        {
            let mut state = self.lock();
            state.close_calls += 1;
            state.signaling = Some(SignalingState::Closed);
        }
        self.emit(MediaEvent::ConnectionState(PeerConnectionState::Closed));
        Ok(())
    }
}

/// Hands out [`FakeConnection`]s and remembers them per remote.
#[derive(Default)]
pub struct FakeFactory {
    connections: Mutex<Vec<(ConnectionId, Arc<FakeConnection>)>>,
    refuse: Mutex<HashSet<ConnectionId>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refuse(&self, remote: ConnectionId) {
        self.refuse.lock().unwrap().insert(remote);
    }

    /// Latest connection created for `remote`.
    pub fn connection(&self, remote: &ConnectionId) -> Option<Arc<FakeConnection>> {
        self.connections
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(id, _)| id == remote)
            .map(|(_, conn)| conn.clone())
    }

    pub fn created(&self) -> usize {
        self.connections.lock().unwrap().len()
    }
}

#[async_trait]
impl MediaConnectionFactory for FakeFactory {
    async fn create(
        &self,
        remote: ConnectionId,
        _ice_servers: &[IceServerConfig],
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Result<Arc<dyn MediaConnection>> {
        if self.refuse.lock().unwrap().contains(&remote) {
            bail!("refused connection to {remote}");
        }
        let conn = FakeConnection::new(format!("to-{remote}"), events);
        self.connections.lock().unwrap().push((remote, conn.clone()));
        Ok(conn)
    }
}

pub struct FakeMediaSource {
    pub deny: bool,
}

#[async_trait]
impl LocalMediaSource for FakeMediaSource {
    async fn acquire(&self) -> Result<LocalMedia, MediaAcquisitionError> {
        if self.deny {
            return Err(MediaAcquisitionError::Denied("permission dismissed".into()));
        }
        Ok(LocalMedia::new(
            vec![
                LocalTrack::new("mic", TrackKind::Audio, "local"),
                LocalTrack::new("cam", TrackKind::Video, "local"),
            ],
            None,
        ))
    }
}

/// Next `signal` frame from an outbox, skipping anything else.
pub async fn next_signal(
    rx: &mut mpsc::UnboundedReceiver<ClientMessage>,
) -> (ConnectionId, SignalPayload) {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("no signal within timeout")
            .expect("outbox closed");
        if let ClientMessage::Signal(envelope) = msg {
            let payload = SignalPayload::from_value(envelope.payload).expect("bad payload");
            return (envelope.to, payload);
        }
    }
}
