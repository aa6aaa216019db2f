use crate::error::NegotiationError;
use crate::media::{LocalMedia, MediaConnection, MediaEvent, SignalingState, TrackKind};
use crate::session::{NegotiationRole, PeerState, SignalOutbox};
use crate::speaker::{AudioSources, Speaker};
use dashmap::DashMap;
use meshcall_core::{ConnectionId, IceCandidate, SessionDescription, SignalPayload};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, info, warn};

#[derive(Debug)]
pub enum SessionInput {
    Signal(SignalPayload),
    RestartIce,
}

static NEXT_SESSION: AtomicU64 = AtomicU64::new(1);

/// Distinguishes successive sessions with the same remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(u64);

impl SessionToken {
    fn next() -> Self {
        Self(NEXT_SESSION.fetch_add(1, Ordering::Relaxed))
    }
}

/// Reported to the session manager once a session has shut itself down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Ended {
        remote: ConnectionId,
        token: SessionToken,
        state: PeerState,
    },
}

/// Presentation state derived from live sessions.
#[derive(Clone, Default)]
pub struct SessionViews {
    /// Whether each remote is currently sending video.
    pub video: Arc<DashMap<ConnectionId, bool>>,
    pub audio: AudioSources,
}

impl SessionViews {
    pub fn prune(&self, remote: &ConnectionId) {
        self.video.remove(remote);
        self.audio.remove(&Speaker::Remote(*remote));
    }
}

/// What every session of one participant shares.
#[derive(Clone)]
pub struct SessionContext {
    pub local: ConnectionId,
    pub outbox: SignalOutbox,
    pub views: SessionViews,
    pub events: mpsc::UnboundedSender<SessionEvent>,
    pub negotiation_timeout: Option<Duration>,
}

/// Close-once guard shared by a session and its handle.
struct Teardown {
    remote: ConnectionId,
    closed: AtomicBool,
    connection: Arc<dyn MediaConnection>,
    state: watch::Sender<PeerState>,
}

impl Teardown {
    /// Only the first caller closes the connection.
    async fn close(&self) -> bool {
        if self.closed.swap(true, Ordering::AcqRel) {
            return false;
        }

        if let Err(e) = self.connection.close().await {
            warn!("Error closing connection to {}: {:?}", self.remote, e);
        }
        self.state.send_replace(PeerState::Closed);
        info!("Session with {} closed", self.remote);
        true
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Negotiation state machine for one remote participant.
///
/// Signals and media events for the session are applied one at a time by
/// [`PeerSession::run`], so an incoming offer collides with a local one
/// exactly when the signaling state is not stable.
pub struct PeerSession {
    ctx: SessionContext,
    remote: ConnectionId,
    token: SessionToken,
    role: NegotiationRole,
    connection: Arc<dyn MediaConnection>,
    local_media: Option<Arc<LocalMedia>>,
    pending_candidates: Vec<IceCandidate>,
    ignore_offer: bool,
    negotiation_deadline: Option<Instant>,
    teardown: Arc<Teardown>,
}

impl PeerSession {
    pub fn new(
        ctx: SessionContext,
        remote: ConnectionId,
        connection: Arc<dyn MediaConnection>,
        local_media: Option<Arc<LocalMedia>>,
    ) -> Self {
        let (state, _) = watch::channel(PeerState::New);
        let teardown = Arc::new(Teardown {
            remote,
            closed: AtomicBool::new(false),
            connection: connection.clone(),
            state,
        });

        Self {
            role: NegotiationRole::for_edge(ctx.local, remote),
            ctx,
            remote,
            token: SessionToken::next(),
            connection,
            local_media,
            pending_candidates: Vec::new(),
            ignore_offer: false,
            negotiation_deadline: None,
            teardown,
        }
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> PeerState {
        *self.teardown.state.borrow()
    }

    /// Starts the event loop. `media_rx` must be the receiving end of the
    /// channel the connection was created with.
    pub fn spawn(self, media_rx: mpsc::UnboundedReceiver<MediaEvent>) -> PeerSessionHandle {
        let (input_tx, input_rx) = mpsc::unbounded_channel();
        let handle = PeerSessionHandle {
            remote: self.remote,
            token: self.token,
            role: self.role,
            input_tx,
            state: self.teardown.state.subscribe(),
            teardown: self.teardown.clone(),
        };

        tokio::spawn(self.run(input_rx, media_rx));
        handle
    }

    async fn run(
        mut self,
        mut input_rx: mpsc::UnboundedReceiver<SessionInput>,
        mut media_rx: mpsc::UnboundedReceiver<MediaEvent>,
    ) {
        info!("Session with {} started as {:?}", self.remote, self.role);
        let mut state_rx = self.teardown.state.subscribe();

        if let Err(e) = self.start().await {
            warn!("Failed to start session with {}: {}", self.remote, e);
            self.set_state(PeerState::Failed);
        }

        while !self.state().is_terminal() {
            let deadline = self.negotiation_deadline;

            tokio::select! {
                input = input_rx.recv() => match input {
                    Some(SessionInput::Signal(payload)) => {
                        let kind = payload.kind();
                        if let Err(e) = self.handle_signal(payload).await {
                            warn!("Dropped {} from {}: {}", kind, self.remote, e);
                        }
                    }
                    Some(SessionInput::RestartIce) => {
                        if let Err(e) = self.restart_ice().await {
                            warn!("ICE restart with {} failed: {}", self.remote, e);
                        }
                    }
                    None => break,
                },

                event = media_rx.recv() => match event {
                    Some(event) => self.handle_media_event(event).await,
                    None => break,
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    warn!("Negotiation with {} timed out", self.remote);
                    self.set_state(PeerState::Failed);
                }

                // Closed through the handle.
                _ = state_rx.changed() => {}
            }
        }

        let state = self.state();
        self.terminate().await;
        let _ = self.ctx.events.send(SessionEvent::Ended {
            remote: self.remote,
            token: self.token,
            state,
        });
    }

    async fn start(&mut self) -> Result<(), NegotiationError> {
        match self.local_media.clone() {
            Some(media) => self.connection.add_local_tracks(&media).await?,
            // Nothing will ask for negotiation without tracks.
            None => self.negotiate().await?,
        }
        Ok(())
    }

    pub async fn handle_signal(&mut self, payload: SignalPayload) -> Result<(), NegotiationError> {
        if self.teardown.is_closed() {
            return Err(NegotiationError::Closed);
        }

        match payload {
            SignalPayload::Offer { sdp } => {
                let collision = self.connection.signaling_state().await != SignalingState::Stable;
                self.ignore_offer = collision && !self.role.is_polite();
                if self.ignore_offer {
                    debug!("Ignoring colliding offer from {}", self.remote);
                    return Ok(());
                }

                self.enter_negotiating();
                if collision {
                    debug!("Rolling back local offer for {}", self.remote);
                    self.connection
                        .set_local_description(SessionDescription::rollback())
                        .await?;
                }

                self.connection
                    .set_remote_description(SessionDescription::offer(sdp))
                    .await?;
                self.flush_pending_candidates().await;

                let answer = self.connection.create_answer().await?;
                self.connection.set_local_description(answer.clone()).await?;
                self.ctx
                    .outbox
                    .signal(self.remote, &SignalPayload::Answer { sdp: answer.sdp });
            }

            SignalPayload::Answer { sdp } => {
                let state = self.connection.signaling_state().await;
                if state != SignalingState::HaveLocalOffer {
                    return Err(NegotiationError::OutOfOrder {
                        kind: "answer",
                        state,
                    });
                }

                self.connection
                    .set_remote_description(SessionDescription::answer(sdp))
                    .await?;
                self.flush_pending_candidates().await;
            }

            SignalPayload::Candidate { candidate } => {
                if !self.connection.has_remote_description().await {
                    debug!("Buffering candidate from {}", self.remote);
                    self.pending_candidates.push(candidate);
                    return Ok(());
                }

                if let Err(e) = self.connection.add_candidate(candidate).await {
                    if self.ignore_offer {
                        debug!("Candidate for ignored offer from {}: {}", self.remote, e);
                        return Ok(());
                    }
                    return Err(e.into());
                }
            }
        }

        Ok(())
    }

    pub async fn handle_media_event(&mut self, event: MediaEvent) {
        match event {
            MediaEvent::NegotiationNeeded => {
                if let Err(e) = self.negotiate().await {
                    warn!("Negotiation with {} failed: {}", self.remote, e);
                }
            }

            MediaEvent::LocalCandidate(candidate) => {
                self.ctx
                    .outbox
                    .signal(self.remote, &SignalPayload::Candidate { candidate });
            }

            MediaEvent::ConnectionState(state) => {
                let Some(next) = PeerState::from_connection(state) else {
                    return;
                };
                if next == PeerState::Connected {
                    self.negotiation_deadline = None;
                }
                self.set_state(next);
            }

            MediaEvent::Track(track) => match track.kind {
                TrackKind::Video => {
                    self.ctx.views.video.insert(self.remote, track.enabled);
                }
                TrackKind::Audio => {
                    if let Some(level) = track.audio_level {
                        self.ctx.views.audio.insert(Speaker::Remote(self.remote), level);
                    }
                }
            },

            MediaEvent::TrackMuted { kind, muted } => match kind {
                TrackKind::Video => {
                    self.ctx.views.video.insert(self.remote, !muted);
                }
                TrackKind::Audio => {
                    debug!("Audio from {} muted: {}", self.remote, muted);
                }
            },
        }
    }

    /// Answers a renegotiation request. Only the impolite side offers.
    pub async fn negotiate(&mut self) -> Result<(), NegotiationError> {
        if self.role.is_polite() {
            debug!("Waiting for {} to offer", self.remote);
            return Ok(());
        }
        self.make_offer(false).await
    }

    /// Sends an ICE-restart offer regardless of role.
    pub async fn restart_ice(&mut self) -> Result<(), NegotiationError> {
        self.make_offer(true).await
    }

    async fn make_offer(&mut self, ice_restart: bool) -> Result<(), NegotiationError> {
        let state = self.connection.signaling_state().await;
        if state != SignalingState::Stable {
            debug!("Offer to {} skipped in {:?}", self.remote, state);
            return Ok(());
        }

        self.enter_negotiating();
        let offer = self.connection.create_offer(ice_restart).await?;
        self.connection.set_local_description(offer.clone()).await?;
        self.ctx
            .outbox
            .signal(self.remote, &SignalPayload::Offer { sdp: offer.sdp });
        Ok(())
    }

    async fn flush_pending_candidates(&mut self) {
        for candidate in std::mem::take(&mut self.pending_candidates) {
            if let Err(e) = self.connection.add_candidate(candidate).await {
                debug!("Buffered candidate from {} rejected: {}", self.remote, e);
            }
        }
    }

    fn enter_negotiating(&mut self) {
        if self.state() != PeerState::New {
            return;
        }
        self.set_state(PeerState::Negotiating);
        if let Some(timeout) = self.ctx.negotiation_timeout {
            self.negotiation_deadline = Some(Instant::now() + timeout);
        }
    }

    fn set_state(&self, next: PeerState) {
        let changed = self.teardown.state.send_if_modified(|current| {
            if *current == PeerState::Closed || *current == next {
                return false;
            }
            *current = next;
            true
        });
        if changed {
            info!("Session with {} is now {:?}", self.remote, next);
        }
    }

    pub async fn terminate(&self) -> bool {
        self.teardown.close().await
    }
}

/// Manager-side view of a running [`PeerSession`].
#[derive(Clone)]
pub struct PeerSessionHandle {
    remote: ConnectionId,
    token: SessionToken,
    role: NegotiationRole,
    input_tx: mpsc::UnboundedSender<SessionInput>,
    state: watch::Receiver<PeerState>,
    teardown: Arc<Teardown>,
}

impl PeerSessionHandle {
    pub fn remote(&self) -> ConnectionId {
        self.remote
    }

    pub fn token(&self) -> SessionToken {
        self.token
    }

    pub fn role(&self) -> NegotiationRole {
        self.role
    }

    pub fn state(&self) -> PeerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<PeerState> {
        self.state.clone()
    }

    /// Queues a signal behind everything already delivered from this remote.
    pub fn deliver(&self, payload: SignalPayload) -> bool {
        self.input_tx.send(SessionInput::Signal(payload)).is_ok()
    }

    pub fn restart_ice(&self) -> bool {
        self.input_tx.send(SessionInput::RestartIce).is_ok()
    }

    /// Safe to race with the session closing itself; returns whether this
    /// call was the one that closed it.
    pub async fn close(&self) -> bool {
        self.teardown.close().await
    }
}
