use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::media::{LocalMedia, LocalMediaSource, MediaConnectionFactory, TrackKind};
use crate::session::{
    PeerSession, PeerSessionHandle, PeerState, SessionContext, SessionEvent, SessionViews,
    SignalOutbox,
};
use crate::speaker::Speaker;
use meshcall_core::{
    ClientMessage, ConnectionId, IceServerConfig, RoomId, ServerMessage, SignalPayload,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Owns the local participant's sessions, one per known co-member.
///
/// The active set only changes through membership frames from the server,
/// terminal session events, transport loss and shutdown.
pub struct SessionManager {
    factory: Arc<dyn MediaConnectionFactory>,
    outbox: SignalOutbox,
    config: ClientConfig,
    local_id: Option<ConnectionId>,
    ice_servers: Vec<IceServerConfig>,
    room: Option<RoomId>,
    local_media: Option<Arc<LocalMedia>>,
    sessions: HashMap<ConnectionId, PeerSessionHandle>,
    views: SessionViews,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionManager {
    pub fn new(
        factory: Arc<dyn MediaConnectionFactory>,
        outbox: SignalOutbox,
        config: ClientConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let manager = Self {
            factory,
            outbox,
            ice_servers: config.ice_servers.clone(),
            config,
            local_id: None,
            room: None,
            local_media: None,
            sessions: HashMap::new(),
            views: SessionViews::default(),
            events_tx,
        };

        (manager, events_rx)
    }

    pub async fn acquire_media(&mut self, source: &dyn LocalMediaSource) -> Result<(), ClientError> {
        let media = source.acquire().await.inspect_err(|e| {
            warn!("Local media unavailable: {}", e);
        })?;
        self.start_media(media);
        Ok(())
    }

    pub fn start_media(&mut self, media: LocalMedia) {
        if let Some(level) = media.audio_level() {
            self.views.audio.insert(Speaker::Local, level);
        }
        info!("Local media ready with {} tracks", media.tracks().len());
        self.local_media = Some(Arc::new(media));
    }

    /// Records the room to be in. The join is sent once the server has
    /// welcomed this connection, and again after every reconnect.
    pub fn join(&mut self, room: RoomId) -> Result<(), ClientError> {
        if self.local_media.is_none() {
            return Err(ClientError::MediaNotReady);
        }

        info!("Joining room '{}'", room);
        self.room = Some(room);
        if self.local_id.is_some() {
            self.send_join();
        }
        Ok(())
    }

    pub async fn handle_server_message(&mut self, msg: ServerMessage) {
        match msg {
            ServerMessage::Welcome { connection_id } => {
                info!("Server assigned connection id {}", connection_id);
                self.local_id = Some(connection_id);
                if self.room.is_some() {
                    self.send_join();
                }
            }

            ServerMessage::IceConfig { ice_servers } => {
                if !ice_servers.is_empty() {
                    debug!("Using {} ICE servers from server", ice_servers.len());
                    self.ice_servers = ice_servers;
                }
            }

            ServerMessage::AllUsers { members } => {
                info!("Room has {} other participants", members.len());
                for remote in members {
                    self.add_peer(remote).await;
                }
            }

            ServerMessage::UserJoined { id } => {
                self.add_peer(id).await;
            }

            ServerMessage::UserDisconnected { id } => {
                self.remove_peer(&id).await;
            }

            ServerMessage::Signal { from, payload } => {
                let payload = match SignalPayload::from_value(payload) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Malformed signal from {}: {}", from, e);
                        return;
                    }
                };

                match self.sessions.get(&from) {
                    Some(handle) => {
                        handle.deliver(payload);
                    }
                    None => debug!("Dropping {} from unknown peer {}", payload.kind(), from),
                }
            }

            ServerMessage::HeartbeatAck => {
                debug!("Heartbeat acknowledged");
            }

            ServerMessage::Error { message } => {
                warn!("Server error: {}", message);
            }
        }
    }

    /// Removes the session that ended. An event from a session that was
    /// already replaced by a newer one for the same remote is ignored.
    pub fn handle_session_event(&mut self, event: SessionEvent) {
        let SessionEvent::Ended { remote, token, state } = event;

        match self.sessions.get(&remote) {
            Some(handle) if handle.token() == token => {
                self.sessions.remove(&remote);
                self.views.prune(&remote);
                info!("Session with {} ended in state {:?}", remote, state);
            }
            Some(_) => debug!("Stale end of session with {} ignored", remote),
            None => {}
        }
    }

    /// Drops every session; the server has already forgotten this
    /// connection and will hand out a new id on reconnect.
    pub async fn handle_transport_lost(&mut self) {
        warn!("Signaling channel lost, closing {} sessions", self.sessions.len());
        self.local_id = None;
        self.close_all().await;
    }

    /// Hang up: close every session, leave the room, release local media.
    pub async fn shutdown(&mut self) {
        self.close_all().await;

        if self.room.take().is_some() {
            self.outbox.send(ClientMessage::LeaveRoom);
        }
        if let Some(media) = self.local_media.take() {
            media.release();
        }
        self.views.audio.clear();
        info!("Session manager shut down");
    }

    pub fn send_heartbeat(&self) -> bool {
        self.outbox.send(ClientMessage::Heartbeat)
    }

    pub fn restart_ice(&self, remote: &ConnectionId) -> bool {
        self.sessions
            .get(remote)
            .is_some_and(|handle| handle.restart_ice())
    }

    /// Returns the new enabled state, or `None` without local media.
    pub fn toggle(&self, kind: TrackKind) -> Option<bool> {
        let media = self.local_media.as_ref()?;
        Some(match kind {
            TrackKind::Audio => media.toggle_audio(),
            TrackKind::Video => media.toggle_video(),
        })
    }

    pub fn local_id(&self) -> Option<ConnectionId> {
        self.local_id
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn active_peers(&self) -> Vec<ConnectionId> {
        let mut peers: Vec<ConnectionId> = self.sessions.keys().copied().collect();
        peers.sort();
        peers
    }

    pub fn session_state(&self, remote: &ConnectionId) -> Option<PeerState> {
        self.sessions.get(remote).map(PeerSessionHandle::state)
    }

    pub fn video_enabled(&self, remote: &ConnectionId) -> Option<bool> {
        self.views.video.get(remote).map(|v| *v)
    }

    pub fn views(&self) -> &SessionViews {
        &self.views
    }

    async fn add_peer(&mut self, remote: ConnectionId) {
        let Some(local) = self.local_id else {
            warn!("Ignoring peer {} before welcome", remote);
            return;
        };
        if remote == local || self.sessions.contains_key(&remote) {
            return;
        }

        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let connection = match self
            .factory
            .create(remote, &self.ice_servers, media_tx)
            .await
        {
            Ok(connection) => connection,
            Err(e) => {
                warn!("Failed to create connection to {}: {:?}", remote, e);
                return;
            }
        };

        let ctx = SessionContext {
            local,
            outbox: self.outbox.clone(),
            views: self.views.clone(),
            events: self.events_tx.clone(),
            negotiation_timeout: self.config.negotiation_timeout(),
        };
        let session = PeerSession::new(ctx, remote, connection, self.local_media.clone());
        self.sessions.insert(remote, session.spawn(media_rx));
    }

    async fn remove_peer(&mut self, remote: &ConnectionId) {
        let Some(handle) = self.sessions.remove(remote) else {
            return;
        };
        handle.close().await;
        self.views.prune(remote);
        info!("{} left, {} sessions remaining", remote, self.sessions.len());
    }

    async fn close_all(&mut self) {
        for (remote, handle) in self.sessions.drain() {
            handle.close().await;
            self.views.prune(&remote);
        }
        self.views.video.clear();
        self.views.audio.retain_local();
    }

    fn send_join(&self) {
        if let Some(room) = &self.room {
            self.outbox
                .send(ClientMessage::JoinRoom { room: room.clone() });
        }
    }
}
