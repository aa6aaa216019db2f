use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::media::{LocalMediaSource, MediaConnectionFactory, TrackKind};
use crate::session::{SessionEvent, SessionManager, SignalOutbox};
use crate::speaker::{ActiveSpeakerMonitor, Speaker};
use crate::transport::{TransportEvent, WsTransport};
use meshcall_core::{ClientMessage, ConnectionId, RoomId};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

/// Coordination channel status as shown to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    /// Reconnecting was given up. Terminal.
    Disconnected,
}

/// One participant: session manager, speaker monitor and signaling
/// channel wired together.
pub struct MeshClient {
    config: ClientConfig,
    manager: SessionManager,
    session_events: mpsc::UnboundedReceiver<SessionEvent>,
    status: watch::Sender<ConnectionStatus>,
    speaker: watch::Sender<Option<Speaker>>,
}

impl MeshClient {
    /// Returns the client and the frames it wants sent to the server.
    pub fn new(
        config: ClientConfig,
        factory: Arc<dyn MediaConnectionFactory>,
    ) -> (Self, mpsc::UnboundedReceiver<ClientMessage>) {
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let (manager, session_events) =
            SessionManager::new(factory, SignalOutbox::new(outgoing_tx), config.clone());

        let client = Self {
            config,
            manager,
            session_events,
            status: watch::Sender::new(ConnectionStatus::Connecting),
            speaker: watch::Sender::new(None),
        };

        (client, outgoing_rx)
    }

    /// Acquires local media and joins `room` over a WebSocket to the
    /// configured server, then runs until `shutdown` resolves or the
    /// channel is lost for good.
    pub async fn connect(
        config: ClientConfig,
        factory: Arc<dyn MediaConnectionFactory>,
        source: &dyn LocalMediaSource,
        room: RoomId,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ClientError> {
        let (mut client, outgoing) = Self::new(config, factory);
        client.acquire_media(source).await?;
        client.join(room)?;

        let (transport_events, transport) =
            WsTransport::spawn(client.config.server_url.clone(), client.config.reconnect, outgoing);
        let result = client.run(transport_events, shutdown).await;
        transport.abort();
        result
    }

    pub async fn acquire_media(&mut self, source: &dyn LocalMediaSource) -> Result<(), ClientError> {
        self.manager.acquire_media(source).await
    }

    pub fn join(&mut self, room: RoomId) -> Result<(), ClientError> {
        self.manager.join(room)
    }

    pub fn status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn active_speaker(&self) -> watch::Receiver<Option<Speaker>> {
        self.speaker.subscribe()
    }

    pub fn toggle_audio(&self) -> Option<bool> {
        self.manager.toggle(TrackKind::Audio)
    }

    pub fn toggle_video(&self) -> Option<bool> {
        self.manager.toggle(TrackKind::Video)
    }

    pub fn restart_ice(&self, remote: &ConnectionId) -> bool {
        self.manager.restart_ice(remote)
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    /// Drives the client from transport events. Always shuts the session
    /// manager down before returning.
    pub async fn run(
        mut self,
        mut transport_events: mpsc::UnboundedReceiver<TransportEvent>,
        shutdown: impl Future<Output = ()>,
    ) -> Result<(), ClientError> {
        let monitor = ActiveSpeakerMonitor::new(self.manager.views().audio.clone(), self.config.speaker);
        let monitor_task = tokio::spawn(monitor.run(self.speaker.clone()));

        let mut heartbeat = interval(self.config.heartbeat_interval());
        heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
        heartbeat.tick().await;

        tokio::pin!(shutdown);

        let result = loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Hanging up");
                    break Ok(());
                }

                event = transport_events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        self.status.send_replace(ConnectionStatus::Connected);
                    }
                    Some(TransportEvent::Message(msg)) => {
                        self.manager.handle_server_message(msg).await;
                    }
                    Some(TransportEvent::Disconnected) => {
                        self.status.send_replace(ConnectionStatus::Connecting);
                        self.manager.handle_transport_lost().await;
                    }
                    Some(TransportEvent::GaveUp { attempts }) => {
                        self.status.send_replace(ConnectionStatus::Disconnected);
                        break Err(ClientError::TransportExhausted { attempts });
                    }
                    None => {
                        self.status.send_replace(ConnectionStatus::Disconnected);
                        break Err(ClientError::ChannelClosed);
                    }
                },

                Some(event) = self.session_events.recv() => {
                    self.manager.handle_session_event(event);
                }

                _ = heartbeat.tick() => {
                    if *self.status.borrow() == ConnectionStatus::Connected {
                        self.manager.send_heartbeat();
                    }
                }
            }
        };

        if let Err(e) = &result {
            warn!("Client stopped: {}", e);
        }
        self.manager.shutdown().await;
        monitor_task.abort();
        result
    }
}
