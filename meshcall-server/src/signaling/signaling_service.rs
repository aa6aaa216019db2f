use crate::signaling::SignalingOutput;
use async_trait::async_trait;
use axum::extract::ws::Message;
use dashmap::DashMap;
use meshcall_core::{ConnectionId, IceServerConfig, ServerMessage};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error};

struct SignalingInner {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<Message>>,
    ice_servers: Vec<IceServerConfig>,
}

/// Table of live WebSocket channels, keyed by their server-assigned id.
#[derive(Clone)]
pub struct SignalingService {
    inner: Arc<SignalingInner>,
}

impl SignalingService {
    pub fn new(ice_servers: Vec<IceServerConfig>) -> Self {
        Self {
            inner: Arc::new(SignalingInner {
                connections: DashMap::new(),
                ice_servers,
            }),
        }
    }

    pub fn ice_servers(&self) -> Vec<IceServerConfig> {
        self.inner.ice_servers.clone()
    }

    pub fn add_connection(&self, connection_id: ConnectionId, tx: mpsc::UnboundedSender<Message>) {
        self.inner.connections.insert(connection_id, tx);
    }

    pub fn remove_connection(&self, connection_id: &ConnectionId) {
        self.inner.connections.remove(connection_id);
    }

    pub fn connection_count(&self) -> usize {
        self.inner.connections.len()
    }

    pub fn send_message(&self, connection_id: &ConnectionId, msg: &ServerMessage) -> bool {
        let Some(connection) = self.inner.connections.get(connection_id) else {
            debug!(
                "Attempted to send {:?} to disconnected connection {}",
                msg, connection_id
            );
            return false;
        };

        match serde_json::to_string(msg) {
            Ok(json) => match connection.send(Message::Text(json.into())) {
                Ok(()) => true,
                Err(e) => {
                    error!("Failed to queue WS message to {}: {:?}", connection_id, e);
                    false
                }
            },
            Err(e) => {
                error!("Failed to serialize server message: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl SignalingOutput for SignalingService {
    async fn send(&self, to: &ConnectionId, msg: ServerMessage) -> bool {
        self.send_message(to, &msg)
    }
}
