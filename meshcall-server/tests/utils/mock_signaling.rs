use async_trait::async_trait;
use meshcall_core::{ConnectionId, ServerMessage};
use meshcall_server::SignalingOutput;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Mock SignalingOutput that records every frame per target connection.
///
/// Only connections registered through [`MockSignalingOutput::connect`] are
/// live; sends to anything else report a miss.
#[derive(Clone, Default)]
pub struct MockSignalingOutput {
    live: Arc<Mutex<HashSet<ConnectionId>>>,
    sent: Arc<Mutex<Vec<(ConnectionId, ServerMessage)>>>,
}

impl MockSignalingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fresh live connection.
    pub fn connect(&self) -> ConnectionId {
        let id = ConnectionId::new();
        self.live.lock().unwrap().insert(id);
        id
    }

    pub fn disconnect(&self, id: &ConnectionId) {
        self.live.lock().unwrap().remove(id);
    }

    /// All frames delivered to `id`, in delivery order.
    pub fn messages_for(&self, id: &ConnectionId) -> Vec<ServerMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(to, _)| to == id)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Ids announced to `id` through `user-joined`.
    pub fn joined_seen_by(&self, id: &ConnectionId) -> Vec<ConnectionId> {
        self.messages_for(id)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::UserJoined { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Ids announced to `id` through `user-disconnected`.
    pub fn departures_seen_by(&self, id: &ConnectionId) -> Vec<ConnectionId> {
        self.messages_for(id)
            .into_iter()
            .filter_map(|msg| match msg {
                ServerMessage::UserDisconnected { id } => Some(id),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.sent.lock().unwrap().clear();
    }
}

#[async_trait]
impl SignalingOutput for MockSignalingOutput {
    async fn send(&self, to: &ConnectionId, msg: ServerMessage) -> bool {
        tracing::debug!("[MockSignaling] {:?} -> {}", msg, to);

        if !self.live.lock().unwrap().contains(to) {
            return false;
        }
        self.sent.lock().unwrap().push((*to, msg));
        true
    }
}

/// Wraps [`MockSignalingOutput`] with a gate. While the gate is closed every
/// send blocks, which holds the room loop mid-command.
#[derive(Clone)]
pub struct GatedSignalingOutput {
    inner: MockSignalingOutput,
    open: watch::Sender<bool>,
}

impl GatedSignalingOutput {
    pub fn new(inner: MockSignalingOutput) -> Self {
        Self {
            inner,
            open: watch::Sender::new(true),
        }
    }

    pub fn close_gate(&self) {
        self.open.send_replace(false);
    }

    pub fn open_gate(&self) {
        self.open.send_replace(true);
    }
}

#[async_trait]
impl SignalingOutput for GatedSignalingOutput {
    async fn send(&self, to: &ConnectionId, msg: ServerMessage) -> bool {
        let mut open = self.open.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return false;
        }
        self.inner.send(to, msg).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_signaling_drops_for_unknown_target() {
        let signaling = MockSignalingOutput::new();
        let live = signaling.connect();
        let gone = ConnectionId::new();

        assert!(signaling.send(&live, ServerMessage::HeartbeatAck).await);
        assert!(!signaling.send(&gone, ServerMessage::HeartbeatAck).await);

        assert_eq!(signaling.messages_for(&live), vec![ServerMessage::HeartbeatAck]);
        assert!(signaling.messages_for(&gone).is_empty());
    }
}
