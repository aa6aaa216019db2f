use meshcall_core::{ClientMessage, ConnectionId, SignalEnvelope, SignalPayload};
use tokio::sync::mpsc;
use tracing::warn;

/// Outgoing half of the signaling channel, shared by every session.
#[derive(Clone, Debug)]
pub struct SignalOutbox {
    tx: mpsc::UnboundedSender<ClientMessage>,
}

impl SignalOutbox {
    pub fn new(tx: mpsc::UnboundedSender<ClientMessage>) -> Self {
        Self { tx }
    }

    pub fn send(&self, msg: ClientMessage) -> bool {
        self.tx.send(msg).is_ok()
    }

    /// `from` is left empty; the relay stamps it.
    pub fn signal(&self, to: ConnectionId, payload: &SignalPayload) -> bool {
        let payload = match payload.to_value() {
            Ok(value) => value,
            Err(e) => {
                warn!("Failed to encode {} for {}: {}", payload.kind(), to, e);
                return false;
            }
        };

        self.send(ClientMessage::Signal(SignalEnvelope {
            to,
            from: None,
            payload,
        }))
    }
}
