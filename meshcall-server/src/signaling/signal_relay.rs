use crate::signaling::SignalingOutput;
use meshcall_core::{ConnectionId, ServerMessage, SignalEnvelope};
use std::sync::Arc;
use tracing::{debug, warn};

/// Routes negotiation payloads between connections.
///
/// Routing is by `ConnectionId` only: the relay does not consult rooms and
/// never looks inside the payload. The sender id always comes from the
/// channel the envelope arrived on.
#[derive(Clone)]
pub struct SignalRelay {
    signaling: Arc<dyn SignalingOutput>,
}

impl SignalRelay {
    pub fn new(signaling: Arc<dyn SignalingOutput>) -> Self {
        Self { signaling }
    }

    /// Returns whether the target was live. A miss is not an error for the
    /// sender; it finds out through its own connection state.
    pub async fn relay(&self, sender: ConnectionId, envelope: SignalEnvelope) -> bool {
        let SignalEnvelope { to, from, payload } = envelope;

        if let Some(claimed) = from.filter(|claimed| *claimed != sender) {
            warn!(
                "Connection {} claimed to be {} in a signal; overriding",
                sender, claimed
            );
        }

        let delivered = self
            .signaling
            .send(&to, ServerMessage::Signal {
                from: sender,
                payload,
            })
            .await;

        if !delivered {
            debug!("Dropped signal from {} to departed connection {}", sender, to);
        }

        delivered
    }
}
