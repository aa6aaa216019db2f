use meshcall_core::{ConnectionId, ServerMessage};
use async_trait::async_trait;

/// Outbound side of the transport channel table. Rooms and the relay only
/// know connections through this trait.
#[async_trait]
pub trait SignalingOutput: Send + Sync {
    /// Pushes a frame to one connection. Returns `false` if that connection
    /// is no longer live; the frame is dropped in that case.
    async fn send(&self, to: &ConnectionId, msg: ServerMessage) -> bool;
}
