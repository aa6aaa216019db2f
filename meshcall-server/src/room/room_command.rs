use meshcall_core::{ConnectionId, ServerMessage};
use tokio::sync::oneshot;

/// Commands processed one at a time by a room's event loop.
#[derive(Debug)]
pub enum RoomCommand {
    /// Add a member. The reply carries the members present before the join.
    /// A dropped reply means the room retired and the join must be retried.
    Join {
        connection_id: ConnectionId,
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },

    /// Remove a member; replies once the departure has been broadcast.
    Leave {
        connection_id: ConnectionId,
        reply: oneshot::Sender<()>,
    },

    /// Fan a frame out to every member except `exclude`.
    Broadcast {
        exclude: Option<ConnectionId>,
        message: ServerMessage,
    },

    /// Current member list.
    Members {
        reply: oneshot::Sender<Vec<ConnectionId>>,
    },
}
