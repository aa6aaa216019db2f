mod connection;
mod protocol;
mod room;
mod signaling;

pub use connection::ConnectionId;
pub use protocol::{ClientMessage, ServerMessage};
pub use room::{InvalidRoomId, RoomId};
pub use signaling::{
    IceCandidate, IceServerConfig, SdpKind, SessionDescription, SignalEnvelope,
    SignalPayload,
};
