use crate::model::connection::ConnectionId;
use crate::model::room::RoomId;
use crate::model::signaling::{IceServerConfig, SignalEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames sent by a participant to the coordination server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ClientMessage {
    JoinRoom {
        room: RoomId,
    },
    LeaveRoom,
    Signal(SignalEnvelope),
    Heartbeat,
}

/// Frames pushed by the coordination server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", content = "d", rename_all = "kebab-case")]
pub enum ServerMessage {
    Welcome {
        connection_id: ConnectionId,
    },
    IceConfig {
        ice_servers: Vec<IceServerConfig>,
    },
    AllUsers {
        members: Vec<ConnectionId>,
    },
    UserJoined {
        id: ConnectionId,
    },
    UserDisconnected {
        id: ConnectionId,
    },
    Signal {
        from: ConnectionId,
        payload: Value,
    },
    HeartbeatAck,
    Error {
        message: String,
    },
}
