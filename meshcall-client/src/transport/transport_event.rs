use meshcall_core::ServerMessage;

#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A channel is open; the server's `welcome` follows.
    Connected,
    Message(ServerMessage),
    /// The channel dropped and a reconnect is pending.
    Disconnected,
    /// Reconnecting was abandoned. No further events follow.
    GaveUp { attempts: u32 },
}
