use crate::media::PeerConnectionState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    New,
    Negotiating,
    Connected,
    Failed,
    Disconnected,
    Closed,
}

impl PeerState {
    /// `Failed` and `Disconnected` escalate to `Closed`; all three end the
    /// session.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PeerState::Failed | PeerState::Disconnected | PeerState::Closed
        )
    }

    /// Session state implied by a media connection transition, if any.
    pub fn from_connection(state: PeerConnectionState) -> Option<Self> {
        match state {
            PeerConnectionState::Connected => Some(PeerState::Connected),
            PeerConnectionState::Failed => Some(PeerState::Failed),
            PeerConnectionState::Disconnected => Some(PeerState::Disconnected),
            PeerConnectionState::Closed => Some(PeerState::Closed),
            PeerConnectionState::New | PeerConnectionState::Connecting => None,
        }
    }
}
