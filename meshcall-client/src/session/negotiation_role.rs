use meshcall_core::ConnectionId;

/// Tie-break for one mesh edge.
///
/// Both ends compute this independently from the same pair of ids, and the
/// total order on [`ConnectionId`] guarantees they disagree: the greater id
/// is impolite and initiates offers, the lesser is polite and yields when
/// offers collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationRole {
    Polite,
    Impolite,
}

impl NegotiationRole {
    pub fn for_edge(local: ConnectionId, remote: ConnectionId) -> Self {
        if local > remote {
            NegotiationRole::Impolite
        } else {
            NegotiationRole::Polite
        }
    }

    pub fn is_polite(self) -> bool {
        self == NegotiationRole::Polite
    }
}
