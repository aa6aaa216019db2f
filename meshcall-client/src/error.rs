use crate::media::SignalingState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MediaAcquisitionError {
    #[error("media access denied: {0}")]
    Denied(String),

    #[error("no usable media device: {0}")]
    Unavailable(String),
}

/// Failure while applying one signaling step. Never fatal to the session.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("unexpected {kind} in signaling state {state:?}")]
    OutOfOrder {
        kind: &'static str,
        state: SignalingState,
    },

    #[error("session already closed")]
    Closed,

    #[error(transparent)]
    Media(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    MediaAcquisition(#[from] MediaAcquisitionError),

    #[error("local media must be acquired before joining a room")]
    MediaNotReady,

    #[error("signaling channel lost after {attempts} reconnect attempts")]
    TransportExhausted { attempts: u32 },

    #[error("signaling channel closed")]
    ChannelClosed,
}
