use meshcall_core::RoomId;
use std::net::SocketAddr;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {name}: {value:?}")]
    InvalidVar { name: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The room kept retiring underneath the join. Only reachable under
    /// pathological join/leave churn on a single id.
    #[error("room {0} was unavailable after repeated join attempts")]
    RoomUnavailable(RoomId),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server stopped: {0}")]
    Io(#[from] std::io::Error),
}
