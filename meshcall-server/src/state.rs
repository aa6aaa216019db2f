use crate::config::ServerConfig;
use crate::room::RoomRegistry;
use crate::signaling::{SignalRelay, SignalingOutput, SignalingService};
use std::sync::Arc;

/// Shared state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub signaling: SignalingService,
    pub registry: RoomRegistry,
    pub relay: SignalRelay,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Self {
        let signaling = SignalingService::new(config.ice_servers.clone());
        let output: Arc<dyn SignalingOutput> = Arc::new(signaling.clone());

        Self {
            registry: RoomRegistry::new(output.clone(), config.room_command_capacity),
            relay: SignalRelay::new(output),
            signaling,
        }
    }
}
